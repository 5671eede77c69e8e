// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use archetype_store::World;

#[test]
fn staged_only_view_diverges_from_world_view_until_merge() {
    let mut world = World::new();
    let velocity = world.new_component("Velocity", 4);
    let velocity_family = world.new_family("Velocity", "Velocity").unwrap();
    let empty = world.new_family("Empty", "0").unwrap();
    let entity = world.new(empty).unwrap();

    world.begin_progress();
    world.add(entity, velocity).unwrap();
    world.commit(entity).unwrap();

    assert!(world.get_ptr(entity, velocity, true).is_some());
    assert!(world.get_ptr(entity, velocity, false).is_none());
    // `has` reads the same effective (stage-first) location as
    // `get_ptr(.., staged_only=true)`, so it already sees the staged add.
    assert!(world.has(entity, velocity_family).unwrap());

    world.merge();

    assert!(world.get_ptr(entity, velocity, true).is_some());
    assert!(world.get_ptr(entity, velocity, false).is_some());
    assert!(world.has(entity, velocity_family).unwrap());
}

#[test]
fn staged_writes_survive_the_merge() {
    let mut world = World::new();
    let velocity = world.new_component("Velocity", 4);
    let empty = world.new_family("Empty", "0").unwrap();
    let entity = world.new(empty).unwrap();

    world.begin_progress();
    world.add(entity, velocity).unwrap();
    world.commit(entity).unwrap();
    world.set_ptr(entity, velocity, &[5, 6, 7, 8]).unwrap();
    world.merge();

    assert_eq!(world.get_ptr(entity, velocity, false).unwrap(), &[5, 6, 7, 8]);
}

#[test]
fn deferred_delete_during_progress_only_lands_at_merge() {
    let mut world = World::new();
    let position = world.new_component("Position", 4);
    let position_family = world.new_family("Position", "Position").unwrap();
    let entity = world.new(position_family).unwrap();

    world.begin_progress();
    world.delete(entity);
    // Still present from the world's point of view until merge applies the
    // deferred delete.
    assert!(world.has(entity, position_family).unwrap());

    world.merge();
    assert!(!world.has(entity, position_family).unwrap());
}

#[test]
fn merge_without_subscriptions_produces_no_notifications() {
    let mut world = World::new();
    let velocity = world.new_component("Velocity", 4);
    let empty = world.new_family("Empty", "0").unwrap();
    let entity = world.new(empty).unwrap();
    let _ = world.drain_notifications(); // discard the spawn's own notifications

    world.begin_progress();
    world.add(entity, velocity).unwrap();
    world.commit(entity).unwrap();
    world.merge();

    assert!(world.drain_notifications().is_empty());
}
