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
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_spawn_1000_entities(c: &mut Criterion) {
    c.bench_function("spawn_1000_entities", |b| {
        b.iter(|| {
            let mut world = World::new();
            let position = world.new_component("Position", 12);
            let family = world.new_family("Position", "Position").unwrap();
            black_box(world.new_w_count(family, 1000).unwrap());
            let _ = position;
        })
    });
}

fn bench_add_and_commit_1000_entities(c: &mut Criterion) {
    c.bench_function("add_commit_1000_entities", |b| {
        b.iter(|| {
            let mut world = World::new();
            let position = world.new_component("Position", 12);
            let velocity = world.new_component("Velocity", 12);
            let empty = world.new_family("Empty", "0").unwrap();
            let entities = world.new_w_count(empty, 1000).unwrap();

            for &e in &entities {
                world.add(e, position).unwrap();
                world.add(e, velocity).unwrap();
                world.commit(e).unwrap();
            }
            black_box(&entities);
        })
    });
}

fn bench_staged_commit_and_merge_1000_entities(c: &mut Criterion) {
    c.bench_function("staged_commit_merge_1000_entities", |b| {
        b.iter(|| {
            let mut world = World::new();
            let velocity = world.new_component("Velocity", 12);
            let position_family = world.new_family("Position", "0").unwrap();
            let entities = world.new_w_count(position_family, 1000).unwrap();

            world.begin_progress();
            for &e in &entities {
                world.add(e, velocity).unwrap();
                world.commit(e).unwrap();
            }
            world.merge();
            black_box(&entities);
        })
    });
}

criterion_group!(
    benches,
    bench_spawn_1000_entities,
    bench_add_and_commit_1000_entities,
    bench_staged_commit_and_merge_1000_entities,
);
criterion_main!(benches);
