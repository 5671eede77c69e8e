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

//! The commit engine: folds a pending add/remove pair into an entity's
//! effective family, migrates its row between tables, and reports which
//! observers should fire.
//!
//! `commit_w_family` comes in two flavours. [`commit_in_world`] mutates the
//! world's own tables and entity index directly (used outside a progress
//! cycle, and by [`merge_entity`] at the end of one). [`commit_in_stage`]
//! writes into the staging overlay instead, so a traversal in progress never
//! observes a half-applied mutation.

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::family::FamilyId;
use crate::handle::{ComponentRegistry, Handle};
use crate::index::{EntityIndex, Location};
use crate::notify::{Notification, ObserverRegistry};
use crate::prefab::PrefabIndex;
use crate::stage::Stage;
use crate::table::{self, Table};

/// Result of folding one commit into the world or stage.
pub struct CommitOutcome {
    pub family: FamilyId,
    pub row: u32,
    pub notifications: Vec<Notification>,
}

fn ensure_world_table(
    tables: &mut FxHashMap<FamilyId, Table>,
    family: FamilyId,
    interner: &crate::family::FamilyInterner,
    components: &ComponentRegistry,
) -> Result<()> {
    if tables.contains_key(&family) {
        return Ok(());
    }
    let schema = interner.members(family).to_vec();
    let sizes = components
        .sizes_for(&schema)
        .ok_or(EcsError::ComponentNotRegistered)?;
    tables.insert(family, Table::new(family, &schema, &sizes));
    Ok(())
}

/// Walk `family`'s prefab chain, copying default column values for every
/// enclosing prefab family into `(dst_family, dst_row)`'s row, closest
/// ancestor last so nearer prefabs win ties on overlapping columns.
fn copy_from_prefab_chain(
    tables: &mut FxHashMap<FamilyId, Table>,
    prefabs: &PrefabIndex,
    index: &EntityIndex,
    dst_family: FamilyId,
    dst_row: usize,
) {
    const MAX_CHAIN: usize = 8;
    let mut chain = Vec::new();
    let mut frontier = dst_family;
    let mut visited = vec![frontier];
    for _ in 0..MAX_CHAIN {
        let Some(prefab_entity) = prefabs.prefab_for(frontier) else {
            break;
        };
        let Location::At {
            family: prefab_family,
            row: prefab_row,
        } = index.get(prefab_entity)
        else {
            break;
        };
        if visited.contains(&prefab_family) {
            break;
        }
        visited.push(prefab_family);
        chain.push((prefab_family, prefab_row as usize));
        frontier = prefab_family;
    }

    // Apply furthest ancestor first so a nearer prefab's values win.
    for (prefab_family, prefab_row) in chain.into_iter().rev() {
        let Some(src_table) = tables.get(&prefab_family) else {
            continue;
        };
        let src_base = src_table.row_ptr(prefab_row);
        let src_cols = src_table.columns().to_vec();
        let Some(dst_table) = tables.get_mut(&dst_family) else {
            continue;
        };
        let dst_base = dst_table.row_ptr_mut(dst_row);
        table::copy_shared_columns(&src_cols, src_base, dst_table.columns(), dst_base);
    }
}

/// Commit `entity`'s pending `to_add`/`to_remove` directly against the
/// world's own storage.
#[allow(clippy::too_many_arguments)]
pub fn commit_in_world(
    entity: Handle,
    old: Location,
    to_add: FamilyId,
    to_remove: FamilyId,
    interner: &mut crate::family::FamilyInterner,
    components: &ComponentRegistry,
    tables: &mut FxHashMap<FamilyId, Table>,
    prefabs: &PrefabIndex,
    observers: &ObserverRegistry,
    index: &mut EntityIndex,
) -> Result<CommitOutcome> {
    let old_family = match old {
        Location::At { family, .. } => family,
        _ => FamilyId::EMPTY,
    };
    let old_row = match old {
        Location::At { row, .. } => Some(row as usize),
        _ => None,
    };
    let new_family = interner.merge(old_family, to_add, to_remove);

    if new_family == old_family {
        return Ok(CommitOutcome {
            family: new_family,
            row: old_row.unwrap_or(0) as u32,
            notifications: Vec::new(),
        });
    }

    let mut notifications = Vec::new();

    if new_family.is_empty() {
        if let Some(old_row) = old_row {
            observers.dispatch_deinit(
                interner,
                prefabs,
                index,
                old_family,
                entity,
                old_family,
                old_row as u32,
                &mut notifications,
            );
            if let Some(old_table) = tables.get_mut(&old_family) {
                if let Some(relocated) = old_table.delete(old_row) {
                    index.set_at(relocated, old_family, old_row as u32);
                }
            }
        }
        index.remove(entity);
        return Ok(CommitOutcome {
            family: FamilyId::EMPTY,
            row: 0,
            notifications,
        });
    }

    ensure_world_table(tables, new_family, interner, components)?;

    let new_row = if let Some(old_row) = old_row {
        let mut old_table = tables
            .remove(&old_family)
            .expect("entity with a row must have a table for its current family");
        let row = {
            let dest = tables
                .get_mut(&new_family)
                .expect("destination table was just ensured");
            let row = dest.insert(entity);
            Table::copy_row(&old_table, old_row, dest, row);
            row
        };
        if let Some(relocated) = old_table.delete(old_row) {
            index.set_at(relocated, old_family, old_row as u32);
        }
        tables.insert(old_family, old_table);
        row
    } else {
        tables
            .get_mut(&new_family)
            .expect("destination table was just ensured")
            .insert(entity)
    };

    if !to_remove.is_empty() {
        observers.dispatch_deinit(
            interner,
            prefabs,
            index,
            old_family,
            entity,
            old_family,
            old_row.unwrap_or(0) as u32,
            &mut notifications,
        );
    }
    if !to_add.is_empty() {
        observers.dispatch_init(
            interner,
            prefabs,
            index,
            new_family,
            entity,
            new_family,
            new_row as u32,
            &mut notifications,
        );
    }

    copy_from_prefab_chain(tables, prefabs, index, new_family, new_row);

    index.set_at(entity, new_family, new_row as u32);

    Ok(CommitOutcome {
        family: new_family,
        row: new_row as u32,
        notifications,
    })
}

/// Commit `entity`'s pending `to_add`/`to_remove` into the staging overlay.
/// `old` is looked up against the stage's own shadow index first by the
/// caller; `world_tables`/`world_index` supply the baseline row to copy
/// from and the prefab defaults, which always live in the world proper.
#[allow(clippy::too_many_arguments)]
pub fn commit_in_stage(
    entity: Handle,
    old: Location,
    to_add: FamilyId,
    to_remove: FamilyId,
    interner: &mut crate::family::FamilyInterner,
    components: &ComponentRegistry,
    world_tables: &FxHashMap<FamilyId, Table>,
    world_index: &EntityIndex,
    stage: &mut Stage,
    prefabs: &PrefabIndex,
    observers: &ObserverRegistry,
) -> Result<CommitOutcome> {
    let old_family = match old {
        Location::At { family, .. } => family,
        _ => FamilyId::EMPTY,
    };
    let old_row = match old {
        Location::At { row, .. } => Some(row as usize),
        _ => None,
    };
    let new_family = interner.merge(old_family, to_add, to_remove);

    if new_family == old_family {
        return Ok(CommitOutcome {
            family: new_family,
            row: old_row.unwrap_or(0) as u32,
            notifications: Vec::new(),
        });
    }

    let mut notifications = Vec::new();

    if new_family.is_empty() {
        if let Some(old_row) = old_row {
            observers.dispatch_deinit(
                interner,
                prefabs,
                &stage.entity_stage,
                old_family,
                entity,
                old_family,
                old_row as u32,
                &mut notifications,
            );
        }
        stage.entity_stage.set_empty(entity);
        return Ok(CommitOutcome {
            family: FamilyId::EMPTY,
            row: 0,
            notifications,
        });
    }

    let schema = interner.members(new_family).to_vec();
    let sizes = components
        .sizes_for(&schema)
        .ok_or(EcsError::ComponentNotRegistered)?;
    let new_row = stage.insert_row(new_family, &schema, &sizes, entity);

    // Copy surviving columns, preferring whatever the stage has already
    // recorded for this entity this cycle over the untouched world row.
    if let Some(old_row) = old_row {
        if let Some(src_table) = world_tables.get(&old_family) {
            let dest = stage
                .table_mut(new_family)
                .expect("table just created above");
            crate::stage::StageTable::copy_row_from_world(src_table, old_row, dest, new_row);
        }
    }
    // `new_family != old_family` always holds here (the identity case
    // returned above), so any row the stage already holds for `entity`
    // under `old_family` needs its columns carried forward too.
    if let Some(old_stage_table) = stage.take_table(old_family) {
        if let Some(staged_row) =
            (0..old_stage_table.len()).find(|&r| old_stage_table.row_entity(r) == entity)
        {
            let dest = stage
                .table_mut(new_family)
                .expect("table just created above");
            crate::stage::StageTable::copy_row_from_stage(
                &old_stage_table,
                staged_row,
                dest,
                new_row,
            );
        }
        stage.put_table(old_family, old_stage_table);
    }

    if !to_remove.is_empty() {
        observers.dispatch_deinit(
            interner,
            prefabs,
            &stage.entity_stage,
            old_family,
            entity,
            old_family,
            old_row.unwrap_or(0) as u32,
            &mut notifications,
        );
    }
    if !to_add.is_empty() {
        observers.dispatch_init(
            interner,
            prefabs,
            &stage.entity_stage,
            new_family,
            entity,
            new_family,
            new_row as u32,
            &mut notifications,
        );
    }

    copy_from_prefab_chain_staged(world_tables, world_index, stage, prefabs, new_family, new_row);

    stage.entity_stage.set_at(entity, new_family, new_row as u32);

    Ok(CommitOutcome {
        family: new_family,
        row: new_row as u32,
        notifications,
    })
}

fn copy_from_prefab_chain_staged(
    world_tables: &FxHashMap<FamilyId, Table>,
    world_index: &EntityIndex,
    stage: &mut Stage,
    prefabs: &PrefabIndex,
    dst_family: FamilyId,
    dst_row: usize,
) {
    const MAX_CHAIN: usize = 8;
    let mut chain = Vec::new();
    let mut frontier = dst_family;
    let mut visited = vec![frontier];
    for _ in 0..MAX_CHAIN {
        let Some(prefab_entity) = prefabs.prefab_for(frontier) else {
            break;
        };
        let Location::At {
            family: prefab_family,
            row: prefab_row,
        } = world_index.get(prefab_entity)
        else {
            break;
        };
        if visited.contains(&prefab_family) {
            break;
        }
        visited.push(prefab_family);
        chain.push((prefab_family, prefab_row as usize));
        frontier = prefab_family;
    }

    for (prefab_family, prefab_row) in chain.into_iter().rev() {
        let Some(src_table) = world_tables.get(&prefab_family) else {
            continue;
        };
        let src_base = src_table.row_ptr(prefab_row);
        let src_cols = src_table.columns().to_vec();
        let Some(dst_table) = stage.table_mut(dst_family) else {
            continue;
        };
        let dst_base = dst_table.row_base_mut(dst_row);
        table::copy_shared_columns(&src_cols, src_base, dst_table.columns(), dst_base);
    }
}

/// End-of-progress reconciliation: fold everything the stage recorded for
/// `entity` back into the world, in the order [`Stage::touched`] returns.
pub fn merge_entity(
    entity: Handle,
    interner: &mut crate::family::FamilyInterner,
    components: &ComponentRegistry,
    tables: &mut FxHashMap<FamilyId, Table>,
    stage: &Stage,
    prefabs: &PrefabIndex,
    observers: &ObserverRegistry,
    index: &mut EntityIndex,
) -> Result<CommitOutcome> {
    let old = index.get(entity);
    let old_family = match old {
        Location::At { family, .. } => family,
        _ => FamilyId::EMPTY,
    };
    // The staged row's family already reflects every add/remove folded in by
    // `commit_in_stage` so far this cycle -- `add_stage`/`remove_stage` are
    // drained by `World::commit` on the way in and are empty by the time
    // `merge` runs, so the staged family has to come from `entity_stage`,
    // falling back to the world's own family if this entity was touched but
    // never actually changed (a no-op commit doesn't update `entity_stage`).
    let staged_family = if stage.entity_stage.contains(entity) {
        match stage.entity_stage.get(entity) {
            Location::At { family, .. } => family,
            _ => FamilyId::EMPTY,
        }
    } else {
        old_family
    };
    let removed = stage
        .remove_merge
        .get(&entity)
        .copied()
        .unwrap_or(FamilyId::EMPTY);

    let deleted = stage.delete_stage.contains(&entity);
    let to_add = if deleted { FamilyId::EMPTY } else { staged_family };
    let to_remove = if deleted { old_family } else { removed };

    let outcome = commit_in_world(
        entity, old, to_add, to_remove, interner, components, tables, prefabs, observers, index,
    )?;

    // Overlay whatever the stage actually wrote for this entity's columns
    // this cycle -- the world migration above only carries over what the
    // *original* world row held, not writes that landed in the overlay.
    if !deleted && !outcome.family.is_empty() {
        if let Location::At {
            family: staged_family,
            row: staged_row,
        } = stage.entity_stage.get(entity)
        {
            if let Some(stage_table) = stage.table(staged_family) {
                let src_cols = stage_table.columns().to_vec();
                for col in &src_cols {
                    let Some(src_ptr) =
                        stage_table.component_ptr(staged_row as usize, col.component)
                    else {
                        continue;
                    };
                    let Some(dest_table) = tables.get_mut(&outcome.family) else {
                        continue;
                    };
                    if let Some(dst_ptr) =
                        dest_table.component_ptr_mut(outcome.row as usize, col.component)
                    {
                        unsafe {
                            std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, col.size);
                        }
                    }
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::FamilyInterner;

    fn setup() -> (
        FamilyInterner,
        ComponentRegistry,
        FxHashMap<FamilyId, Table>,
        PrefabIndex,
        ObserverRegistry,
        EntityIndex,
    ) {
        (
            FamilyInterner::new(),
            ComponentRegistry::new(),
            FxHashMap::default(),
            PrefabIndex::new(),
            ObserverRegistry::new(),
            EntityIndex::new(),
        )
    }

    #[test]
    fn commit_adds_a_component_and_migrates_row() {
        let (mut interner, mut components, mut tables, prefabs, observers, mut index) = setup();
        let pos = Handle::from_raw(1);
        components.register(pos, "Position", 8);
        let pos_family = interner.from_handle(pos);

        let entity = Handle::from_raw(100);
        let outcome = commit_in_world(
            entity,
            Location::Absent,
            pos_family,
            FamilyId::EMPTY,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();

        assert_eq!(outcome.family, pos_family);
        assert_eq!(index.get(entity), Location::At { family: pos_family, row: 0 });
        assert_eq!(tables.get(&pos_family).unwrap().len(), 1);
    }

    #[test]
    fn commit_removing_everything_drops_the_row() {
        let (mut interner, mut components, mut tables, prefabs, observers, mut index) = setup();
        let pos = Handle::from_raw(1);
        components.register(pos, "Position", 8);
        let pos_family = interner.from_handle(pos);
        let entity = Handle::from_raw(100);

        commit_in_world(
            entity,
            Location::Absent,
            pos_family,
            FamilyId::EMPTY,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();

        let outcome = commit_in_world(
            entity,
            index.get(entity),
            FamilyId::EMPTY,
            pos_family,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();

        assert!(outcome.family.is_empty());
        assert_eq!(index.get(entity), Location::Absent);
        assert_eq!(tables.get(&pos_family).unwrap().len(), 0);
    }

    #[test]
    fn commit_copies_prefab_defaults_into_new_row() {
        let (mut interner, mut components, mut tables, mut prefabs, observers, mut index) =
            setup();
        let hp = Handle::from_raw(1);
        components.register(hp, "Health", 4);
        let hp_family = interner.from_handle(hp);

        let prefab_entity = Handle::from_raw(1);
        commit_in_world(
            prefab_entity,
            Location::Absent,
            hp_family,
            FamilyId::EMPTY,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();
        let prefab_row = match index.get(prefab_entity) {
            Location::At { row, .. } => row as usize,
            _ => panic!("expected a row"),
        };
        unsafe {
            let ptr = tables
                .get_mut(&hp_family)
                .unwrap()
                .component_ptr_mut(prefab_row, hp)
                .unwrap();
            std::ptr::copy_nonoverlapping([99u8, 0, 0, 0].as_ptr(), ptr, 4);
        }
        prefabs.register(hp_family, prefab_entity);

        let instance = Handle::from_raw(2);
        let outcome = commit_in_world(
            instance,
            Location::Absent,
            hp_family,
            FamilyId::EMPTY,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();

        let ptr = tables
            .get(&hp_family)
            .unwrap()
            .component_ptr(outcome.row as usize, hp)
            .unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 4) };
        assert_eq!(bytes, &[99, 0, 0, 0]);
    }

    #[test]
    fn commit_fires_init_observers_for_added_family() {
        let (mut interner, mut components, mut tables, prefabs, mut observers, mut index) =
            setup();
        let pos = Handle::from_raw(1);
        components.register(pos, "Position", 8);
        let pos_family = interner.from_handle(pos);
        let system = Handle::from_raw(900);
        observers.subscribe_init(pos_family, system, pos_family);

        let entity = Handle::from_raw(100);
        let outcome = commit_in_world(
            entity,
            Location::Absent,
            pos_family,
            FamilyId::EMPTY,
            &mut interner,
            &components,
            &mut tables,
            &prefabs,
            &observers,
            &mut index,
        )
        .unwrap();

        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].system, system);
    }
}
