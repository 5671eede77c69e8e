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

//! World: the central entity/archetype store and public API surface.
//!
//! A `World` owns every table, the family interner, the entity index, the
//! prefab index and observer registry, and (while a progress cycle is
//! running) the staging overlay that shadows writes until [`World::merge`]
//! folds them back in.

use ahash::AHashMap;
use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::commit::{self, CommitOutcome};
use crate::error::{EcsError, Result};
use crate::expr;
use crate::family::{FamilyId, FamilyInterner};
use crate::handle::{ComponentRegistry, Handle, HandleRegistry};
use crate::index::{EntityIndex, Location};
use crate::notify::{Notification, ObserverRegistry};
use crate::prefab::PrefabIndex;
use crate::stage::Stage;
use crate::table::Table;

const DEFAULT_ENTITY_CAPACITY: usize = 64;
const DEFAULT_TABLE_CAPACITY: usize = 64;

/// The ECS world. Construction always succeeds and always yields a usable
/// object -- there's no separate "is this world valid" check to forget, a
/// deliberate replacement for a magic-cookie guard.
pub struct World {
    handles: HandleRegistry,
    components: ComponentRegistry,
    component_names: AHashMap<String, Handle>,
    family_names: AHashMap<String, Handle>,
    interner: FamilyInterner,
    tables: FxHashMap<FamilyId, Table>,
    index: EntityIndex,
    prefabs: PrefabIndex,
    observers: ObserverRegistry,
    /// Handles returned by `new_family`/`new_prefab`, resolved back to the
    /// family they name.
    families: AHashMap<Handle, FamilyId>,
    /// Pending add/remove, used outside a progress cycle. While a cycle is
    /// running, `stage.add_stage`/`stage.remove_stage` take over this job
    /// instead (see `World::add`/`World::remove`).
    pending_add: AHashMap<Handle, FamilyId>,
    pending_remove: AHashMap<Handle, FamilyId>,
    stage: Option<Stage>,
    notifications: Vec<Notification>,
}

impl World {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ENTITY_CAPACITY, DEFAULT_TABLE_CAPACITY)
    }

    /// Pre-size the world's maps for a caller that knows its rough scale
    /// up front, mirroring the teacher's `ensure_entity_capacity` growth
    /// helpers but applied once at construction.
    pub fn with_capacity(entities: usize, tables: usize) -> Self {
        Self {
            handles: HandleRegistry::new(),
            components: ComponentRegistry::new(),
            component_names: AHashMap::with_capacity(entities.min(256)),
            family_names: AHashMap::with_capacity(tables),
            interner: FamilyInterner::new(),
            tables: FxHashMap::with_capacity_and_hasher(tables, Default::default()),
            index: EntityIndex::with_capacity(entities),
            prefabs: PrefabIndex::new(),
            observers: ObserverRegistry::new(),
            families: AHashMap::with_capacity(tables),
            pending_add: AHashMap::new(),
            pending_remove: AHashMap::new(),
            stage: None,
            notifications: Vec::new(),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.stage.is_some()
    }

    /// Enter a progress cycle: from here until [`World::merge`], every
    /// mutation lands in the staging overlay instead of the world proper.
    pub fn begin_progress(&mut self) {
        debug_assert!(!self.in_progress(), "progress cycle already active");
        self.stage = Some(Stage::new());
    }

    // -- registration ----------------------------------------------------

    pub fn new_component(&mut self, name: impl Into<String>, size: usize) -> Handle {
        let name = name.into();
        let handle = self.handles.allocate();
        self.components.register(handle, name.clone(), size);
        self.component_names.insert(name, handle);
        handle
    }

    /// Intern a family from a component-list expression and hand back a
    /// handle callers use as the `type` argument to [`World::new`]/
    /// [`World::new_w_count`] and as the `t` argument to
    /// [`World::has`]/[`World::has_any`].
    pub fn new_family(&mut self, name: impl Into<String>, expr: &str) -> Result<Handle> {
        let names = &self.component_names;
        let family = expr::resolve_family(expr, &mut self.interner, |n| names.get(n).copied())?;
        let handle = self.handles.allocate();
        self.families.insert(handle, family);
        self.family_names.insert(name.into(), handle);
        Ok(handle)
    }

    /// Like [`World::new_family`], but also spawns an entity in that family
    /// and registers it as the family's prefab: any later entity that
    /// acquires this family has its columns defaulted from this entity's
    /// row.
    pub fn new_prefab(&mut self, name: impl Into<String>, expr: &str) -> Result<Handle> {
        let family_handle = self.new_family(name, expr)?;
        let family = self.families[&family_handle];
        let prefab_entity = self.spawn_in_family(family)?;
        self.prefabs.register(family, prefab_entity);
        Ok(prefab_entity)
    }

    fn family_for_handle(&self, handle: Handle) -> Result<FamilyId> {
        self.families
            .get(&handle)
            .copied()
            .ok_or(EcsError::FamilyUnknownComponent)
    }

    // -- creation ----------------------------------------------------------

    /// Spawn a single entity directly into `family`, copying prefab
    /// defaults if one is registered. Bypasses the add/commit dance since
    /// the family is already known up front.
    fn spawn_in_family(&mut self, family: FamilyId) -> Result<Handle> {
        let entity = self.handles.allocate();
        let outcome = commit::commit_in_world(
            entity,
            Location::Absent,
            family,
            FamilyId::EMPTY,
            &mut self.interner,
            &self.components,
            &mut self.tables,
            &self.prefabs,
            &self.observers,
            &mut self.index,
        )?;
        self.notifications.extend(outcome.notifications);
        Ok(entity)
    }

    /// Spawn a single entity of `family_handle` (as returned by
    /// `new_family`/`new_prefab`).
    pub fn new(&mut self, family_handle: Handle) -> Result<Handle> {
        let family = self.family_for_handle(family_handle)?;
        self.spawn_in_family(family)
    }

    /// Bulk-create `count` entities of `family_handle` in one reserved
    /// table growth, all landing contiguously at rows `0..count` of a
    /// fresh table (or appended contiguously to an existing one).
    pub fn new_w_count(&mut self, family_handle: Handle, count: usize) -> Result<Vec<Handle>> {
        let family = self.family_for_handle(family_handle)?;
        #[cfg(feature = "profiling")]
        let span = info_span!("world.new_w_count", count, table_count = self.tables.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let schema = self.interner.members(family).to_vec();
        let sizes = self
            .components
            .sizes_for(&schema)
            .ok_or(EcsError::ComponentNotRegistered)?;
        let table = self
            .tables
            .entry(family)
            .or_insert_with(|| Table::new(family, &schema, &sizes));
        table.reserve_rows(count);

        let mut entities = Vec::with_capacity(count);
        for _ in 0..count {
            entities.push(self.spawn_in_family(family)?);
        }
        Ok(entities)
    }

    // -- staged mutation -----------------------------------------------

    pub fn add(&mut self, entity: Handle, component: Handle) -> Result<()> {
        let addition = self.interner.from_handle(component);
        if let Some(stage) = &mut self.stage {
            stage.touch(entity);
            let existing = stage.add_stage.get(&entity).copied().unwrap_or(FamilyId::EMPTY);
            let merged = self.interner.merge(existing, addition, FamilyId::EMPTY);
            stage.add_stage.insert(entity, merged);
        } else {
            let existing = self.pending_add.get(&entity).copied().unwrap_or(FamilyId::EMPTY);
            let merged = self.interner.merge(existing, addition, FamilyId::EMPTY);
            self.pending_add.insert(entity, merged);
        }
        Ok(())
    }

    pub fn remove(&mut self, entity: Handle, component: Handle) -> Result<()> {
        let removal = self.interner.from_handle(component);
        if let Some(stage) = &mut self.stage {
            stage.touch(entity);
            let existing = stage.remove_stage.get(&entity).copied().unwrap_or(FamilyId::EMPTY);
            let merged = self.interner.merge(existing, removal, FamilyId::EMPTY);
            stage.remove_stage.insert(entity, merged);
        } else {
            let existing = self.pending_remove.get(&entity).copied().unwrap_or(FamilyId::EMPTY);
            let merged = self.interner.merge(existing, removal, FamilyId::EMPTY);
            self.pending_remove.insert(entity, merged);
        }
        Ok(())
    }

    /// Fold `entity`'s pending add/remove into its effective family, right
    /// now -- into the staging overlay if a progress cycle is active, into
    /// the world directly otherwise.
    pub fn commit(&mut self, entity: Handle) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.commit", in_progress = self.in_progress());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let outcome = if let Some(stage) = &mut self.stage {
            let to_add = stage.add_stage.remove(&entity).unwrap_or(FamilyId::EMPTY);
            let to_remove = stage.remove_stage.remove(&entity).unwrap_or(FamilyId::EMPTY);
            stage.touch(entity);
            let old = if stage.entity_stage.contains(entity) {
                stage.entity_stage.get(entity)
            } else {
                self.index.get(entity)
            };
            let outcome: CommitOutcome = commit::commit_in_stage(
                entity,
                old,
                to_add,
                to_remove,
                &mut self.interner,
                &self.components,
                &self.tables,
                &self.index,
                stage,
                &self.prefabs,
                &self.observers,
            )?;
            let accumulated = stage.remove_merge.get(&entity).copied().unwrap_or(FamilyId::EMPTY);
            let merged = self.interner.merge(accumulated, to_remove, FamilyId::EMPTY);
            stage.remove_merge.insert(entity, merged);
            outcome
        } else {
            let to_add = self.pending_add.remove(&entity).unwrap_or(FamilyId::EMPTY);
            let to_remove = self.pending_remove.remove(&entity).unwrap_or(FamilyId::EMPTY);
            let old = self.index.get(entity);
            commit::commit_in_world(
                entity,
                old,
                to_add,
                to_remove,
                &mut self.interner,
                &self.components,
                &mut self.tables,
                &self.prefabs,
                &self.observers,
                &mut self.index,
            )?
        };
        self.notifications.extend(outcome.notifications);
        Ok(())
    }

    /// Staged during a progress cycle (the row disappears only at merge);
    /// immediate otherwise.
    pub fn delete(&mut self, entity: Handle) {
        if let Some(stage) = &mut self.stage {
            stage.touch(entity);
            stage.delete_stage.push(entity);
        } else if let Location::At { family, row } = self.index.get(entity) {
            if let Some(table) = self.tables.get_mut(&family) {
                if let Some(relocated) = table.delete(row as usize) {
                    self.index.set_at(relocated, family, row);
                }
            }
            self.index.remove(entity);
        }
    }

    // -- end of progress -------------------------------------------------

    /// Fold every mutation buffered this cycle back into the world, in the
    /// order entities were first touched, then apply deferred deletes.
    pub fn merge(&mut self) {
        let Some(stage) = self.stage.take() else {
            return;
        };
        #[cfg(feature = "profiling")]
        let span = info_span!("world.merge", touched = stage.touched().len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        for &entity in stage.touched() {
            if stage.delete_stage.contains(&entity) {
                continue;
            }
            if let Ok(outcome) = commit::merge_entity(
                entity,
                &mut self.interner,
                &self.components,
                &mut self.tables,
                &stage,
                &self.prefabs,
                &self.observers,
                &mut self.index,
            ) {
                self.notifications.extend(outcome.notifications);
            }
        }

        for &entity in &stage.delete_stage {
            self.delete(entity);
        }
    }

    /// Every notification accumulated since the last drain, in dispatch
    /// order. The core never invokes these itself -- delivering them to
    /// the systems that subscribed is an external collaborator's job.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // -- accessors --------------------------------------------------------

    fn effective_location(&self, entity: Handle) -> Location {
        if let Some(stage) = &self.stage {
            if stage.entity_stage.contains(entity) {
                return stage.entity_stage.get(entity);
            }
        }
        self.index.get(entity)
    }

    fn prefab_ptr(&self, family: FamilyId, component: Handle) -> Option<*const u8> {
        const MAX_CHAIN: usize = 8;
        let mut frontier = family;
        let mut visited = vec![frontier];
        for _ in 0..MAX_CHAIN {
            let prefab_entity = self.prefabs.prefab_for(frontier)?;
            let Location::At {
                family: prefab_family,
                row: prefab_row,
            } = self.index.get(prefab_entity)
            else {
                return None;
            };
            if visited.contains(&prefab_family) {
                return None;
            }
            if let Some(ptr) = self
                .tables
                .get(&prefab_family)
                .and_then(|t| t.component_ptr(prefab_row as usize, component))
            {
                return Some(ptr);
            }
            visited.push(prefab_family);
            frontier = prefab_family;
        }
        None
    }

    /// Interior column access. `staged_only=true` reads the in-progress
    /// overlay (falling back to the world row if `entity` wasn't touched
    /// this cycle); `staged_only=false` always reads the pre-progress
    /// world row, ignoring any staged-but-uncommitted-to-world mutation.
    pub fn get_ptr(&self, entity: Handle, component: Handle, staged_only: bool) -> Option<&[u8]> {
        let size = self.components.size_of(component)?;
        let raw = if staged_only {
            if let Some(stage) = &self.stage {
                if let Location::At { family, row } = stage.entity_stage.get(entity) {
                    if let Some(ptr) = stage
                        .table(family)
                        .and_then(|t| t.component_ptr(row as usize, component))
                    {
                        Some(ptr)
                    } else {
                        self.prefab_ptr(family, component)
                    }
                } else {
                    self.get_ptr_world_raw(entity, component)
                }
            } else {
                self.get_ptr_world_raw(entity, component)
            }
        } else {
            self.get_ptr_world_raw(entity, component)
        }?;
        Some(unsafe { std::slice::from_raw_parts(raw, size) })
    }

    fn get_ptr_world_raw(&self, entity: Handle, component: Handle) -> Option<*const u8> {
        let Location::At { family, row } = self.index.get(entity) else {
            return None;
        };
        if let Some(ptr) = self
            .tables
            .get(&family)
            .and_then(|t| t.component_ptr(row as usize, component))
        {
            return Some(ptr);
        }
        self.prefab_ptr(family, component)
    }

    /// Writes `src` into `entity`'s `component` column, adding and
    /// committing the component first if the entity doesn't already carry
    /// it directly (not merely through a prefab fallback).
    pub fn set_ptr(&mut self, entity: Handle, component: Handle, src: &[u8]) -> Result<()> {
        let size = self
            .components
            .size_of(component)
            .ok_or(EcsError::ComponentNotRegistered)?;
        debug_assert_eq!(src.len(), size, "set_ptr source length must match component size");

        let has_directly = match self.effective_location(entity) {
            Location::At { family, .. } => {
                let component_family = self.interner.from_handle(component);
                self.interner.contains(family, component_family, true)
            }
            _ => false,
        };
        if !has_directly {
            self.add(entity, component)?;
            self.commit(entity)?;
        }

        let dest = if self.in_progress() {
            let stage = self.stage.as_mut().expect("in_progress implies stage is Some");
            match stage.entity_stage.get(entity) {
                Location::At { family, row } => stage
                    .table_mut(family)
                    .and_then(|t| t.component_ptr_mut(row as usize, component)),
                _ => None,
            }
        } else {
            match self.index.get(entity) {
                Location::At { family, row } => self
                    .tables
                    .get_mut(&family)
                    .and_then(|t| t.component_ptr_mut(row as usize, component)),
                _ => None,
            }
        };
        let Some(dest) = dest else {
            return Err(EcsError::EntityNotFound);
        };
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dest, size);
        }
        Ok(())
    }

    /// True if `entity`'s effective family carries every component of
    /// `family_handle` (directly, or via a prefab in its chain).
    pub fn has(&self, entity: Handle, family_handle: Handle) -> Result<bool> {
        self.contains(entity, family_handle, true)
    }

    /// True if `entity`'s effective family carries at least one component
    /// of `family_handle`.
    pub fn has_any(&self, entity: Handle, family_handle: Handle) -> Result<bool> {
        self.contains(entity, family_handle, false)
    }

    fn contains(&self, entity: Handle, family_handle: Handle, match_all: bool) -> Result<bool> {
        let sub = self.family_for_handle(family_handle)?;
        let entity_family = match self.effective_location(entity) {
            Location::At { family, .. } => family,
            _ => FamilyId::EMPTY,
        };
        Ok(self
            .interner
            .contains_with_prefabs(entity_family, sub, match_all, &self.prefabs, &self.index))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
