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

//! The staging overlay entered for the duration of a progress cycle.
//!
//! Everything a system does while `World::in_progress()` is true lands here
//! instead of in the world's own tables and entity index, so an in-flight
//! traversal never observes a half-applied mutation. `World::merge` folds
//! the overlay back into the world at a safe point.

use ahash::{AHashMap, AHashSet};
use bumpalo::Bump;

use crate::family::FamilyId;
use crate::handle::Handle;
use crate::index::EntityIndex;
use crate::table::ColumnMeta;

const HEADER_SIZE: usize = std::mem::size_of::<u64>();

/// A table living only for the current progress cycle. Backed by a bump
/// arena rather than `Vec<u8>`: the overlay never swap-removes a row (stage
/// deletes are recorded in `delete_stage` and applied to the *world* table
/// at merge time, not to this one), so rows are purely append-only and a
/// bump allocation is a perfect fit -- every row pointer handed out during
/// the cycle stays valid until the whole arena is reset at merge, instead of
/// being invalidated by the next `Vec::push` the way a growing buffer would.
pub struct StageTable {
    family: FamilyId,
    columns: Vec<ColumnMeta>,
    stride: usize,
    rows: Vec<*mut u8>,
}

impl StageTable {
    fn new(family: FamilyId, schema: &[Handle], sizes: &[usize]) -> Self {
        let mut columns = Vec::with_capacity(schema.len());
        let mut offset = HEADER_SIZE;
        for (&component, &size) in schema.iter().zip(sizes.iter()) {
            columns.push(ColumnMeta {
                component,
                size,
                offset,
            });
            offset += size;
        }
        Self {
            family,
            columns,
            stride: offset,
            rows: Vec::new(),
        }
    }

    pub fn family(&self) -> FamilyId {
        self.family
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column(&self, component: Handle) -> Option<&ColumnMeta> {
        self.columns
            .binary_search_by_key(&component, |c| c.component)
            .ok()
            .map(|idx| &self.columns[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn insert(&mut self, arena: &Bump, entity: Handle) -> usize {
        let row = arena.alloc_slice_fill_copy(self.stride, 0u8);
        row[..HEADER_SIZE].copy_from_slice(&entity.raw().to_ne_bytes());
        self.rows.push(row.as_mut_ptr());
        self.rows.len() - 1
    }

    pub fn row_entity(&self, row_index: usize) -> Handle {
        let mut bytes = [0u8; HEADER_SIZE];
        unsafe {
            std::ptr::copy_nonoverlapping(self.rows[row_index], bytes.as_mut_ptr(), HEADER_SIZE);
        }
        Handle::from_raw(u64::from_ne_bytes(bytes))
    }

    pub fn component_ptr(&self, row_index: usize, component: Handle) -> Option<*const u8> {
        let col = self.column(component)?;
        Some(unsafe { self.rows[row_index].add(col.offset) as *const u8 })
    }

    pub fn component_ptr_mut(&mut self, row_index: usize, component: Handle) -> Option<*mut u8> {
        let col = self.column(component)?;
        Some(unsafe { self.rows[row_index].add(col.offset) })
    }

    /// Base pointer for a whole row, for bulk merge-walk copies.
    pub fn row_base_mut(&mut self, row_index: usize) -> *mut u8 {
        self.rows[row_index]
    }

    pub fn row_base(&self, row_index: usize) -> *const u8 {
        self.rows[row_index] as *const u8
    }

    /// Copy columns shared between a world table row and this overlay row.
    pub fn copy_row_from_world(
        src: &crate::table::Table,
        src_row: usize,
        dst: &mut StageTable,
        dst_row: usize,
    ) {
        let src_base = src.row_ptr(src_row);
        let dst_base = dst.rows[dst_row];
        crate::table::copy_shared_columns(src.columns(), src_base, &dst.columns, dst_base);
    }

    /// Copy columns shared between two overlay rows, possibly in different
    /// overlay tables (used when an entity touched earlier in the same
    /// cycle migrates to another staged family before the cycle merges).
    pub fn copy_row_from_stage(src: &StageTable, src_row: usize, dst: &mut StageTable, dst_row: usize) {
        let src_base = src.row_base(src_row);
        let dst_base = dst.rows[dst_row];
        crate::table::copy_shared_columns(&src.columns, src_base, &dst.columns, dst_base);
    }
}

/// The per-progress-cycle overlay described in §3/§4.6 of the design.
#[derive(Default)]
pub struct Stage {
    /// Shadow entity index consulted before the world's own index while
    /// `in_progress` is true.
    pub entity_stage: EntityIndex,
    /// Overlay tables, one per family touched this cycle.
    data_stage: AHashMap<FamilyId, StageTable>,
    /// Deferred component-set additions, keyed by entity.
    pub add_stage: AHashMap<Handle, FamilyId>,
    /// Deferred component-set removals, keyed by entity.
    pub remove_stage: AHashMap<Handle, FamilyId>,
    /// Components actually removed so far this cycle, accumulated so a
    /// remove followed by a re-add inside the same cycle still removes the
    /// component from the base family at merge time.
    pub remove_merge: AHashMap<Handle, FamilyId>,
    /// Entities deferred-deleted this cycle, in encounter order.
    pub delete_stage: Vec<Handle>,
    /// Entities touched this cycle (add/remove/commit), in first-touch
    /// order -- `World::merge` walks entities in this order.
    touch_order: Vec<Handle>,
    /// Dedup set for `touch_order`. Can't dedup against `entity_stage`
    /// membership instead: `touch` runs before `commit_in_stage` ever writes
    /// the entity's row into `entity_stage`, so that membership test would
    /// still be false on an entity's first `add`+`commit` and it would be
    /// pushed onto `touch_order` twice.
    touched: AHashSet<Handle>,
    arena: Bump,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entity` was touched this cycle, if it wasn't already.
    pub fn touch(&mut self, entity: Handle) {
        if self.touched.insert(entity) {
            self.touch_order.push(entity);
        }
    }

    pub fn touched(&self) -> &[Handle] {
        &self.touch_order
    }

    pub fn get_or_create_table(
        &mut self,
        family: FamilyId,
        schema: &[Handle],
        sizes: &[usize],
    ) -> &mut StageTable {
        self.data_stage
            .entry(family)
            .or_insert_with(|| StageTable::new(family, schema, sizes))
    }

    pub fn table(&self, family: FamilyId) -> Option<&StageTable> {
        self.data_stage.get(&family)
    }

    pub fn table_mut(&mut self, family: FamilyId) -> Option<&mut StageTable> {
        self.data_stage.get_mut(&family)
    }

    /// Insert a fresh row for `entity` in the overlay table for `family`,
    /// creating the table (and the entity's touch record) as needed.
    pub fn insert_row(
        &mut self,
        family: FamilyId,
        schema: &[Handle],
        sizes: &[usize],
        entity: Handle,
    ) -> usize {
        let arena_ptr: *const Bump = &self.arena;
        let table = self.get_or_create_table(family, schema, sizes);
        // SAFETY: `arena` is a sibling field of `data_stage`; inserting into
        // the table never touches the arena, so there's no aliasing here,
        // only a borrow-checker limitation around disjoint struct fields
        // accessed through a helper method.
        let arena = unsafe { &*arena_ptr };
        table.insert(arena, entity)
    }

    pub fn clear_add_remove(&mut self, entity: Handle) {
        self.add_stage.remove(&entity);
        self.remove_stage.remove(&entity);
    }

    /// Temporarily take ownership of a staged table, so the caller can read
    /// from it while inserting into a different one without aliasing the
    /// same `data_stage` map through two borrows at once.
    pub fn take_table(&mut self, family: FamilyId) -> Option<StageTable> {
        self.data_stage.remove(&family)
    }

    pub fn put_table(&mut self, family: FamilyId, table: StageTable) {
        self.data_stage.insert(family, table);
    }

    /// Reset the overlay for the next progress cycle. Resetting the arena
    /// frees every row byte buffer at once; nothing may still reference
    /// them afterwards.
    pub fn clear(&mut self) {
        self.entity_stage.clear();
        self.data_stage.clear();
        self.add_stage.clear();
        self.remove_stage.clear();
        self.remove_merge.clear();
        self.delete_stage.clear();
        self.touch_order.clear();
        self.touched.clear();
        self.arena.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_order_is_first_touch_order() {
        let mut stage = Stage::new();
        let a = Handle::from_raw(1);
        let b = Handle::from_raw(2);
        stage.entity_stage.set_empty(a);
        stage.touch(a);
        stage.entity_stage.set_empty(b);
        stage.touch(b);
        stage.entity_stage.set_empty(a); // already touched, no duplicate
        stage.touch(a);
        assert_eq!(stage.touched(), &[a, b]);
    }

    #[test]
    fn overlay_rows_survive_further_inserts() {
        let mut stage = Stage::new();
        let family = FamilyId::EMPTY;
        let schema = [Handle::from_raw(10)];
        let sizes = [4usize];
        let row0 = stage.insert_row(family, &schema, &sizes, Handle::from_raw(1));
        let ptr0 = stage
            .table(family)
            .unwrap()
            .component_ptr(row0, Handle::from_raw(10))
            .unwrap();
        unsafe {
            std::ptr::write_bytes(ptr0 as *mut u8, 7, 4);
        }
        // Insert many more rows; a Vec<u8>-backed table would have
        // reallocated by now and invalidated `ptr0`.
        for i in 2..200 {
            stage.insert_row(family, &schema, &sizes, Handle::from_raw(i));
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr0, 4) };
        assert_eq!(bytes, &[7, 7, 7, 7]);
    }
}
