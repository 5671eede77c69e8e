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

//! Entity index: `Handle -> (FamilyId, row)`.
//!
//! The source packs this pair into one 64-bit word where `0` is overloaded
//! to mean "absent" in the world index and "present but empty" in a stage's
//! shadow index. We keep the three-valued semantics but make the states
//! explicit with [`Slot`] instead of relying on a magic zero word, which
//! also sidesteps the ambiguity between family `0`/row `0` and "no entry".

use ahash::AHashMap;

use crate::family::FamilyId;
use crate::handle::Handle;

/// What an `EntityIndex` lookup can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// No entry at all: the entity is unknown to this index.
    Absent,
    /// An entry exists but currently has no row (used by stage indices to
    /// record an in-progress delete without letting it leak back into the
    /// base index).
    Empty,
    /// The entity occupies `row` in the table for `family`.
    At { family: FamilyId, row: u32 },
}

impl Location {
    /// Mirrors the source's `ecs_empty`, which despite its name returns
    /// truthy when the packed word is non-zero -- i.e. when the entity
    /// *has* a row, not when it's empty. We keep the behaviour and give it
    /// an honest name instead of reproducing the misleading one.
    pub fn has_row(self) -> bool {
        matches!(self, Location::At { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    At { family: FamilyId, row: u32 },
}

/// Maps live entities to their table location.
#[derive(Default)]
pub struct EntityIndex {
    slots: AHashMap<Handle, Slot>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self {
            slots: AHashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: AHashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, entity: Handle) -> Location {
        match self.slots.get(&entity) {
            None => Location::Absent,
            Some(Slot::Empty) => Location::Empty,
            Some(Slot::At { family, row }) => Location::At {
                family: *family,
                row: *row,
            },
        }
    }

    pub fn set_at(&mut self, entity: Handle, family: FamilyId, row: u32) {
        self.slots.insert(entity, Slot::At { family, row });
    }

    /// Mark the entity present-but-empty, the stage-only sentinel used when
    /// an in-progress delete must not be visible as "absent" (which could
    /// be confused with "never touched this cycle").
    pub fn set_empty(&mut self, entity: Handle) {
        self.slots.insert(entity, Slot::Empty);
    }

    /// Fully remove the entry, making subsequent lookups report `Absent`.
    pub fn remove(&mut self, entity: Handle) {
        self.slots.remove(&entity);
    }

    pub fn contains(&self, entity: Handle) -> bool {
        self.slots.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, Location)> + '_ {
        self.slots.iter().map(|(&e, &slot)| {
            let loc = match slot {
                Slot::Empty => Location::Empty,
                Slot::At { family, row } => Location::At { family, row },
            };
            (e, loc)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_vs_empty_vs_at() {
        let mut idx = EntityIndex::new();
        let e = Handle::from_raw(7);
        assert_eq!(idx.get(e), Location::Absent);

        idx.set_empty(e);
        assert_eq!(idx.get(e), Location::Empty);
        assert!(!idx.get(e).has_row());

        idx.set_at(e, FamilyId::EMPTY, 3);
        assert_eq!(
            idx.get(e),
            Location::At {
                family: FamilyId::EMPTY,
                row: 3
            }
        );
        assert!(idx.get(e).has_row());

        idx.remove(e);
        assert_eq!(idx.get(e), Location::Absent);
    }
}
