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

//! Family (archetype signature) interning.
//!
//! A [`FamilyId`] is a compact, stable name for an order-insensitive,
//! duplicate-free set of component [`Handle`]s. Two sets that contain the
//! same handles always intern to the same id, regardless of the order they
//! were presented in -- canonicalisation sorts and dedups before hashing.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::handle::Handle;
use crate::index::{EntityIndex, Location};
use crate::prefab::PrefabIndex;

/// How many links of a prefab chain [`FamilyInterner::contains_with_prefabs`]
/// will follow before giving up. Prefab chains are short in practice; this
/// only guards against a misbehaving chain that cycles back on itself.
const MAX_PREFAB_CHAIN: usize = 8;

/// Inline capacity for a family's member list before it spills to the heap.
/// Most archetypes in a real simulation carry well under this many
/// components.
const INLINE_MEMBERS: usize = 8;

pub type FamilyMembers = SmallVec<[Handle; INLINE_MEMBERS]>;

/// Interned identifier for a set of component handles. `FamilyId(0)` is the
/// empty set and is always valid without being explicitly interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FamilyId(u32);

impl FamilyId {
    pub const EMPTY: FamilyId = FamilyId(0);

    pub const fn index(self) -> u32 {
        self.0
    }

    /// Reconstruct a `FamilyId` from a raw index previously obtained via
    /// [`Self::index`]. Only meaningful for ids that came from the same
    /// interner.
    pub const fn from_index(index: u32) -> Self {
        FamilyId(index)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

fn canonicalize(mut members: FamilyMembers) -> FamilyMembers {
    members.sort_unstable();
    members.dedup();
    members
}

/// Interns every distinct set of component handles seen by a world.
pub struct FamilyInterner {
    // sets[0] is always the empty set, matching FamilyId::EMPTY.
    sets: Vec<FamilyMembers>,
    lookup: FxHashMap<FamilyMembers, FamilyId>,
}

impl FamilyInterner {
    pub fn new() -> Self {
        let empty: FamilyMembers = SmallVec::new();
        let mut lookup = FxHashMap::default();
        lookup.insert(empty.clone(), FamilyId::EMPTY);
        Self {
            sets: vec![empty],
            lookup,
        }
    }

    /// Canonical sorted, deduped member list for a family.
    pub fn members(&self, family: FamilyId) -> &[Handle] {
        &self.sets[family.index() as usize]
    }

    /// Intern an arbitrary (possibly unsorted, possibly duplicated) set of
    /// handles, returning its canonical id.
    pub fn intern(&mut self, members: FamilyMembers) -> FamilyId {
        let canonical = canonicalize(members);
        if canonical.is_empty() {
            return FamilyId::EMPTY;
        }
        if let Some(&id) = self.lookup.get(&canonical) {
            return id;
        }
        let id = FamilyId(self.sets.len() as u32);
        self.lookup.insert(canonical.clone(), id);
        self.sets.push(canonical);
        id
    }

    /// Intern the singleton family `{handle}`.
    pub fn from_handle(&mut self, handle: Handle) -> FamilyId {
        let mut members = FamilyMembers::new();
        members.push(handle);
        self.intern(members)
    }

    /// Returns the id for `(a ∪ b) \ remove`.
    ///
    /// `merge(EMPTY, EMPTY, EMPTY) == EMPTY`; `merge(a, EMPTY, EMPTY) == a`.
    pub fn merge(&mut self, a: FamilyId, b: FamilyId, remove: FamilyId) -> FamilyId {
        if b.is_empty() && remove.is_empty() {
            return a;
        }

        let remove_members = self.members(remove).to_vec();
        let mut union: FamilyMembers = self.members(a).iter().copied().collect();
        union.extend(self.members(b).iter().copied());
        union.retain(|h| !remove_members.contains(h));
        self.intern(union)
    }

    /// `contains(super, sub, match_all)` without prefab fallback -- see
    /// [`Self::contains_with_prefabs`] for the prefab-aware version used by
    /// observer dispatch and `has`/`has_any`.
    ///
    /// `match_all = true`: every handle in `sub` is present in `super`.
    /// `match_all = false`: at least one handle in `sub` is present.
    /// `contains(a, EMPTY, _) == true` for any `a`.
    pub fn contains(&self, sup: FamilyId, sub: FamilyId, match_all: bool) -> bool {
        let sub_members = self.members(sub);
        if sub_members.is_empty() {
            return true;
        }
        let sup_members = self.members(sup);
        if match_all {
            sub_members.iter().all(|h| sup_members.binary_search(h).is_ok())
        } else {
            sub_members.iter().any(|h| sup_members.binary_search(h).is_ok())
        }
    }

    pub fn family_count(&self) -> usize {
        self.sets.len()
    }

    /// Like [`Self::contains`], but a `sup` family also counts as carrying
    /// whatever components are present on the families of the prefabs in its
    /// inheritance chain (`prefabs.prefab_for(sup)`'s own family, and that
    /// prefab's prefab, and so on). Used by `has`/`has_any` and observer
    /// dispatch so a family that inherits a component from a prefab without
    /// also declaring it directly still matches.
    pub fn contains_with_prefabs(
        &self,
        sup: FamilyId,
        sub: FamilyId,
        match_all: bool,
        prefabs: &PrefabIndex,
        index: &EntityIndex,
    ) -> bool {
        let sub_members = self.members(sub);
        if sub_members.is_empty() {
            return true;
        }

        let mut visited: Vec<FamilyId> = vec![sup];
        let mut pool: FamilyMembers = self.members(sup).iter().copied().collect();
        let mut frontier = sup;

        for _ in 0..MAX_PREFAB_CHAIN {
            let Some(prefab_entity) = prefabs.prefab_for(frontier) else {
                break;
            };
            let ancestor_family = match index.get(prefab_entity) {
                Location::At { family, .. } => family,
                _ => break,
            };
            if visited.contains(&ancestor_family) {
                break;
            }
            visited.push(ancestor_family);
            pool.extend(self.members(ancestor_family).iter().copied());
            frontier = ancestor_family;
        }

        if match_all {
            sub_members.iter().all(|h| pool.contains(h))
        } else {
            sub_members.iter().any(|h| pool.contains(h))
        }
    }
}

impl Default for FamilyInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    #[test]
    fn permutations_canonicalise_to_the_same_id() {
        let mut interner = FamilyInterner::new();
        let a = interner.intern(SmallVec::from_slice(&[h(1), h(2), h(3)]));
        let b = interner.intern(SmallVec::from_slice(&[h(3), h(1), h(2)]));
        let c = interner.intern(SmallVec::from_slice(&[h(2), h(3), h(1), h(1)]));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn empty_set_is_family_zero() {
        let mut interner = FamilyInterner::new();
        let empty = interner.intern(SmallVec::new());
        assert_eq!(empty, FamilyId::EMPTY);
    }

    #[test]
    fn merge_identities() {
        let mut interner = FamilyInterner::new();
        let a = interner.from_handle(h(1));
        assert_eq!(interner.merge(FamilyId::EMPTY, FamilyId::EMPTY, FamilyId::EMPTY), FamilyId::EMPTY);
        assert_eq!(interner.merge(a, FamilyId::EMPTY, FamilyId::EMPTY), a);
    }

    #[test]
    fn merge_unions_and_subtracts() {
        let mut interner = FamilyInterner::new();
        let pos = interner.from_handle(h(1));
        let vel = interner.from_handle(h(2));
        let both = interner.merge(pos, vel, FamilyId::EMPTY);
        assert_eq!(interner.members(both), &[h(1), h(2)]);

        let pos_only = interner.merge(both, FamilyId::EMPTY, vel);
        assert_eq!(pos_only, pos);
    }

    #[test]
    fn contains_all_vs_any() {
        let mut interner = FamilyInterner::new();
        let pos = interner.from_handle(h(1));
        let vel = interner.from_handle(h(2));
        let both = interner.merge(pos, vel, FamilyId::EMPTY);

        assert!(interner.contains(both, pos, true));
        assert!(interner.contains(both, both, true));
        assert!(!interner.contains(pos, both, true));
        assert!(interner.contains(pos, both, false));
        assert!(interner.contains(both, FamilyId::EMPTY, true));
    }

    #[test]
    fn containment_all_implies_any() {
        let mut interner = FamilyInterner::new();
        let pos = interner.from_handle(h(1));
        let vel = interner.from_handle(h(2));
        let both = interner.merge(pos, vel, FamilyId::EMPTY);
        if interner.contains(both, pos, true) {
            assert!(interner.contains(both, pos, false));
        }
    }

    #[test]
    fn contains_with_prefabs_inherits_ancestor_components() {
        use crate::index::EntityIndex;
        use crate::prefab::PrefabIndex;

        let mut interner = FamilyInterner::new();
        let renderable = interner.from_handle(h(1));
        let health = interner.from_handle(h(2));
        // `enemy` declares only `health`, but its prefab lives in `renderable`.
        let enemy = health;

        let mut index = EntityIndex::new();
        let prefab_entity = Handle::from_raw(500);
        index.set_at(prefab_entity, renderable, 0);

        let mut prefabs = PrefabIndex::new();
        prefabs.register(enemy, prefab_entity);

        assert!(!interner.contains(enemy, renderable, true));
        assert!(interner.contains_with_prefabs(enemy, renderable, true, &prefabs, &index));
        assert!(interner.contains_with_prefabs(enemy, health, true, &prefabs, &index));
    }
}
