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

//! Prefab index: `FamilyId -> Handle`, the default-value source for a
//! family. `new_prefab` registers its created entity as the prefab for its
//! own family; any later entity that acquires that family gets its columns
//! defaulted from the prefab's row (see `commit::copy_from_prefab_chain`).

use ahash::AHashMap;

use crate::family::FamilyId;
use crate::handle::Handle;

#[derive(Default)]
pub struct PrefabIndex {
    map: AHashMap<FamilyId, Handle>,
}

impl PrefabIndex {
    pub fn new() -> Self {
        Self {
            map: AHashMap::new(),
        }
    }

    pub fn register(&mut self, family: FamilyId, prefab: Handle) {
        self.map.insert(family, prefab);
    }

    pub fn prefab_for(&self, family: FamilyId) -> Option<Handle> {
        self.map.get(&family).copied()
    }

    pub fn contains(&self, family: FamilyId) -> bool {
        self.map.contains_key(&family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves_a_prefab() {
        let mut prefabs = PrefabIndex::new();
        let family = FamilyId::from_index(3);
        let prefab = Handle::from_raw(99);
        assert!(prefabs.prefab_for(family).is_none());
        prefabs.register(family, prefab);
        assert_eq!(prefabs.prefab_for(family), Some(prefab));
    }
}
