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

//! Observer registration and init/deinit dispatch.
//!
//! The source registers a system's interest on the archetype table it
//! subscribes to; we register by `FamilyId` instead, since a table is
//! created lazily on first insert and a subscription may be declared before
//! any entity has taken that family. Dispatch walks a family's registered
//! systems and tests containment (with prefab fallback) against the set of
//! components that actually changed.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::family::FamilyId;
use crate::handle::Handle;
use crate::index::EntityIndex;
use crate::prefab::PrefabIndex;

/// Which edge of a commit triggered a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Init,
    Deinit,
}

/// One dispatched callback: everything a subscriber needs to look up the
/// row that changed.
#[derive(Debug, Clone, Copy)]
pub struct Notification {
    pub system: Handle,
    pub entity: Handle,
    pub family: FamilyId,
    pub row: u32,
    pub kind: NotifyKind,
}

/// A single subscription: `system` wants to hear about this table's
/// init/deinit events, but only fires when the entity's family at the time
/// also satisfies `interest` -- letting a system subscribe to a table more
/// broadly than "exactly this family".
#[derive(Clone, Copy)]
struct Subscription {
    system: Handle,
    interest: FamilyId,
}

#[derive(Default, Clone)]
struct Subscriptions {
    init: SmallVec<[Subscription; 4]>,
    deinit: SmallVec<[Subscription; 4]>,
}

/// Per-family subscriber lists. Subscribing to a family that has no table
/// yet is legal; the registry doesn't require one to exist.
#[derive(Default)]
pub struct ObserverRegistry {
    by_family: FxHashMap<FamilyId, Subscriptions>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `system` to `table`'s init list; it fires when `table`
    /// gains a member whose family satisfies `interest`.
    pub fn subscribe_init(&mut self, table: FamilyId, system: Handle, interest: FamilyId) {
        self.by_family
            .entry(table)
            .or_default()
            .init
            .push(Subscription { system, interest });
    }

    pub fn subscribe_deinit(&mut self, table: FamilyId, system: Handle, interest: FamilyId) {
        self.by_family
            .entry(table)
            .or_default()
            .deinit
            .push(Subscription { system, interest });
    }

    /// Dispatch notifications for every system subscribed on `table` whose
    /// `interest` is satisfied by `entity_family` (with prefab fallback),
    /// in subscription order. `out` collects the callbacks rather than
    /// invoking them directly, since the caller (`commit`) is mid-mutation
    /// and may not want to re-enter itself.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_init(
        &self,
        interner: &crate::family::FamilyInterner,
        prefabs: &PrefabIndex,
        index: &EntityIndex,
        table: FamilyId,
        entity: Handle,
        entity_family: FamilyId,
        row: u32,
        out: &mut Vec<Notification>,
    ) {
        self.dispatch(
            interner,
            prefabs,
            index,
            table,
            entity,
            entity_family,
            row,
            NotifyKind::Init,
            out,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_deinit(
        &self,
        interner: &crate::family::FamilyInterner,
        prefabs: &PrefabIndex,
        index: &EntityIndex,
        table: FamilyId,
        entity: Handle,
        entity_family: FamilyId,
        row: u32,
        out: &mut Vec<Notification>,
    ) {
        self.dispatch(
            interner,
            prefabs,
            index,
            table,
            entity,
            entity_family,
            row,
            NotifyKind::Deinit,
            out,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        interner: &crate::family::FamilyInterner,
        prefabs: &PrefabIndex,
        index: &EntityIndex,
        table: FamilyId,
        entity: Handle,
        entity_family: FamilyId,
        row: u32,
        kind: NotifyKind,
        out: &mut Vec<Notification>,
    ) {
        let Some(subs) = self.by_family.get(&table) else {
            return;
        };
        let list = match kind {
            NotifyKind::Init => &subs.init,
            NotifyKind::Deinit => &subs.deinit,
        };
        for sub in list {
            if interner.contains_with_prefabs(entity_family, sub.interest, true, prefabs, index) {
                out.push(Notification {
                    system: sub.system,
                    entity,
                    family: entity_family,
                    row,
                    kind,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::FamilyInterner;

    #[test]
    fn init_dispatches_once_per_subscribed_system() {
        let mut interner = FamilyInterner::new();
        let pos = interner.from_handle(Handle::from_raw(1));
        let mut registry = ObserverRegistry::new();
        let system = Handle::from_raw(900);
        registry.subscribe_init(pos, system, pos);

        let prefabs = PrefabIndex::new();
        let index = EntityIndex::new();
        let mut out = Vec::new();
        registry.dispatch_init(
            &interner,
            &prefabs,
            &index,
            pos,
            Handle::from_raw(1),
            pos,
            0,
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].system, system);
        assert_eq!(out[0].kind, NotifyKind::Init);
    }

    #[test]
    fn unsubscribed_family_dispatches_nothing() {
        let interner = FamilyInterner::new();
        let registry = ObserverRegistry::new();
        let prefabs = PrefabIndex::new();
        let index = EntityIndex::new();
        let mut out = Vec::new();
        registry.dispatch_init(
            &interner,
            &prefabs,
            &index,
            FamilyId::EMPTY,
            Handle::from_raw(1),
            FamilyId::EMPTY,
            0,
            &mut out,
        );
        assert!(out.is_empty());
    }
}
