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

//! Entity handles and the component registry.
//!
//! A [`Handle`] is an opaque, monotonically allocated 64-bit id. Unlike a
//! slotmap key it carries no generation: the source this crate models never
//! recycles identities, so a stale handle simply fails to resolve in the
//! entity index rather than aliasing a newer entity.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

/// Opaque entity identifier. `Handle::NONE` (zero) is never allocated and
/// means "no entity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The reserved "no entity" value.
    pub const NONE: Handle = Handle(0);

    /// Construct a handle from a raw id. Exposed for tests and for callers
    /// that round-trip handles through the packed `(family, row)` word.
    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// The raw 64-bit id.
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::NONE
    }
}

/// Monotonic allocator backing every `Handle` a world hands out: components,
/// families, prefabs and ordinary entities all come from the same counter,
/// matching the source's single id space.
#[derive(Debug)]
pub struct HandleRegistry {
    next: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        // Start at 1: 0 is Handle::NONE.
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next handle. Never returns `Handle::NONE`.
    pub fn allocate(&self) -> Handle {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        Handle(raw)
    }

    /// Number of handles allocated so far.
    pub fn allocated_count(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The two records attached to every registered component, per §3/§4.1 of
/// the design: a display name and a byte size. These are kept in a side
/// table keyed by `Handle` rather than as literal rows in a self-hosted
/// "component family" table -- one record per registered component handle,
/// created by `new_component`, without reproducing the meta-circular
/// bootstrap of the system this crate is modelled on.
#[derive(Debug, Clone)]
pub struct ComponentRecord {
    pub name: String,
    pub size: usize,
}

/// Registered components, keyed by their handle. Tables and the commit
/// engine consult this to learn a schema's column sizes.
#[derive(Default)]
pub struct ComponentRegistry {
    map: AHashMap<Handle, ComponentRecord>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: Handle, name: impl Into<String>, size: usize) {
        self.map.insert(
            handle,
            ComponentRecord {
                name: name.into(),
                size,
            },
        );
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.map.contains_key(&handle)
    }

    pub fn size_of(&self, handle: Handle) -> Option<usize> {
        self.map.get(&handle).map(|r| r.size)
    }

    pub fn name_of(&self, handle: Handle) -> Option<&str> {
        self.map.get(&handle).map(|r| r.name.as_str())
    }

    /// Sizes for `schema`, in order. Returns `None` if any handle isn't
    /// registered.
    pub fn sizes_for(&self, schema: &[Handle]) -> Option<Vec<usize>> {
        schema.iter().map(|&h| self.size_of(h)).collect()
    }
}
