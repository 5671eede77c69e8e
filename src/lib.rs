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

//! Archetype store: a dynamic-component, archetype-based entity storage and
//! staged-mutation core.
//!
//! Components are handles registered at runtime rather than Rust types, so a
//! single interleaved row buffer backs each archetype ("family") instead of
//! one typed column per component. A two-phase staging pipeline lets a
//! traversal in progress queue mutations into an overlay, merged back into
//! the world only once the traversal finishes.

pub mod commit;
pub mod error;
pub mod expr;
pub mod family;
pub mod handle;
pub mod index;
pub mod notify;
pub mod prefab;
pub mod stage;
pub mod table;
pub mod world;

pub use error::{EcsError, Result};
pub use family::{FamilyId, FamilyInterner};
pub use handle::{ComponentRegistry, Handle, HandleRegistry};
pub use index::{EntityIndex, Location};
pub use notify::{NotifyKind, Notification, ObserverRegistry};
pub use prefab::PrefabIndex;
pub use world::World;
