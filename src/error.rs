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

//! Error types
//!
//! Programmer errors (bad handles, a corrupt world) are assertions, not
//! `Result`s -- by the time they'd reach here the API contract was already
//! violated. Only conditions a well-behaved caller can legitimately hit
//! (an unknown name in a family expression, a component that was never
//! registered) are represented here.

use std::fmt;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A name used in a family/prefab expression did not resolve to a
    /// registered component.
    UnknownComponent(String),

    /// A handle used where a component handle was expected does not carry
    /// a `Component` record (no registered size).
    ComponentNotRegistered,

    /// The entity does not exist in the world (or stage) index.
    EntityNotFound,

    /// A handle inside a family expression does not resolve to any
    /// registered entity at all.
    FamilyUnknownComponent,

    /// The destination table for a family could not be constructed from a
    /// malformed or inconsistent schema.
    TableMigrationFailed(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownComponent(name) => write!(f, "unknown component: {name}"),
            EcsError::ComponentNotRegistered => write!(f, "component not registered"),
            EcsError::EntityNotFound => write!(f, "entity not found"),
            EcsError::FamilyUnknownComponent => {
                write!(f, "family expression references an unregistered handle")
            }
            EcsError::TableMigrationFailed(msg) => write!(f, "table migration failed: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EcsError>;
