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

//! A minimal tokenizer for the component-list expressions `new_family` and
//! `new_prefab` accept: a comma-separated list of identifiers, each
//! optionally prefixed with `!`, or the literal `0` for the empty family.
//!
//! This is a convenience for the two constructors above, not the external
//! rule-matching query language -- it only resolves which components go
//! into the *positive* subset a family actually stores. A negated token is
//! recognised and returned to the caller (so an external matcher can still
//! apply the filter) but never contributes a component handle to the
//! family itself.

use smallvec::SmallVec;

use crate::error::{EcsError, Result};
use crate::family::{FamilyId, FamilyInterner, FamilyMembers};
use crate::handle::Handle;

/// One parsed token from a family expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain component reference, e.g. `Position`.
    Component(String),
    /// A `!`-prefixed component reference, e.g. `!Velocity`.
    Negated(String),
    /// The literal `0`, the empty family.
    Empty,
}

/// Split `expr` on commas into tokens, trimming whitespace around each and
/// recognising a leading `!`. Empty segments (from trailing commas or
/// doubled separators) are skipped.
pub fn tokenize(expr: &str) -> Vec<Token> {
    expr.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s == "0" {
                Token::Empty
            } else if let Some(name) = s.strip_prefix('!') {
                Token::Negated(name.trim().to_string())
            } else {
                Token::Component(s.to_string())
            }
        })
        .collect()
}

/// Parse `expr` and intern the family made up of its *positive* tokens,
/// resolving each name to a handle via `lookup`. Negated tokens are parsed
/// (so the caller can inspect them) but contribute nothing to the returned
/// `FamilyId`. Fails with [`EcsError::UnknownComponent`] if a positive
/// token's name doesn't resolve.
pub fn resolve_family(
    expr: &str,
    interner: &mut FamilyInterner,
    lookup: impl Fn(&str) -> Option<Handle>,
) -> Result<FamilyId> {
    let tokens = tokenize(expr);
    let mut members: FamilyMembers = SmallVec::new();
    for token in &tokens {
        if let Token::Component(name) = token {
            let handle = lookup(name).ok_or_else(|| EcsError::UnknownComponent(name.clone()))?;
            members.push(handle);
        }
    }
    Ok(interner.intern(members))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_plain_negated_and_empty() {
        let tokens = tokenize("Position, !Velocity, 0");
        assert_eq!(
            tokens,
            vec![
                Token::Component("Position".to_string()),
                Token::Negated("Velocity".to_string()),
                Token::Empty,
            ]
        );
    }

    #[test]
    fn skips_blank_segments() {
        let tokens = tokenize("Position,,Velocity,");
        assert_eq!(
            tokens,
            vec![
                Token::Component("Position".to_string()),
                Token::Component("Velocity".to_string()),
            ]
        );
    }

    #[test]
    fn resolve_family_ignores_negated_tokens() {
        let mut interner = FamilyInterner::new();
        let pos = Handle::from_raw(1);
        let vel = Handle::from_raw(2);
        let lookup = |name: &str| match name {
            "Position" => Some(pos),
            "Velocity" => Some(vel),
            _ => None,
        };
        let family = resolve_family("Position, !Velocity", &mut interner, lookup).unwrap();
        assert_eq!(interner.members(family), &[pos]);
    }

    #[test]
    fn resolve_family_fails_on_unknown_name() {
        let mut interner = FamilyInterner::new();
        let err = resolve_family("Bogus", &mut interner, |_| None).unwrap_err();
        assert_eq!(err, EcsError::UnknownComponent("Bogus".to_string()));
    }

    #[test]
    fn empty_literal_yields_empty_family() {
        let mut interner = FamilyInterner::new();
        let family = resolve_family("0", &mut interner, |_| None).unwrap();
        assert!(family.is_empty());
    }
}
