// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Variables, their ids, and the bindings that carry their outputs.

use std::borrow::Borrow;
use std::fmt;
use std::rc::Rc;

use engraft_promise::EngraftPromise;
use engraft_refunc::eq::{RefEq, ShallowEq, map_eq_with_ref_eq};
use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tool::ToolOutput;

/// Number of letters between the `ID` prefix and the digits of a generated id.
const ID_LETTERS: usize = 8;
/// Number of trailing digits of an id.
const ID_DIGITS: usize = 6;

/// The id of a variable, of the form `ID<letters><six digits>`.
///
/// Ids are embedded verbatim in code, which is how references are found (see
/// [`references_from_code`](crate::references_from_code)).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(String);

impl VarId {
    /// Wraps an existing id string without checking its shape.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id from the thread-local generator.
    #[must_use]
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    /// Generates a fresh id from `rng`.
    pub fn random_with(rng: &mut impl Rng) -> Self {
        let mut id = String::with_capacity(2 + ID_LETTERS + ID_DIGITS);
        id.push_str("ID");
        id.extend((0..ID_LETTERS).map(|_| char::from(rng.gen_range(b'a'..=b'z'))));
        id.extend((0..ID_DIGITS).map(|_| char::from(rng.gen_range(b'0'..=b'9'))));
        Self(id)
    }

    /// Returns `true` if this id has the shape ids are generated with, so that
    /// it can be found in code.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let Some(rest) = self.0.strip_prefix("ID") else {
            return false;
        };
        let letters = rest.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = rest.len() - letters.len();
        digits == ID_DIGITS
            && letters
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '_')
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VarId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Borrow<str> for VarId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl RefEq for VarId {
    fn ref_eq(&self, other: &Self) -> bool {
        self == other
    }
}

/// A named variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    /// Stable identifier.
    pub id: VarId,
    /// Human-readable label.
    pub label: String,
}

impl Var {
    /// Creates a variable with a fresh random id.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: VarId::random(),
            label: label.into(),
        }
    }

    /// Creates a variable with a known id.
    pub fn with_id(id: impl Into<VarId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A variable together with the output bound to it.
#[derive(Clone, Debug)]
pub struct VarBinding {
    /// The bound variable.
    pub var: Var,
    /// The output promise of whatever defines the variable.
    pub output: EngraftPromise<ToolOutput>,
}

impl VarBinding {
    /// Binds `output` to `var`.
    pub fn new(var: Var, output: EngraftPromise<ToolOutput>) -> Self {
        Self { var, output }
    }
}

/// Same variable and the same output promise.
impl RefEq for VarBinding {
    fn ref_eq(&self, other: &Self) -> bool {
        self.var == other.var && self.output.ref_eq(&other.output)
    }
}

/// A shared, immutable map from variable id to binding.
///
/// Cloning is cheap. Two `VarBindings` are [`RefEq`] only if they are the
/// same map; [`ShallowEq`] compares their bindings.
#[derive(Clone, Default)]
pub struct VarBindings(Rc<HashMap<VarId, VarBinding>>);

impl VarBindings {
    /// Returns an empty set of bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the binding for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&VarBinding> {
        self.0.get(id)
    }

    /// Returns `true` if `id` is bound.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the bindings in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&VarId, &VarBinding)> {
        self.0.iter()
    }

    /// Returns these bindings extended by `newer`, whose entries win.
    #[must_use]
    pub fn with(&self, newer: &Self) -> Self {
        if newer.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return newer.clone();
        }
        let mut merged = HashMap::clone(&self.0);
        merged.extend(newer.iter().map(|(id, binding)| (id.clone(), binding.clone())));
        Self(Rc::new(merged))
    }

    /// Returns `true` if both handles share one map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns `true` if every binding is stored under its own variable's id.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.iter().all(|(id, binding)| *id == binding.var.id)
    }
}

impl FromIterator<VarBinding> for VarBindings {
    fn from_iter<I: IntoIterator<Item = VarBinding>>(iter: I) -> Self {
        Self(Rc::new(
            iter.into_iter()
                .map(|binding| (binding.var.id.clone(), binding))
                .collect(),
        ))
    }
}

impl FromIterator<(VarId, VarBinding)> for VarBindings {
    fn from_iter<I: IntoIterator<Item = (VarId, VarBinding)>>(iter: I) -> Self {
        Self(Rc::new(iter.into_iter().collect()))
    }
}

impl RefEq for VarBindings {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl ShallowEq for VarBindings {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || map_eq_with_ref_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for VarBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&VarId> = self.0.keys().collect();
        ids.sort();
        f.debug_tuple("VarBindings").field(&ids).finish()
    }
}
