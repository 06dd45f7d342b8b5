// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference collections, binding narrowing, and references found in code.

use std::rc::Rc;
use std::sync::LazyLock;

use engraft_refunc::{Hooks, ShallowEq};
use hashbrown::HashSet;
use regex::Regex;

use crate::program::Program;
use crate::tool::ToolProps;
use crate::var::{Var, VarBindings, VarId};

/// The transitive set of variable ids a program reads.
pub type RefSet = Rc<HashSet<VarId>>;

/// What a program declares it reads.
///
/// Programs are followed through their own tools' declarations. A
/// [`Minus`](Self::Minus) entry of a list removes its references from those
/// accumulated so far, which is how containers hide the variables they define
/// themselves.
#[derive(Clone, Debug)]
pub enum ReferenceCollection {
    /// A variable read directly.
    Var(VarId),
    /// A nested program, whose references are included.
    Program(Program),
    /// Entries applied in order.
    List(Vec<ReferenceCollection>),
    /// Removes the references of its content.
    Minus(Box<ReferenceCollection>),
}

impl ReferenceCollection {
    /// The empty collection.
    #[must_use]
    pub fn none() -> Self {
        Self::List(Vec::new())
    }

    /// Wraps `collection` so that it removes references.
    pub fn minus(collection: impl Into<Self>) -> Self {
        Self::Minus(Box::new(collection.into()))
    }
}

impl From<VarId> for ReferenceCollection {
    fn from(id: VarId) -> Self {
        Self::Var(id)
    }
}

impl From<&Var> for ReferenceCollection {
    fn from(var: &Var) -> Self {
        Self::Var(var.id.clone())
    }
}

impl From<Program> for ReferenceCollection {
    fn from(program: Program) -> Self {
        Self::Program(program)
    }
}

impl From<&Program> for ReferenceCollection {
    fn from(program: &Program) -> Self {
        Self::Program(program.clone())
    }
}

impl<T: Into<Self>> From<Vec<T>> for ReferenceCollection {
    fn from(entries: Vec<T>) -> Self {
        Self::List(entries.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> FromIterator<T> for ReferenceCollection {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Returns the bindings whose id is in `refs`.
///
/// Referenced ids without a binding are left out; the tool reading them sees
/// an unbound variable.
pub fn narrow(var_bindings: &VarBindings, refs: &HashSet<VarId>) -> VarBindings {
    refs.iter()
        .filter_map(|id| {
            var_bindings
                .get(id.as_str())
                .map(|binding| (id.clone(), binding.clone()))
        })
        .collect()
}

/// Narrows the props' bindings to what its program references, keeping the
/// identity of the result while the narrowed bindings stay shallow-equal.
///
/// Recomputes only when the reference set or the incoming bindings change
/// identity. Either way, a result equal to the previous one is replaced by
/// the previous one, so a rebuilt parent environment does not look like a
/// change to the tool.
pub fn hook_relevant_var_bindings(hooks: &mut Hooks<'_>, props: &ToolProps) -> VarBindings {
    let refs = props.context.dispatcher().references(&props.program);
    let var_bindings = props.var_bindings.clone();
    hooks.memo((refs.clone(), var_bindings.clone()), |hooks| {
        let narrowed = narrow(&var_bindings, &refs);
        hooks.dedupe(narrowed, VarBindings::shallow_eq)
    })
}

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID[a-zA-Z_]*[0-9]{6}").expect("static id pattern"));

/// Finds the ids referenced directly in `code`.
///
/// An id followed by `_` (such as the `_promise` form) is not a direct
/// reference.
pub fn references_from_code(code: &str) -> HashSet<VarId> {
    ID_PATTERN
        .find_iter(code)
        .filter(|found| !code[found.end()..].starts_with('_'))
        .map(|found| VarId::new(found.as_str()))
        .collect()
}

/// Finds the ids referenced in `code` in their `<id>_promise` form.
pub fn promise_references_from_code(code: &str) -> HashSet<VarId> {
    ID_PATTERN
        .find_iter(code)
        .filter(|found| code[found.end()..].starts_with("_promise"))
        .map(|found| VarId::new(found.as_str()))
        .collect()
}
