// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engraft Refunc: hook-based incremental recomputation.
//!
//! A *refunction* is a function that receives its own persistent [`Memory`]
//! on every call. Called again with the same memory, it can skip work whose
//! inputs have not changed and hand back results with the same identity as
//! before. This crate provides:
//!
//! - **Memory** ([`Memory`]): the opaque per-call-site state.
//! - **Refunctions** ([`Refunc`]): the `(&mut Memory, A) -> R` function type.
//! - **Hooks** ([`Hooks`]): React-style sugar for writing refunctions. A
//!   hook-aware function claims ordered slots of its memory through
//!   [`Hooks::cell`], [`Hooks::memo`], [`Hooks::dedupe`], [`Hooks::fork`],
//!   [`Hooks::later`], [`Hooks::cache`], and [`Hooks::refunction`].
//! - **Combinators** ([`memoize`], [`memoize_props`], [`memoize_forever`]):
//!   wrap a refunction so it only reruns when its inputs change identity.
//! - **Equality** ([`eq`]): the identity and one-level-deep comparisons that
//!   decide when inputs "changed".
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use engraft_refunc::{Memory, Refunc};
//!
//! // Sum a list, but only re-sum the halves whose input changed.
//! let halves = Refunc::hooks(|hooks, (left, right): (Rc<Vec<u32>>, Rc<Vec<u32>>)| {
//!     let l = hooks.memo((left.clone(),), |_| left.iter().sum::<u32>());
//!     let r = hooks.memo((right.clone(),), |_| right.iter().sum::<u32>());
//!     l + r
//! });
//!
//! let mut memory = Memory::new();
//! let left = Rc::new(vec![1, 2]);
//! assert_eq!(halves.call(&mut memory, (left.clone(), Rc::new(vec![3]))), 6);
//! // `left` keeps its identity, so only the right half is recomputed.
//! assert_eq!(halves.call(&mut memory, (left, Rc::new(vec![10]))), 13);
//! ```
//!
//! ## Rules of hooks
//!
//! A hook-aware function must make the same hook calls, in the same order,
//! on every run against the same memory. Breaking this rule is a programming
//! error and panics. Work that is conditional, or repeated a dynamic number of
//! times, belongs inside [`Hooks::memo`] or a keyed [`Fork`] branch, each of
//! which keeps its own ordered slots.
//!
//! A memory is owned by one call site. It is neither `Send` nor `Sync`.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.
//!
//! ## Features
//!
//! This crate currently has no optional features. All functionality is always
//! available.

#![no_std]

extern crate alloc;

pub mod eq;
mod fork;
mod hooks;
mod memoize;
mod memory;
mod refunc;

pub use eq::{RefEq, ShallowEq};
pub use fork::{Fork, HookCache, Later};
pub use hooks::{HookCell, Hooks};
pub use memoize::{memoize, memoize_forever, memoize_props};
pub use memory::Memory;
pub use refunc::Refunc;
