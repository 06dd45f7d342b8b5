// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engraft Promise: deferred values for single-threaded incremental programs.
//!
//! [`EngraftPromise`] is a promise that never defers work it could do now.
//! Continuations attached to a settled promise run before the attaching call
//! returns, so a chain of computations over already-available values finishes
//! in one synchronous pass. Its state can be peeked with
//! [`EngraftPromise::state`], which lets a view render "pending" or an error
//! without waiting.
//!
//! - Construction: [`EngraftPromise::resolve`], [`EngraftPromise::reject`],
//!   [`EngraftPromise::new`], [`EngraftPromise::deferred`],
//!   [`EngraftPromise::unresolved`], [`EngraftPromise::from_state`],
//!   [`EngraftPromise::attempt`], [`EngraftPromise::attempt_promise`].
//! - Chaining: [`EngraftPromise::then`], [`EngraftPromise::map`],
//!   [`EngraftPromise::and_then`], [`EngraftPromise::catch`],
//!   [`EngraftPromise::on_settled`].
//! - Combining: [`EngraftPromise::all`], [`EngraftPromise::all_settled`],
//!   [`EngraftPromise::all_values`], [`EngraftPromise::any`].
//!
//! Rejection reasons are [`Rejection`]s: shared handles to any error. Panics
//! inside computations run by this crate are caught and become rejections.
//!
//! ## Quick Start
//!
//! ```rust
//! use engraft_promise::{EngraftPromise, PromiseState, Rejection};
//!
//! let sum = EngraftPromise::all([EngraftPromise::resolve(1), EngraftPromise::resolve(2)])
//!     .map(|values| values.iter().sum::<i32>());
//! // Both inputs were settled, so the sum is available right away.
//! assert!(matches!(sum.state(), PromiseState::Fulfilled(3)));
//!
//! let (input, resolver) = EngraftPromise::<i32>::deferred();
//! let checked = input.then(|x| {
//!     if x >= 0 { Ok(x) } else { Err(Rejection::msg("negative")) }
//! });
//! assert!(checked.state().is_pending());
//! resolver.resolve(-1);
//! assert_eq!(checked.state().reason().unwrap().to_string(), "negative");
//! ```
//!
//! ## Threading
//!
//! Promises are `Rc`-based and neither `Send` nor `Sync`. Values produced by
//! other threads must be handed to a [`Resolver`] on the promise's own thread.

mod combine;
mod promise;
mod rejection;

pub use promise::{EngraftPromise, PromiseState, Resolver};
pub use rejection::{PromiseError, Rejection, panic_message};
