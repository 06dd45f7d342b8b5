// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The promise type and its resolver.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use crate::rejection::Rejection;

type Callback<T> = Box<dyn FnOnce(Result<T, Rejection>)>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Fulfilled(T),
    Rejected(Rejection),
}

/// A snapshot of a promise's state, as returned by [`EngraftPromise::state`].
#[derive(Clone, Debug)]
pub enum PromiseState<T> {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with a rejection reason.
    Rejected(Rejection),
}

impl<T> PromiseState<T> {
    /// Returns `true` for [`PromiseState::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns the settled outcome, or `None` while pending.
    #[must_use]
    pub fn into_outcome(self) -> Option<Result<T, Rejection>> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(value) => Some(Ok(value)),
            Self::Rejected(reason) => Some(Err(reason)),
        }
    }

    /// Returns the fulfilled value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A deferred value that settles at most once.
///
/// Continuations attached to a settled promise run before the attaching call
/// returns. Continuations attached to a pending promise run inside the
/// [`Resolver`] call that settles it, in the order they were attached.
///
/// Promises are shared handles: clones observe the same state, and
/// [`ptr_eq`](Self::ptr_eq) identifies them.
pub struct EngraftPromise<T> {
    inner: Rc<RefCell<State<T>>>,
}

/// The settling side of a pending [`EngraftPromise`].
///
/// Only the first call to [`resolve`](Self::resolve),
/// [`reject`](Self::reject), or [`settle`](Self::settle) has an effect.
pub struct Resolver<T> {
    inner: Rc<RefCell<State<T>>>,
}

impl<T> Clone for EngraftPromise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

fn status_name<T>(state: &State<T>) -> &'static str {
    match state {
        State::Pending(_) => "pending",
        State::Fulfilled(_) => "fulfilled",
        State::Rejected(_) => "rejected",
    }
}

impl<T> fmt::Debug for EngraftPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngraftPromise")
            .field("status", &status_name(&self.inner.borrow()))
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("status", &status_name(&self.inner.borrow()))
            .finish_non_exhaustive()
    }
}

/// Runs `f`, turning a panic into a rejection.
pub(crate) fn guarded<U>(f: impl FnOnce() -> Result<U, Rejection>) -> Result<U, Rejection> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Rejection::from_panic(payload)))
}

impl<T: Clone + 'static> Resolver<T> {
    /// Fulfills the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with `reason`.
    pub fn reject(&self, reason: impl Into<Rejection>) {
        self.settle(Err(reason.into()));
    }

    /// Settles the promise with `outcome` and runs its waiting continuations.
    ///
    /// Does nothing if the promise is already settled.
    ///
    /// # Panics
    ///
    /// Every continuation runs even if an earlier one panics. The first
    /// panic is resumed once all of them have run.
    pub fn settle(&self, outcome: Result<T, Rejection>) {
        let callbacks = {
            let mut state = self.inner.borrow_mut();
            if !matches!(*state, State::Pending(_)) {
                return;
            }
            let settled = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(reason) => State::Rejected(reason.clone()),
            };
            match mem::replace(&mut *state, settled) {
                State::Pending(callbacks) => callbacks,
                State::Fulfilled(_) | State::Rejected(_) => Vec::new(),
            }
        };
        let mut first_panic = None;
        for callback in callbacks {
            let outcome = outcome.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
    }

    /// Returns `true` once the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(*self.inner.borrow(), State::Pending(_))
    }
}

impl<T: Clone + 'static> EngraftPromise<T> {
    /// Creates a promise settled by `executor`.
    ///
    /// The executor runs immediately. If it panics before settling, the
    /// promise is rejected with the panic message.
    pub fn new(executor: impl FnOnce(Resolver<T>)) -> Self {
        let (promise, resolver) = Self::deferred();
        let handle = resolver.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| executor(handle))) {
            resolver.reject(Rejection::from_panic(payload));
        }
        promise
    }

    /// Creates a pending promise together with the [`Resolver`] that
    /// settles it, for values produced by an external source.
    #[must_use]
    pub fn deferred() -> (Self, Resolver<T>) {
        let inner = Rc::new(RefCell::new(State::Pending(Vec::new())));
        (
            Self {
                inner: Rc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// Creates a promise that is already fulfilled.
    #[must_use]
    pub fn resolve(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Fulfilled(value))),
        }
    }

    /// Creates a promise that is already rejected.
    pub fn reject(reason: impl Into<Rejection>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Rejected(reason.into()))),
        }
    }

    /// Creates a promise that never settles.
    #[must_use]
    pub fn unresolved() -> Self {
        Self::deferred().0
    }

    /// Creates a promise settled with `outcome`.
    pub fn from_outcome(outcome: Result<T, Rejection>) -> Self {
        match outcome {
            Ok(value) => Self::resolve(value),
            Err(reason) => Self::reject(reason),
        }
    }

    /// Creates a promise from a state snapshot. A pending snapshot gives a
    /// promise that never settles.
    pub fn from_state(state: PromiseState<T>) -> Self {
        match state.into_outcome() {
            None => Self::unresolved(),
            Some(outcome) => Self::from_outcome(outcome),
        }
    }

    /// Runs `f` now and captures its outcome. Both an `Err` and a panic
    /// become a rejection.
    ///
    /// ```rust
    /// use engraft_promise::{EngraftPromise, Rejection};
    ///
    /// let ok = EngraftPromise::attempt(|| Ok::<_, Rejection>(100));
    /// assert_eq!(ok.state().value(), Some(&100));
    ///
    /// let failed = EngraftPromise::<i32>::attempt(|| Err(Rejection::msg("no good")));
    /// assert_eq!(failed.state().reason().unwrap().to_string(), "no good");
    /// ```
    pub fn attempt<E: Into<Rejection>>(f: impl FnOnce() -> Result<T, E>) -> Self {
        Self::from_outcome(guarded(|| f().map_err(Into::into)))
    }

    /// Like [`attempt`](Self::attempt), for a computation that itself returns
    /// a promise. The result follows that promise.
    pub fn attempt_promise<E: Into<Rejection>>(f: impl FnOnce() -> Result<Self, E>) -> Self {
        match guarded(|| f().map_err(Into::into)) {
            Ok(promise) => promise,
            Err(reason) => Self::reject(reason),
        }
    }

    /// Returns a snapshot of the current state without side effects.
    #[must_use]
    pub fn state(&self) -> PromiseState<T> {
        match &*self.inner.borrow() {
            State::Pending(_) => PromiseState::Pending,
            State::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
            State::Rejected(reason) => PromiseState::Rejected(reason.clone()),
        }
    }

    /// Returns `true` while the promise has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.borrow(), State::Pending(_))
    }

    /// Calls `f` with the outcome once the promise settles.
    ///
    /// If the promise is already settled, `f` runs before this returns.
    pub fn on_settled(&self, f: impl FnOnce(Result<T, Rejection>) + 'static) {
        let outcome = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(f));
                    return;
                }
                State::Fulfilled(value) => Ok(value.clone()),
                State::Rejected(reason) => Err(reason.clone()),
            }
        };
        f(outcome);
    }

    /// Chains a fallible computation on the fulfilled value.
    ///
    /// A rejection passes through untouched. An `Err` or a panic from `f`
    /// rejects the returned promise.
    pub fn then<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> Result<U, Rejection> + 'static,
    ) -> EngraftPromise<U> {
        let (promise, resolver) = EngraftPromise::deferred();
        self.on_settled(move |outcome| {
            resolver.settle(outcome.and_then(|value| guarded(|| f(value))));
        });
        promise
    }

    /// Maps the fulfilled value.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> EngraftPromise<U> {
        self.then(move |value| Ok(f(value)))
    }

    /// Chains a computation that returns another promise, and follows it.
    pub fn and_then<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> EngraftPromise<U> + 'static,
    ) -> EngraftPromise<U> {
        let (promise, resolver) = EngraftPromise::deferred();
        self.on_settled(move |outcome| {
            match outcome.and_then(|value| guarded(|| Ok(f(value)))) {
                Ok(next) => next.on_settled(move |outcome| resolver.settle(outcome)),
                Err(reason) => resolver.reject(reason),
            }
        });
        promise
    }

    /// Handles a rejection. A fulfilled value passes through untouched.
    pub fn catch(&self, f: impl FnOnce(Rejection) -> Result<T, Rejection> + 'static) -> Self {
        let (promise, resolver) = Self::deferred();
        self.on_settled(move |outcome| {
            resolver.settle(outcome.or_else(|reason| guarded(|| f(reason))));
        });
        promise
    }

    /// Returns `true` if both handles share one promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> engraft_refunc::RefEq for EngraftPromise<T> {
    fn ref_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn then_runs_synchronously_when_fulfilled() {
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        EngraftPromise::resolve(100).on_settled(move |outcome| {
            sink.set(outcome.unwrap_or_default());
        });
        assert_eq!(seen.get(), 100);

        let doubled = EngraftPromise::resolve(21).map(|x| x * 2);
        assert_eq!(doubled.state().value(), Some(&42));
    }

    #[test]
    fn continuations_wait_for_the_resolver() {
        let (promise, resolver) = EngraftPromise::<i32>::deferred();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let seen = seen.clone();
            promise.on_settled(move |outcome| seen.borrow_mut().push((tag, outcome.ok())));
        }
        assert!(seen.borrow().is_empty());
        assert!(promise.is_pending());

        resolver.resolve(100);
        assert_eq!(*seen.borrow(), [(0, Some(100)), (1, Some(100)), (2, Some(100))]);
        assert_eq!(promise.state().value(), Some(&100));
    }

    #[test]
    fn state_reports_each_status() {
        assert!(EngraftPromise::<i32>::unresolved().state().is_pending());
        assert_eq!(EngraftPromise::resolve(100).state().value(), Some(&100));
        let rejected = EngraftPromise::<i32>::reject(Rejection::msg("no good"));
        assert_eq!(rejected.state().reason().map(ToString::to_string), Some("no good".into()));
    }

    #[test]
    fn settles_at_most_once() {
        let (promise, resolver) = EngraftPromise::deferred();
        resolver.resolve(1);
        resolver.resolve(2);
        resolver.reject(Rejection::msg("late"));
        assert_eq!(promise.state().value(), Some(&1));
        assert!(resolver.is_settled());
    }

    #[test]
    fn a_panicking_observer_does_not_strand_later_continuations() {
        let (source, resolver) = EngraftPromise::deferred();
        source.on_settled(|_: Result<i32, Rejection>| panic!("observer failed"));
        let mapped = source.map(|x| x + 1);

        let settled = catch_unwind(AssertUnwindSafe(|| resolver.resolve(1)));
        assert!(settled.is_err(), "the observer's panic reaches the resolver");
        assert_eq!(source.state().value(), Some(&1));
        assert_eq!(mapped.state().value(), Some(&2));
    }

    #[test]
    fn attempt_catches_panics() {
        let promise = EngraftPromise::<i32>::attempt(|| -> Result<i32, Rejection> {
            panic!("no good");
        });
        assert_eq!(
            promise.state().reason().map(ToString::to_string),
            Some("panicked: no good".into())
        );
    }

    #[test]
    fn attempt_promise_follows_the_returned_promise() {
        let (inner, resolver) = EngraftPromise::deferred();
        let outer = EngraftPromise::attempt_promise(|| Ok::<_, Rejection>(inner.clone()));
        assert!(outer.is_pending());
        resolver.resolve("done");
        assert_eq!(outer.state().value(), Some(&"done"));
    }

    #[test]
    fn executor_panic_rejects() {
        let promise = EngraftPromise::<u8>::new(|_| panic!("executor failed"));
        assert!(promise.state().reason().is_some());

        let promise = EngraftPromise::new(|resolver| resolver.resolve(3_u8));
        assert_eq!(promise.state().value(), Some(&3));
    }

    #[test]
    fn rejections_skip_then_and_reach_catch() {
        let recovered = EngraftPromise::<i32>::reject(Rejection::msg("bad"))
            .map(|x| x + 1)
            .catch(|reason| {
                assert_eq!(reason.to_string(), "bad");
                Ok(0)
            });
        assert_eq!(recovered.state().value(), Some(&0));
    }

    #[test]
    fn panics_in_continuations_reject() {
        let promise = EngraftPromise::resolve(1).map(|_: i32| -> i32 { panic!("in map") });
        assert!(promise.state().reason().is_some());
    }

    #[test]
    fn and_then_flattens() {
        let (inner, resolver) = EngraftPromise::deferred();
        let chained = EngraftPromise::resolve(2).and_then(move |x| inner.map(move |y: i32| x * y));
        assert!(chained.is_pending());
        resolver.resolve(5);
        assert_eq!(chained.state().value(), Some(&10));
    }

    #[test]
    fn from_state_round_trips() {
        for state in [
            PromiseState::Pending,
            PromiseState::Fulfilled(4),
            PromiseState::Rejected(Rejection::msg("x")),
        ] {
            let promise = EngraftPromise::from_state(state.clone());
            assert_eq!(promise.state().is_pending(), state.is_pending());
            assert_eq!(promise.state().value(), state.value());
        }
    }
}
