// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The hook engine.
//!
//! A hook-aware function receives a [`Hooks`] context. Each hook call claims
//! the next slot of the current trail, so a function must make the same hook
//! calls in the same order on every run. Conditional or repeated work goes
//! through [`Hooks::memo`], [`Hooks::fork`], or [`Hooks::later`], each of
//! which runs its body against a child trail of its own.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;
use core::ops::Deref;

use crate::eq::ShallowEq;
use crate::memory::{Memory, Trail};
use crate::refunc::Refunc;

/// The running position inside one trail.
pub struct Hooks<'a> {
    trail: &'a mut Trail,
    index: usize,
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("index", &self.index)
            .field("first_run", &!self.trail.completed)
            .finish_non_exhaustive()
    }
}

/// A persisted, shared, mutable slot created by [`Hooks::cell`].
pub struct HookCell<T>(Rc<RefCell<T>>);

impl<T> HookCell<T> {
    /// Returns `true` if both handles point at the same slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for HookCell<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Deref for HookCell<T> {
    type Target = RefCell<T>;

    fn deref(&self) -> &RefCell<T> {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for HookCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HookCell").field(&self.0).finish()
    }
}

struct MemoEntry<K, R> {
    key: K,
    result: R,
    trail: Trail,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(trail: &'a mut Trail) -> Self {
        Self { trail, index: 0 }
    }

    /// Number of hooks called so far in this run.
    pub(crate) fn position(&self) -> usize {
        self.index
    }

    /// Returns `true` during the first run of this trail.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        !self.trail.completed
    }

    /// Claims the next slot, initializing it with `init` on the first run.
    ///
    /// This is the fundamental hook; every other hook is built on it.
    ///
    /// # Panics
    ///
    /// Panics if a later run calls more hooks than the first run did, or if
    /// the slot at this position was created with a different type.
    pub fn cell<T: 'static>(&mut self, init: impl FnOnce() -> T) -> HookCell<T> {
        let index = self.index;
        self.index += 1;

        if !self.trail.completed {
            let cell = Rc::new(RefCell::new(init()));
            self.trail.slots.push(cell.clone());
            return HookCell(cell);
        }

        let Some(slot) = self.trail.slots.get(index) else {
            panic!("hooks ran off the end of the trail with {} slots", index + 1);
        };
        match Rc::clone(slot).downcast::<RefCell<T>>() {
            Ok(cell) => HookCell(cell),
            Err(_) => panic!("hook at position {index} changed type between runs"),
        }
    }

    /// Recomputes `f` only when `key` is not shallow-equal to the previous
    /// key, and otherwise returns the previous result.
    ///
    /// `f` is itself hook-aware; its slots persist across recomputations.
    ///
    /// ```rust
    /// use std::rc::Rc;
    /// use engraft_refunc::{Memory, Refunc};
    ///
    /// let square = Refunc::hooks(|hooks, n: Rc<u32>| hooks.memo((n.clone(),), |_| *n * *n));
    /// let mut memory = Memory::new();
    /// let n = Rc::new(7);
    /// assert_eq!(square.call(&mut memory, n.clone()), 49);
    /// assert_eq!(square.call(&mut memory, n), 49);
    /// ```
    pub fn memo<K, R>(&mut self, key: K, f: impl FnOnce(&mut Hooks<'_>) -> R) -> R
    where
        K: ShallowEq + 'static,
        R: Clone + 'static,
    {
        self.memo_with(key, K::shallow_eq, f)
    }

    /// [`memo`](Self::memo) with a custom key equality.
    pub fn memo_with<K, R>(
        &mut self,
        key: K,
        eq: impl Fn(&K, &K) -> bool,
        f: impl FnOnce(&mut Hooks<'_>) -> R,
    ) -> R
    where
        K: 'static,
        R: Clone + 'static,
    {
        let slot = self.cell(|| None::<MemoEntry<K, R>>);

        let mut trail = {
            let mut last = slot.borrow_mut();
            let hit = last
                .as_ref()
                .filter(|entry| eq(&entry.key, &key))
                .map(|entry| entry.result.clone());
            if let Some(result) = hit {
                return result;
            }
            last.take().map(|entry| entry.trail).unwrap_or_default()
        };

        tracing::trace!(slot = self.index - 1, "memo key changed, recomputing");
        let result = trail.run(f);
        *slot.borrow_mut() = Some(MemoEntry {
            key,
            result: result.clone(),
            trail,
        });
        result
    }

    /// Returns the previously stored value if it equals `value` under `eq`,
    /// otherwise stores and returns `value`.
    ///
    /// Use this to keep the identity of a freshly built value that turned out
    /// to be equivalent to the last one.
    pub fn dedupe<T: Clone + 'static>(&mut self, value: T, eq: impl Fn(&T, &T) -> bool) -> T {
        let slot = self.cell(|| None::<T>);
        let mut stored = slot.borrow_mut();
        if let Some(previous) = stored.as_ref().filter(|previous| eq(previous, &value)) {
            return previous.clone();
        }
        *stored = Some(value.clone());
        value
    }

    /// Calls a refunction with a [`Memory`] persisted in this slot.
    pub fn refunction<A, R>(&mut self, f: &Refunc<A, R>, args: A) -> R {
        let memory = self.cell(Memory::new);
        let mut memory = memory.borrow_mut();
        f.call(&mut memory, args)
    }

    /// Returns a closure that calls `f` with one [`Memory`] persisted in
    /// this slot, for refunctions called more than once per run.
    pub fn shared_refunction<A, R>(&mut self, f: &Refunc<A, R>) -> impl FnMut(A) -> R + use<A, R> {
        let memory = self.cell(Memory::new);
        let f = f.clone();
        move |args| f.call(&mut memory.borrow_mut(), args)
    }
}
