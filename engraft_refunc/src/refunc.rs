// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The refunction type.

use alloc::rc::Rc;
use core::fmt;

use crate::hooks::Hooks;
use crate::memory::Memory;

/// A function that takes its own [`Memory`] as the first argument.
///
/// Calling a refunction repeatedly with the same memory lets it reuse work
/// from its previous call. Refunctions are cheap to clone and compare by
/// identity.
pub struct Refunc<A, R>(Rc<dyn Fn(&mut Memory, A) -> R>);

impl<A, R> Refunc<A, R> {
    /// Wraps a function that manages its memory directly.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Memory, A) -> R + 'static,
    {
        Self(Rc::new(f))
    }

    /// Wraps a plain function that ignores its memory.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(A) -> R + 'static,
    {
        Self::new(move |_, args| f(args))
    }

    /// Wraps a hook-aware function.
    ///
    /// Every call runs `f` against the hook trail stored in the memory.
    ///
    /// # Panics
    ///
    /// The returned refunction panics if `f` changes the number or the types
    /// of its hook calls between runs on the same memory.
    ///
    /// ```rust
    /// use engraft_refunc::{Memory, Refunc};
    ///
    /// let calls = Refunc::hooks(|hooks, (): ()| {
    ///     let count = hooks.cell(|| 0);
    ///     *count.borrow_mut() += 1;
    ///     *count.borrow()
    /// });
    ///
    /// let mut memory = Memory::new();
    /// calls.call(&mut memory, ());
    /// assert_eq!(calls.call(&mut memory, ()), 2);
    /// assert_eq!(calls.call(&mut Memory::new(), ()), 1);
    /// ```
    pub fn hooks<F>(f: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, A) -> R + 'static,
    {
        Self::new(move |memory, args| memory.trail.run(|hooks| f(hooks, args)))
    }

    /// Calls the refunction with `memory`.
    pub fn call(&self, memory: &mut Memory, args: A) -> R {
        (self.0)(memory, args)
    }

    /// Returns `true` if both handles wrap the same function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<A, R> Clone for Refunc<A, R> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<A, R> fmt::Debug for Refunc<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Refunc")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl<A, R> crate::eq::RefEq for Refunc<A, R> {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eq::RefEq;

    #[test]
    fn from_fn_ignores_memory() {
        let double = Refunc::from_fn(|x: i32| x * 2);
        let mut memory = Memory::new();
        assert_eq!(double.call(&mut memory, 4), 8);
        assert!(memory.is_fresh());
    }

    #[test]
    fn clones_share_identity() {
        let f = Refunc::from_fn(|(): ()| ());
        let g = Refunc::from_fn(|(): ()| ());
        assert!(f.ref_eq(&f.clone()));
        assert!(!f.ref_eq(&g));
    }

    #[test]
    fn separate_memories_do_not_interfere() {
        let calls = Refunc::hooks(|hooks, (): ()| {
            let count = hooks.cell(|| 0_u32);
            *count.borrow_mut() += 1;
            *count.borrow()
        });
        let mut a = Memory::new();
        let mut b = Memory::new();
        calls.call(&mut a, ());
        calls.call(&mut a, ());
        assert_eq!(calls.call(&mut b, ()), 1);
        assert_eq!(calls.call(&mut a, ()), 3);
    }
}
