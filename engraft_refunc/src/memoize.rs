// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memoization combinators over refunctions.
//!
//! [`memoize`] and [`memoize_props`] keep a single entry, like a one-item LRU
//! cache: they recompute whenever the arguments differ from the previous call.
//! [`memoize_forever`] keeps every result for as long as its memory lives.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::any::Any;

use hashbrown::HashMap;

use crate::eq::ShallowEq;
use crate::refunc::Refunc;

/// Memoizes a refunction on its argument tuple.
///
/// Arguments are compared with [`ShallowEq`], so each element of the tuple is
/// compared by identity. On a miss, `f` runs with a memory that persists
/// across misses.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use engraft_refunc::{memoize, Memory, Refunc};
///
/// let runs = Rc::new(Cell::new(0));
/// let add = memoize({
///     let runs = runs.clone();
///     Refunc::from_fn(move |(a, b): (i32, i32)| {
///         runs.set(runs.get() + 1);
///         a + b
///     })
/// });
///
/// let mut memory = Memory::new();
/// assert_eq!(add.call(&mut memory, (1, 2)), 3);
/// assert_eq!(add.call(&mut memory, (1, 2)), 3);
/// assert_eq!(runs.get(), 1);
/// ```
pub fn memoize<A, R>(f: Refunc<A, R>) -> Refunc<A, R>
where
    A: ShallowEq + Clone + 'static,
    R: Clone + 'static,
{
    Refunc::hooks(move |hooks, args: A| {
        hooks.memo(args.clone(), |hooks| hooks.refunction(&f, args))
    })
}

/// Memoizes a refunction taking a single props record.
///
/// The record's [`ShallowEq`] impl compares it field by field with
/// identity equality. A props type is usually a struct of shared handles with
/// a hand-written or derived `ShallowEq`.
pub fn memoize_props<P, R>(f: Refunc<P, R>) -> Refunc<P, R>
where
    P: ShallowEq + Clone + 'static,
    R: Clone + 'static,
{
    Refunc::hooks(move |hooks, props: P| {
        hooks.memo_with(props.clone(), P::shallow_eq, |hooks| {
            hooks.refunction(&f, props)
        })
    })
}

/// Caches a plain function forever, keyed by the identity of its argument.
///
/// The cache is owned by the memory the returned refunction is called with.
/// An entry is never recomputed while its key is alive. Entries whose key has
/// been dropped are pruned as the cache grows.
///
/// # Panics
///
/// The returned refunction panics if its memory is also used by a different
/// `memoize_forever` refunction with other argument or result types.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use engraft_refunc::{memoize_forever, Memory};
///
/// let runs = Rc::new(Cell::new(0));
/// let len = memoize_forever({
///     let runs = runs.clone();
///     move |s: &String| {
///         runs.set(runs.get() + 1);
///         s.len()
///     }
/// });
///
/// let mut memory = Memory::new();
/// let o1 = Rc::new(String::from("one"));
/// let o2 = Rc::new(String::from("two"));
/// len.call(&mut memory, o1.clone());
/// len.call(&mut memory, o2);
/// len.call(&mut memory, o1);
/// assert_eq!(runs.get(), 2);
/// ```
pub fn memoize_forever<T, R, F>(f: F) -> Refunc<Rc<T>, R>
where
    T: 'static,
    R: Clone + 'static,
    F: Fn(&T) -> R + 'static,
{
    Refunc::new(move |memory, key: Rc<T>| {
        let cache = memory
            .forever
            .get_or_insert_with(|| Box::new(ForeverCache::<T, R>::default()) as Box<dyn Any>);
        let Some(cache) = cache.downcast_mut::<ForeverCache<T, R>>() else {
            panic!("memory is shared by memoize_forever refunctions of different types");
        };
        cache.get_or_insert(&key, || f(&key))
    })
}

/// Entries keyed by allocation address. Each entry keeps a [`Weak`] to its
/// key, which pins the allocation so the address cannot be reused while the
/// entry exists.
struct ForeverCache<T, R> {
    entries: HashMap<usize, (Weak<T>, R)>,
    prune_at: usize,
}

impl<T, R> Default for ForeverCache<T, R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: 16,
        }
    }
}

impl<T, R: Clone> ForeverCache<T, R> {
    fn get_or_insert(&mut self, key: &Rc<T>, f: impl FnOnce() -> R) -> R {
        let addr = Rc::as_ptr(key) as usize;
        if let Some((_, result)) = self.entries.get(&addr) {
            return result.clone();
        }
        if self.entries.len() >= self.prune_at {
            self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(16);
        }
        let result = f();
        self.entries
            .insert(addr, (Rc::downgrade(key), result.clone()));
        result
    }
}
