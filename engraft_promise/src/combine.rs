// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Combinators over many promises.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::promise::EngraftPromise;
use crate::rejection::{PromiseError, Rejection};

/// Slots filled as inputs settle, in input order.
struct Gather<V> {
    slots: Vec<Option<V>>,
    remaining: usize,
}

impl<V> Gather<V> {
    fn new(len: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
            remaining: len,
        }))
    }

    /// Records `value` at `index`; returns every value once all are in.
    fn fill(&mut self, index: usize, value: V) -> Option<Vec<V>> {
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        (self.remaining == 0).then(|| self.slots.drain(..).flatten().collect())
    }
}

impl<T: Clone + 'static> EngraftPromise<T> {
    /// Fulfills with every value, in input order, once all inputs fulfill.
    ///
    /// Rejects with the first rejection. Settles synchronously when the
    /// inputs are already settled, and fulfills immediately with an empty
    /// list when there are no inputs.
    ///
    /// ```rust
    /// use engraft_promise::EngraftPromise;
    ///
    /// let (later, resolver) = EngraftPromise::deferred();
    /// let all = EngraftPromise::all([EngraftPromise::resolve(1), later]);
    /// assert!(all.is_pending());
    /// resolver.resolve(2);
    /// assert_eq!(all.state().value(), Some(&vec![1, 2]));
    /// ```
    pub fn all(promises: impl IntoIterator<Item = Self>) -> EngraftPromise<Vec<T>> {
        let promises: Vec<Self> = promises.into_iter().collect();
        if promises.is_empty() {
            return EngraftPromise::resolve(Vec::new());
        }
        let (all, resolver) = EngraftPromise::deferred();
        let gather = Gather::new(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let gather = Rc::clone(&gather);
            let resolver = resolver.clone();
            promise.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    let done = gather.borrow_mut().fill(index, value);
                    if let Some(values) = done {
                        resolver.resolve(values);
                    }
                }
                Err(reason) => resolver.reject(reason),
            });
        }
        all
    }

    /// Fulfills with every outcome, in input order, once all inputs settle.
    /// Never rejects.
    pub fn all_settled(
        promises: impl IntoIterator<Item = Self>,
    ) -> EngraftPromise<Vec<Result<T, Rejection>>> {
        let promises: Vec<Self> = promises.into_iter().collect();
        if promises.is_empty() {
            return EngraftPromise::resolve(Vec::new());
        }
        let (all, resolver) = EngraftPromise::deferred();
        let gather = Gather::new(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let gather = Rc::clone(&gather);
            let resolver = resolver.clone();
            promise.on_settled(move |outcome| {
                let done = gather.borrow_mut().fill(index, outcome);
                if let Some(outcomes) = done {
                    resolver.resolve(outcomes);
                }
            });
        }
        all
    }

    /// [`all`](Self::all) over a keyed collection, fulfilling with a map
    /// from each key to its value.
    pub fn all_values<K>(
        promises: impl IntoIterator<Item = (K, Self)>,
    ) -> EngraftPromise<HashMap<K, T>>
    where
        K: Eq + Hash + Clone + 'static,
    {
        let (keys, promises): (Vec<K>, Vec<Self>) = promises.into_iter().unzip();
        Self::all(promises).map(move |values| keys.into_iter().zip(values).collect())
    }

    /// Fulfills with the first value to arrive.
    ///
    /// Rejects with [`PromiseError::AllRejected`], listing every reason in
    /// input order, if all inputs reject (or there are none).
    pub fn any(promises: impl IntoIterator<Item = Self>) -> Self {
        let promises: Vec<Self> = promises.into_iter().collect();
        if promises.is_empty() {
            return Self::reject(PromiseError::AllRejected(Vec::new()));
        }
        let (any, resolver) = Self::deferred();
        let gather = Gather::new(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let gather = Rc::clone(&gather);
            let resolver = resolver.clone();
            promise.on_settled(move |outcome| match outcome {
                Ok(value) => resolver.resolve(value),
                Err(reason) => {
                    let done = gather.borrow_mut().fill(index, reason);
                    if let Some(reasons) = done {
                        resolver.reject(PromiseError::AllRejected(reasons));
                    }
                }
            });
        }
        any
    }
}
