// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed forks: dynamically many hook-aware calls inside one hook slot.

use alloc::string::String;
use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::hooks::{HookCell, Hooks};
use crate::memory::Trail;

/// Access to the branches of a fork for one pass.
///
/// Each branch key owns a trail that persists across passes. Branches whose
/// key is not visited before [`done`](Self::done) are dropped.
pub struct Fork {
    branches: HookCell<HashMap<String, Trail>>,
    used: HashSet<String>,
}

impl fmt::Debug for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fork")
            .field("branches", &self.branches.borrow().len())
            .field("used", &self.used)
            .finish()
    }
}

impl Fork {
    /// Runs `f` on the trail persisted under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` was already used in this pass.
    pub fn branch<R>(&mut self, key: &str, f: impl FnOnce(&mut Hooks<'_>) -> R) -> R {
        assert!(
            self.used.insert(String::from(key)),
            "fork key `{key}` used twice in one pass"
        );
        // Out of the map while `f` runs; `f` may branch on this fork's cell.
        let mut trail = self.branches.borrow_mut().remove(key).unwrap_or_default();
        let result = trail.run(f);
        self.branches.borrow_mut().insert(String::from(key), trail);
        result
    }

    /// Returns `true` if `key` has been visited in this pass.
    #[must_use]
    pub fn is_used(&self, key: &str) -> bool {
        self.used.contains(key)
    }

    /// Ends the pass, dropping every branch not visited in it.
    pub fn done(self) {
        let used = self.used;
        self.branches
            .borrow_mut()
            .retain(|key, _| used.contains(key.as_str()));
    }
}

/// A single-branch fork for deferring one hook-aware call.
///
/// Obtained from [`Hooks::later`]. The branch is never dropped.
pub struct Later {
    fork: Fork,
}

impl fmt::Debug for Later {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Later").finish_non_exhaustive()
    }
}

impl Later {
    /// Runs the deferred call, consuming the handle.
    pub fn run<R>(mut self, f: impl FnOnce(&mut Hooks<'_>) -> R) -> R {
        self.fork.branch("", f)
    }
}

/// A per-pass keyed cache over a fork, created by [`Hooks::cache`].
///
/// Each key is computed at most once per pass, on its own persistent branch.
pub struct HookCache<T, F> {
    fork: Fork,
    values: HashMap<String, T>,
    compute: F,
}

impl<T, F> fmt::Debug for HookCache<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookCache")
            .field("fork", &self.fork)
            .field("cached", &self.values.len())
            .finish_non_exhaustive()
    }
}

impl<T, F> HookCache<T, F>
where
    T: Clone,
    F: FnMut(&mut Hooks<'_>, &str) -> T,
{
    /// Returns the value for `key`, computing it on first request this pass.
    pub fn get(&mut self, key: &str) -> T {
        if let Some(value) = self.values.get(key) {
            return value.clone();
        }
        let compute = &mut self.compute;
        let value = self.fork.branch(key, |hooks| compute(hooks, key));
        self.values.insert(String::from(key), value.clone());
        value
    }

    /// Ends the pass, dropping branches for keys not requested in it.
    pub fn done(self) {
        self.fork.done();
    }
}

impl Hooks<'_> {
    /// Starts a fork whose pass ends when [`Fork::done`] is called.
    pub fn fork_later(&mut self) -> Fork {
        Fork {
            branches: self.cell(HashMap::new),
            used: HashSet::new(),
        }
    }

    /// Runs `f` with a fork and ends the pass when `f` returns.
    ///
    /// ```rust
    /// use engraft_refunc::{Memory, Refunc};
    ///
    /// let count_per_key = Refunc::hooks(|hooks, keys: Vec<&'static str>| {
    ///     hooks.fork(|fork| {
    ///         keys.iter()
    ///             .map(|key| {
    ///                 fork.branch(key, |hooks| {
    ///                     let runs = hooks.cell(|| 0);
    ///                     *runs.borrow_mut() += 1;
    ///                     *runs.borrow()
    ///                 })
    ///             })
    ///             .collect::<Vec<i32>>()
    ///     })
    /// });
    ///
    /// let mut memory = Memory::new();
    /// assert_eq!(count_per_key.call(&mut memory, vec!["a", "b"]), [1, 1]);
    /// assert_eq!(count_per_key.call(&mut memory, vec!["b", "c"]), [2, 1]);
    /// // "a" was dropped on the previous pass.
    /// assert_eq!(count_per_key.call(&mut memory, vec!["a"]), [1]);
    /// ```
    pub fn fork<R>(&mut self, f: impl FnOnce(&mut Fork) -> R) -> R {
        let mut fork = self.fork_later();
        let result = f(&mut fork);
        fork.done();
        result
    }

    /// Returns a handle for running one hook-aware call later in this pass,
    /// for example from inside a callback.
    pub fn later(&mut self) -> Later {
        Later {
            fork: self.fork_later(),
        }
    }

    /// Returns a keyed cache whose entries each run on a persistent branch.
    pub fn cache<T, F>(&mut self, compute: F) -> HookCache<T, F>
    where
        T: Clone,
        F: FnMut(&mut Hooks<'_>, &str) -> T,
    {
        HookCache {
            fork: self.fork_later(),
            values: HashMap::new(),
            compute,
        }
    }
}
