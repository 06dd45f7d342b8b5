// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent memory for refunctions.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::any::Any;
use core::fmt;

use smallvec::SmallVec;

use crate::hooks::Hooks;

/// The opaque state a refunction keeps between calls.
///
/// A `Memory` belongs to exactly one call site: a mount point, a memo slot,
/// or a fork branch. Passing the same `Memory` on every call is what lets the
/// refunction reuse work from its previous run.
///
/// `Memory` is neither `Send` nor `Sync`.
#[derive(Default)]
pub struct Memory {
    pub(crate) trail: Trail,
    /// Storage for refunctions that do not use hooks (see
    /// [`memoize_forever`](crate::memoize_forever)).
    pub(crate) forever: Option<Box<dyn Any>>,
}

impl Memory {
    /// Creates an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing has been stored in this memory yet.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !self.trail.completed && self.trail.slots.is_empty() && self.forever.is_none()
    }

    /// Forgets everything stored in this memory.
    ///
    /// The next call made with it behaves like a first run.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("hook_slots", &self.trail.slots.len())
            .field("forever", &self.forever.is_some())
            .finish_non_exhaustive()
    }
}

/// The ordered slots of one hook-aware call.
///
/// Slot `i` belongs to the `i`-th hook called during the run. Child trails
/// (memo thunks, fork branches) live inside the slots that own them.
#[derive(Default)]
pub(crate) struct Trail {
    /// Set once a run has finished; the slot count is fixed from then on.
    pub(crate) completed: bool,
    pub(crate) slots: SmallVec<[Rc<dyn Any>; 4]>,
}

impl Trail {
    /// Runs `f` against this trail.
    ///
    /// # Panics
    ///
    /// Panics if a completed trail sees a different number of hook calls
    /// than its first run did.
    pub(crate) fn run<R>(&mut self, f: impl FnOnce(&mut Hooks<'_>) -> R) -> R {
        if !self.completed {
            // A first run that unwound part way leaves partial slots behind.
            self.slots.clear();
        }
        let mut hooks = Hooks::new(self);
        let result = f(&mut hooks);
        let used = hooks.position();
        if self.completed {
            assert!(
                used == self.slots.len(),
                "hook-aware function changed number of hook calls between runs: {} => {used}",
                self.slots.len(),
            );
        }
        self.completed = true;
        result
    }
}

impl fmt::Debug for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trail")
            .field("completed", &self.completed)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_memory_reports_fresh() {
        let memory = Memory::new();
        assert!(memory.is_fresh());
    }

    #[test]
    fn trail_keeps_slots_between_runs() {
        let mut trail = Trail::default();
        let first = trail.run(|h| h.cell(|| 5_u32));
        let second = trail.run(|h| h.cell(|| 9_u32));
        assert!(first.ptr_eq(&second));
        assert_eq!(*second.borrow(), 5);
    }

    #[test]
    #[should_panic(expected = "ran off the end of the trail")]
    fn trail_rejects_extra_hook_calls() {
        let mut trail = Trail::default();
        trail.run(|h| {
            h.cell(|| 0_u8);
        });
        trail.run(|h| {
            h.cell(|| 0_u8);
            h.cell(|| 0_u8);
        });
    }

    #[test]
    #[should_panic(expected = "changed number of hook calls")]
    fn trail_rejects_missing_hook_calls() {
        let mut trail = Trail::default();
        trail.run(|h| {
            h.cell(|| 0_u8);
            h.cell(|| 0_u8);
        });
        trail.run(|h| {
            h.cell(|| 0_u8);
        });
    }

    #[test]
    fn interrupted_first_run_restarts_cleanly() {
        extern crate std;

        let mut trail = Trail::default();
        let outcome = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| {
            trail.run(|h| {
                h.cell(|| 1_u8);
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());

        let cell = trail.run(|h| {
            h.cell(|| 2_u8);
            h.cell(|| 3_u8)
        });
        assert_eq!(*cell.borrow(), 3);
        assert_eq!(trail.slots.len(), 2);
    }

    #[test]
    fn reset_forgets_slots() {
        let mut memory = Memory::new();
        memory.trail.run(|h| {
            h.cell(|| 0_u8);
        });
        assert!(!memory.is_fresh());
        memory.reset();
        assert!(memory.is_fresh());
    }
}
