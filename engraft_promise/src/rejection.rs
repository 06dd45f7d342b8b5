// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rejection reasons.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Errors produced by this crate itself.
#[derive(Debug, Error)]
pub enum PromiseError {
    /// A plain message, from [`Rejection::msg`].
    #[error("{0}")]
    Message(String),
    /// A computation panicked while producing the value.
    #[error("panicked: {0}")]
    Panicked(String),
    /// Every input of [`EngraftPromise::any`](crate::EngraftPromise::any)
    /// was rejected (or there were no inputs).
    #[error("all {} promises were rejected", .0.len())]
    AllRejected(Vec<Rejection>),
}

/// Extracts the message of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// The reason a promise was rejected.
///
/// A cheap-to-clone handle to any [`Error`]. Like other catch-all error
/// handles, `Rejection` does not implement [`Error`] itself, so that any
/// error type converts into it with `?`.
#[derive(Clone)]
pub struct Rejection(Rc<dyn Error>);

impl Rejection {
    /// Wraps an error.
    pub fn new(error: impl Error + 'static) -> Self {
        Self(Rc::new(error))
    }

    /// Creates a rejection carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(PromiseError::Message(message.into()))
    }

    /// Converts a caught panic payload into a rejection.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(PromiseError::Panicked(panic_message(&*payload)))
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn error(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Returns the wrapped error as `E`, if it is one.
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }

    /// Returns `true` if both handles share one error value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<E: Error + 'static> From<E> for Rejection {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rejection").field(&self.0).finish()
    }
}

impl engraft_refunc::RefEq for Rejection {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("custom failure {code}")]
    struct Custom {
        code: u32,
    }

    #[test]
    fn message_displays_verbatim() {
        assert_eq!(Rejection::msg("no good").to_string(), "no good");
    }

    #[test]
    fn downcast_recovers_the_error() {
        let rejection = Rejection::from(Custom { code: 7 });
        assert_eq!(rejection.downcast_ref::<Custom>().map(|c| c.code), Some(7));
        assert!(rejection.downcast_ref::<PromiseError>().is_none());
        assert_eq!(rejection.to_string(), "custom failure 7");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let caught = std::panic::catch_unwind(|| {
            panic!("bad {}", 1);
        })
        .unwrap_err();
        let rejection = Rejection::from_panic(caught);
        assert_eq!(rejection.to_string(), "panicked: bad 1");

        let caught = std::panic::catch_unwind(|| {
            panic!("static");
        })
        .unwrap_err();
        assert_eq!(Rejection::from_panic(caught).to_string(), "panicked: static");
    }
}
