// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ambient context threaded through every tool run.

use std::fmt;
use std::rc::Rc;

use engraft_refunc::RefEq;
use serde::Deserialize;
use thiserror::Error;

use crate::dispatcher::Dispatcher;
use crate::program::Program;

/// Environment variable switching debug mode on.
pub const DEBUG_ENV_VAR: &str = "ENGRAFT_DEBUG";

type SlotWithCode = dyn Fn(Option<&str>) -> Program;
type SlotWithProgram = dyn Fn(Program, Option<&str>) -> Program;

/// An error raised by the context on behalf of a tool.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The context was built without the named capability.
    #[error("context does not support `{0}`")]
    Unsupported(&'static str),
}

/// Settings read from the environment or a config file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextConfig {
    /// Trace each tool run in its own span.
    pub debug_mode: bool,
}

impl ContextConfig {
    /// Reads the configuration from [`DEBUG_ENV_VAR`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(DEBUG_ENV_VAR).ok().as_deref())
    }

    /// Interprets a value of [`DEBUG_ENV_VAR`]; `1` and `true` enable debug
    /// mode.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        let debug_mode = value.is_some_and(|value| {
            let value = value.trim();
            value == "1" || value.eq_ignore_ascii_case("true")
        });
        Self { debug_mode }
    }
}

struct Inner {
    dispatcher: Dispatcher,
    make_slot_with_code: Option<Rc<SlotWithCode>>,
    make_slot_with_program: Option<Rc<SlotWithProgram>>,
    debug_mode: bool,
}

/// The dispatcher, slot factories, and debug flag available to tools.
///
/// Contexts are shared handles and compare by identity.
#[derive(Clone)]
pub struct EngraftContext(Rc<Inner>);

impl EngraftContext {
    /// A context with only a dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::builder(dispatcher).build()
    }

    /// Starts building a context around `dispatcher`.
    pub fn builder(dispatcher: Dispatcher) -> ContextBuilder {
        ContextBuilder {
            inner: Inner {
                dispatcher,
                make_slot_with_code: None,
                make_slot_with_program: None,
                debug_mode: false,
            },
        }
    }

    /// The dispatch table.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.0.dispatcher
    }

    /// Whether tool runs are traced.
    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.0.debug_mode
    }

    /// Creates a placeholder program for a nested slot, seeded with code.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Unsupported`] if no factory was configured.
    pub fn make_slot_with_code(&self, code: Option<&str>) -> Result<Program, ContextError> {
        let make = self
            .0
            .make_slot_with_code
            .as_ref()
            .ok_or(ContextError::Unsupported("make_slot_with_code"))?;
        Ok(make(code))
    }

    /// Creates a placeholder program for a nested slot, wrapping `program`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Unsupported`] if no factory was configured.
    pub fn make_slot_with_program(
        &self,
        program: Program,
        code: Option<&str>,
    ) -> Result<Program, ContextError> {
        let make = self
            .0
            .make_slot_with_program
            .as_ref()
            .ok_or(ContextError::Unsupported("make_slot_with_program"))?;
        Ok(make(program, code))
    }

    /// Returns `true` if both handles share one context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl RefEq for EngraftContext {
    fn ref_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EngraftContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngraftContext")
            .field("dispatcher", &self.0.dispatcher)
            .field("make_slot_with_code", &self.0.make_slot_with_code.is_some())
            .field(
                "make_slot_with_program",
                &self.0.make_slot_with_program.is_some(),
            )
            .field("debug_mode", &self.0.debug_mode)
            .finish()
    }
}

/// Builder for [`EngraftContext`].
pub struct ContextBuilder {
    inner: Inner,
}

impl ContextBuilder {
    /// Sets the factory for code slots.
    #[must_use]
    pub fn slot_with_code(mut self, make: impl Fn(Option<&str>) -> Program + 'static) -> Self {
        self.inner.make_slot_with_code = Some(Rc::new(make));
        self
    }

    /// Sets the factory for slots wrapping an existing program.
    #[must_use]
    pub fn slot_with_program(
        mut self,
        make: impl Fn(Program, Option<&str>) -> Program + 'static,
    ) -> Self {
        self.inner.make_slot_with_program = Some(Rc::new(make));
        self
    }

    /// Sets debug mode.
    #[must_use]
    pub fn debug_mode(mut self, debug_mode: bool) -> Self {
        self.inner.debug_mode = debug_mode;
        self
    }

    /// Applies loaded settings.
    #[must_use]
    pub fn config(self, config: &ContextConfig) -> Self {
        self.debug_mode(config.debug_mode)
    }

    /// Finishes the context.
    #[must_use]
    pub fn build(self) -> EngraftContext {
        EngraftContext(Rc::new(self.inner))
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("debug_mode", &self.inner.debug_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ToolProgram;

    #[derive(Debug)]
    struct Slot(Option<String>);

    impl ToolProgram for Slot {
        fn tool_name(&self) -> &str {
            "slot"
        }
    }

    #[test]
    fn env_values() {
        assert!(ContextConfig::from_env_value(Some("1")).debug_mode);
        assert!(ContextConfig::from_env_value(Some(" TRUE ")).debug_mode);
        assert!(!ContextConfig::from_env_value(Some("0")).debug_mode);
        assert!(!ContextConfig::from_env_value(None).debug_mode);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ContextConfig = serde_json::from_str(r#"{"debugMode": true}"#).unwrap();
        assert!(config.debug_mode);
        let config: ContextConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ContextConfig::default());
    }

    #[test]
    fn missing_factories_are_reported() {
        let context = EngraftContext::new(Dispatcher::new());
        let err = context.make_slot_with_code(None).unwrap_err();
        assert_eq!(err.to_string(), "context does not support `make_slot_with_code`");
        assert!(context.make_slot_with_program(Program::new(Slot(None)), None).is_err());
    }

    #[test]
    fn factories_are_called() {
        let context = EngraftContext::builder(Dispatcher::new())
            .slot_with_code(|code| Program::new(Slot(code.map(str::to_owned))))
            .config(&ContextConfig { debug_mode: true })
            .build();
        assert!(context.debug_mode());
        let slot = context.make_slot_with_code(Some("1 + 1")).unwrap();
        assert_eq!(slot.downcast::<Slot>().unwrap().0.as_deref(), Some("1 + 1"));
        assert!(context.ref_eq(&context.clone()));
    }
}
