// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The fallback tool for tags nothing is registered under.

use std::fmt;

use engraft_promise::EngraftPromise;
use engraft_refunc::{Memory, Refunc, memoize_props};
use serde_json::{Map, Value};

use crate::context::{ContextError, EngraftContext};
use crate::dispatcher::Dispatcher;
use crate::program::{Program, ProgramError, ToolProgram, tagged, tool_name_of};
use crate::references::ReferenceCollection;
use crate::run_tool::RunError;
use crate::tool::{AnyTool, ToolProps, ToolResult};
use crate::view::ToolView;

/// Name of the not-found tool.
pub const NOT_FOUND_TOOL: &str = "not-found";

/// A program whose tool is not registered, kept as its JSON.
#[derive(Debug)]
pub struct NotFoundProgram {
    tool_name: String,
    json: Value,
}

impl NotFoundProgram {
    /// A placeholder program for `tool_name`.
    pub fn new(tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        let json = tagged(&tool_name, Map::new());
        Self { tool_name, json }
    }

    /// Keeps `json`, loaded for the unregistered `tool_name`.
    pub fn from_json(tool_name: impl Into<String>, json: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            json,
        }
    }
}

impl ToolProgram for NotFoundProgram {
    fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn to_json(&self) -> Value {
        self.json.clone()
    }
}

/// Runs any program whose tag is not registered.
///
/// The output is rejected with [`RunError::ToolNotFound`] and the view shows
/// a warning, so a missing tool degrades one node instead of the tree.
pub struct NotFoundTool {
    run: Refunc<ToolProps, ToolResult>,
}

impl NotFoundTool {
    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        let run = memoize_props(Refunc::from_fn(|props: ToolProps| {
            let name = props.program.tool_name();
            tracing::debug!(tool = name, "no tool registered");
            ToolResult::new(
                EngraftPromise::reject(RunError::ToolNotFound(name.to_owned())),
                ToolView::warning(format!("Tool not found: {name}")),
            )
        }));
        Self { run }
    }
}

impl Default for NotFoundTool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotFoundTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotFoundTool").finish_non_exhaustive()
    }
}

impl AnyTool for NotFoundTool {
    fn name(&self) -> &str {
        NOT_FOUND_TOOL
    }

    fn make_program(
        &self,
        _context: &EngraftContext,
        _default_code: Option<&str>,
    ) -> Result<Program, ContextError> {
        Ok(Program::new(NotFoundProgram::new(NOT_FOUND_TOOL)))
    }

    fn collect_references(&self, _program: &Program) -> ReferenceCollection {
        ReferenceCollection::none()
    }

    fn load_program(&self, json: &Value, _dispatcher: &Dispatcher) -> Result<Program, ProgramError> {
        let name = tool_name_of(json)?;
        Ok(Program::new(NotFoundProgram::from_json(name, json.clone())))
    }

    fn run(&self, memory: &mut Memory, props: ToolProps) -> ToolResult {
        self.run.call(memory, props)
    }
}
