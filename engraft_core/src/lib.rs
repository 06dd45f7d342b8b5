// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engraft Core: the tool runtime.
//!
//! An Engraft program is a tree of nodes. Each node is a [`Program`] tagged
//! with the name of the [`Tool`] that runs it, and a tool's run may run
//! nested programs in turn. Runs are refunctions (see [`engraft_refunc`]), so
//! re-running the tree after an edit only recomputes the nodes whose inputs
//! changed, and everything else comes back with the same identity.
//!
//! - **Variables** ([`VarId`], [`Var`], [`VarBindings`]): named outputs in
//!   scope for a node.
//! - **Programs and tools** ([`Program`], [`ToolProgram`], [`Tool`],
//!   [`AnyTool`]): the node data and the behavior registered for it.
//! - **Dispatch** ([`Dispatcher`]): tag to tool, with a not-found fallback,
//!   JSON loading, and cached reference sets.
//! - **References** ([`ReferenceCollection`], [`narrow`],
//!   [`hook_relevant_var_bindings`]): what each node reads, so edits to
//!   unrelated bindings do not reach it.
//! - **Execution** ([`hook_run_tool`], [`run_tool`]): the protocol every
//!   node goes through, including the failure boundary.
//! - **Views** ([`ToolView`], [`ViewOutput`]): a host-neutral description of
//!   what each node shows.
//! - **Hosting** ([`mount::ToolMount`]): a tree mounted with its own memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use engraft_core::simple_tool::{SimpleProgram, SimpleToolSpec, Fields};
//! use engraft_core::testing::{KnownOutputProgram, testing_context_with};
//! use engraft_core::{Program, ToolOutput, VarBindings, ToolProps, run_tool};
//! use engraft_promise::Rejection;
//! use engraft_refunc::Memory;
//!
//! let adder = SimpleToolSpec::new("adder", |_, outputs| {
//!     let x = outputs["x"].as_i64().ok_or_else(|| Rejection::msg("x must be a number"))?;
//!     let y = outputs["y"].as_i64().ok_or_else(|| Rejection::msg("y must be a number"))?;
//!     Ok((x + y).into())
//! })
//! .sub_tool("x")
//! .sub_tool("y")
//! .build();
//! let context = testing_context_with([adder]);
//!
//! let program = Program::new(SimpleProgram::new(
//!     "adder",
//!     Fields::new(),
//!     [
//!         ("x".to_owned(), Program::new(KnownOutputProgram::value(1))),
//!         ("y".to_owned(), Program::new(KnownOutputProgram::value(2))),
//!     ],
//! ));
//!
//! let run = run_tool();
//! let mut memory = Memory::new();
//! let result = run.call(&mut memory, ToolProps::new(program, VarBindings::new(), context));
//! assert_eq!(result.output.state().value(), Some(&ToolOutput::new(3)));
//! ```
//!
//! ## Logging
//!
//! This crate logs through [`tracing`]. Dispatch misses and tool registration
//! are logged at `debug` and `warn`, panics caught at the tool boundary at
//! `error`. With [`EngraftContext::debug_mode`] on, every node run is wrapped
//! in a `run_tool` span.
//!
//! ## Features
//!
//! This crate currently has no optional features. All functionality is always
//! available.

mod context;
mod dispatcher;
mod not_found;
mod program;
mod references;
mod run_tool;
mod tool;
mod var;
mod view;

pub mod mount;
pub mod simple_tool;
pub mod testing;

pub use context::{ContextBuilder, ContextConfig, ContextError, DEBUG_ENV_VAR, EngraftContext};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use not_found::{NOT_FOUND_TOOL, NotFoundProgram, NotFoundTool};
pub use program::{Program, ProgramError, TOOL_NAME_KEY, ToolProgram, tagged, tool_name_of};
pub use references::{
    RefSet, ReferenceCollection, hook_relevant_var_bindings, narrow, promise_references_from_code,
    references_from_code,
};
pub use run_tool::{
    RunError, ToolResultWithScope, hook_run_tool, hook_run_tool_with_new_var_bindings, run_tool,
    run_tool_with_new_var_bindings,
};
pub use tool::{AnyTool, Tool, ToolOutput, ToolProps, ToolResult};
pub use var::{Var, VarBinding, VarBindings, VarId};
pub use view::{RenderProps, ToolView, ViewOutput, ViewRender, render_output};
