// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Running a program node: dispatch, narrowing, and the failure boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use engraft_promise::panic_message;
use engraft_refunc::{Hooks, Memory, RefEq, Refunc, ShallowEq};
use thiserror::Error;

use crate::references::hook_relevant_var_bindings;
use crate::tool::{AnyTool, ToolProps, ToolResult};
use crate::var::{VarBindings, VarId};

/// Why a tool run produced no output.
#[derive(Debug, Error)]
pub enum RunError {
    /// No tool is registered for the program's tag.
    #[error("tool `{0}` is not registered")]
    ToolNotFound(String),
    /// The tool registered for the tag does not understand the program.
    #[error("tool `{tool}` cannot run a program of `{program}`")]
    ProgramMismatch {
        /// The tool that was dispatched to.
        tool: String,
        /// The program's tag.
        program: String,
    },
    /// The program reads a variable that is not bound.
    #[error("variable `{0}` is not bound")]
    UnboundVar(VarId),
    /// The tool panicked.
    #[error("tool `{tool}` panicked: {message}")]
    Panicked {
        /// The tool that panicked.
        tool: String,
        /// The panic message.
        message: String,
    },
}

/// Per-branch state: the tool's own memory, and the result of a run that
/// panicked.
struct ToolSlot {
    memory: Memory,
    tool: Option<Rc<dyn AnyTool>>,
    failure: Option<(ToolProps, ToolResult)>,
}

impl ToolSlot {
    fn new() -> Self {
        Self {
            memory: Memory::new(),
            tool: None,
            failure: None,
        }
    }

    fn run(&mut self, tool: &Rc<dyn AnyTool>, props: ToolProps) -> ToolResult {
        if !self.tool.as_ref().is_some_and(|last| Rc::ptr_eq(last, tool)) {
            // A different tool now answers to this tag.
            self.memory.reset();
            self.failure = None;
            self.tool = Some(Rc::clone(tool));
        }

        if let Some((last_props, result)) = &self.failure {
            if last_props.shallow_eq(&props) {
                return result.clone();
            }
            self.failure = None;
        }

        let memory = &mut self.memory;
        match catch_unwind(AssertUnwindSafe(|| tool.run(memory, props.clone()))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!(tool = tool.name(), %message, "tool panicked; rejecting its output");
                self.memory.reset();
                let result = ToolResult::failed(RunError::Panicked {
                    tool: tool.name().to_owned(),
                    message,
                });
                self.failure = Some((props, result.clone()));
                result
            }
        }
    }
}

/// Runs a program node as a hook.
///
/// 1. Resolves the program's tag through the context's dispatcher.
/// 2. Narrows the bindings to the program's references.
/// 3. Forks into a branch keyed by the tag, so replacing a node with a
///    different kind of tool starts from fresh state.
/// 4. Runs the tool with a memory persisted in that branch.
///
/// A panic inside the tool is caught here. The branch's memory is reset and
/// the node yields a rejected output with an error view; the failure is
/// reused until the props change.
pub fn hook_run_tool(hooks: &mut Hooks<'_>, props: &ToolProps) -> ToolResult {
    let tool_name = props.program.tool_name().to_owned();
    let tool = props.context.dispatcher().look_up_by_program(&props.program);

    let var_bindings = hook_relevant_var_bindings(hooks, props);
    let props = ToolProps::new(props.program.clone(), var_bindings, props.context.clone());

    let _span = props
        .context
        .debug_mode()
        .then(|| tracing::debug_span!("run_tool", tool = %tool_name).entered());

    hooks.fork(|fork| {
        fork.branch(&tool_name, |hooks| {
            let slot = hooks.cell(ToolSlot::new);
            let mut slot = slot.borrow_mut();
            slot.run(&tool, props)
        })
    })
}

/// [`hook_run_tool`] as a refunction, for callers that own a [`Memory`].
pub fn run_tool() -> Refunc<ToolProps, ToolResult> {
    Refunc::hooks(|hooks, props: ToolProps| hook_run_tool(hooks, &props))
}

/// A result together with the bindings its node added to the scope.
#[derive(Clone, Debug)]
pub struct ToolResultWithScope {
    /// The node's result.
    pub result: ToolResult,
    /// Bindings the node introduced, for views rendered inside it.
    pub new_scope_var_bindings: VarBindings,
}

impl RefEq for ToolResultWithScope {
    fn ref_eq(&self, other: &Self) -> bool {
        self.result.ref_eq(&other.result)
            && self.new_scope_var_bindings.ref_eq(&other.new_scope_var_bindings)
    }
}

/// Runs a program node with extra bindings layered over the props' own.
///
/// The merged bindings keep their identity while both inputs do.
pub fn hook_run_tool_with_new_var_bindings(
    hooks: &mut Hooks<'_>,
    props: &ToolProps,
    new_var_bindings: &VarBindings,
) -> ToolResultWithScope {
    let all = hooks.memo(
        (props.var_bindings.clone(), new_var_bindings.clone()),
        |_| props.var_bindings.with(new_var_bindings),
    );
    let result = hook_run_tool(
        hooks,
        &ToolProps::new(props.program.clone(), all, props.context.clone()),
    );
    ToolResultWithScope {
        result,
        new_scope_var_bindings: new_var_bindings.clone(),
    }
}

/// [`hook_run_tool_with_new_var_bindings`] as a refunction.
pub fn run_tool_with_new_var_bindings() -> Refunc<(ToolProps, VarBindings), ToolResultWithScope> {
    Refunc::hooks(|hooks, (props, new_var_bindings): (ToolProps, VarBindings)| {
        hook_run_tool_with_new_var_bindings(hooks, &props, &new_var_bindings)
    })
}
