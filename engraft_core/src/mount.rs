// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Embedding a program tree in a host.

use std::fmt;

use engraft_promise::{EngraftPromise, PromiseState};
use engraft_refunc::{Memory, RefEq, Refunc};

use crate::context::EngraftContext;
use crate::program::Program;
use crate::run_tool::{ToolResultWithScope, run_tool_with_new_var_bindings};
use crate::tool::{ToolOutput, ToolProps};
use crate::var::VarBindings;
use crate::view::{RenderProps, ViewOutput};

type OutputCallback = Box<dyn FnMut(&EngraftPromise<ToolOutput>)>;

/// A mount point for one program tree.
///
/// A host keeps one mount per embedded tree, updates its inputs as they
/// change, and calls [`run`](Self::run) after each change. The mount owns the
/// tree's [`Memory`], so untouched nodes are not recomputed.
///
/// ```rust
/// use engraft_core::mount::ToolMount;
/// use engraft_core::testing::{KnownOutputProgram, testing_context};
/// use engraft_core::{Program, ToolOutput};
///
/// let mut mount = ToolMount::new(Program::new(KnownOutputProgram::value(3)), testing_context());
/// let first = mount.run().result.output.clone();
/// assert_eq!(first.state().value(), Some(&ToolOutput::new(3)));
/// let again = mount.run().result.output.clone();
/// assert!(first.ptr_eq(&again));
/// ```
pub struct ToolMount {
    memory: Memory,
    run: Refunc<(ToolProps, VarBindings), ToolResultWithScope>,
    program: Program,
    var_bindings: VarBindings,
    context: EngraftContext,
    no_bindings: VarBindings,
    last: Option<ToolResultWithScope>,
    on_output: Option<OutputCallback>,
}

impl ToolMount {
    /// Mounts `program` with no bindings.
    pub fn new(program: Program, context: EngraftContext) -> Self {
        Self {
            memory: Memory::new(),
            run: run_tool_with_new_var_bindings(),
            program,
            var_bindings: VarBindings::new(),
            context,
            no_bindings: VarBindings::new(),
            last: None,
            on_output: None,
        }
    }

    /// Calls `f` from [`run`](Self::run) whenever the output promise is a
    /// different one than last time.
    #[must_use]
    pub fn on_output(mut self, f: impl FnMut(&EngraftPromise<ToolOutput>) + 'static) -> Self {
        self.on_output = Some(Box::new(f));
        self
    }

    /// The mounted program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Replaces the mounted program.
    pub fn set_program(&mut self, program: Program) {
        self.program = program;
    }

    /// Replaces the bindings the tree runs with.
    pub fn set_var_bindings(&mut self, var_bindings: VarBindings) {
        self.var_bindings = var_bindings;
    }

    /// Replaces the context.
    ///
    /// Nodes are recomputed on the next run, since every node's props
    /// include the context.
    pub fn set_context(&mut self, context: EngraftContext) {
        self.context = context;
    }

    /// Runs the tree against the current inputs.
    pub fn run(&mut self) -> &ToolResultWithScope {
        let props = ToolProps::new(
            self.program.clone(),
            self.no_bindings.clone(),
            self.context.clone(),
        );
        let result = self
            .run
            .call(&mut self.memory, (props, self.var_bindings.clone()));

        let changed = self
            .last
            .as_ref()
            .is_none_or(|last| !last.result.output.ref_eq(&result.result.output));
        if changed {
            tracing::trace!(tool = self.program.tool_name(), "mounted output changed");
            if let Some(on_output) = &mut self.on_output {
                on_output(&result.result.output);
            }
        }
        self.last.insert(result)
    }

    /// The result of the last [`run`](Self::run).
    #[must_use]
    pub fn last_result(&self) -> Option<&ToolResultWithScope> {
        self.last.as_ref()
    }

    /// The state of the last output.
    #[must_use]
    pub fn output_state(&self) -> Option<PromiseState<ToolOutput>> {
        self.last.as_ref().map(|last| last.result.output.state())
    }

    /// Renders the last view, with the mounted bindings in scope.
    ///
    /// Renders [`ViewOutput::Empty`] before the first run.
    #[must_use]
    pub fn render(&self, auto_focus: bool, expand: bool) -> ViewOutput {
        let Some(last) = &self.last else {
            return ViewOutput::Empty;
        };
        last.result.view.render(&RenderProps {
            auto_focus,
            expand,
            scope_var_bindings: last.new_scope_var_bindings.clone(),
        })
    }
}

impl fmt::Debug for ToolMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolMount")
            .field("program", &self.program)
            .field("var_bindings", &self.var_bindings)
            .field("context", &self.context)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KnownOutputProgram, RefsFuncProgram, testing_context};
    use crate::var::{Var, VarBinding};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn bindings(value: i64) -> VarBindings {
        let binding = VarBinding::new(
            Var::with_id("IDinput000001", "input"),
            EngraftPromise::resolve(ToolOutput::new(value)),
        );
        [binding].into_iter().collect()
    }

    #[test]
    fn reports_only_new_outputs() {
        let reports = Rc::new(Cell::new(0));
        let sink = Rc::clone(&reports);
        let program = Program::new(RefsFuncProgram::new(["IDinput000001"], |outputs| {
            Ok(json!(outputs[0].value.as_i64().unwrap_or_default() * 2))
        }));
        let mut mount = ToolMount::new(program, testing_context())
            .on_output(move |_| sink.set(sink.get() + 1));
        assert_eq!(mount.render(false, false), ViewOutput::Empty);

        mount.set_var_bindings(bindings(4));
        let doubled = mount.run().result.output.state();
        assert_eq!(doubled.value(), Some(&ToolOutput::new(8)));
        mount.run();
        assert_eq!(reports.get(), 1);

        mount.set_var_bindings(bindings(5));
        mount.run();
        assert_eq!(reports.get(), 2);
        assert_eq!(
            mount.output_state().and_then(|state| state.value().cloned()),
            Some(ToolOutput::new(10))
        );
    }

    #[test]
    fn swapping_programs_reruns() {
        let mut mount = ToolMount::new(Program::new(KnownOutputProgram::value(1)), testing_context());
        mount.run();
        mount.set_program(Program::new(KnownOutputProgram::value(2)));
        mount.run();
        assert_eq!(mount.render(false, false), ViewOutput::Value(json!(2)));
        assert_eq!(mount.program().tool_name(), "testing-known-output");
    }
}
