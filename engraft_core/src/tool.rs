// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tool interface and the values flowing through it.
//!
//! A [`Tool`] is written against its own program type. The dispatcher
//! stores tools behind the object-safe [`AnyTool`], which every [`Tool`]
//! implements through a blanket impl that downcasts the erased [`Program`].

use std::fmt;
use std::rc::Rc;

use engraft_promise::{EngraftPromise, Rejection};
use engraft_refunc::{Memory, RefEq, ShallowEq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ContextError, EngraftContext};
use crate::dispatcher::Dispatcher;
use crate::program::{Program, ProgramError, ToolProgram};
use crate::references::ReferenceCollection;
use crate::run_tool::RunError;
use crate::var::VarBindings;
use crate::view::ToolView;

/// The value a tool produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The produced value.
    pub value: Value,
}

impl ToolOutput {
    /// Wraps a value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// What running a tool yields: an output channel and a view.
#[derive(Clone, Debug)]
pub struct ToolResult {
    /// The output, possibly still pending.
    pub output: EngraftPromise<ToolOutput>,
    /// How the tool presents itself.
    pub view: ToolView,
}

impl ToolResult {
    /// Pairs an output with a view.
    pub fn new(output: EngraftPromise<ToolOutput>, view: ToolView) -> Self {
        Self { output, view }
    }

    /// A result whose output is rejected with `reason` and whose view shows
    /// the error.
    pub fn failed(reason: impl Into<Rejection>) -> Self {
        let reason = reason.into();
        let view = ToolView::error(reason.to_string());
        Self::new(EngraftPromise::reject(reason), view)
    }
}

/// Same output promise and same view.
impl RefEq for ToolResult {
    fn ref_eq(&self, other: &Self) -> bool {
        self.output.ref_eq(&other.output) && self.view.ref_eq(&other.view)
    }
}

/// The arguments of a tool run.
///
/// `P` is the program handle: the erased [`Program`] at dispatch boundaries,
/// and `Rc<T::Program>` inside [`Tool::run`].
#[derive(Clone)]
pub struct ToolProps<P = Program> {
    /// The program to run.
    pub program: P,
    /// Bindings narrowed to what the program references.
    pub var_bindings: VarBindings,
    /// The ambient context.
    pub context: EngraftContext,
}

impl<P> ToolProps<P> {
    /// Bundles a run's arguments.
    pub fn new(program: P, var_bindings: VarBindings, context: EngraftContext) -> Self {
        Self {
            program,
            var_bindings,
            context,
        }
    }

    /// Replaces the program handle, keeping bindings and context.
    pub fn with_program<Q>(&self, program: Q) -> ToolProps<Q> {
        ToolProps {
            program,
            var_bindings: self.var_bindings.clone(),
            context: self.context.clone(),
        }
    }
}

/// Field by field, each by identity.
impl<P: RefEq> ShallowEq for ToolProps<P> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.program.ref_eq(&other.program)
            && self.var_bindings.ref_eq(&other.var_bindings)
            && self.context.ref_eq(&other.context)
    }
}

impl<P: fmt::Debug> fmt::Debug for ToolProps<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolProps")
            .field("program", &self.program)
            .field("var_bindings", &self.var_bindings)
            .finish_non_exhaustive()
    }
}

/// A tool: the implementation behind one program tag.
///
/// `run` is a refunction. It receives the same [`Memory`] on every run of the
/// same program node, and is expected to memoize on its props (see
/// [`memoize_props`](engraft_refunc::memoize_props)) so that unchanged props
/// return the previous result by identity.
pub trait Tool: 'static {
    /// The program type this tool runs.
    type Program: ToolProgram;

    /// The tag programs of this tool carry.
    fn name(&self) -> &str;

    /// Builds a fresh program, optionally seeded with code.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context cannot supply a slot the
    /// program needs.
    fn make_program(
        &self,
        context: &EngraftContext,
        default_code: Option<&str>,
    ) -> Result<Self::Program, ContextError>;

    /// Declares what the program reads: variables and nested programs.
    fn collect_references(&self, program: &Self::Program) -> ReferenceCollection;

    /// Rebuilds a program from its JSON form, loading nested programs
    /// through `dispatcher`.
    ///
    /// # Errors
    ///
    /// The default refuses with [`ProgramError::NotSerializable`].
    fn load_program(
        &self,
        json: &Value,
        dispatcher: &Dispatcher,
    ) -> Result<Self::Program, ProgramError> {
        let _ = (json, dispatcher);
        Err(ProgramError::NotSerializable(self.name().to_owned()))
    }

    /// Runs the program.
    fn run(&self, memory: &mut Memory, props: ToolProps<Rc<Self::Program>>) -> ToolResult;
}

/// An object-safe view of a [`Tool`], over erased programs.
pub trait AnyTool {
    /// The tag this tool handles.
    fn name(&self) -> &str;

    /// Builds a fresh program.
    ///
    /// # Errors
    ///
    /// See [`Tool::make_program`].
    fn make_program(
        &self,
        context: &EngraftContext,
        default_code: Option<&str>,
    ) -> Result<Program, ContextError>;

    /// Declares what the program reads.
    fn collect_references(&self, program: &Program) -> ReferenceCollection;

    /// Rebuilds a program from its JSON form.
    ///
    /// # Errors
    ///
    /// See [`Tool::load_program`].
    fn load_program(&self, json: &Value, dispatcher: &Dispatcher)
    -> Result<Program, ProgramError>;

    /// Runs the program.
    fn run(&self, memory: &mut Memory, props: ToolProps) -> ToolResult;
}

impl<T: Tool> AnyTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn make_program(
        &self,
        context: &EngraftContext,
        default_code: Option<&str>,
    ) -> Result<Program, ContextError> {
        Tool::make_program(self, context, default_code).map(Program::new)
    }

    fn collect_references(&self, program: &Program) -> ReferenceCollection {
        match program.downcast::<T::Program>() {
            Some(program) => Tool::collect_references(self, &program),
            None => ReferenceCollection::none(),
        }
    }

    fn load_program(
        &self,
        json: &Value,
        dispatcher: &Dispatcher,
    ) -> Result<Program, ProgramError> {
        Tool::load_program(self, json, dispatcher).map(Program::new)
    }

    fn run(&self, memory: &mut Memory, props: ToolProps) -> ToolResult {
        match props.program.downcast::<T::Program>() {
            Some(program) => Tool::run(self, memory, props.with_program(program)),
            None => ToolResult::failed(RunError::ProgramMismatch {
                tool: Tool::name(self).to_owned(),
                program: props.program.tool_name().to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::testing_context;
    use engraft_refunc::{Refunc, memoize_props};
    use serde_json::json;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Echo {
        text: String,
    }

    impl ToolProgram for Echo {
        fn tool_name(&self) -> &str {
            "echo"
        }
    }

    struct EchoTool {
        runs: Rc<Cell<u32>>,
        run: Refunc<ToolProps<Rc<Echo>>, ToolResult>,
    }

    impl EchoTool {
        fn new() -> Self {
            let runs = Rc::new(Cell::new(0));
            let counter = Rc::clone(&runs);
            let run = memoize_props(Refunc::from_fn(move |props: ToolProps<Rc<Echo>>| {
                counter.set(counter.get() + 1);
                let output = EngraftPromise::resolve(ToolOutput::new(props.program.text.as_str()));
                ToolResult::new(output.clone(), ToolView::output(output))
            }));
            Self { runs, run }
        }
    }

    impl Tool for EchoTool {
        type Program = Echo;

        fn name(&self) -> &str {
            "echo"
        }

        fn make_program(
            &self,
            _context: &EngraftContext,
            default_code: Option<&str>,
        ) -> Result<Echo, ContextError> {
            Ok(Echo {
                text: default_code.unwrap_or_default().to_owned(),
            })
        }

        fn collect_references(&self, _program: &Echo) -> ReferenceCollection {
            ReferenceCollection::none()
        }

        fn run(&self, memory: &mut Memory, props: ToolProps<Rc<Echo>>) -> ToolResult {
            self.run.call(memory, props)
        }
    }

    #[test]
    fn erased_run_keeps_memoization() {
        let tool = EchoTool::new();
        let context = testing_context();
        let program = AnyTool::make_program(&tool, &context, Some("hi")).unwrap();
        let props = ToolProps::new(program, VarBindings::new(), context);

        let mut memory = Memory::new();
        let first = AnyTool::run(&tool, &mut memory, props.clone());
        let second = AnyTool::run(&tool, &mut memory, props);
        assert!(first.ref_eq(&second));
        assert_eq!(tool.runs.get(), 1);
        assert_eq!(first.output.state().value(), Some(&ToolOutput::new(json!("hi"))));
    }

    #[test]
    fn mismatched_program_fails_softly() {
        #[derive(Debug)]
        struct Stranger;
        impl ToolProgram for Stranger {
            fn tool_name(&self) -> &str {
                "stranger"
            }
        }

        let tool = EchoTool::new();
        let props = ToolProps::new(Program::new(Stranger), VarBindings::new(), testing_context());
        let result = AnyTool::run(&tool, &mut Memory::new(), props);
        assert!(result.output.state().reason().is_some());
        assert_eq!(tool.runs.get(), 0);
        assert!(matches!(
            AnyTool::collect_references(&tool, &Program::new(Stranger)),
            ReferenceCollection::List(ref list) if list.is_empty()
        ));
    }

    #[test]
    fn default_loading_refuses() {
        let tool = EchoTool::new();
        let err = Tool::load_program(&tool, &json!({"toolName": "echo"}), &Dispatcher::new())
            .unwrap_err();
        assert!(matches!(err, ProgramError::NotSerializable(name) if name == "echo"));
    }
}
