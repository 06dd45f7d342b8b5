// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tools and a context for exercising the runtime in tests.
//!
//! The programs here hold closures and promises, so they do not serialize.

use std::fmt;
use std::rc::Rc;

use engraft_promise::{EngraftPromise, Rejection};
use engraft_refunc::{Hooks, Memory, Refunc, memoize_props};
use serde_json::Value;

use crate::context::{ContextError, EngraftContext};
use crate::dispatcher::{Dispatcher, DispatcherBuilder};
use crate::program::{Program, ToolProgram};
use crate::references::ReferenceCollection;
use crate::run_tool::{RunError, hook_run_tool};
use crate::simple_tool::SimpleTool;
use crate::tool::{Tool, ToolOutput, ToolProps, ToolResult};
use crate::var::VarId;
use crate::view::{RenderProps, ToolView, ViewOutput, render_output};

type Callback = Rc<dyn Fn()>;

/// Registers the testing tools.
pub fn testing_dispatcher() -> DispatcherBuilder {
    Dispatcher::builder()
        .register(KnownOutputTool::new())
        .register(RefsFuncTool::new())
        .register(CountRunsTool::new())
}

/// A context with the testing tools and no slot factories.
pub fn testing_context() -> EngraftContext {
    EngraftContext::new(testing_dispatcher().build())
}

/// A context with the testing tools plus `tools`.
pub fn testing_context_with(tools: impl IntoIterator<Item = SimpleTool>) -> EngraftContext {
    let builder = tools
        .into_iter()
        .fold(testing_dispatcher(), |builder, tool| builder.register(tool));
    EngraftContext::new(builder.build())
}

/// Program of [`KnownOutputTool`]: a fixed output.
pub struct KnownOutputProgram {
    /// The output to produce.
    pub output: EngraftPromise<ToolOutput>,
    on_run: Option<Callback>,
    on_view_render: Option<Callback>,
}

impl KnownOutputProgram {
    /// A program producing `output`.
    pub fn new(output: EngraftPromise<ToolOutput>) -> Self {
        Self {
            output,
            on_run: None,
            on_view_render: None,
        }
    }

    /// A program producing the fulfilled `value`.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(EngraftPromise::resolve(ToolOutput::new(value)))
    }

    /// Calls `f` whenever the tool actually runs.
    #[must_use]
    pub fn on_run(mut self, f: impl Fn() + 'static) -> Self {
        self.on_run = Some(Rc::new(f));
        self
    }

    /// Calls `f` whenever the view renders.
    #[must_use]
    pub fn on_view_render(mut self, f: impl Fn() + 'static) -> Self {
        self.on_view_render = Some(Rc::new(f));
        self
    }
}

impl ToolProgram for KnownOutputProgram {
    fn tool_name(&self) -> &str {
        KnownOutputTool::NAME
    }
}

impl fmt::Debug for KnownOutputProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownOutputProgram")
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Produces its program's output as is.
pub struct KnownOutputTool {
    run: Refunc<ToolProps<Rc<KnownOutputProgram>>, ToolResult>,
}

impl KnownOutputTool {
    /// Tag of [`KnownOutputProgram`].
    pub const NAME: &str = "testing-known-output";

    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        let run = memoize_props(Refunc::hooks(
            |hooks, props: ToolProps<Rc<KnownOutputProgram>>| {
                let program = &props.program;
                if let Some(on_run) = &program.on_run {
                    on_run();
                }
                let output = program.output.clone();
                let on_view_render = program.on_view_render.clone();
                let view = hooks.memo((output.clone(), on_view_render.clone()), |_| {
                    ToolView::new(move |_: &RenderProps| {
                        if let Some(on_view_render) = &on_view_render {
                            on_view_render();
                        }
                        render_output(&output)
                    })
                });
                ToolResult::new(program.output.clone(), view)
            },
        ));
        Self { run }
    }
}

impl Default for KnownOutputTool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KnownOutputTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownOutputTool").finish_non_exhaustive()
    }
}

impl Tool for KnownOutputTool {
    type Program = KnownOutputProgram;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn make_program(
        &self,
        _context: &EngraftContext,
        _default_code: Option<&str>,
    ) -> Result<KnownOutputProgram, ContextError> {
        Ok(KnownOutputProgram::new(EngraftPromise::unresolved()))
    }

    fn collect_references(&self, _program: &KnownOutputProgram) -> ReferenceCollection {
        ReferenceCollection::none()
    }

    fn run(&self, memory: &mut Memory, props: ToolProps<Rc<KnownOutputProgram>>) -> ToolResult {
        self.run.call(memory, props)
    }
}

type RefsFunc = Rc<dyn Fn(&[ToolOutput]) -> Result<Value, Rejection>>;

/// Program of [`RefsFuncTool`]: a function over the outputs of some
/// variables.
pub struct RefsFuncProgram {
    /// The variables read, in the order `func` receives their outputs.
    pub refs: Vec<VarId>,
    func: Option<RefsFunc>,
    on_run: Option<Rc<dyn Fn(&ToolProps<Rc<Self>>)>>,
}

impl RefsFuncProgram {
    /// A program computing `func` over the outputs of `refs`.
    pub fn new<I, F>(refs: I, func: F) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VarId>,
        F: Fn(&[ToolOutput]) -> Result<Value, Rejection> + 'static,
    {
        Self {
            refs: refs.into_iter().map(Into::into).collect(),
            func: Some(Rc::new(func)),
            on_run: None,
        }
    }

    /// A program reading `refs` whose output never settles.
    pub fn pending<I>(refs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VarId>,
    {
        Self {
            refs: refs.into_iter().map(Into::into).collect(),
            func: None,
            on_run: None,
        }
    }

    /// Calls `f` with the props whenever the tool actually runs.
    #[must_use]
    pub fn on_run(mut self, f: impl Fn(&ToolProps<Rc<Self>>) + 'static) -> Self {
        self.on_run = Some(Rc::new(f));
        self
    }
}

impl ToolProgram for RefsFuncProgram {
    fn tool_name(&self) -> &str {
        RefsFuncTool::NAME
    }
}

impl fmt::Debug for RefsFuncProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefsFuncProgram")
            .field("refs", &self.refs)
            .finish_non_exhaustive()
    }
}

/// Computes a function over the outputs of the variables its program reads.
pub struct RefsFuncTool {
    run: Refunc<ToolProps<Rc<RefsFuncProgram>>, ToolResult>,
}

impl RefsFuncTool {
    /// Tag of [`RefsFuncProgram`].
    pub const NAME: &str = "testing-refs-func";

    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        let run = memoize_props(Refunc::from_fn(|props: ToolProps<Rc<RefsFuncProgram>>| {
            let program = &props.program;
            if let Some(on_run) = &program.on_run {
                on_run(&props);
            }
            let output = match &program.func {
                Some(func) => {
                    let func = Rc::clone(func);
                    let inputs = program.refs.iter().map(|id| match props.var_bindings.get(id.as_str()) {
                        Some(binding) => binding.output.clone(),
                        None => EngraftPromise::reject(RunError::UnboundVar(id.clone())),
                    });
                    EngraftPromise::all(inputs)
                        .then(move |outputs| func(outputs.as_slice()).map(ToolOutput::new))
                }
                None => EngraftPromise::unresolved(),
            };
            ToolResult::new(output, ToolView::empty())
        }));
        Self { run }
    }
}

impl Default for RefsFuncTool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefsFuncTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefsFuncTool").finish_non_exhaustive()
    }
}

impl Tool for RefsFuncTool {
    type Program = RefsFuncProgram;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn make_program(
        &self,
        _context: &EngraftContext,
        _default_code: Option<&str>,
    ) -> Result<RefsFuncProgram, ContextError> {
        Ok(RefsFuncProgram::pending(Vec::<VarId>::new()))
    }

    fn collect_references(&self, program: &RefsFuncProgram) -> ReferenceCollection {
        program.refs.iter().cloned().collect()
    }

    fn run(&self, memory: &mut Memory, props: ToolProps<Rc<RefsFuncProgram>>) -> ToolResult {
        self.run.call(memory, props)
    }
}

/// Program of [`CountRunsTool`]: a wrapped sub-program.
#[derive(Debug)]
pub struct CountRunsProgram {
    /// The program run inside.
    pub sub_program: Program,
}

impl ToolProgram for CountRunsProgram {
    fn tool_name(&self) -> &str {
        CountRunsTool::NAME
    }
}

/// Passes its sub-program's output through and shows how often it ran.
pub struct CountRunsTool {
    run: Refunc<ToolProps<Rc<CountRunsProgram>>, ToolResult>,
}

impl CountRunsTool {
    /// Tag of [`CountRunsProgram`].
    pub const NAME: &str = "test-count-runs";

    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        let run = memoize_props(Refunc::hooks(count_runs));
        Self { run }
    }
}

fn count_runs(hooks: &mut Hooks<'_>, props: ToolProps<Rc<CountRunsProgram>>) -> ToolResult {
    let sub_result = hook_run_tool(hooks, &props.with_program(props.program.sub_program.clone()));

    let runs = hooks.cell(|| 0_u32);
    *runs.borrow_mut() += 1;

    let sub_view = sub_result.view.clone();
    let view = hooks.memo((sub_view.clone(),), |_| {
        ToolView::new(move |render_props: &RenderProps| ViewOutput::Group {
            label: format!("runs: {}", runs.borrow()),
            children: vec![sub_view.render(render_props)],
        })
    });
    ToolResult::new(sub_result.output, view)
}

impl Default for CountRunsTool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CountRunsTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountRunsTool").finish_non_exhaustive()
    }
}

impl Tool for CountRunsTool {
    type Program = CountRunsProgram;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn make_program(
        &self,
        context: &EngraftContext,
        default_code: Option<&str>,
    ) -> Result<CountRunsProgram, ContextError> {
        Ok(CountRunsProgram {
            sub_program: context.make_slot_with_code(Some(default_code.unwrap_or_default()))?,
        })
    }

    fn collect_references(&self, program: &CountRunsProgram) -> ReferenceCollection {
        ReferenceCollection::from(&program.sub_program)
    }

    fn run(&self, memory: &mut Memory, props: ToolProps<Rc<CountRunsProgram>>) -> ToolResult {
        self.run.call(memory, props)
    }
}
