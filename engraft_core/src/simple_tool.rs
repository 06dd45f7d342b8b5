// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tools with fixed fields, a fixed set of named sub-tools, and a pure
//! computation over their outputs.

use std::fmt;
use std::rc::Rc;

use engraft_promise::{EngraftPromise, Rejection};
use engraft_refunc::eq::{arr_eq_with_ref_eq, pair_eq_with};
use engraft_refunc::{Hooks, Memory, RefEq, Refunc, memoize_props};
use hashbrown::HashMap;
use serde_json::{Map, Value};

use crate::context::{ContextError, EngraftContext};
use crate::dispatcher::Dispatcher;
use crate::program::{Program, ProgramError, ToolProgram, tagged};
use crate::references::ReferenceCollection;
use crate::run_tool::hook_run_tool;
use crate::tool::{Tool, ToolOutput, ToolProps, ToolResult};
use crate::view::{RenderProps, ToolView, ViewOutput, render_output};

/// Field values of a simple program.
pub type Fields = Map<String, Value>;

type Compute = dyn Fn(&Fields, &HashMap<String, Value>) -> Result<Value, Rejection>;

/// Describes a simple tool.
///
/// ```rust
/// use engraft_core::simple_tool::SimpleToolSpec;
/// use engraft_promise::Rejection;
///
/// let adder = SimpleToolSpec::new("toy-adder-simple", |fields, outputs| {
///     let number = |key: &str| {
///         outputs[key]
///             .as_f64()
///             .ok_or_else(|| Rejection::msg(format!("{key} must be a number")))
///     };
///     let extra = fields["extra"].as_f64().unwrap_or_default();
///     Ok((number("x")? + number("y")? + extra).into())
/// })
/// .field("extra", 0)
/// .sub_tool("x")
/// .sub_tool("y")
/// .build();
/// assert_eq!(adder.name(), "toy-adder-simple");
/// ```
pub struct SimpleToolSpec {
    name: String,
    fields: Fields,
    sub_tools: Vec<String>,
    compute: Rc<Compute>,
}

impl SimpleToolSpec {
    /// Starts describing a tool named `name` that computes its output with
    /// `compute`, from its fields and its sub-tools' output values.
    pub fn new(
        name: impl Into<String>,
        compute: impl Fn(&Fields, &HashMap<String, Value>) -> Result<Value, Rejection> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            sub_tools: Vec::new(),
            compute: Rc::new(compute),
        }
    }

    /// Adds a field with its default value.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), default.into());
        self
    }

    /// Adds a named sub-tool slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already added.
    #[must_use]
    pub fn sub_tool(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        assert!(
            !self.sub_tools.contains(&key),
            "sub-tool `{key}` declared twice"
        );
        self.sub_tools.push(key);
        self
    }

    /// Finishes the tool.
    #[must_use]
    pub fn build(self) -> SimpleTool {
        SimpleTool::new(self)
    }
}

impl fmt::Debug for SimpleToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleToolSpec")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("sub_tools", &self.sub_tools)
            .finish_non_exhaustive()
    }
}

/// Program of a [`SimpleTool`].
#[derive(Debug)]
pub struct SimpleProgram {
    tool_name: String,
    fields: Rc<Fields>,
    sub_tools: Vec<(String, Program)>,
}

impl SimpleProgram {
    /// A program with the given fields and sub-programs, in slot order.
    pub fn new(
        tool_name: impl Into<String>,
        fields: Fields,
        sub_tools: impl IntoIterator<Item = (String, Program)>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            fields: Rc::new(fields),
            sub_tools: sub_tools.into_iter().collect(),
        }
    }

    /// The field values.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// The program in slot `key`.
    #[must_use]
    pub fn sub_tool(&self, key: &str) -> Option<&Program> {
        self.sub_tools
            .iter()
            .find_map(|(slot, program)| (slot == key).then_some(program))
    }

    /// A copy with slot `key` replaced; every other part is shared.
    #[must_use]
    pub fn with_sub_tool(&self, key: &str, program: Program) -> Self {
        let sub_tools = self
            .sub_tools
            .iter()
            .map(|(slot, old)| {
                let program = if slot == key { program.clone() } else { old.clone() };
                (slot.clone(), program)
            })
            .collect();
        Self {
            tool_name: self.tool_name.clone(),
            fields: Rc::clone(&self.fields),
            sub_tools,
        }
    }

    /// A copy with field `key` set; the sub-programs are shared.
    #[must_use]
    pub fn with_field(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut fields = Fields::clone(&self.fields);
        fields.insert(key.to_owned(), value.into());
        Self {
            tool_name: self.tool_name.clone(),
            fields: Rc::new(fields),
            sub_tools: self.sub_tools.clone(),
        }
    }
}

impl ToolProgram for SimpleProgram {
    fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn to_json(&self) -> Value {
        let sub_tools: Map<String, Value> = self
            .sub_tools
            .iter()
            .map(|(slot, program)| (slot.clone(), program.to_json()))
            .collect();
        let mut json = Map::new();
        json.insert("fields".to_owned(), Value::Object(Fields::clone(&self.fields)));
        json.insert("subTools".to_owned(), Value::Object(sub_tools));
        tagged(&self.tool_name, json)
    }
}

/// A tool built from a [`SimpleToolSpec`].
pub struct SimpleTool {
    spec: Rc<SimpleToolSpec>,
    run: Refunc<ToolProps<Rc<SimpleProgram>>, ToolResult>,
}

impl SimpleTool {
    /// Builds the tool.
    pub fn new(spec: SimpleToolSpec) -> Self {
        let spec = Rc::new(spec);
        let run = {
            let spec = Rc::clone(&spec);
            memoize_props(Refunc::hooks(move |hooks, props| run_simple(&spec, hooks, &props)))
        };
        Self { spec, run }
    }

    /// The tool's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl fmt::Debug for SimpleTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleTool")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

fn run_simple(
    spec: &SimpleToolSpec,
    hooks: &mut Hooks<'_>,
    props: &ToolProps<Rc<SimpleProgram>>,
) -> ToolResult {
    let program = &props.program;

    // Keyed by slot, so programs with a different slot set stay consistent.
    let results: Vec<ToolResult> = hooks.fork(|fork| {
        program
            .sub_tools
            .iter()
            .map(|(slot, sub_program)| {
                fork.branch(slot, |hooks| {
                    hook_run_tool(hooks, &props.with_program(sub_program.clone()))
                })
            })
            .collect()
    });
    let results = hooks.dedupe(results, |a, b| arr_eq_with_ref_eq(a, b));

    let outputs: Vec<EngraftPromise<ToolOutput>> =
        results.iter().map(|result| result.output.clone()).collect();
    let outputs = hooks.dedupe(outputs, |a, b| arr_eq_with_ref_eq(a, b));

    let output = hooks.memo_with(
        (Rc::clone(&program.fields), outputs.clone()),
        pair_eq_with(
            |a: &Rc<Fields>, b: &Rc<Fields>| Rc::ptr_eq(a, b) || a == b,
            |a: &Vec<EngraftPromise<ToolOutput>>, b: &Vec<EngraftPromise<ToolOutput>>| {
                arr_eq_with_ref_eq(a, b)
            },
        ),
        |_| {
            let fields = Rc::clone(&program.fields);
            let slots: Vec<String> = program.sub_tools.iter().map(|(slot, _)| slot.clone()).collect();
            let compute = Rc::clone(&spec.compute);
            EngraftPromise::all(outputs).then(move |values| {
                let named: HashMap<String, Value> = slots
                    .into_iter()
                    .zip(values)
                    .map(|(slot, output)| (slot, output.value))
                    .collect();
                compute(&*fields, &named).map(ToolOutput::new)
            })
        },
    );

    let view = hooks.memo_with(
        (output.clone(), results.clone()),
        pair_eq_with(
            |a: &EngraftPromise<ToolOutput>, b: &EngraftPromise<ToolOutput>| a.ref_eq(b),
            |a: &Vec<ToolResult>, b: &Vec<ToolResult>| arr_eq_with_ref_eq(a, b),
        ),
        |_| {
            let label = program.tool_name.clone();
            let slots: Vec<(String, ToolView)> = program
                .sub_tools
                .iter()
                .zip(&results)
                .map(|((slot, _), result)| (slot.clone(), result.view.clone()))
                .collect();
            let output = output.clone();
            ToolView::new(move |render_props: &RenderProps| {
                let mut children: Vec<ViewOutput> = slots
                    .iter()
                    .map(|(slot, view)| ViewOutput::Group {
                        label: slot.clone(),
                        children: vec![view.render(render_props)],
                    })
                    .collect();
                children.push(render_output(&output));
                ViewOutput::Group {
                    label: label.clone(),
                    children,
                }
            })
        },
    );

    ToolResult::new(output, view)
}

impl Tool for SimpleTool {
    type Program = SimpleProgram;

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn make_program(
        &self,
        context: &EngraftContext,
        default_code: Option<&str>,
    ) -> Result<SimpleProgram, ContextError> {
        let sub_tools = self
            .spec
            .sub_tools
            .iter()
            .enumerate()
            .map(|(i, slot)| -> Result<_, ContextError> {
                let code = if i == 0 { default_code } else { None };
                Ok((slot.clone(), context.make_slot_with_code(code)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SimpleProgram::new(
            self.spec.name.clone(),
            self.spec.fields.clone(),
            sub_tools,
        ))
    }

    fn collect_references(&self, program: &SimpleProgram) -> ReferenceCollection {
        program
            .sub_tools
            .iter()
            .map(|(_, sub_program)| sub_program)
            .collect()
    }

    fn load_program(
        &self,
        json: &Value,
        dispatcher: &Dispatcher,
    ) -> Result<SimpleProgram, ProgramError> {
        let name = &self.spec.name;
        let fields = match json.get("fields") {
            Some(Value::Object(fields)) => fields.clone(),
            None => self.spec.fields.clone(),
            Some(_) => return Err(ProgramError::invalid_field(name, "fields")),
        };
        let sub_tools_json = json
            .get("subTools")
            .and_then(Value::as_object)
            .ok_or_else(|| ProgramError::invalid_field(name, "subTools"))?;
        let sub_tools = self
            .spec
            .sub_tools
            .iter()
            .map(|slot| -> Result<_, ProgramError> {
                let sub_json = sub_tools_json
                    .get(slot)
                    .ok_or_else(|| ProgramError::invalid_field(name, &format!("subTools.{slot}")))?;
                Ok((slot.clone(), dispatcher.load_program(sub_json)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SimpleProgram::new(name.clone(), fields, sub_tools))
    }

    fn run(&self, memory: &mut Memory, props: ToolProps<Rc<SimpleProgram>>) -> ToolResult {
        self.run.call(memory, props)
    }
}
