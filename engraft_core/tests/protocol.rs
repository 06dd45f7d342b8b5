// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the tool execution protocol across nested tools: dispatch
//! misses, failures, JSON trees, and mounts.

use std::cell::Cell;
use std::rc::Rc;

use engraft_core::mount::ToolMount;
use engraft_core::simple_tool::{Fields, SimpleProgram, SimpleTool, SimpleToolSpec};
use engraft_core::testing::{CountRunsProgram, KnownOutputProgram, testing_context_with};
use engraft_core::{Program, RenderProps, RunError, ToolProps, VarBindings, ViewOutput, run_tool};
use engraft_promise::Rejection;
use engraft_refunc::Memory;
use serde_json::json;

fn pair() -> SimpleTool {
    SimpleToolSpec::new("pair", |_, outputs| Ok(json!([outputs["left"], outputs["right"]])))
        .sub_tool("left")
        .sub_tool("right")
        .build()
}

fn constant() -> SimpleTool {
    SimpleToolSpec::new("constant", |fields, _| {
        fields
            .get("value")
            .cloned()
            .ok_or_else(|| Rejection::msg("no value"))
    })
    .field("value", json!(null))
    .build()
}

fn pair_of(left: Program, right: Program) -> Program {
    Program::new(SimpleProgram::new(
        "pair",
        Fields::new(),
        [("left".to_owned(), left), ("right".to_owned(), right)],
    ))
}

#[test]
fn a_panicking_node_does_not_take_down_its_sibling() {
    let context = testing_context_with([pair()]);
    let right_runs = Rc::new(Cell::new(0));
    let sink = Rc::clone(&right_runs);
    let left = Program::new(KnownOutputProgram::value(1).on_run(|| panic!("boom")));
    let right = Program::new(KnownOutputProgram::value(2).on_run(move || sink.set(sink.get() + 1)));

    let run = run_tool();
    let mut memory = Memory::new();
    let result = run.call(
        &mut memory,
        ToolProps::new(pair_of(left, right.clone()), VarBindings::new(), context.clone()),
    );
    let reason = result.output.state().reason().cloned().unwrap();
    assert!(matches!(
        reason.downcast_ref::<RunError>(),
        Some(RunError::Panicked { message, .. }) if message == "boom"
    ));
    assert_eq!(right_runs.get(), 1);

    // Replacing the failing node recovers the tree; the sibling is reused.
    let fixed = pair_of(Program::new(KnownOutputProgram::value(1)), right);
    let result = run.call(&mut memory, ToolProps::new(fixed, VarBindings::new(), context));
    assert_eq!(result.output.state().value().map(|o| o.value.clone()), Some(json!([1, 2])));
    assert_eq!(right_runs.get(), 1);
}

#[test]
fn json_trees_with_unknown_tools_load_run_and_round_trip() {
    let context = testing_context_with([pair(), constant()]);
    let json = json!({
        "toolName": "pair",
        "fields": {},
        "subTools": {
            "left": {"toolName": "constant", "fields": {"value": "hi"}, "subTools": {}},
            "right": {"toolName": "slider", "min": 0, "max": 10},
        },
    });
    let program = context.dispatcher().load_program(&json).unwrap();
    assert_eq!(program.to_json(), json);

    let result = run_tool().call(
        &mut Memory::new(),
        ToolProps::new(program, VarBindings::new(), context),
    );
    let reason = result.output.state().reason().cloned().unwrap();
    assert!(matches!(
        reason.downcast_ref::<RunError>(),
        Some(RunError::ToolNotFound(name)) if name == "slider"
    ));
    let view = result.view.render(&RenderProps::default());
    assert_eq!(view.first_problem(), Some("Tool not found: slider"));
}

#[test]
fn malformed_trees_fail_to_load() {
    let context = testing_context_with([pair()]);
    let err = context
        .dispatcher()
        .load_program(&json!({"subTools": {}}))
        .unwrap_err();
    assert!(err.to_string().starts_with("program is not an object"));
}

#[test]
fn mounted_trees_rerun_only_what_changed() {
    let context = testing_context_with([pair()]);
    let leaf = Program::new(KnownOutputProgram::value("leaf"));
    let counted = Program::new(CountRunsProgram { sub_program: leaf.clone() });
    let mut mount = ToolMount::new(pair_of(counted.clone(), leaf.clone()), context);

    mount.run();
    // A new root around the same counted node.
    mount.set_program(pair_of(counted, Program::new(KnownOutputProgram::value("other"))));
    mount.run();

    let ViewOutput::Group { children, .. } = mount.render(false, false) else {
        panic!("pair renders a group");
    };
    let ViewOutput::Group { children: left, .. } = &children[0] else {
        panic!("each slot renders a group");
    };
    assert!(matches!(&left[0], ViewOutput::Group { label, .. } if label == "runs: 1"));
}
