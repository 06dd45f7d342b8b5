// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use engraft_core::simple_tool::{Fields, SimpleProgram, SimpleTool, SimpleToolSpec};
use engraft_core::testing::{KnownOutputProgram, testing_context_with};
use engraft_core::{EngraftContext, Program, ToolProps, VarBindings, run_tool};
use engraft_promise::Rejection;
use engraft_refunc::Memory;
use serde_json::json;

fn sum_tool() -> SimpleTool {
    SimpleToolSpec::new("sum", |_, outputs| {
        let mut total = 0_i64;
        for value in outputs.values() {
            total += value.as_i64().ok_or_else(|| Rejection::msg("not a number"))?;
        }
        Ok(json!(total))
    })
    .sub_tool("left")
    .sub_tool("right")
    .build()
}

/// A complete binary tree of `sum` nodes over `2^depth` leaves.
fn build_tree(depth: u32, first_leaf: i64) -> SimpleProgram {
    fn node(depth: u32, leaf: &mut i64) -> Program {
        if depth == 0 {
            *leaf += 1;
            return Program::new(KnownOutputProgram::value(*leaf));
        }
        let left = node(depth - 1, leaf);
        let right = node(depth - 1, leaf);
        Program::new(SimpleProgram::new(
            "sum",
            Fields::new(),
            [("left".to_owned(), left), ("right".to_owned(), right)],
        ))
    }
    let mut leaf = first_leaf;
    let left = node(depth - 1, &mut leaf);
    let right = node(depth - 1, &mut leaf);
    SimpleProgram::new(
        "sum",
        Fields::new(),
        [("left".to_owned(), left), ("right".to_owned(), right)],
    )
}

/// Replaces the leftmost leaf, rebuilding only the nodes on its path.
fn edit_leftmost(program: &SimpleProgram, value: i64) -> SimpleProgram {
    let Some(left) = program.sub_tool("left") else {
        return SimpleProgram::new("sum", Fields::new(), []);
    };
    let new_left = match left.downcast::<SimpleProgram>() {
        Some(inner) => Program::new(edit_leftmost(&inner, value)),
        None => Program::new(KnownOutputProgram::value(value)),
    };
    program.with_sub_tool("left", new_left)
}

// A fresh root on every call, so only the nodes below it can be reused.
fn props(program: &SimpleProgram, context: &EngraftContext) -> ToolProps {
    let program = Program::new(program.with_field("depth", 0));
    ToolProps::new(program, VarBindings::new(), context.clone())
}

fn bench_run_tool(c: &mut Criterion) {
    let mut group = c.benchmark_group("engraft_run_tool");
    group.sample_size(50);
    let context = testing_context_with([sum_tool()]);
    let run = run_tool();

    for depth in [4_u32, 8, 10] {
        let tree = build_tree(depth, 0);

        group.bench_function(format!("cold(depth={depth})"), |b| {
            b.iter_batched(
                Memory::new,
                |mut memory| black_box(run.call(&mut memory, props(&tree, &context))),
                BatchSize::SmallInput,
            );
        });

        let mut memory = Memory::new();
        run.call(&mut memory, props(&tree, &context));
        group.bench_function(format!("unchanged(depth={depth})"), |b| {
            b.iter(|| black_box(run.call(&mut memory, props(&tree, &context))));
        });

        let mut memory = Memory::new();
        run.call(&mut memory, props(&tree, &context));
        let mut value = 0;
        group.bench_function(format!("edit_one_leaf(depth={depth})"), |b| {
            b.iter(|| {
                value += 1;
                let edited = edit_leftmost(&tree, value);
                black_box(run.call(&mut memory, props(&edited, &context)))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_run_tool);
criterion_main!(benches);
