// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::rc::Rc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use engraft_promise::EngraftPromise;
use engraft_refunc::{Memory, Refunc, memoize};

fn bench_hooks(c: &mut Criterion) {
    let mut group = c.benchmark_group("engraft_refunc");
    group.sample_size(50);

    for n in [16_usize, 256, 4_096] {
        let inputs: Vec<Rc<u64>> = (0..n as u64).map(Rc::new).collect();

        // One memo per input inside a fork, all hits after the first run.
        let sum = Refunc::hooks(|hooks, inputs: Rc<Vec<Rc<u64>>>| {
            hooks.fork(|fork| {
                inputs
                    .iter()
                    .enumerate()
                    .map(|(i, input)| {
                        fork.branch(&i.to_string(), |hooks| {
                            hooks.memo((Rc::clone(input),), |_| **input * 2)
                        })
                    })
                    .sum::<u64>()
            })
        });
        let mut memory = Memory::new();
        let shared = Rc::new(inputs.clone());
        sum.call(&mut memory, Rc::clone(&shared));
        group.bench_function(format!("fork_memo_hits(n={n})"), |b| {
            b.iter(|| black_box(sum.call(&mut memory, Rc::new(inputs.clone()))));
        });

        let memoized = memoize(sum.clone());
        let mut memory = Memory::new();
        memoized.call(&mut memory, Rc::clone(&shared));
        group.bench_function(format!("memoize_hit(n={n})"), |b| {
            b.iter(|| black_box(memoized.call(&mut memory, Rc::clone(&shared))));
        });
    }

    group.finish();
}

fn bench_promises(c: &mut Criterion) {
    let mut group = c.benchmark_group("engraft_promise");

    for n in [16_usize, 256] {
        group.bench_function(format!("all_resolved(n={n})"), |b| {
            b.iter(|| {
                let all = EngraftPromise::all((0..n).map(EngraftPromise::resolve));
                black_box(all.map(|values| values.len()).state())
            });
        });
        group.bench_function(format!("all_deferred(n={n})"), |b| {
            b.iter(|| {
                let (promises, resolvers): (Vec<_>, Vec<_>) =
                    (0..n).map(|_| EngraftPromise::<usize>::deferred()).unzip();
                let all = EngraftPromise::all(promises);
                for (i, resolver) in resolvers.into_iter().enumerate() {
                    resolver.resolve(i);
                }
                black_box(all.state())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hooks, bench_promises);
criterion_main!(benches);
