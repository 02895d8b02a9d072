//! Benchmarks for dependency tracking and write notification.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ripple_core::observe::{reactive, Target, Value};
use ripple_core::reactive::{effect, EffectOptions, Memo};

/// Benchmark a write fanning out to `n` effects reading the same key
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for n in [1, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let state = reactive(&Target::object());
            state.set("count", 0);

            let effects: Vec<_> = (0..n)
                .map(|_| {
                    let s = state.clone();
                    effect(move || black_box(s.get("count")), EffectOptions::new())
                })
                .collect();

            let mut i = 0;
            b.iter(|| {
                i += 1;
                state.set("count", i);
            });
            drop(effects);
        });
    }

    group.finish();
}

/// Benchmark re-running an effect that reads `n` keys, where the set of keys
/// read is stable between runs
fn bench_stable_rerun(c: &mut Criterion) {
    let mut group = c.benchmark_group("stable_rerun");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let list = reactive(&Target::from_values((0..n).map(Value::from)));

            let l = list.clone();
            let handle = effect(
                move || {
                    for index in 0..n as usize {
                        black_box(l.get(index));
                    }
                },
                EffectOptions::new().lazy(true),
            );
            handle.run();

            b.iter(|| handle.run());
        });
    }

    group.finish();
}

/// Benchmark a memo chain of depth `n` invalidated and read back
fn bench_memo_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo_chain");

    for n in [1, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let state = reactive(&Target::object());
            state.set("n", 0);

            let s = state.clone();
            let mut tail = Memo::new(move || s.get("n").as_number().unwrap_or(0.0));
            for _ in 1..n {
                let prev = tail.clone();
                tail = Memo::new(move || prev.get() + 1.0);
            }
            tail.get();

            let mut i = 0;
            b.iter(|| {
                i += 1;
                state.set("n", i);
                black_box(tail.get())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_stable_rerun, bench_memo_chain);
criterion_main!(benches);
