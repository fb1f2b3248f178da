//! Benchmark: update propagation through deep chains and wide fan-outs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use filament_core::reactive::{Computed, Runtime, Signal};

fn deep_chain(rt: &Runtime, depth: usize) -> (Signal<i64>, Computed<i64>) {
    let source = rt.signal(0i64);
    let s = source.clone();
    let mut head = rt.computed(move |_| s.get() + 1);
    for _ in 1..depth {
        let prev = head.clone();
        head = rt.computed(move |_| prev.get() + 1);
    }
    (source, head)
}

fn benchmark_deep_chain_update(c: &mut Criterion) {
    let rt = Runtime::new();
    let (source, head) = deep_chain(&rt, 200);
    let h = head.clone();
    let _effect = rt.effect(move || {
        black_box(h.get());
    });

    let mut value = 0i64;
    c.bench_function("deep_chain_update_200", |b| {
        b.iter(|| {
            value += 1;
            source.set(value);
        });
    });
}

fn benchmark_wide_fanout_update(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(0i64);
    let _effects: Vec<_> = (0..500)
        .map(|_| {
            let s = source.clone();
            rt.effect(move || {
                black_box(s.get());
            })
        })
        .collect();

    let mut value = 0i64;
    c.bench_function("wide_fanout_update_500", |b| {
        b.iter(|| {
            value += 1;
            source.set(value);
        });
    });
}

fn benchmark_batched_writes(c: &mut Criterion) {
    let rt = Runtime::new();
    let signals: Vec<_> = (0..100).map(|i| rt.signal(i as i64)).collect();
    let watched: Vec<_> = signals.clone();
    let _effect = rt.effect(move || {
        black_box(watched.iter().map(|s| s.get()).sum::<i64>());
    });

    let mut value = 0i64;
    c.bench_function("batched_writes_100", |b| {
        b.iter(|| {
            value += 1;
            rt.batch(|| {
                for s in &signals {
                    s.set(value);
                }
            });
        });
    });
}

criterion_group!(
    benches,
    benchmark_deep_chain_update,
    benchmark_wide_fanout_update,
    benchmark_batched_writes
);
criterion_main!(benches);
