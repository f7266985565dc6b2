//! Production benchmarks for rts_production.
//!
//! Run with: `cargo bench -p rts_production`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rts_production::prelude::*;
use rts_test_utils::fixtures::{add_barracks, local_session, skirmish_session, RED};

/// Ticks a skirmish with many autonomous and idle launchers.
pub fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for barracks in [10u64, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(barracks), &barracks, |b, &n| {
            b.iter_batched(
                || skirmish_session(1, n, 2),
                |mut session| {
                    for _ in 0..20 {
                        black_box(session.tick());
                    }
                    session
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Launch and cancel round trips against one launcher.
pub fn launch_cancel_benchmark(c: &mut Criterion) {
    let mut session = local_session(1);
    session.host_mut().stockpile.set(RED, "wood", 1_000_000);
    let id = add_barracks(&mut session, RED, 1);

    c.bench_function("launch_cancel", |b| {
        b.iter(|| {
            let result = session.launch(id, 0).unwrap_or(AdmissionResult::Disabled);
            black_box(result);
            black_box(session.cancel(id, 0).unwrap_or(false));
        });
    });
}

/// Unit upgrade applied across every launcher of a faction.
pub fn upgrade_benchmark(c: &mut Criterion) {
    c.bench_function("unit_upgrade_200_launchers", |b| {
        b.iter_batched(
            || {
                let mut session = local_session(1);
                for entity in 0..200 {
                    add_barracks(&mut session, RED, entity);
                }
                session
            },
            |mut session| {
                let outcome = session.apply_upgrade(&UpgradeId::new("pikes"), RED);
                black_box(outcome.map(|o| o.rewritten_tasks).unwrap_or_default())
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

/// Snapshot encoding and hashing.
pub fn snapshot_benchmark(c: &mut Criterion) {
    let session = skirmish_session(1, 100, 2);
    c.bench_function("state_hash_200_launchers", |b| {
        b.iter(|| black_box(session.state_hash().unwrap_or_default()));
    });
}

criterion_group!(
    benches,
    tick_benchmark,
    launch_cancel_benchmark,
    upgrade_benchmark,
    snapshot_benchmark
);
criterion_main!(benches);
