//! Scheduler throughput benchmarks.
//!
//! Measures selection cost as the queue grows and a full
//! enqueue/dispatch/complete cycle for both scheduler kinds.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use tiergate::capacity::CapacityBudget;
use tiergate::clock::ManualClock;
use tiergate::request::Request;
use tiergate::scheduler::{self, Scheduler, SchedulerConfig, SchedulerKind};
use tiergate::tier::Tier;

fn filled(kind: SchedulerKind, depth: usize) -> Box<dyn Scheduler> {
    let config = SchedulerConfig { kind, ..SchedulerConfig::default() };
    let mut s = scheduler::build(&config, Arc::new(ManualClock::new()));
    for i in 0..depth {
        let tier = Tier::ALL[i % 3];
        s.enqueue(Request::new(format!("req-{i}"), tier, json!(i)))
            .expect("unique ids");
    }
    s
}

fn bench_select_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_next");
    let budget = CapacityBudget::new(6, 3);

    for depth in [10, 100, 1_000] {
        for kind in [SchedulerKind::WorkConserving, SchedulerKind::FixedConcurrency] {
            let s = filled(kind, depth);
            group.throughput(Throughput::Elements(1));
            group.bench_function(BenchmarkId::new(format!("{kind:?}"), depth), |b| {
                b.iter(|| black_box(s.select_next(black_box(&budget))))
            });
        }
    }

    group.finish();
}

fn bench_dispatch_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_cycle");
    let budget = CapacityBudget::new(6, 0);

    for depth in [10, 100] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_function(BenchmarkId::new("work_conserving", depth), |b| {
            b.iter(|| {
                let mut s = filled(SchedulerKind::WorkConserving, depth);
                while let Some(next) = s.select_next(&budget) {
                    s.mark_processing(&next.id).expect("queued");
                    s.complete(&next.id).expect("processing");
                }
                black_box(s.stats())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select_next, bench_dispatch_cycle);
criterion_main!(benches);
