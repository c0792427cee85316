//! Benchmarks for pipeline orchestration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slipway::prelude::*;
use slipway::testing::TestPorts;

fn orchestrator_in(dir: &tempfile::TempDir) -> PipelineOrchestrator {
    let mut config = PipelineConfig::default();
    config.workspace_root = dir.path().join("runs");
    PipelineOrchestrator::new(config, TestPorts::new().ports()).expect("orchestrator")
}

fn plan_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator_in(&dir);
    let event = TriggerEvent::tag("v1.0.0");

    c.bench_function("plan", |b| {
        b.iter(|| black_box(orchestrator.plan(black_box(&event))));
    });
}

fn run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator_in(&dir);
    let event = TriggerEvent::push("main");

    c.bench_function("push_run_in_memory", |b| {
        b.iter(|| {
            let report = runtime.block_on(orchestrator.run(&event)).expect("run");
            black_box(report)
        });
    });
}

criterion_group!(benches, plan_benchmark, run_benchmark);
criterion_main!(benches);
