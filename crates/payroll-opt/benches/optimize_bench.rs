use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_optimize(c: &mut Criterion) {
    let model = payroll_sim::Model::new(payroll_core::ModelConfig::reference()).unwrap();
    let bounds = payroll_core::PayrollBounds::reference();
    let grid = payroll_core::SimGrid::reference();
    let settings = payroll_opt::OptimizerSettings {
        search: payroll_opt::SwarmSettings {
            max_iterations: 20,
            ..payroll_opt::SwarmSettings::default()
        },
        ..payroll_opt::OptimizerSettings::default()
    };
    let mut group = c.benchmark_group("optimize");
    group.sample_size(10);
    group.bench_function("swarm 5 periods x 20 iterations", |b| {
        b.iter(|| {
            let _ = black_box(payroll_opt::optimize(&model, &bounds, &grid, &settings));
        })
    });
    group.finish();
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
