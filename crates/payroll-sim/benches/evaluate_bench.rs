use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_evaluate(c: &mut Criterion) {
    let model = payroll_sim::Model::new(payroll_core::ModelConfig::reference()).unwrap();
    let grid = payroll_core::SimGrid::reference();
    let payroll =
        payroll_core::PayrollTrajectory::new(vec![150e6, 195e6, 230e6, 210e6, 180e6]).unwrap();
    c.bench_function("evaluate 5y x 100 steps", |b| {
        b.iter(|| {
            let _ = black_box(model.evaluate_trajectory(black_box(&payroll), &grid));
        })
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
