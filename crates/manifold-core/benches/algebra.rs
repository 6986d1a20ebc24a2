use std::f64::consts::PI;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use manifold_core::{PatternType, evolve, generate, interfere, merge, to_cube};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn sources(n: usize) -> Vec<Vec<f64>> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n)
        .map(|i| {
            let t = PatternType::ALL[i % PatternType::ALL.len()];
            generate(t, "⦿", 0.0, &mut rng).unwrap().vector
        })
        .collect()
}

fn bench_algebra(c: &mut Criterion) {
    let vs = sources(8);
    let mut rng = SmallRng::seed_from_u64(7);

    c.bench_function("generate_quantum", |b| {
        b.iter(|| generate(PatternType::Quantum, "⦿", black_box(0.5), &mut rng))
    });
    c.bench_function("merge_pair", |b| {
        b.iter(|| merge(black_box(&vs[0]), black_box(&vs[1]), PI / 4.0))
    });
    c.bench_function("evolve", |b| {
        b.iter(|| evolve(black_box(&vs[0]), 1.0, black_box(0.3)))
    });
    c.bench_function("interfere_8", |b| {
        b.iter(|| interfere(black_box(&vs), black_box(PI / 3.0)))
    });
    c.bench_function("to_cube", |b| b.iter(|| to_cube(black_box(&vs[0]))));
}

criterion_group!(benches, bench_algebra);
criterion_main!(benches);
