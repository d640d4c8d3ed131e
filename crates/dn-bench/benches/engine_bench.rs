//! Engine step and gain benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dn_backends::{entropy_normalized, normalized_kl};
use dn_engine::{DnEngine, EngineConfig, PerturbationParams};

fn inputs(n: usize) -> Vec<(f64, f64)> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let a = (state >> 11) as f64 / (1u64 << 53) as f64;
            let b = ((state >> 3) & 0xFFFF) as f64 / 65_535.0;
            (a, b)
        })
        .collect()
}

fn bench_step(c: &mut Criterion) {
    let stream = inputs(1024);
    let mut group = c.benchmark_group("engine_step");

    for (label, enabled) in [("noise_on", true), ("noise_off", false)] {
        let cfg = EngineConfig {
            perturbation: PerturbationParams {
                enabled,
                ..PerturbationParams::default()
            },
            ..EngineConfig::default()
        };
        group.bench_function(label, |b| {
            let mut engine = DnEngine::new(cfg).unwrap();
            let mut i = 0usize;
            b.iter(|| {
                let (dn, dd) = stream[i & 1023];
                i = i.wrapping_add(1);
                criterion::black_box(engine.step(dn, dd));
            });
        });
    }
    group.finish();
}

fn bench_alpha(c: &mut Criterion) {
    let engine = DnEngine::default();
    c.bench_function("engine_alpha", |b| {
        b.iter(|| {
            criterion::black_box(engine.alpha(
                criterion::black_box(0.7),
                criterion::black_box(0.2),
                1.0,
            ))
        });
    });
}

fn bench_signals(c: &mut Criterion) {
    let mut group = c.benchmark_group("signals");
    for &k in &[8usize, 64, 512] {
        let w: Vec<f64> = (0..k).map(|i| (i % 7) as f64 + 0.5).collect();
        let p: Vec<f64> = (0..k).map(|i| (i % 5) as f64 + 1.0).collect();
        group.bench_with_input(BenchmarkId::new("entropy", k), &w, |b, w| {
            b.iter(|| criterion::black_box(entropy_normalized(w)));
        });
        group.bench_with_input(BenchmarkId::new("kl", k), &(w.clone(), p), |b, (q, p)| {
            b.iter(|| criterion::black_box(normalized_kl(q, p)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step, bench_alpha, bench_signals);
criterion_main!(benches);
