//! Benchmarks for TrackFitter::fit and the per-track derivative emission
//!
//! Usage:
//!   cargo bench --bench track_fit

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use telmille::alignment_mode::AlignmentMode;
use telmille::constants::SensorId;
use telmille::derivatives::DerivativeBuilder;
use telmille::geometry::{PlaneCatalog, TelescopeLayout};
use telmille::hits::Hit;
use telmille::labels::AlignmentLabels;
use telmille::mille::MemorySink;
use telmille::params::AlignParams;
use telmille::track_fit::TrackFitter;

const Z_MM: [f64; 6] = [0.0, 150.0, 300.0, 450.0, 600.0, 750.0];

fn catalog() -> PlaneCatalog {
    let planes: Vec<(SensorId, f64)> = Z_MM
        .iter()
        .enumerate()
        .map(|(i, &z)| (i as SensorId, z))
        .collect();
    PlaneCatalog::new(
        &TelescopeLayout::straight(&planes, 0.0184),
        &AlignParams::default(),
    )
    .unwrap()
}

/// Smeared hits (µm) of one random line.
fn track_hits(rng: &mut StdRng, noise: &Normal<f64>) -> Vec<Hit> {
    let x0 = rng.random_range(-5000.0..5000.0);
    let y0 = rng.random_range(-2500.0..2500.0);
    let tx = rng.random_range(-5e-4..5e-4);
    let ty = rng.random_range(-5e-4..5e-4);
    Z_MM.iter()
        .map(|&z| {
            let z = z * 1000.0;
            Hit::new(
                x0 + tx * z + noise.sample(rng),
                y0 + ty * z + noise.sample(rng),
                z,
            )
        })
        .collect()
}

fn bench_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xF17);
    let noise = Normal::new(0.0, 4.0).unwrap();
    let catalog = catalog();
    let fitter = TrackFitter::with_default_minimizer(0);

    c.bench_function("track_fit/fit_six_planes", |b| {
        b.iter_batched(
            || track_hits(&mut rng, &noise),
            |hits| {
                let refs: Vec<Option<&Hit>> = hits.iter().map(Some).collect();
                black_box(fitter.fit(&catalog, &refs).ok());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_fit_and_emit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xE417);
    let noise = Normal::new(0.0, 4.0).unwrap();
    let catalog = catalog();
    let labels = AlignmentLabels::allocate(&catalog.sensor_ids());
    let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYZShiftXZRotYZRotXYRot);
    let fitter = TrackFitter::with_default_minimizer(0);

    c.bench_function("track_fit/fit_and_emit_mode7", |b| {
        b.iter_batched(
            || (track_hits(&mut rng, &noise), MemorySink::default()),
            |(hits, mut sink)| {
                let refs: Vec<Option<&Hit>> = hits.iter().map(Some).collect();
                if let Ok(track) = fitter.fit(&catalog, &refs) {
                    black_box(builder.build_and_emit(&track, &mut sink).ok());
                }
                sink
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_fit, bench_fit_and_emit
);
criterion_main!(benches);
