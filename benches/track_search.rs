//! Benchmarks for TrackCandidateSearch::search
//!
//! Usage:
//!   cargo bench --bench track_search
//!   cargo bench track_search -- track_search/busy_event

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use telmille::constants::SensorId;
use telmille::geometry::{PlaneCatalog, TelescopeLayout};
use telmille::hits::{HitStore, RawHit};
use telmille::params::AlignParams;
use telmille::track_search::TrackCandidateSearch;

const Z_MM: [f64; 6] = [0.0, 150.0, 300.0, 450.0, 600.0, 750.0];

fn catalog(window_um: f64) -> PlaneCatalog {
    let planes: Vec<(SensorId, f64)> = Z_MM
        .iter()
        .enumerate()
        .map(|(i, &z)| (i as SensorId, z))
        .collect();
    let params = AlignParams::builder()
        .residual_windows(
            vec![0.0; 6],
            vec![window_um; 6],
            vec![0.0; 6],
            vec![window_um; 6],
        )
        .build()
        .unwrap();
    PlaneCatalog::new(&TelescopeLayout::straight(&planes, 0.0184), &params).unwrap()
}

/// `tracks` straight lines spread over a 10 × 5 mm sensor.
fn event_hits(rng: &mut StdRng, tracks: usize) -> Vec<RawHit> {
    let mut hits = Vec::with_capacity(tracks * Z_MM.len());
    for _ in 0..tracks {
        let x0 = rng.random_range(-5.0..5.0);
        let y0 = rng.random_range(-2.5..2.5);
        let tx = rng.random_range(-2e-4..2e-4);
        let ty = rng.random_range(-2e-4..2e-4);
        for (i, &z) in Z_MM.iter().enumerate() {
            hits.push(RawHit::measured(i as SensorId, x0 + tx * z, y0 + ty * z, z));
        }
    }
    hits
}

fn store(catalog: &PlaneCatalog, hits: &[RawHit]) -> HitStore {
    let mut store = HitStore::new(catalog.len());
    for hit in hits {
        store.insert_raw(catalog, hit);
    }
    store
}

/// One track per event, the common test-beam case.
fn bench_single_track(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5EA4C4);
    let catalog = catalog(100.0);
    let search = TrackCandidateSearch::new(1, 2000);

    c.bench_function("track_search/single_track", |b| {
        b.iter_batched(
            || store(&catalog, &event_hits(&mut rng, 1)),
            |store| black_box(search.search(&catalog, &store)),
            BatchSize::SmallInput,
        )
    });
}

/// Ten tracks per event: windows decide the fan-out.
fn bench_busy_event(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xB0B);
    let catalog = catalog(100.0);
    let search = TrackCandidateSearch::new(1, 2000);

    c.bench_function("track_search/busy_event", |b| {
        b.iter_batched(
            || store(&catalog, &event_hits(&mut rng, 10)),
            |store| black_box(search.search(&catalog, &store)),
            BatchSize::SmallInput,
        )
    });
}

/// Unbounded windows and a full budget: the per-event cap ends the search.
fn bench_capped(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xCA9);
    let catalog = catalog(f64::MAX);
    let search = TrackCandidateSearch::new(2, 2000);
    let store = store(&catalog, &event_hits(&mut rng, 8));

    c.bench_function("track_search/capped_combinatorics", |b| {
        b.iter(|| black_box(search.search(&catalog, black_box(&store))))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_single_track, bench_busy_event, bench_capped
);
criterion_main!(benches);
