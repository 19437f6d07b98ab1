//! Synthetic alignment run on a misaligned six-plane telescope.
//!
//! Hits are generated on shifted and rotated planes but processed with the nominal geometry,
//! so the written Mille file carries the residual pattern pede has to undo.
//!
//! Usage:
//!   cargo run --example synthetic_run -- [events] [output directory]
//!   RUST_LOG=debug cargo run --example synthetic_run -- 200
use std::error::Error;

use camino::Utf8PathBuf;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use telmille::{
    alignment_mode::AlignmentMode,
    constants::SensorId,
    geometry::{SensorLayout, TelescopeLayout},
    hits::{Event, RawHit},
    params::{AlignParams, SteeringParams},
    processor::AlignmentProcessor,
};

const Z_MM: [f64; 6] = [0.0, 150.0, 300.0, 450.0, 600.0, 750.0];
const PITCH_MM: f64 = 0.0184;
const SIGMA_UM: f64 = 3.5;

/// (x shift mm, y shift mm, rotation about the beam axis rad) per plane.
const MISALIGNMENT: [(f64, f64, f64); 6] = [
    (0.0, 0.0, 0.0),
    (0.012, -0.008, 1.5e-3),
    (-0.020, 0.005, -0.8e-3),
    (0.007, 0.015, 0.4e-3),
    (-0.004, -0.011, 2.0e-3),
    (0.0, 0.0, 0.0),
];

fn nominal() -> TelescopeLayout {
    let planes: Vec<(SensorId, f64)> = Z_MM
        .iter()
        .enumerate()
        .map(|(i, &z)| (i as SensorId, z))
        .collect();
    TelescopeLayout::straight(&planes, PITCH_MM)
}

fn misaligned() -> TelescopeLayout {
    TelescopeLayout::new(
        Z_MM.iter()
            .zip(MISALIGNMENT)
            .enumerate()
            .map(|(i, (&z, (dx, dy, gamma)))| {
                SensorLayout::at_z(i as SensorId, z, PITCH_MM)
                    .with_offset(dx, dy)
                    .with_tilt(0.0, 0.0, gamma)
            })
            .collect(),
    )
}

/// Hits of one straight track as measured by the misaligned planes, in nominal coordinates.
fn event(rng: &mut StdRng, truth: &TelescopeLayout, run: i32, number: i64) -> Event {
    let noise = Normal::new(0.0, SIGMA_UM * 1e-3).unwrap();
    let origin = Vector3::new(rng.random_range(-4.0..4.0), rng.random_range(-2.0..2.0), 0.0);
    let slope = Vector3::new(
        rng.random_range(-3e-4..3e-4),
        rng.random_range(-3e-4..3e-4),
        1.0,
    );

    let hits = truth
        .sensors()
        .iter()
        .map(|sensor| {
            let z = sensor.position_mm.z;
            let global = origin + slope * z;
            // local coordinates on the true plane, reported as if the plane were nominal
            let local = sensor.orientation.inverse() * (global - sensor.position_mm);
            RawHit::measured(
                sensor.sensor_id,
                local.x + noise.sample(rng),
                local.y + noise.sample(rng),
                z,
            )
        })
        .collect();
    Event::new(run, number).with_hits("corrhits", hits)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let n_events: i64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5000);
    let out_dir = args
        .next()
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| Utf8PathBuf::from("."));

    let n = Z_MM.len();
    let params = AlignParams::builder()
        .alignment_mode(AlignmentMode::XYShiftXYRot)
        .max_missing_hits(1)
        .residual_windows(vec![0.0; n], vec![400.0; n], vec![0.0; n], vec![400.0; n])
        .resolutions(vec![SIGMA_UM; n], vec![SIGMA_UM; n], vec![1000.0; n])
        .binary_filename(out_dir.join("mille.bin"))
        .steering(SteeringParams {
            file_name: out_dir.join("steer_mille.txt"),
            additional_commands: vec!["chisqcut 5.0 2.5 \\\\ outlierdownweighting 4".into()],
            ..SteeringParams::default()
        })
        .build()?;

    let truth = misaligned();
    let mut rng = StdRng::seed_from_u64(2024);
    let mut processor = AlignmentProcessor::open(&nominal(), params)?;
    for number in 0..n_events {
        processor.process_event(&event(&mut rng, &truth, 1, number))?;
    }
    let stats = processor.finish()?;

    info!(%stats, output = %out_dir, "synthetic run done");
    Ok(())
}
