#![allow(dead_code)]

use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, Normal};
use telmille::{
    constants::SensorId,
    geometry::TelescopeLayout,
    hits::{Event, PrefittedTrack, RawHit},
};

/// Six-plane telescope, 150 mm spacing, sensor ids 0..=5 in beam order.
pub const Z_MM: [f64; 6] = [0.0, 150.0, 300.0, 450.0, 600.0, 750.0];
pub const PITCH_MM: f64 = 0.0184;
pub const HIT_COLLECTION: &str = "corrhits";

pub fn telescope() -> TelescopeLayout {
    let planes: Vec<(SensorId, f64)> = Z_MM
        .iter()
        .enumerate()
        .map(|(i, &z)| (i as SensorId, z))
        .collect();
    TelescopeLayout::straight(&planes, PITCH_MM)
}

/// Straight line `x = x0 + tx·z`, `y = y0 + ty·z` (mm).
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub x0: f64,
    pub y0: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Line {
    pub fn new(x0: f64, y0: f64, tx: f64, ty: f64) -> Self {
        Line { x0, y0, tx, ty }
    }

    pub fn random(rng: &mut StdRng) -> Self {
        Line {
            x0: rng.random_range(-5.0..5.0),
            y0: rng.random_range(-2.5..2.5),
            tx: rng.random_range(-5e-4..5e-4),
            ty: rng.random_range(-5e-4..5e-4),
        }
    }

    pub fn at(&self, z: f64) -> (f64, f64) {
        (self.x0 + self.tx * z, self.y0 + self.ty * z)
    }

    /// One measured hit per plane.
    pub fn hits(&self) -> Vec<RawHit> {
        Z_MM.iter()
            .enumerate()
            .map(|(i, &z)| {
                let (x, y) = self.at(z);
                RawHit::measured(i as SensorId, x, y, z)
            })
            .collect()
    }

    /// One measured hit per plane, smeared by `sigma_um` in x and y.
    pub fn smeared_hits(&self, rng: &mut StdRng, sigma_um: f64) -> Vec<RawHit> {
        let noise = Normal::new(0.0, sigma_um * 1e-3).unwrap();
        self.hits()
            .into_iter()
            .map(|mut h| {
                h.position_mm.x += noise.sample(rng);
                h.position_mm.y += noise.sample(rng);
                h
            })
            .collect()
    }

    /// Measured hits plus their exact fitted counterparts, as an upstream tracker would
    /// hand them over.
    pub fn prefitted(&self, rng: &mut StdRng, sigma_um: f64) -> PrefittedTrack {
        let mut hits = self.smeared_hits(rng, sigma_um);
        hits.extend(Z_MM.iter().enumerate().map(|(i, &z)| {
            let (x, y) = self.at(z);
            RawHit::fitted(i as SensorId, x, y, z)
        }));
        PrefittedTrack { hits }
    }
}

pub fn event_with_hits(event: i64, hits: Vec<RawHit>) -> Event {
    Event::new(1, event).with_hits(HIT_COLLECTION, hits)
}

/// `n` events of one random, smeared track each.
pub fn random_events(rng: &mut StdRng, n: usize, sigma_um: f64) -> Vec<Event> {
    (0..n)
        .map(|i| {
            let hits = Line::random(rng).smeared_hits(rng, sigma_um);
            event_with_hits(i as i64, hits)
        })
        .collect()
}
