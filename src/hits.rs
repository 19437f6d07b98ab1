//! # Event hits
//!
//! Event-side data handed to the processor and the per-event hit store built from it.
//!
//! - [`RawHit`], [`PrefittedTrack`]: hits and tracks as delivered by the upstream stages,
//!   in millimetres and keyed by sensor id.
//! - [`EventData`]: narrow read interface to one event; [`Event`] is an in-memory implementation.
//! - [`Hit`], [`HitStore`]: hits converted to micrometres and bucketed by plane z order. The
//!   store lives for one event.
use ahash::AHashMap;
use nalgebra::Vector3;
use tracing::warn;

use crate::{
    constants::{Micrometer, Millimeter, SensorId, ZOrder, MM_TO_UM, PLACEHOLDER_EPS},
    geometry::PlaneCatalog,
};

/// Bit of [`RawHit::properties`] flagging a hit produced by a track fit.
pub const FITTED_HIT: u32 = 0b10;

/// Hit as delivered by the hit-making stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawHit {
    pub sensor_id: SensorId,
    /// Global position (mm).
    pub position_mm: Vector3<Millimeter>,
    /// Bit field; only [`FITTED_HIT`] is interpreted.
    pub properties: u32,
}

impl RawHit {
    pub fn measured(sensor_id: SensorId, x: Millimeter, y: Millimeter, z: Millimeter) -> Self {
        RawHit {
            sensor_id,
            position_mm: Vector3::new(x, y, z),
            properties: 0,
        }
    }

    pub fn fitted(sensor_id: SensorId, x: Millimeter, y: Millimeter, z: Millimeter) -> Self {
        RawHit {
            properties: FITTED_HIT,
            ..RawHit::measured(sensor_id, x, y, z)
        }
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.properties & FITTED_HIT != 0
    }
}

/// Track fitted by an upstream tracking stage: its measured hits and the fit intersection with
/// every plane it crossed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefittedTrack {
    pub hits: Vec<RawHit>,
}

/// Read access to one event.
pub trait EventData {
    fn run_number(&self) -> i32;
    fn event_number(&self) -> i64;
    /// Hits of a named collection, `None` when the event does not hold it.
    fn hit_collection(&self, name: &str) -> Option<&[RawHit]>;
    /// Tracks of a named collection, `None` when the event does not hold it.
    fn track_collection(&self, name: &str) -> Option<&[PrefittedTrack]>;
}

/// In-memory [`EventData`].
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub run: i32,
    pub event: i64,
    hit_collections: AHashMap<String, Vec<RawHit>>,
    track_collections: AHashMap<String, Vec<PrefittedTrack>>,
}

impl Event {
    pub fn new(run: i32, event: i64) -> Self {
        Event {
            run,
            event,
            ..Event::default()
        }
    }

    pub fn with_hits(mut self, name: impl Into<String>, hits: Vec<RawHit>) -> Self {
        self.hit_collections.insert(name.into(), hits);
        self
    }

    pub fn with_tracks(mut self, name: impl Into<String>, tracks: Vec<PrefittedTrack>) -> Self {
        self.track_collections.insert(name.into(), tracks);
        self
    }
}

impl EventData for Event {
    fn run_number(&self) -> i32 {
        self.run
    }

    fn event_number(&self) -> i64 {
        self.event
    }

    fn hit_collection(&self, name: &str) -> Option<&[RawHit]> {
        self.hit_collections.get(name).map(Vec::as_slice)
    }

    fn track_collection(&self, name: &str) -> Option<&[PrefittedTrack]> {
        self.track_collections.get(name).map(Vec::as_slice)
    }
}

/// Space point in the global frame (µm).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hit {
    pub x: Micrometer,
    pub y: Micrometer,
    pub z: Micrometer,
}

impl Hit {
    pub fn new(x: Micrometer, y: Micrometer, z: Micrometer) -> Self {
        Hit { x, y, z }
    }

    pub fn from_mm(position_mm: &Vector3<Millimeter>) -> Self {
        let p = position_mm * MM_TO_UM;
        Hit::new(p.x, p.y, p.z)
    }

    /// A hit with X and Y both numerically zero stands for "no measurement".
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.x.abs() < PLACEHOLDER_EPS && self.y.abs() < PLACEHOLDER_EPS
    }

    #[inline]
    pub fn to_vector(self) -> Vector3<Micrometer> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Hits of one event, bucketed by plane z order, in arrival order inside each plane.
#[derive(Debug, Clone, Default)]
pub struct HitStore {
    planes: Vec<Vec<Hit>>,
}

impl HitStore {
    pub fn new(n_planes: usize) -> Self {
        HitStore {
            planes: vec![Vec::new(); n_planes],
        }
    }

    /// Append `hit` to the bucket of plane `z_order`.
    ///
    /// # Panics
    /// If `z_order` is not a plane of the store.
    pub fn push(&mut self, z_order: ZOrder, hit: Hit) {
        self.planes[z_order].push(hit);
    }

    /// Convert a raw hit to µm and file it under its plane.
    ///
    /// Returns `false`, with a warning, when the sensor id is not part of the catalog.
    pub fn insert_raw(&mut self, catalog: &PlaneCatalog, raw: &RawHit) -> bool {
        match catalog.z_order_of(raw.sensor_id) {
            Some(z_order) if z_order < self.planes.len() => {
                self.push(z_order, Hit::from_mm(&raw.position_mm));
                true
            }
            _ => {
                warn!(sensor_id = raw.sensor_id, "hit on an unknown sensor dropped");
                false
            }
        }
    }

    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    /// Hits on plane `z_order`; empty for an unknown plane.
    pub fn hits_on(&self, z_order: ZOrder) -> &[Hit] {
        self.planes.get(z_order).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hit(&self, z_order: ZOrder, index: usize) -> Option<&Hit> {
        self.planes.get(z_order).and_then(|p| p.get(index))
    }

    pub fn total_hits(&self) -> usize {
        self.planes.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod hits_tests {
    use super::*;
    use crate::{geometry::TelescopeLayout, params::AlignParams};

    #[test]
    fn raw_hits_are_bucketed_by_z_order_in_micrometres() {
        let layout = TelescopeLayout::straight(&[(5, 100.0), (1, 0.0)], 0.02);
        let catalog = PlaneCatalog::new(&layout, &AlignParams::default()).unwrap();
        let mut store = HitStore::new(catalog.len());

        assert!(store.insert_raw(&catalog, &RawHit::measured(5, 0.5, -0.25, 100.0)));
        assert!(store.insert_raw(&catalog, &RawHit::measured(1, 0.125, 0.375, 0.0)));
        assert!(!store.insert_raw(&catalog, &RawHit::measured(9, 0.1, 0.2, 50.0)));

        assert_eq!(store.total_hits(), 2);
        assert_eq!(store.hits_on(1), &[Hit::new(500.0, -250.0, 100_000.0)]);
        assert_eq!(store.hit(0, 0), Some(&Hit::new(125.0, 375.0, 0.0)));
        assert!(store.hits_on(4).is_empty());
    }

    #[test]
    fn placeholder_and_fitted_flags() {
        assert!(Hit::new(0.0, 0.0, 150_000.0).is_placeholder());
        assert!(!Hit::new(0.0, 3.0, 150_000.0).is_placeholder());

        assert!(RawHit::fitted(0, 0.0, 0.0, 0.0).is_fitted());
        assert!(!RawHit::measured(0, 0.0, 0.0, 0.0).is_fitted());
        assert!(!RawHit {
            properties: 0b101,
            ..RawHit::measured(0, 0.0, 0.0, 0.0)
        }
        .is_fitted());
    }

    #[test]
    fn event_collections_by_name() {
        let event = Event::new(12, 3)
            .with_hits("corrhits", vec![RawHit::measured(0, 1.0, 1.0, 0.0)])
            .with_tracks("fittracks", vec![PrefittedTrack::default()]);

        assert_eq!(event.hit_collection("corrhits").map(<[_]>::len), Some(1));
        assert!(event.hit_collection("other").is_none());
        assert_eq!(event.track_collection("fittracks").map(<[_]>::len), Some(1));
        assert_eq!((event.run_number(), event.event_number()), (12, 3));
    }
}
