//! # Geometry description of the telescope
//!
//! The processor never reads a geometry file itself. It only needs, for every sensor plane,
//! the position of its centre, the directions of its local axes in the global frame and its
//! pixel pitch. [`GeometryProvider`] is that narrow interface; [`TelescopeLayout`] is an
//! in-memory implementation used by the tests, the benches and the demo.
//!
//! All lengths handed over by a provider are in **millimetres**.
use nalgebra::{Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::{Millimeter, SensorId};

/// Read access to the static description of the telescope planes.
///
/// Every method taking a sensor id returns `None` when the provider has no entry for it.
/// [`PlaneCatalog::new`](crate::geometry::PlaneCatalog::new) turns a missing entry into a
/// configuration error.
pub trait GeometryProvider {
    /// Identifiers of all planes, in any order.
    fn sensor_ids(&self) -> Vec<SensorId>;

    /// Position of the plane centre in the global frame (mm).
    fn position_mm(&self, sensor_id: SensorId) -> Option<Vector3<Millimeter>>;

    /// Direction of the local X axis in the global frame.
    fn x_axis(&self, sensor_id: SensorId) -> Option<Vector3<f64>>;

    /// Direction of the local Y axis in the global frame.
    fn y_axis(&self, sensor_id: SensorId) -> Option<Vector3<f64>>;

    /// Pixel pitch along the local X and Y axes (mm).
    fn pixel_pitch_mm(&self, sensor_id: SensorId) -> Option<Vector2<Millimeter>>;
}

/// One sensor plane of a [`TelescopeLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLayout {
    pub sensor_id: SensorId,
    /// Centre of the plane (mm).
    pub position_mm: Vector3<Millimeter>,
    /// Orientation of the local frame with respect to the global frame.
    pub orientation: Rotation3<f64>,
    /// Pixel pitch (mm).
    pub pitch_mm: Vector2<Millimeter>,
}

impl SensorLayout {
    /// Plane perpendicular to the beam axis at `z_mm`.
    pub fn at_z(sensor_id: SensorId, z_mm: Millimeter, pitch_mm: Millimeter) -> Self {
        SensorLayout {
            sensor_id,
            position_mm: Vector3::new(0.0, 0.0, z_mm),
            orientation: Rotation3::identity(),
            pitch_mm: Vector2::new(pitch_mm, pitch_mm),
        }
    }

    /// Shift the plane centre in the transverse plane (mm).
    pub fn with_offset(mut self, x_mm: Millimeter, y_mm: Millimeter) -> Self {
        self.position_mm.x = x_mm;
        self.position_mm.y = y_mm;
        self
    }

    /// Tilt the plane by the rotation angles α, β, γ (rad) about the X, Y and Z axes.
    pub fn with_tilt(mut self, alpha: f64, beta: f64, gamma: f64) -> Self {
        self.orientation = Rotation3::from_euler_angles(alpha, beta, gamma);
        self
    }
}

/// In-memory [`GeometryProvider`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelescopeLayout {
    sensors: Vec<SensorLayout>,
}

impl TelescopeLayout {
    pub fn new(sensors: Vec<SensorLayout>) -> Self {
        TelescopeLayout { sensors }
    }

    /// Planes perpendicular to the beam, one per `(sensor_id, z_mm)` pair, sharing one pitch.
    pub fn straight(planes: &[(SensorId, Millimeter)], pitch_mm: Millimeter) -> Self {
        TelescopeLayout {
            sensors: planes
                .iter()
                .map(|&(id, z)| SensorLayout::at_z(id, z, pitch_mm))
                .collect(),
        }
    }

    pub fn push(&mut self, sensor: SensorLayout) {
        self.sensors.push(sensor);
    }

    pub fn sensors(&self) -> &[SensorLayout] {
        &self.sensors
    }

    fn sensor(&self, sensor_id: SensorId) -> Option<&SensorLayout> {
        self.sensors.iter().find(|s| s.sensor_id == sensor_id)
    }
}

impl GeometryProvider for TelescopeLayout {
    fn sensor_ids(&self) -> Vec<SensorId> {
        self.sensors.iter().map(|s| s.sensor_id).collect()
    }

    fn position_mm(&self, sensor_id: SensorId) -> Option<Vector3<Millimeter>> {
        self.sensor(sensor_id).map(|s| s.position_mm)
    }

    fn x_axis(&self, sensor_id: SensorId) -> Option<Vector3<f64>> {
        self.sensor(sensor_id).map(|s| s.orientation * Vector3::x())
    }

    fn y_axis(&self, sensor_id: SensorId) -> Option<Vector3<f64>> {
        self.sensor(sensor_id).map(|s| s.orientation * Vector3::y())
    }

    fn pixel_pitch_mm(&self, sensor_id: SensorId) -> Option<Vector2<Millimeter>> {
        self.sensor(sensor_id).map(|s| s.pitch_mm)
    }
}
