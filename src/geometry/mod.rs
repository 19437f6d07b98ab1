//! # Plane catalog
//!
//! Static, per-run description of the telescope planes, ordered along the beam axis.
//!
//! ## Overview
//!
//! [`PlaneCatalog::new`] reads a [`GeometryProvider`] once at run start, merges it with the
//! per-plane arrays of [`AlignParams`] and produces one immutable [`Plane`] per sensor:
//!
//! - planes are sorted by their **z order**, the number of planes whose centre lies upstream
//!   (`z + 1e-6 mm < own z`),
//! - positions are converted from millimetres to **micrometres**,
//! - resolutions, residual windows, exclusion and fix flags are resolved per plane.
//!
//! A sensor id ↔ z-order [`BiMap`] backs the lookups used by the hit store, the pre-fitted
//! residual extraction and the label allocator.
//!
//! ## Fallbacks
//!
//! | input                                | behaviour                                                  |
//! |--------------------------------------|------------------------------------------------------------|
//! | all resolution arrays empty          | σx, σy = pitch·1000/√12, σz = `telescope_resolution`       |
//! | a resolution array of wrong length   | warning, `telescope_resolution` on every plane and axis    |
//! | fix masks empty                      | every dof free                                             |
//! | fix masks of wrong length            | warning, every dof free                                    |
//! | residual windows empty               | unbounded                                                  |
//! | residual windows of wrong length     | [`TelMilleError::ArrayLengthMismatch`]                     |
//!
//! The catalog is read-only after construction and can be shared between threads.
pub mod bimap;
pub mod layout;

use itertools::Itertools;
use nalgebra::{Vector2, Vector3};
use tracing::{debug, warn};

use crate::{
    constants::{Micrometer, Millimeter, SensorId, ZOrder, MM_TO_UM, Z_ORDER_EPS},
    params::AlignParams,
    telmille_errors::TelMilleError,
};

pub use bimap::BiMap;
pub use layout::{GeometryProvider, SensorLayout, TelescopeLayout};

/// Acceptance window on hit differences and residuals of one plane (µm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualWindow {
    pub x_min: Micrometer,
    pub x_max: Micrometer,
    pub y_min: Micrometer,
    pub y_max: Micrometer,
}

impl ResidualWindow {
    /// Window accepting everything.
    pub const UNBOUNDED: ResidualWindow = ResidualWindow {
        x_min: f64::NEG_INFINITY,
        x_max: f64::INFINITY,
        y_min: f64::NEG_INFINITY,
        y_max: f64::INFINITY,
    };

    /// True when both values lie inside the window, bounds included.
    #[inline]
    pub fn contains(&self, x: Micrometer, y: Micrometer) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// One sensor plane, as seen by the track search, the fitter and the derivative builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub z_order: ZOrder,
    pub sensor_id: SensorId,
    /// Measurement resolution (σx, σy, σz) in µm.
    pub resolution: Vector3<Micrometer>,
    /// Left out of the fit and of the derivatives.
    pub excluded: bool,
    /// Carries no global derivatives.
    pub fixed: bool,
    /// Bit `k` set ⇒ dof `k` (see [`DofKind`](crate::alignment_mode::DofKind)) is fixed.
    pub fixed_dof_mask: u8,
    /// Plane centre (µm).
    pub position: Vector3<Micrometer>,
    pub x_axis: Vector3<f64>,
    pub y_axis: Vector3<f64>,
    pub normal: Vector3<f64>,
    /// Pixel pitch (mm).
    pub pixel_pitch: Vector2<Millimeter>,
    pub residual_window: ResidualWindow,
}

/// Raw per-sensor geometry before ordering.
struct SensorEntry {
    sensor_id: SensorId,
    position_mm: Vector3<Millimeter>,
    x_axis: Vector3<f64>,
    y_axis: Vector3<f64>,
    pitch_mm: Vector2<Millimeter>,
}

/// Immutable, z-ordered collection of the telescope planes.
#[derive(Debug, Clone)]
pub struct PlaneCatalog {
    planes: Vec<Plane>,
    ids: BiMap<SensorId, ZOrder>,
    has_residual_windows: bool,
}

impl PlaneCatalog {
    /// Build the catalog from a geometry description and the run parameters.
    ///
    /// Arguments
    /// -----------------
    /// * `geometry`: provider of plane positions, axes and pitches (mm).
    /// * `params`: validated run parameters; per-plane arrays are read in z order.
    ///
    /// Return
    /// ----------
    /// * The catalog, or a configuration error:
    ///   [`EmptyGeometry`](TelMilleError::EmptyGeometry),
    ///   [`MissingGeometry`](TelMilleError::MissingGeometry),
    ///   [`CoincidentPlanes`](TelMilleError::CoincidentPlanes),
    ///   [`DuplicateSensorId`](TelMilleError::DuplicateSensorId),
    ///   [`ArrayLengthMismatch`](TelMilleError::ArrayLengthMismatch) for the residual windows and
    ///   the user start values,
    ///   [`UnknownSensorId`](TelMilleError::UnknownSensorId) for the fixed and excluded lists.
    pub fn new<G: GeometryProvider + ?Sized>(
        geometry: &G,
        params: &AlignParams,
    ) -> Result<Self, TelMilleError> {
        let entries = read_entries(geometry)?;
        let n = entries.len();

        let ordered = order_along_beam(entries)?;

        let has_residual_windows = params.has_residual_windows();
        if has_residual_windows {
            check_length("residual_x_min", &params.residual_x_min, n)?;
            check_length("residual_x_max", &params.residual_x_max, n)?;
            check_length("residual_y_min", &params.residual_y_min, n)?;
            check_length("residual_y_max", &params.residual_y_max, n)?;
        } else if let Some((name, values)) = [
            ("residual_x_max", &params.residual_x_max),
            ("residual_y_min", &params.residual_y_min),
            ("residual_y_max", &params.residual_y_max),
        ]
        .into_iter()
        .find(|(_, values)| !values.is_empty())
        {
            return Err(TelMilleError::ArrayLengthMismatch {
                name,
                expected: 0,
                found: values.len(),
            });
        }
        if let Some(start) = params
            .steering
            .as_ref()
            .and_then(|s| s.user_start_values.as_ref())
        {
            if start.len() != n {
                return Err(TelMilleError::ArrayLengthMismatch {
                    name: "user_start_values",
                    expected: n,
                    found: start.len(),
                });
            }
        }

        let mut ids = BiMap::with_capacity(n);
        for (z_order, entry) in ordered.iter().enumerate() {
            ids.try_insert(entry.sensor_id, z_order)
                .map_err(TelMilleError::DuplicateSensorId)?;
        }
        for id in params
            .excluded_sensor_ids
            .iter()
            .chain(&params.fixed_sensor_ids)
        {
            if !ids.contains_key(id) {
                return Err(TelMilleError::UnknownSensorId(*id));
            }
        }

        let resolutions = resolve_resolutions(&ordered, params);
        let masks = resolve_fix_masks(n, &params.fix_parameter_masks);

        let planes = ordered
            .into_iter()
            .enumerate()
            .map(|(z_order, e)| {
                let residual_window = if has_residual_windows {
                    ResidualWindow {
                        x_min: params.residual_x_min[z_order],
                        x_max: params.residual_x_max[z_order],
                        y_min: params.residual_y_min[z_order],
                        y_max: params.residual_y_max[z_order],
                    }
                } else {
                    ResidualWindow::UNBOUNDED
                };

                Plane {
                    z_order,
                    sensor_id: e.sensor_id,
                    resolution: resolutions[z_order],
                    excluded: params.excluded_sensor_ids.contains(&e.sensor_id),
                    fixed: params.fixed_sensor_ids.contains(&e.sensor_id),
                    fixed_dof_mask: masks[z_order],
                    position: e.position_mm * MM_TO_UM,
                    normal: e.x_axis.cross(&e.y_axis).normalize(),
                    x_axis: e.x_axis,
                    y_axis: e.y_axis,
                    pixel_pitch: e.pitch_mm,
                    residual_window,
                }
            })
            .collect::<Vec<_>>();

        for p in &planes {
            debug!(
                sensor_id = p.sensor_id,
                z_order = p.z_order,
                z_um = p.position.z,
                excluded = p.excluded,
                fixed = p.fixed,
                "plane registered"
            );
        }

        Ok(PlaneCatalog {
            planes,
            ids,
            has_residual_windows,
        })
    }

    /// Number of planes, excluded ones included.
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// All planes, in z order.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, z_order: ZOrder) -> Option<&Plane> {
        self.planes.get(z_order)
    }

    pub fn z_order_of(&self, sensor_id: SensorId) -> Option<ZOrder> {
        self.ids.get_by_key(&sensor_id)
    }

    pub fn sensor_at(&self, z_order: ZOrder) -> Option<SensorId> {
        self.ids.get_by_value(&z_order)
    }

    pub fn plane_by_sensor(&self, sensor_id: SensorId) -> Option<&Plane> {
        self.z_order_of(sensor_id).and_then(|z| self.plane(z))
    }

    /// Sensor ids in z order.
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.planes.iter().map(|p| p.sensor_id).collect()
    }

    /// Planes taking part in the fit.
    pub fn active_planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes.iter().filter(|p| !p.excluded)
    }

    pub fn has_residual_windows(&self) -> bool {
        self.has_residual_windows
    }
}

fn read_entries<G: GeometryProvider + ?Sized>(
    geometry: &G,
) -> Result<Vec<SensorEntry>, TelMilleError> {
    let ids = geometry.sensor_ids();
    if ids.is_empty() {
        return Err(TelMilleError::EmptyGeometry);
    }
    if let Some(&id) = ids.iter().duplicates().next() {
        return Err(TelMilleError::DuplicateSensorId(id));
    }

    ids.into_iter()
        .map(|sensor_id| {
            let missing = |what| TelMilleError::MissingGeometry { sensor_id, what };

            let position_mm = geometry.position_mm(sensor_id).ok_or(missing("position"))?;
            let x_axis = geometry.x_axis(sensor_id).ok_or(missing("x axis"))?;
            let y_axis = geometry.y_axis(sensor_id).ok_or(missing("y axis"))?;
            let pitch_mm = geometry
                .pixel_pitch_mm(sensor_id)
                .ok_or(missing("pixel pitch"))?;

            if x_axis.cross(&y_axis).norm() < 1e-12 {
                return Err(missing("independent x and y axes"));
            }

            Ok(SensorEntry {
                sensor_id,
                position_mm,
                x_axis,
                y_axis,
                pitch_mm,
            })
        })
        .collect()
}

/// Sort the sensors by z order, rejecting planes that share a z position.
fn order_along_beam(entries: Vec<SensorEntry>) -> Result<Vec<SensorEntry>, TelMilleError> {
    let z: Vec<Millimeter> = entries.iter().map(|e| e.position_mm.z).collect();
    let mut keyed: Vec<(ZOrder, SensorEntry)> = Vec::with_capacity(entries.len());

    for (i, entry) in entries.into_iter().enumerate() {
        let rank = z.iter().filter(|&&other| other + Z_ORDER_EPS < z[i]).count();
        if let Some((_, clash)) = keyed.iter().find(|(r, _)| *r == rank) {
            return Err(TelMilleError::CoincidentPlanes {
                first: clash.sensor_id,
                second: entry.sensor_id,
            });
        }
        keyed.push((rank, entry));
    }

    keyed.sort_by_key(|(rank, _)| *rank);
    Ok(keyed.into_iter().map(|(_, e)| e).collect())
}

fn check_length(name: &'static str, values: &[f64], expected: usize) -> Result<(), TelMilleError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(TelMilleError::ArrayLengthMismatch {
            name,
            expected,
            found: values.len(),
        })
    }
}

fn resolve_resolutions(ordered: &[SensorEntry], params: &AlignParams) -> Vec<Vector3<Micrometer>> {
    let n = ordered.len();
    let (rx, ry, rz) = (
        &params.resolution_x,
        &params.resolution_y,
        &params.resolution_z,
    );
    let telescope = params.telescope_resolution;

    if rx.is_empty() && ry.is_empty() && rz.is_empty() {
        let binary = 12f64.sqrt();
        return ordered
            .iter()
            .map(|e| {
                Vector3::new(
                    e.pitch_mm.x * MM_TO_UM / binary,
                    e.pitch_mm.y * MM_TO_UM / binary,
                    telescope,
                )
            })
            .collect();
    }

    if rx.len() != n || ry.len() != n || rz.len() != n {
        warn!(
            planes = n,
            resolution_x = rx.len(),
            resolution_y = ry.len(),
            resolution_z = rz.len(),
            telescope_resolution = telescope,
            "resolution arrays do not match the number of planes, using the telescope resolution"
        );
        return vec![Vector3::repeat(telescope); n];
    }

    (0..n).map(|i| Vector3::new(rx[i], ry[i], rz[i])).collect()
}

fn resolve_fix_masks(n: usize, masks: &[u8]) -> Vec<u8> {
    if masks.len() == n {
        return masks.to_vec();
    }
    if !masks.is_empty() {
        warn!(
            planes = n,
            masks = masks.len(),
            "fix_parameter_masks do not match the number of planes, all dofs are left free"
        );
    }
    vec![0; n]
}
