//! # Alignment derivatives
//!
//! For every fitted track, every non-excluded plane holding a measured hit and every axis, the
//! builder produces one [`DerivativeRecord`]: the residual, its sigma, the derivatives with respect
//! to the four local track parameters and the derivatives with respect to the global alignment
//! parameters of that plane.
//!
//! ## Jacobians
//!
//! With `(x, y, z)` the hit, `(Δx, Δy, Δz)` the residual and `(dx, dy, dz) = hit − plane centre`:
//!
//! | axis | local `(b0, b1, c0, c1)` | global `(x, y, z, α, β, γ)` |
//! |------|--------------------------|-----------------------------|
//! | X    | `1, 0, z + Δz, 0`        | `−1, 0, 0, 0, −dz, dy`      |
//! | Y    | `0, 1, 0, z + Δz`        | `0, −1, 0, dz, 0, −dx`      |
//! | Z    | `0, 0, x + Δx, y + Δy`   | `0, 0, −1, −dy, dx, 0`      |
//!
//! The Z row keeps its coupling to the X and Y residuals.
//!
//! Only the dofs of the [`AlignmentMode`] are carried, in the mode's slot order. A fixed plane
//! carries no global derivative at all; a bit of a plane's fix mask removes that dof only.
//!
//! ## Emission order
//!
//! Planes in ascending z order, X then Y then Z, followed by one end-of-track marker.
use smallvec::SmallVec;

use crate::{
    alignment_mode::{AlignmentMode, DofKind},
    constants::{Label, Micrometer, SensorId, ZOrder, N_DOF, N_LOCAL_PARAMS},
    geometry::{Plane, PlaneCatalog},
    labels::AlignmentLabels,
    mille::RecordSink,
    telmille_errors::TelMilleError,
    track_fit::{FittedTrack, PlaneResidual},
};

/// Measurement axis of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Global derivatives of one record, `(label, derivative)`.
pub type GlobalDerivatives = SmallVec<[(Label, f64); N_DOF]>;

/// One weighted measurement for the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeRecord {
    pub sensor_id: SensorId,
    pub z_order: ZOrder,
    pub axis: Axis,
    /// Prediction − measurement (µm).
    pub residual: Micrometer,
    pub sigma: Micrometer,
    /// Derivatives with respect to `(b0, b1, c0, c1)`.
    pub local: [f64; N_LOCAL_PARAMS],
    pub global: GlobalDerivatives,
}

/// Builds derivative records for one run configuration.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeBuilder<'a> {
    catalog: &'a PlaneCatalog,
    labels: &'a AlignmentLabels,
    mode: AlignmentMode,
}

impl<'a> DerivativeBuilder<'a> {
    pub fn new(catalog: &'a PlaneCatalog, labels: &'a AlignmentLabels, mode: AlignmentMode) -> Self {
        DerivativeBuilder {
            catalog,
            labels,
            mode,
        }
    }

    /// Records of one track, in emission order.
    pub fn build(&self, track: &FittedTrack) -> Vec<DerivativeRecord> {
        let mut records = Vec::with_capacity(3 * track.planes.len());

        for entry in &track.planes {
            let Some(plane) = self.catalog.plane(entry.z_order) else {
                continue;
            };
            if plane.excluded {
                continue;
            }
            let Some(hit) = entry.hit.filter(|h| !h.is_placeholder()) else {
                continue;
            };

            let d = hit.to_vector() - plane.position;
            let r = &entry.residual;

            for axis in Axis::ALL {
                let (local, full_global) = match axis {
                    Axis::X => (
                        [1.0, 0.0, hit.z + r.z, 0.0],
                        [-1.0, 0.0, 0.0, 0.0, -d.z, d.y],
                    ),
                    Axis::Y => (
                        [0.0, 1.0, 0.0, hit.z + r.z],
                        [0.0, -1.0, 0.0, d.z, 0.0, -d.x],
                    ),
                    Axis::Z => (
                        [0.0, 0.0, hit.x + r.x, hit.y + r.y],
                        [0.0, 0.0, -1.0, -d.y, d.x, 0.0],
                    ),
                };

                records.push(DerivativeRecord {
                    sensor_id: plane.sensor_id,
                    z_order: plane.z_order,
                    axis,
                    residual: r[axis.index()],
                    sigma: plane.resolution[axis.index()],
                    local,
                    global: self.global_slots(plane, &full_global),
                });
            }
        }
        records
    }

    /// Build the records of one track, hand them to `sink` and close the track.
    ///
    /// Return
    /// ----------
    /// * Number of records written, or the sink's I/O error.
    pub fn build_and_emit<S: RecordSink + ?Sized>(
        &self,
        track: &FittedTrack,
        sink: &mut S,
    ) -> Result<usize, TelMilleError> {
        let records = self.build(track);
        for record in &records {
            sink.write_record(record)?;
        }
        sink.end_track()?;
        Ok(records.len())
    }

    fn global_slots(&self, plane: &Plane, full: &[f64; N_DOF]) -> GlobalDerivatives {
        free_dofs(plane, self.mode)
            .into_iter()
            .filter_map(|dof| {
                self.labels
                    .label(plane.sensor_id, dof)
                    .map(|label| (label, full[dof.index()]))
            })
            .collect()
    }
}

/// Active dofs of a plane after applying its fix flags.
pub fn free_dofs(plane: &Plane, mode: AlignmentMode) -> SmallVec<[DofKind; N_DOF]> {
    if plane.fixed {
        return SmallVec::new();
    }
    mode.active_dofs()
        .iter()
        .copied()
        .filter(|dof| plane.fixed_dof_mask & dof.mask_bit() == 0)
        .collect()
}

impl PlaneResidual {
    /// True when this plane contributes derivative records.
    pub fn contributes(&self, plane: &Plane) -> bool {
        !plane.excluded && self.hit.is_some_and(|h| !h.is_placeholder())
    }
}

#[cfg(test)]
mod derivative_builder_tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;
    use crate::{
        geometry::TelescopeLayout,
        hits::Hit,
        mille::MemorySink,
        params::AlignParams,
        track_fit::FittedTrack,
    };

    fn setup(params: &AlignParams) -> (PlaneCatalog, AlignmentLabels) {
        let layout = TelescopeLayout::straight(&[(0, 0.0), (1, 100.0), (2, 200.0)], 0.02)
            .sensors()
            .iter()
            .cloned()
            .map(|s| {
                if s.sensor_id == 1 {
                    s.with_offset(2.0, -1.0)
                } else {
                    s
                }
            })
            .collect();
        let catalog = PlaneCatalog::new(&TelescopeLayout::new(layout), params).unwrap();
        let labels = AlignmentLabels::allocate(&catalog.sensor_ids());
        (catalog, labels)
    }

    fn track(catalog: &PlaneCatalog) -> FittedTrack {
        let mut planes = PlaneResidual::empty_planes(catalog);
        for (i, entry) in planes.iter_mut().enumerate() {
            let z = i as f64 * 100_000.0;
            entry.hit = Some(Hit::new(2_100.0, -950.0, z));
            entry.residual = Vector3::new(1.5, -0.5, 0.25);
        }
        FittedTrack { line: None, planes }
    }

    #[test]
    fn jacobian_rows_for_full_mode() {
        let (catalog, labels) = setup(&AlignParams::default());
        let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYZShiftXZRotYZRotXYRot);

        let records = builder.build(&track(&catalog));
        assert_eq!(records.len(), 9);

        // plane 1 sits at (2000, -1000, 100000) µm
        let x = &records[3];
        assert_eq!((x.sensor_id, x.axis), (1, Axis::X));
        assert_eq!(x.local, [1.0, 0.0, 100_000.25, 0.0]);
        assert_relative_eq!(x.residual, 1.5);
        // slot order X, Y, γ, Z, β, α
        let derivs: Vec<f64> = x.global.iter().map(|(_, d)| *d).collect();
        assert_eq!(derivs, vec![-1.0, 0.0, 50.0, 0.0, -0.0, 0.0]);

        let y = &records[4];
        let derivs: Vec<f64> = y.global.iter().map(|(_, d)| *d).collect();
        assert_eq!(derivs, vec![0.0, -1.0, -100.0, 0.0, 0.0, 0.0]);
        assert_eq!(y.local, [0.0, 1.0, 0.0, 100_000.25]);

        let z = &records[5];
        let derivs: Vec<f64> = z.global.iter().map(|(_, d)| *d).collect();
        assert_eq!(derivs, vec![0.0, 0.0, 0.0, -1.0, 100.0, -50.0]);
        assert_eq!(z.local, [0.0, 0.0, 2_101.5, -950.5]);
    }

    #[test]
    fn labels_follow_the_mode_slots() {
        let (catalog, labels) = setup(&AlignParams::default());
        let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYShiftXYRot);

        let records = builder.build(&track(&catalog));
        let used: Vec<Label> = records[0].global.iter().map(|(l, _)| *l).collect();
        assert_eq!(used, labels.labels_for(0, AlignmentMode::XYShiftXYRot).unwrap().to_vec());
        assert!(records.iter().all(|r| r.global.len() == 3));
    }

    #[test]
    fn fixed_planes_and_masks_drop_globals() {
        let params = AlignParams::builder()
            .fixed_sensor_ids(vec![0])
            .fix_parameter_masks(vec![0, DofKind::RotZ.mask_bit(), 0])
            .build()
            .unwrap();
        let (catalog, labels) = setup(&params);
        let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYShiftXYRot);
        let records = builder.build(&track(&catalog));

        assert!(records[..3].iter().all(|r| r.global.is_empty()));
        assert!(records[3..6].iter().all(|r| r.global.len() == 2));
        assert!(records[6..].iter().all(|r| r.global.len() == 3));
        assert!(free_dofs(catalog.plane(0).unwrap(), AlignmentMode::XYShiftXYRot).is_empty());
        assert_eq!(
            free_dofs(catalog.plane(1).unwrap(), AlignmentMode::XYShiftXYRot).as_slice(),
            &[DofKind::ShiftX, DofKind::ShiftY]
        );
    }

    #[test]
    fn absent_placeholder_and_excluded_planes_are_skipped() {
        let params = AlignParams::builder().excluded_sensor_ids(vec![2]).build().unwrap();
        let (catalog, labels) = setup(&params);
        let mut track = track(&catalog);
        track.planes[0].hit = Some(Hit::new(0.0, 0.0, 0.0));

        let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYShift);
        let records = builder.build(&track);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.sensor_id == 1));
        assert!(!track.planes[2].contributes(catalog.plane(2).unwrap()));
    }

    #[test]
    fn emission_closes_the_track() {
        let (catalog, labels) = setup(&AlignParams::default());
        let builder = DerivativeBuilder::new(&catalog, &labels, AlignmentMode::XYShift);
        let mut sink = MemorySink::default();

        let written = builder.build_and_emit(&track(&catalog), &mut sink).unwrap();

        assert_eq!(written, 9);
        assert_eq!(sink.tracks().len(), 1);
        let axes: Vec<Axis> = sink.tracks()[0].iter().take(3).map(|r| r.axis).collect();
        assert_eq!(axes, vec![Axis::X, Axis::Y, Axis::Z]);
        let resolution = catalog.plane(0).unwrap().resolution;
        assert_relative_eq!(sink.tracks()[0][2].sigma, resolution.z);
    }
}
