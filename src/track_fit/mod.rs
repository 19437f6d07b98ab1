//! # Straight-line track fit
//!
//! Turns a track candidate into a [`FittedTrack`]: fitted line parameters plus one
//! [`PlaneResidual`] per plane.
//!
//! ## Track model
//!
//! A line is described by four parameters `(b0, b1, δ, ψ)`: its crossing point `b = (b0, b1, 0)`
//! with the `z = 0` plane (µm) and two angles giving the unit direction
//!
//! ```text
//! c = ( sin ψ,  −cos ψ · sin δ,  cos δ · cos ψ )
//! ```
//!
//! ## Procedure
//!
//! 1. **Point set**: one point per non-excluded plane. Absent or placeholder hits stay in the
//!    set at a placeholder position with σ = 10⁶ µm on every axis.
//! 2. **Hit-count gate**: `planes − measured > max_missing` ⇒ [`InsufficientHits`].
//! 3. **Seed**: linear regression of x and y on z ([`seed::analytic_seed`]).
//! 4. **Refinement**: minimize
//!    `χ² = Σ (tx/σx)² + (ty/σy)² + (tz/σz)²` with `t = b + c·((p − b)·c) − p`
//!    through a [`Minimizer`]; non-convergence ⇒ [`FitNotConverged`].
//! 5. **Residuals**: intersect the line with every plane
//!    ([`intersection::intersect`]); residual = intersection − hit.
//!
//! Tracks fitted upstream skip steps 1–5; their residuals are read from the track itself
//! ([`prefitted::extract_residuals`]).
//!
//! [`InsufficientHits`]: TelMilleError::InsufficientHits
//! [`FitNotConverged`]: TelMilleError::FitNotConverged
pub mod intersection;
pub mod minimizer;
pub mod prefitted;
pub mod seed;

use nalgebra::{Vector3, Vector4};

use crate::{
    constants::{Micrometer, SensorId, ZOrder, NO_MEASUREMENT_SIGMA},
    geometry::PlaneCatalog,
    hits::{Hit, PrefittedTrack},
    telmille_errors::TelMilleError,
};

pub use minimizer::{DampedNewton, LineParameters, Minimizer, MinimizerOutcome};

/// One entry of the χ² point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPoint {
    pub position: Vector3<Micrometer>,
    pub sigma: Vector3<Micrometer>,
    /// `false` for a placeholder standing in for a missing measurement.
    pub measured: bool,
}

impl FitPoint {
    pub fn measured(position: Vector3<Micrometer>, sigma: Vector3<Micrometer>) -> Self {
        FitPoint {
            position,
            sigma,
            measured: true,
        }
    }

    pub fn placeholder(position: Vector3<Micrometer>) -> Self {
        FitPoint {
            position,
            sigma: Vector3::repeat(NO_MEASUREMENT_SIGMA),
            measured: false,
        }
    }
}

/// χ² of a line against a point set.
pub fn line_chi2(points: &[FitPoint], parameters: &LineParameters) -> f64 {
    let line = FittedLine::from_parameters(parameters);
    let b = line.origin();
    let c = line.direction();
    points
        .iter()
        .map(|p| {
            let t = b + c * (p.position - b).dot(&c) - p.position;
            t.component_div(&p.sigma).norm_squared()
        })
        .sum()
}

/// Result of the χ² minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedLine {
    pub parameters: LineParameters,
    pub errors: LineParameters,
    pub chi2: f64,
    pub ndf: usize,
    pub converged: bool,
}

impl FittedLine {
    /// Line with the given parameters and no fit information.
    pub fn from_parameters(parameters: &LineParameters) -> Self {
        FittedLine {
            parameters: *parameters,
            errors: Vector4::zeros(),
            chi2: 0.0,
            ndf: 0,
            converged: true,
        }
    }

    pub fn b0(&self) -> Micrometer {
        self.parameters[0]
    }

    pub fn b1(&self) -> Micrometer {
        self.parameters[1]
    }

    pub fn delta(&self) -> f64 {
        self.parameters[2]
    }

    pub fn psi(&self) -> f64 {
        self.parameters[3]
    }

    /// Crossing point with the `z = 0` plane.
    pub fn origin(&self) -> Vector3<Micrometer> {
        Vector3::new(self.b0(), self.b1(), 0.0)
    }

    /// Unit direction `(c0, c1, c2)`.
    pub fn direction(&self) -> Vector3<f64> {
        let (sd, cd) = self.delta().sin_cos();
        let (sp, cp) = self.psi().sin_cos();
        Vector3::new(sp, -cp * sd, cd * cp)
    }

    pub fn point_at(&self, lambda: f64) -> Vector3<Micrometer> {
        self.origin() + self.direction() * lambda
    }
}

/// Fit result on one plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneResidual {
    pub z_order: ZOrder,
    pub sensor_id: SensorId,
    /// Measured hit, `None` for an absent or placeholder hit.
    pub hit: Option<Hit>,
    /// Prediction − measurement (µm); zero when `hit` is `None`.
    pub residual: Vector3<Micrometer>,
}

impl PlaneResidual {
    /// One empty entry per catalog plane.
    pub(crate) fn empty_planes(catalog: &PlaneCatalog) -> Vec<PlaneResidual> {
        catalog
            .planes()
            .iter()
            .map(|p| PlaneResidual {
                z_order: p.z_order,
                sensor_id: p.sensor_id,
                hit: None,
                residual: Vector3::zeros(),
            })
            .collect()
    }
}

/// Fitted track: line parameters (absent for pre-fitted input) and per-plane residuals in z order.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTrack {
    pub line: Option<FittedLine>,
    pub planes: Vec<PlaneResidual>,
}

impl FittedTrack {
    /// Number of planes holding a measured hit.
    pub fn measured_planes(&self) -> usize {
        self.planes.iter().filter(|p| p.hit.is_some()).count()
    }
}

/// Straight-line fitter, generic over the χ² minimizer.
#[derive(Debug, Clone)]
pub struct TrackFitter<M: Minimizer = DampedNewton> {
    max_missing: usize,
    minimizer: M,
}

impl TrackFitter<DampedNewton> {
    pub fn with_default_minimizer(max_missing: usize) -> Self {
        TrackFitter::new(max_missing, DampedNewton::default())
    }
}

impl<M: Minimizer> TrackFitter<M> {
    pub fn new(max_missing: usize, minimizer: M) -> Self {
        TrackFitter {
            max_missing,
            minimizer,
        }
    }

    /// Build the χ² point set of a candidate.
    ///
    /// Arguments
    /// -----------------
    /// * `catalog`: planes, in z order.
    /// * `hits`: one entry per plane, `None` for an absent plane.
    ///
    /// Return
    /// ----------
    /// * The points of the non-excluded planes and the number of measured ones.
    pub fn point_set(catalog: &PlaneCatalog, hits: &[Option<&Hit>]) -> (Vec<FitPoint>, usize) {
        let mut valid = 0;
        let points = catalog
            .active_planes()
            .map(|plane| match measured_hit(hits, plane.z_order) {
                Some(hit) => {
                    valid += 1;
                    FitPoint::measured(hit.to_vector(), plane.resolution)
                }
                None => {
                    let z = hits
                        .get(plane.z_order)
                        .copied()
                        .flatten()
                        .map_or(plane.position.z, |h| h.z);
                    FitPoint::placeholder(Vector3::new(0.0, 0.0, z))
                }
            })
            .collect();
        (points, valid)
    }

    /// Fit a candidate and compute its residuals on every plane.
    ///
    /// Arguments
    /// -----------------
    /// * `catalog`: planes, in z order.
    /// * `hits`: one entry per plane, `None` for an absent plane.
    ///
    /// Return
    /// ----------
    /// * The fitted track, or the reason the candidate is dropped:
    ///   [`InsufficientHits`](TelMilleError::InsufficientHits),
    ///   [`DegenerateTrack`](TelMilleError::DegenerateTrack),
    ///   [`FitNotConverged`](TelMilleError::FitNotConverged),
    ///   [`TrackParallelToPlane`](TelMilleError::TrackParallelToPlane).
    pub fn fit(
        &self,
        catalog: &PlaneCatalog,
        hits: &[Option<&Hit>],
    ) -> Result<FittedTrack, TelMilleError> {
        let (points, valid) = Self::point_set(catalog, hits);

        let n_planes = catalog.len();
        if n_planes - valid > self.max_missing {
            return Err(TelMilleError::InsufficientHits {
                valid,
                required: n_planes.saturating_sub(self.max_missing),
            });
        }

        let start = seed::analytic_seed(&points)?;
        let chi2 = |p: &LineParameters| line_chi2(&points, p);
        let outcome = self.minimizer.minimize(&chi2, &start);
        if !outcome.converged {
            return Err(TelMilleError::FitNotConverged {
                iterations: outcome.iterations,
            });
        }

        let line = FittedLine {
            parameters: outcome.parameters,
            errors: outcome.errors,
            chi2: outcome.chi2,
            ndf: (2 * valid).saturating_sub(4),
            converged: true,
        };

        let mut planes = PlaneResidual::empty_planes(catalog);
        for (plane, entry) in catalog.planes().iter().zip(planes.iter_mut()) {
            let (point, _) = intersection::intersect(&line, plane)?;
            if let Some(hit) = measured_hit(hits, plane.z_order) {
                entry.hit = Some(*hit);
                entry.residual = point - hit.to_vector();
            }
        }

        Ok(FittedTrack {
            line: Some(line),
            planes,
        })
    }

    /// Residuals of a track fitted upstream, see [`prefitted::extract_residuals`].
    pub fn extract_residuals(&self, catalog: &PlaneCatalog, track: &PrefittedTrack) -> FittedTrack {
        prefitted::extract_residuals(catalog, track)
    }
}

fn measured_hit<'h>(hits: &[Option<&'h Hit>], z_order: ZOrder) -> Option<&'h Hit> {
    hits.get(z_order)
        .copied()
        .flatten()
        .filter(|h| !h.is_placeholder())
}
