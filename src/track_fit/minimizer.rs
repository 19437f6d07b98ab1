//! # χ² minimization of the four line parameters
//!
//! The fitter hands a [`Minimizer`] a χ² callback over the parameter vector
//! `p = (b0, b1, δ, ψ)` and a start point. Any implementation can be plugged in; the crate
//! ships [`DampedNewton`].
//!
//! ## DampedNewton
//!
//! Levenberg–Marquardt iterations on the scalar χ²:
//!
//! 1. gradient `g` and Hessian `H` by central finite differences,
//! 2. estimated distance to minimum `EDM = ½·gᵀ·H⁻¹·g`; stop when `EDM < 10⁻³·tolerance`,
//! 3. solve `(H + λ·diag(H))·Δ = −g`, accept the step only if χ² decreases
//!    (then `λ ← λ/10`), otherwise `λ ← 10·λ` and retry,
//! 4. δ and ψ are clamped to `[−π, π]` after every step.
//!
//! Parameter errors are `sqrt(diag(2·H⁻¹))`, the one-sigma errors of a χ² objective.
use std::f64::consts::PI;

use nalgebra::{Matrix4, Vector4};

use crate::params::MinimizerParams;

/// `(b0, b1, δ, ψ)`: line offsets at `z = 0` (µm) and direction angles (rad).
pub type LineParameters = Vector4<f64>;

/// Result of one minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerOutcome {
    pub parameters: LineParameters,
    pub errors: LineParameters,
    pub chi2: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimizer of a four-parameter χ².
pub trait Minimizer {
    fn minimize(
        &self,
        chi2: &dyn Fn(&LineParameters) -> f64,
        start: &LineParameters,
    ) -> MinimizerOutcome;
}

/// Damped Newton minimizer with numerical derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct DampedNewton {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Finite-difference step of each parameter.
    pub steps: LineParameters,
    /// Bound of the two angle parameters (rad).
    pub angle_limit: f64,
}

impl Default for DampedNewton {
    fn default() -> Self {
        DampedNewton::from(&MinimizerParams::default())
    }
}

impl From<&MinimizerParams> for DampedNewton {
    /// The configured step applies to the offsets in µm; angles use a step scaled to keep the
    /// displacement at the far end of a telescope comparable.
    fn from(params: &MinimizerParams) -> Self {
        let b = params.initial_step;
        let angle = params.initial_step * 1e-4;
        DampedNewton {
            max_iterations: params.max_iterations,
            tolerance: params.tolerance,
            steps: Vector4::new(b, b, angle, angle),
            angle_limit: PI,
        }
    }
}

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

impl DampedNewton {
    fn clamp(&self, mut p: LineParameters) -> LineParameters {
        for i in 2..4 {
            p[i] = p[i].clamp(-self.angle_limit, self.angle_limit);
        }
        p
    }

    fn gradient_and_hessian(
        &self,
        chi2: &dyn Fn(&LineParameters) -> f64,
        p: &LineParameters,
        f0: f64,
    ) -> (Vector4<f64>, Matrix4<f64>) {
        let h = &self.steps;
        let shifted = |i: usize, si: f64, j: usize, sj: f64| {
            let mut q = *p;
            q[i] += si * h[i];
            q[j] += sj * h[j];
            chi2(&q)
        };

        let mut g = Vector4::zeros();
        let mut hess = Matrix4::zeros();
        for i in 0..4 {
            let mut up = *p;
            up[i] += h[i];
            let mut down = *p;
            down[i] -= h[i];
            let (fu, fd) = (chi2(&up), chi2(&down));

            g[i] = (fu - fd) / (2.0 * h[i]);
            hess[(i, i)] = (fu - 2.0 * f0 + fd) / (h[i] * h[i]);

            for j in 0..i {
                let v = (shifted(i, 1.0, j, 1.0)
                    - shifted(i, 1.0, j, -1.0)
                    - shifted(i, -1.0, j, 1.0)
                    + shifted(i, -1.0, j, -1.0))
                    / (4.0 * h[i] * h[j]);
                hess[(i, j)] = v;
                hess[(j, i)] = v;
            }
        }
        (g, hess)
    }

    fn errors(hess: &Matrix4<f64>) -> LineParameters {
        hess.try_inverse()
            .map(|cov| cov.diagonal().map(|v| (2.0 * v).abs().sqrt()))
            .unwrap_or_else(|| Vector4::repeat(f64::NAN))
    }
}

impl Minimizer for DampedNewton {
    fn minimize(
        &self,
        chi2: &dyn Fn(&LineParameters) -> f64,
        start: &LineParameters,
    ) -> MinimizerOutcome {
        let mut p = self.clamp(*start);
        let mut f = chi2(&p);
        let mut lambda = LAMBDA_START;
        let edm_limit = 1e-3 * self.tolerance;

        let mut iterations = 0;
        let mut converged_hessian = None;

        while iterations < self.max_iterations && f.is_finite() {
            iterations += 1;
            let (g, hess) = self.gradient_and_hessian(chi2, &p, f);

            if let Some(edm) = hess.lu().solve(&g).map(|x| 0.5 * g.dot(&x)) {
                if edm.abs() < edm_limit {
                    converged_hessian = Some(hess);
                    break;
                }
            }

            let mut damped = hess;
            for i in 0..4 {
                damped[(i, i)] += lambda * hess[(i, i)].abs().max(f64::EPSILON);
            }

            let improved = damped.lu().solve(&(-g)).and_then(|step| {
                let candidate = self.clamp(p + step);
                let fc = chi2(&candidate);
                (fc.is_finite() && fc < f).then_some((candidate, fc))
            });

            match improved {
                Some((candidate, fc)) => {
                    p = candidate;
                    f = fc;
                    lambda = (lambda / 10.0).max(1e-12);
                }
                None if lambda < LAMBDA_MAX => lambda *= 10.0,
                None => break,
            }
        }

        let converged = converged_hessian.is_some();
        let hess = converged_hessian
            .unwrap_or_else(|| self.gradient_and_hessian(chi2, &p, f).1);

        MinimizerOutcome {
            parameters: p,
            errors: Self::errors(&hess),
            chi2: f,
            iterations,
            converged,
        }
    }
}
