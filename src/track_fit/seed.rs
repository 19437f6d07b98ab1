use nalgebra::Vector4;

use super::{minimizer::LineParameters, FitPoint};
use crate::telmille_errors::TelMilleError;

/// Start point of the χ² minimization from a linear regression of x and y on z.
///
/// Only measured points enter the regression. With slopes `ax = Szx/Szz`, `ay = Szy/Szz` and
/// intercepts `(x0, y0)` at `z = 0`, the start point is
///
/// ```text
/// b0 = x0,   b1 = y0,   δ = −atan(ay),   ψ = atan(ax / sqrt(1 + ay²))
/// ```
///
/// which reproduces the regression line exactly with the direction convention of
/// [`FittedLine::direction`](super::FittedLine::direction).
///
/// Return
/// ----------
/// * [`TelMilleError::DegenerateTrack`] when fewer than two points are measured or all of them
///   share one z position.
pub fn analytic_seed(points: &[FitPoint]) -> Result<LineParameters, TelMilleError> {
    let measured = || points.iter().filter(|p| p.measured);
    let n = measured().count();
    if n < 2 {
        return Err(TelMilleError::DegenerateTrack);
    }

    let inv_n = 1.0 / n as f64;
    let mean = measured().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.position) * inv_n;

    let (mut szz, mut szx, mut szy) = (0.0, 0.0, 0.0);
    for p in measured() {
        let d = p.position - mean;
        szz += d.z * d.z;
        szx += d.z * d.x;
        szy += d.z * d.y;
    }
    if szz <= f64::EPSILON * mean.z.abs().max(1.0) {
        return Err(TelMilleError::DegenerateTrack);
    }

    let ax = szx / szz;
    let ay = szy / szz;
    let x0 = mean.x - ax * mean.z;
    let y0 = mean.y - ay * mean.z;

    Ok(Vector4::new(
        x0,
        y0,
        -ay.atan(),
        (ax / (1.0 + ay * ay).sqrt()).atan(),
    ))
}
