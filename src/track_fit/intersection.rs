use nalgebra::{Matrix3, Vector3};

use super::FittedLine;
use crate::{constants::Micrometer, geometry::Plane, telmille_errors::TelMilleError};

/// Below this |n·c| the line is considered parallel to the plane surface.
const PARALLEL_EPS: f64 = 1e-9;

/// Intersection of a fitted line with the surface of a plane.
///
/// Solves
///
/// ```text
/// u·x̂ + v·ŷ − λ·c = b − o
/// ```
///
/// for the in-plane coordinates `(u, v)` and the line parameter `λ`, with `x̂, ŷ` the plane axes,
/// `o` its centre, `b = (b0, b1, 0)` the line origin and `c` its direction.
///
/// Return
/// ----------
/// * `(point, λ)` with `point = b + λ·c` in µm, or [`TelMilleError::TrackParallelToPlane`].
pub fn intersect(
    line: &FittedLine,
    plane: &Plane,
) -> Result<(Vector3<Micrometer>, f64), TelMilleError> {
    let c = line.direction();
    let parallel = TelMilleError::TrackParallelToPlane {
        sensor_id: plane.sensor_id,
    };
    if plane.normal.dot(&c).abs() < PARALLEL_EPS {
        return Err(parallel);
    }

    let system = Matrix3::from_columns(&[plane.x_axis, plane.y_axis, -c]);
    let rhs = line.origin() - plane.position;
    let solution = system.lu().solve(&rhs).ok_or(parallel)?;
    let lambda = solution.z;

    Ok((line.point_at(lambda), lambda))
}
