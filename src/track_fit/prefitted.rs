use tracing::{debug, warn};

use super::{FittedTrack, PlaneResidual};
use crate::{
    constants::MM_TO_UM,
    geometry::PlaneCatalog,
    hits::{Hit, PrefittedTrack, RawHit},
};

/// Residuals of a track fitted upstream.
///
/// Every measured hit is paired with the fitted hit of the same sensor; the residual
/// `(fit − measured)·1000` (µm) is stored at the z-order slot of that sensor. Hits on sensors
/// unknown to the catalog are skipped with a warning, measured hits without a fitted partner
/// are skipped silently. The returned track carries no line parameters.
pub fn extract_residuals(catalog: &PlaneCatalog, track: &PrefittedTrack) -> FittedTrack {
    let mut planes = PlaneResidual::empty_planes(catalog);

    let (fitted, measured): (Vec<&RawHit>, Vec<&RawHit>) =
        track.hits.iter().partition(|h| h.is_fitted());

    for hit in measured {
        let Some(z_order) = catalog.z_order_of(hit.sensor_id) else {
            warn!(
                sensor_id = hit.sensor_id,
                "pre-fitted track hit on an unknown sensor skipped"
            );
            continue;
        };
        let Some(fit) = fitted.iter().find(|f| f.sensor_id == hit.sensor_id) else {
            debug!(sensor_id = hit.sensor_id, "measured hit without fitted partner");
            continue;
        };

        let slot = &mut planes[z_order];
        slot.hit = Some(Hit::from_mm(&hit.position_mm));
        slot.residual = (fit.position_mm - hit.position_mm) * MM_TO_UM;
    }

    FittedTrack { line: None, planes }
}

#[cfg(test)]
mod prefitted_tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;
    use crate::{geometry::TelescopeLayout, params::AlignParams};

    #[test]
    fn residuals_are_matched_by_sensor_id() {
        let layout = TelescopeLayout::straight(&[(10, 0.0), (11, 100.0), (12, 200.0)], 0.02);
        let catalog = PlaneCatalog::new(&layout, &AlignParams::default()).unwrap();

        // hits listed out of z order, one plane without measurement, one unknown sensor
        let track = PrefittedTrack {
            hits: vec![
                RawHit::measured(12, 1.0, 2.0, 200.0),
                RawHit::fitted(10, 0.5, 0.5, 0.0),
                RawHit::measured(10, 0.496, 0.502, 0.0),
                RawHit::fitted(12, 1.003, 1.998, 200.0),
                RawHit::fitted(11, 0.75, 1.25, 100.0),
                RawHit::measured(77, 0.0, 0.0, 50.0),
            ],
        };

        let fitted = extract_residuals(&catalog, &track);

        assert!(fitted.line.is_none());
        assert_eq!(fitted.planes.len(), 3);
        assert_relative_eq!(fitted.planes[0].residual, Vector3::new(4.0, -2.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(fitted.planes[2].residual, Vector3::new(3.0, -2.0, 0.0), epsilon = 1e-9);
        assert!(fitted.planes[1].hit.is_none());
        assert_eq!(fitted.planes[2].sensor_id, 12);
        assert_eq!(fitted.measured_planes(), 2);
    }
}
