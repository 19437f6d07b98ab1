use std::fmt::Write as _;

use camino::Utf8Path;
use tracing::info;

use crate::{
    alignment_mode::AlignmentMode, geometry::PlaneCatalog, labels::AlignmentLabels,
    params::SteeringParams, telmille_errors::TelMilleError,
};

const FIXED: &str = "0.0 -1.0";

/// Text of the pede steering file.
///
/// Layout
/// -----------------
/// ```text
/// Cfiles
/// <binary file>
///
/// Parameter
/// <label> <start value> <pre-sigma>     one line per plane and active dof, z order
/// <additional commands>
/// method inversion 10 0.001
/// histprint
/// end
/// ```
///
/// A parameter is fixed (`0.0 -1.0`) when its plane is in the fixed list, when no plane is
/// listed fixed and the plane is the first or last non-excluded one, or when the plane's fix
/// mask has the dof's bit. Free parameters get pre-sigma `0.0` and the user start value of
/// the plane, or `0.0`. Excluded planes get no line. In the additional commands the token `\\`
/// starts a new line.
pub fn render_steering(
    binary_file: &Utf8Path,
    catalog: &PlaneCatalog,
    mode: AlignmentMode,
    labels: &AlignmentLabels,
    steering: &SteeringParams,
) -> String {
    let mut text = String::new();
    let any_fixed = catalog.planes().iter().any(|p| p.fixed);
    let first = catalog.active_planes().next().map(|p| p.z_order);
    let last = catalog.active_planes().last().map(|p| p.z_order);

    let _ = writeln!(text, "Cfiles");
    let _ = writeln!(text, "{binary_file}");
    let _ = writeln!(text);
    let _ = writeln!(text, "Parameter");

    for plane in catalog.active_planes() {
        let plane_fixed = plane.fixed
            || (!any_fixed && (Some(plane.z_order) == first || Some(plane.z_order) == last));
        let start_values = steering
            .user_start_values
            .as_ref()
            .and_then(|v| v.get(plane.z_order));

        for &dof in mode.active_dofs() {
            let Some(label) = labels.label(plane.sensor_id, dof) else {
                continue;
            };
            if plane_fixed || plane.fixed_dof_mask & dof.mask_bit() != 0 {
                let _ = writeln!(text, "{label} {FIXED}");
            } else {
                let start = start_values.map_or(0.0, |v| v[dof.index()]);
                let _ = writeln!(text, "{label} {} 0.0", format_value(start));
            }
        }
    }

    for command in &steering.additional_commands {
        for line in command.split("\\\\") {
            let line = line.trim();
            if !line.is_empty() {
                let _ = writeln!(text, "{line}");
            }
        }
    }

    let _ = writeln!(text, "method inversion 10 0.001");
    let _ = writeln!(text, "histprint");
    let _ = writeln!(text, "end");
    text
}

/// Write the steering file configured in `steering`.
pub fn write_steering(
    binary_file: &Utf8Path,
    catalog: &PlaneCatalog,
    mode: AlignmentMode,
    labels: &AlignmentLabels,
    steering: &SteeringParams,
) -> Result<(), TelMilleError> {
    let text = render_steering(binary_file, catalog, mode, labels, steering);
    std::fs::write(&steering.file_name, text)?;
    info!(path = %steering.file_name, "pede steering file written");
    Ok(())
}

fn format_value(v: f64) -> String {
    if v == 0.0 {
        "0.0".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod steering_tests {
    use super::*;
    use crate::{geometry::TelescopeLayout, params::AlignParams};

    fn render(params: AlignParams, mode: AlignmentMode) -> Vec<String> {
        let layout = TelescopeLayout::straight(&[(0, 0.0), (1, 100.0), (2, 200.0), (3, 300.0)], 0.02);
        let catalog = PlaneCatalog::new(&layout, &params).unwrap();
        let labels = AlignmentLabels::allocate(&catalog.sensor_ids());
        let steering = params.steering.clone().unwrap_or_default();
        render_steering(Utf8Path::new("mille.bin"), &catalog, mode, &labels, &steering)
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn first_and_last_planes_fixed_by_default() {
        let lines = render(AlignParams::default(), AlignmentMode::XYShift);

        assert_eq!(&lines[..4], &["Cfiles", "mille.bin", "", "Parameter"]);
        // X labels 1..=4, Y labels 5..=8
        assert_eq!(
            &lines[4..12],
            &[
                "1 0.0 -1.0",
                "5 0.0 -1.0",
                "2 0.0 0.0",
                "6 0.0 0.0",
                "3 0.0 0.0",
                "7 0.0 0.0",
                "4 0.0 -1.0",
                "8 0.0 -1.0",
            ]
        );
        assert_eq!(&lines[12..], &["method inversion 10 0.001", "histprint", "end"]);
    }

    #[test]
    fn explicit_fixed_list_masks_and_start_values() {
        let mut start = vec![[0.0; 6]; 4];
        start[2] = [12.5, -3.0, 0.0, 0.0, 0.0, 0.001];
        let params = AlignParams::builder()
            .fixed_sensor_ids(vec![1])
            .fix_parameter_masks(vec![0, 0, 0, 0b10_0000])
            .steering(SteeringParams {
                user_start_values: Some(start),
                additional_commands: vec!["chisqcut 5.0 2.5 \\\\ outlierdownweighting 4".into()],
                ..SteeringParams::default()
            })
            .build()
            .unwrap();
        let lines = render(params, AlignmentMode::XYShiftXYRot);

        // z order 0 is free now that the fixed list is set
        assert_eq!(lines[4], "1 0.0 0.0");
        assert_eq!(&lines[7..10], &["2 0.0 -1.0", "6 0.0 -1.0", "22 0.0 -1.0"]);
        assert_eq!(&lines[10..13], &["3 12.5 0.0", "7 -3 0.0", "23 0.001 0.0"]);
        assert_eq!(&lines[13..16], &["4 0.0 0.0", "8 0.0 0.0", "24 0.0 -1.0"]);
        assert_eq!(&lines[16..18], &["chisqcut 5.0 2.5", "outlierdownweighting 4"]);
    }

    #[test]
    fn excluded_planes_are_left_out() {
        let params = AlignParams::builder()
            .excluded_sensor_ids(vec![0])
            .build()
            .unwrap();
        let lines = render(params, AlignmentMode::XYShift);

        assert!(!lines.iter().any(|l| l.starts_with("1 ") || l.starts_with("5 ")));
        // sensor 1 is now the first active plane
        assert!(lines.contains(&"2 0.0 -1.0".to_string()));
        assert!(lines.contains(&"3 0.0 0.0".to_string()));
    }
}
