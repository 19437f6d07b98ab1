//! # Alignment run parameters
//!
//! This module defines [`AlignParams`], the configuration of one alignment run, and its
//! validating builder [`AlignParamsBuilder`]. The parameters are consumed once, at run start, by
//! [`AlignmentProcessor::new`](crate::processor::AlignmentProcessor::new) and by the
//! [`PlaneCatalog`](crate::geometry::PlaneCatalog) construction.
//!
//! ## Purpose
//!
//! The parameters control:
//!
//! - where hits come from (internal candidate search over hit collections, or tracks already
//!   fitted by an upstream tracking stage),
//! - the combinatorics of the candidate search (missing-hit budget, residual windows, per-event
//!   and per-run caps),
//! - the weights of every measurement (per-plane resolutions, with a documented fallback),
//! - which alignment degrees of freedom are solved for ([`AlignmentMode`]) and which planes or
//!   individual dofs are held fixed,
//! - the solver outputs (Mille binary file, optional pede steering file).
//!
//! All per-plane arrays are ordered by the position of the planes along the beam axis
//! (z order), **not** by sensor id.
//!
//! ## Example
//!
//! ```rust
//! use telmille::params::AlignParams;
//! use telmille::alignment_mode::AlignmentMode;
//!
//! let params = AlignParams::builder()
//!     .alignment_mode(AlignmentMode::XYZShiftXZRotYZRotXYRot)
//!     .max_missing_hits(1)
//!     .residual_windows(vec![0.0; 6], vec![500.0; 6], vec![0.0; 6], vec![500.0; 6])
//!     .resolutions(vec![4.3; 6], vec![4.3; 6], vec![1000.0; 6])
//!     .fixed_sensor_ids(vec![0, 5])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(params.alignment_mode.dof_count(), 6);
//! ```
use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::{
    alignment_mode::AlignmentMode,
    constants::{SensorId, DEFAULT_TELESCOPE_RESOLUTION},
    telmille_errors::TelMilleError,
};

/// Source of the track candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputMode {
    /// Hits are read from hit collections and combined by the internal candidate search.
    #[default]
    InternalSearch,
    /// Tracks are read from a track collection; each carries measured and fitted hits.
    PrefittedTracks,
}

/// Controls of the χ² minimizer used by the track fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizerParams {
    /// Maximum number of Newton iterations before a fit is declared non-converged.
    pub max_iterations: usize,
    /// Convergence threshold on the estimated distance to the minimum (χ² units).
    pub tolerance: f64,
    /// Initial step size of every parameter, used to scale finite differences.
    pub initial_step: f64,
}

impl Default for MinimizerParams {
    fn default() -> Self {
        MinimizerParams {
            max_iterations: 2000,
            tolerance: 0.01,
            initial_step: 0.01,
        }
    }
}

/// Pede steering file generation, performed once when the run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringParams {
    pub file_name: Utf8PathBuf,
    /// Extra commands copied verbatim; the token `\\` starts a new line.
    pub additional_commands: Vec<String>,
    /// Per-plane start values `[x, y, z, α, β, γ]` in z order; `None` starts every free
    /// parameter at zero.
    pub user_start_values: Option<Vec<[f64; 6]>>,
}

impl Default for SteeringParams {
    fn default() -> Self {
        SteeringParams {
            file_name: Utf8PathBuf::from("steer_mille.txt"),
            additional_commands: Vec::new(),
            user_start_values: None,
        }
    }
}

/// Configuration of one alignment run.
///
/// Fields
/// -----------------
/// **Input**
/// * `input_mode` – internal candidate search or pre-fitted tracks.
/// * `hit_collection_names` – hit collections read in [`InputMode::InternalSearch`].
/// * `track_collection_name` – track collection read in [`InputMode::PrefittedTracks`].
///
/// **Candidate search**
/// * `max_missing_hits` – number of planes a candidate may lack.
/// * `max_candidates_per_event` – cap on candidates kept per event.
/// * `max_candidates_total` – once more tracks than this were written, further events are ignored.
/// * `residual_x_min`, `residual_x_max`, `residual_y_min`, `residual_y_max` – per-plane windows
///   (µm) on the absolute hit distance between neighbouring planes. Empty = unbounded.
/// * `use_residual_cuts` – also require the fitted residuals to lie in the windows.
/// * `only_single_hit_events` – keep only events with exactly one hit on every used plane.
/// * `only_single_track_events` – keep only events with exactly one candidate.
///
/// **Weights**
/// * `resolution_x`, `resolution_y`, `resolution_z` – per-plane σ (µm).
/// * `telescope_resolution` – σ applied everywhere when the arrays do not match the geometry.
///
/// **Alignment**
/// * `alignment_mode` – set of solved degrees of freedom.
/// * `excluded_sensor_ids` – planes left out of the fit and of the derivatives.
/// * `fixed_sensor_ids` – planes whose global derivatives are suppressed.
/// * `fix_parameter_masks` – per-plane bit masks of fixed dofs (bit 0 = x … bit 5 = γ).
///
/// **Output**
/// * `binary_filename` – Mille binary file, truncated at run start.
/// * `double_precision` – write the Mille floats as `f64`.
/// * `steering` – optional pede steering file.
/// * `minimizer` – χ² minimizer controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignParams {
    // --- Input ---
    pub input_mode: InputMode,
    pub hit_collection_names: Vec<String>,
    pub track_collection_name: String,

    // --- Candidate search ---
    pub max_missing_hits: usize,
    pub max_candidates_per_event: usize,
    pub max_candidates_total: usize,
    pub residual_x_min: Vec<f64>,
    pub residual_x_max: Vec<f64>,
    pub residual_y_min: Vec<f64>,
    pub residual_y_max: Vec<f64>,
    pub use_residual_cuts: bool,
    pub only_single_hit_events: bool,
    pub only_single_track_events: bool,

    // --- Weights ---
    pub resolution_x: Vec<f64>,
    pub resolution_y: Vec<f64>,
    pub resolution_z: Vec<f64>,
    pub telescope_resolution: f64,

    // --- Alignment ---
    pub alignment_mode: AlignmentMode,
    pub excluded_sensor_ids: Vec<SensorId>,
    pub fixed_sensor_ids: Vec<SensorId>,
    pub fix_parameter_masks: Vec<u8>,

    // --- Output ---
    pub binary_filename: Utf8PathBuf,
    #[serde(default)]
    pub double_precision: bool,
    pub steering: Option<SteeringParams>,
    pub minimizer: MinimizerParams,
}

impl AlignParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`AlignParamsBuilder`] initialized with the default values.
    ///
    /// See also
    /// ------------
    /// * [`AlignParamsBuilder::build`] – validation rules.
    pub fn builder() -> AlignParamsBuilder {
        AlignParamsBuilder::new()
    }

    /// Run the [`AlignParamsBuilder::build`] checks on parameters assembled field by field.
    pub fn validate(self) -> Result<Self, TelMilleError> {
        AlignParamsBuilder::from(self).build()
    }

    /// True when residual windows were configured.
    pub fn has_residual_windows(&self) -> bool {
        !self.residual_x_min.is_empty()
    }
}

impl Default for AlignParams {
    fn default() -> Self {
        AlignParams {
            input_mode: InputMode::InternalSearch,
            hit_collection_names: vec!["corrhits".to_string()],
            track_collection_name: "fittracks".to_string(),

            max_missing_hits: 0,
            max_candidates_per_event: 2000,
            max_candidates_total: 10_000_000,
            residual_x_min: Vec::new(),
            residual_x_max: Vec::new(),
            residual_y_min: Vec::new(),
            residual_y_max: Vec::new(),
            use_residual_cuts: false,
            only_single_hit_events: false,
            only_single_track_events: false,

            resolution_x: Vec::new(),
            resolution_y: Vec::new(),
            resolution_z: Vec::new(),
            telescope_resolution: DEFAULT_TELESCOPE_RESOLUTION,

            alignment_mode: AlignmentMode::default(),
            excluded_sensor_ids: Vec::new(),
            fixed_sensor_ids: Vec::new(),
            fix_parameter_masks: Vec::new(),

            binary_filename: Utf8PathBuf::from("mille.bin"),
            double_precision: false,
            steering: None,
            minimizer: MinimizerParams::default(),
        }
    }
}

/// Builder for [`AlignParams`], with validation.
#[derive(Debug, Clone)]
pub struct AlignParamsBuilder {
    params: AlignParams,
}

impl Default for AlignParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<AlignParams> for AlignParamsBuilder {
    fn from(params: AlignParams) -> Self {
        Self { params }
    }
}

impl AlignParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: AlignParams::default(),
        }
    }

    // --- Input ---
    pub fn input_mode(mut self, v: InputMode) -> Self {
        self.params.input_mode = v;
        self
    }
    pub fn hit_collection_names(mut self, v: Vec<String>) -> Self {
        self.params.hit_collection_names = v;
        self
    }
    pub fn track_collection_name(mut self, v: impl Into<String>) -> Self {
        self.params.track_collection_name = v.into();
        self
    }

    // --- Candidate search ---
    pub fn max_missing_hits(mut self, v: usize) -> Self {
        self.params.max_missing_hits = v;
        self
    }
    pub fn max_candidates_per_event(mut self, v: usize) -> Self {
        self.params.max_candidates_per_event = v;
        self
    }
    pub fn max_candidates_total(mut self, v: usize) -> Self {
        self.params.max_candidates_total = v;
        self
    }
    pub fn residual_windows(
        mut self,
        x_min: Vec<f64>,
        x_max: Vec<f64>,
        y_min: Vec<f64>,
        y_max: Vec<f64>,
    ) -> Self {
        self.params.residual_x_min = x_min;
        self.params.residual_x_max = x_max;
        self.params.residual_y_min = y_min;
        self.params.residual_y_max = y_max;
        self
    }
    pub fn use_residual_cuts(mut self, v: bool) -> Self {
        self.params.use_residual_cuts = v;
        self
    }
    pub fn only_single_hit_events(mut self, v: bool) -> Self {
        self.params.only_single_hit_events = v;
        self
    }
    pub fn only_single_track_events(mut self, v: bool) -> Self {
        self.params.only_single_track_events = v;
        self
    }

    // --- Weights ---
    pub fn resolutions(mut self, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        self.params.resolution_x = x;
        self.params.resolution_y = y;
        self.params.resolution_z = z;
        self
    }
    pub fn telescope_resolution(mut self, v: f64) -> Self {
        self.params.telescope_resolution = v;
        self
    }

    // --- Alignment ---
    pub fn alignment_mode(mut self, v: AlignmentMode) -> Self {
        self.params.alignment_mode = v;
        self
    }
    /// Select the alignment mode from its integer code (1..=7).
    pub fn alignment_mode_code(mut self, code: i32) -> Result<Self, TelMilleError> {
        self.params.alignment_mode = AlignmentMode::try_from(code)?;
        Ok(self)
    }
    pub fn excluded_sensor_ids(mut self, v: Vec<SensorId>) -> Self {
        self.params.excluded_sensor_ids = v;
        self
    }
    pub fn fixed_sensor_ids(mut self, v: Vec<SensorId>) -> Self {
        self.params.fixed_sensor_ids = v;
        self
    }
    pub fn fix_parameter_masks(mut self, v: Vec<u8>) -> Self {
        self.params.fix_parameter_masks = v;
        self
    }

    // --- Output ---
    pub fn binary_filename(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.params.binary_filename = v.into();
        self
    }
    pub fn double_precision(mut self, v: bool) -> Self {
        self.params.double_precision = v;
        self
    }
    pub fn steering(mut self, v: SteeringParams) -> Self {
        self.params.steering = Some(v);
        self
    }
    pub fn minimizer(mut self, v: MinimizerParams) -> Self {
        self.params.minimizer = v;
        self
    }

    /// Finalize the builder and produce an [`AlignParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * `max_candidates_per_event >= 1`, `max_candidates_total >= 1`.
    /// * The four residual window arrays are either all empty or all of the same length, with
    ///   `min <= max` entry by entry.
    /// * Every resolution entry and `telescope_resolution` is finite and `> 0`.
    /// * At least one hit collection in [`InputMode::InternalSearch`], a non-empty track
    ///   collection name in [`InputMode::PrefittedTracks`].
    /// * `fix_parameter_masks` entries use only the six low bits.
    /// * `minimizer.max_iterations >= 1`, `minimizer.tolerance > 0`, `minimizer.initial_step > 0`.
    ///
    /// Array lengths versus the number of planes are checked later, against the geometry, by
    /// [`PlaneCatalog::new`](crate::geometry::PlaneCatalog::new).
    ///
    /// Returns
    /// -----------------
    /// * `Ok(AlignParams)` if all values are valid.
    /// * `Err(TelMilleError::InvalidAlignParameter)` naming the first violated rule.
    pub fn build(self) -> Result<AlignParams, TelMilleError> {
        let p = &self.params;

        if p.max_candidates_per_event == 0 {
            return Err(TelMilleError::InvalidAlignParameter(
                "max_candidates_per_event must be >= 1".into(),
            ));
        }
        if p.max_candidates_total == 0 {
            return Err(TelMilleError::InvalidAlignParameter(
                "max_candidates_total must be >= 1".into(),
            ));
        }

        let n_windows = p.residual_x_min.len();
        if p.residual_x_max.len() != n_windows
            || p.residual_y_min.len() != n_windows
            || p.residual_y_max.len() != n_windows
        {
            return Err(TelMilleError::InvalidAlignParameter(
                "residual window arrays must all have the same length".into(),
            ));
        }
        let ordered = |min: &[f64], max: &[f64]| min.iter().zip(max).all(|(lo, hi)| lo <= hi);
        if !ordered(&p.residual_x_min, &p.residual_x_max)
            || !ordered(&p.residual_y_min, &p.residual_y_max)
        {
            return Err(TelMilleError::InvalidAlignParameter(
                "residual windows require min <= max".into(),
            ));
        }

        let positive = |v: &f64| v.is_finite() && *v > 0.0;
        if !p
            .resolution_x
            .iter()
            .chain(&p.resolution_y)
            .chain(&p.resolution_z)
            .all(positive)
        {
            return Err(TelMilleError::InvalidAlignParameter(
                "resolutions must be finite and > 0".into(),
            ));
        }
        if !positive(&p.telescope_resolution) {
            return Err(TelMilleError::InvalidAlignParameter(
                "telescope_resolution must be finite and > 0".into(),
            ));
        }

        match p.input_mode {
            InputMode::InternalSearch if p.hit_collection_names.is_empty() => {
                return Err(TelMilleError::InvalidAlignParameter(
                    "at least one hit collection is required for the internal search".into(),
                ));
            }
            InputMode::PrefittedTracks if p.track_collection_name.is_empty() => {
                return Err(TelMilleError::InvalidAlignParameter(
                    "a track collection name is required for pre-fitted tracks".into(),
                ));
            }
            _ => {}
        }

        if p.fix_parameter_masks.iter().any(|m| m & !0b11_1111 != 0) {
            return Err(TelMilleError::InvalidAlignParameter(
                "fix_parameter_masks only use bits 0..=5".into(),
            ));
        }

        let m = &p.minimizer;
        if m.max_iterations == 0 {
            return Err(TelMilleError::InvalidAlignParameter(
                "minimizer.max_iterations must be >= 1".into(),
            ));
        }
        if !positive(&m.tolerance) || !positive(&m.initial_step) {
            return Err(TelMilleError::InvalidAlignParameter(
                "minimizer tolerance and initial step must be > 0".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for AlignParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PARAM_COL: usize = 44;

        macro_rules! line {
            ($fmt:expr, $val:expr, $comment:expr) => {{
                let s = format!($fmt, $val);
                let pad = if s.len() < PARAM_COL {
                    " ".repeat(PARAM_COL - s.len())
                } else {
                    " ".to_string()
                };
                writeln!(f, "  {}{}# {}", s, pad, $comment)
            }};
        }

        writeln!(f, "Alignment run parameters")?;
        writeln!(f, "------------------------")?;
        line!("input_mode               = {:?}", self.input_mode, "Candidate source")?;
        line!(
            "alignment_mode           = {}",
            self.alignment_mode.code(),
            "Solved degrees of freedom"
        )?;
        line!(
            "max_missing_hits         = {}",
            self.max_missing_hits,
            "Planes a candidate may lack"
        )?;
        line!(
            "max_candidates_per_event = {}",
            self.max_candidates_per_event,
            "Per-event candidate cap"
        )?;
        line!(
            "max_candidates_total     = {}",
            self.max_candidates_total,
            "Run-wide track cap"
        )?;
        line!(
            "use_residual_cuts        = {}",
            self.use_residual_cuts,
            "Cut on fitted residuals"
        )?;
        line!(
            "telescope_resolution     = {:.3} um",
            self.telescope_resolution,
            "Fallback resolution"
        )?;
        line!(
            "excluded_sensor_ids      = {:?}",
            self.excluded_sensor_ids,
            "Planes left out"
        )?;
        line!(
            "fixed_sensor_ids         = {:?}",
            self.fixed_sensor_ids,
            "Planes held fixed"
        )?;
        line!(
            "binary_filename          = {}",
            self.binary_filename,
            "Mille output"
        )
    }
}
