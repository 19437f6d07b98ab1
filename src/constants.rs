//! # Constants and type definitions for telmille
//!
//! This module centralizes the **unit conversions**, **numerical conventions** and **common type
//! aliases** shared by the catalog, the track search, the fitter and the derivative builder.
//!
//! ## Overview
//!
//! - Unit conversions (millimetre frame of the geometry/event collaborators ↔ internal micrometres)
//! - Placeholder conventions for planes without a measurement
//! - Default values mirrored by [`AlignParams::default`](crate::params::AlignParams)
//! - Type aliases used across the crate

use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// Millimetres → micrometres. Hits and plane positions arrive in millimetres and are stored in
/// micrometres internally.
pub const MM_TO_UM: f64 = 1000.0;

// -------------------------------------------------------------------------------------------------
// Placeholder conventions
// -------------------------------------------------------------------------------------------------

/// A hit whose X and Y are both below this magnitude (µm) is a "no measurement" placeholder.
pub const PLACEHOLDER_EPS: f64 = 1e-6;

/// Sigma (µm) given to placeholder points so that they carry no weight in the χ².
pub const NO_MEASUREMENT_SIGMA: f64 = 1.0e6;

/// Tolerance (mm) used when ordering planes along the beam axis.
pub const Z_ORDER_EPS: f64 = 1e-6;

// -------------------------------------------------------------------------------------------------
// Defaults
// -------------------------------------------------------------------------------------------------

/// Fallback telescope resolution (µm), used on every axis when per-plane resolutions are unusable.
pub const DEFAULT_TELESCOPE_RESOLUTION: f64 = 3.0;

/// Number of local (per-track) parameters: b0, b1 and two direction terms.
pub const N_LOCAL_PARAMS: usize = 4;

/// Number of rigid-body alignment degrees of freedom per plane.
pub const N_DOF: usize = 6;

/// Log a progress line every this many events.
pub const PROGRESS_EVENT_INTERVAL: u64 = 1000;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Length in micrometres
pub type Micrometer = f64;
/// Length in millimetres
pub type Millimeter = f64;
/// Sensor identifier as given by the geometry description
pub type SensorId = i32;
/// Index of a plane along the beam axis (0 = most upstream)
pub type ZOrder = usize;
/// Millepede global parameter label (strictly positive)
pub type Label = u32;

/// Per-plane slot vector of a track candidate; telescopes rarely exceed eight planes.
pub type PlaneSlots = SmallVec<[Option<usize>; 8]>;
