//! # telmille
//!
//! Track-based alignment input for pixel beam telescopes. Hits of every event are combined into
//! straight-line track candidates, each candidate is fitted, and the residuals and their
//! derivatives with respect to the plane alignment parameters are written in the Millepede II
//! binary format, together with the steering file of the `pede` solver.
//!
//! ## Pipeline
//!
//! ```text
//! GeometryProvider ──► PlaneCatalog ──┐
//!                                     │
//! EventData ──► HitStore ──► TrackCandidateSearch ──► TrackFitter ──► DerivativeBuilder ──► RecordSink
//!          └──► PrefittedTrack ─────────────────────────┘ (residual extraction)
//! ```
//!
//! [`processor::AlignmentProcessor`] drives the whole chain; every stage is also usable on its
//! own.
//!
//! ## Units
//!
//! Geometry and raw hits are in millimetres. Everything from the [`hits::HitStore`] on (hits,
//! residuals, resolutions, residual windows) is in micrometres.
pub mod alignment_mode;
pub mod constants;
pub mod derivatives;
pub mod geometry;
pub mod hits;
pub mod labels;
pub mod mille;
pub mod params;
pub mod processor;
pub mod telmille_errors;
pub mod track_fit;
pub mod track_search;

pub use alignment_mode::{AlignmentMode, DofKind};
pub use params::AlignParams;
pub use processor::AlignmentProcessor;
pub use telmille_errors::TelMilleError;
