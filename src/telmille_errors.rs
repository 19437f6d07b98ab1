use thiserror::Error;

use crate::constants::SensorId;

#[derive(Error, Debug)]
pub enum TelMilleError {
    #[error("Invalid alignment parameter: {0}")]
    InvalidAlignParameter(String),

    #[error("Unsupported alignment mode: {0} (expected 1..=7)")]
    UnsupportedAlignmentMode(i32),

    #[error("Parameter array `{name}` has {found} entries but the telescope has {expected} planes")]
    ArrayLengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("The geometry description contains no sensor plane")]
    EmptyGeometry,

    #[error("Missing geometry for sensor {sensor_id}: {what}")]
    MissingGeometry {
        sensor_id: SensorId,
        what: &'static str,
    },

    #[error("Sensors {first} and {second} sit at the same position along the beam axis")]
    CoincidentPlanes { first: SensorId, second: SensorId },

    #[error("Sensor id {0} is used by more than one plane")]
    DuplicateSensorId(SensorId),

    #[error("Unknown sensor id: {0}")]
    UnknownSensorId(SensorId),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed Mille record stream: {0}")]
    MalformedMilleStream(String),

    #[error("Track has {valid} valid hits, at least {required} are needed")]
    InsufficientHits { valid: usize, required: usize },

    #[error("Track hits do not constrain a straight line (no spread along the beam axis)")]
    DegenerateTrack,

    #[error("Track fit did not converge after {iterations} iterations")]
    FitNotConverged { iterations: usize },

    #[error("Fitted track is parallel to the surface of sensor {sensor_id}")]
    TrackParallelToPlane { sensor_id: SensorId },

    #[error("Collection `{name}` not found in event {event} of run {run}")]
    MissingCollection { name: String, run: i32, event: i64 },
}

impl PartialEq for TelMilleError {
    fn eq(&self, other: &Self) -> bool {
        use TelMilleError::*;
        match (self, other) {
            (InvalidAlignParameter(a), InvalidAlignParameter(b)) => a == b,
            (UnsupportedAlignmentMode(a), UnsupportedAlignmentMode(b)) => a == b,
            (
                ArrayLengthMismatch {
                    name: n1,
                    expected: e1,
                    found: f1,
                },
                ArrayLengthMismatch {
                    name: n2,
                    expected: e2,
                    found: f2,
                },
            ) => n1 == n2 && e1 == e2 && f1 == f2,
            (
                MissingGeometry {
                    sensor_id: s1,
                    what: w1,
                },
                MissingGeometry {
                    sensor_id: s2,
                    what: w2,
                },
            ) => s1 == s2 && w1 == w2,
            (
                CoincidentPlanes {
                    first: a1,
                    second: b1,
                },
                CoincidentPlanes {
                    first: a2,
                    second: b2,
                },
            ) => a1 == a2 && b1 == b2,
            (DuplicateSensorId(a), DuplicateSensorId(b)) => a == b,
            (UnknownSensorId(a), UnknownSensorId(b)) => a == b,
            (MalformedMilleStream(a), MalformedMilleStream(b)) => a == b,
            (
                InsufficientHits {
                    valid: v1,
                    required: r1,
                },
                InsufficientHits {
                    valid: v2,
                    required: r2,
                },
            ) => v1 == v2 && r1 == r2,
            (FitNotConverged { iterations: a }, FitNotConverged { iterations: b }) => a == b,
            (TrackParallelToPlane { sensor_id: a }, TrackParallelToPlane { sensor_id: b }) => {
                a == b
            }
            (
                MissingCollection {
                    name: n1,
                    run: r1,
                    event: e1,
                },
                MissingCollection {
                    name: n2,
                    run: r2,
                    event: e2,
                },
            ) => n1 == n2 && r1 == r2 && e1 == e2,

            // io::Error is not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,

            (EmptyGeometry, EmptyGeometry) => true,
            (DegenerateTrack, DegenerateTrack) => true,

            _ => false,
        }
    }
}
