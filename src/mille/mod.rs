//! # Solver record sinks
//!
//! Derivative records leave the crate through a [`RecordSink`]. Two sinks are provided:
//!
//! - [`MilleBinaryWriter`]: the Millepede II binary format, one block per track,
//! - [`MemorySink`]: whole tracks kept in memory, for inspection and for replaying per-worker
//!   buffers into a single file sink in event order.
//!
//! The [`reader`] decodes a Mille binary stream back into records and [`steering`] writes the
//! pede steering file that accompanies it.
//!
//! ## Binary layout
//!
//! Per track, little endian:
//!
//! ```text
//! i32 nwords
//! nwords/2 × float   (f32, or f64 in double precision)
//! nwords/2 × i32
//! ```
//!
//! Both arrays start with the pair `(0.0, 0)`. Every record then appends
//!
//! ```text
//! (residual, 0)  (local_i, i+1)…  (sigma, 0)  (global_j, label_j)…
//! ```
//!
//! where only non-zero derivatives are stored. In double precision `nwords` is written negated.
pub mod reader;
pub mod steering;
pub mod writer;

use crate::{derivatives::DerivativeRecord, telmille_errors::TelMilleError};

pub use reader::{MilleReader, MilleRecord, MilleTrack};
pub use steering::{render_steering, write_steering};
pub use writer::MilleBinaryWriter;

/// Destination of derivative records.
pub trait RecordSink {
    /// Append one record to the current track.
    fn write_record(&mut self, record: &DerivativeRecord) -> Result<(), TelMilleError>;

    /// Close the current track. A track without records produces no output.
    fn end_track(&mut self) -> Result<(), TelMilleError>;

    fn flush(&mut self) -> Result<(), TelMilleError>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write_record(&mut self, record: &DerivativeRecord) -> Result<(), TelMilleError> {
        (**self).write_record(record)
    }

    fn end_track(&mut self) -> Result<(), TelMilleError> {
        (**self).end_track()
    }

    fn flush(&mut self) -> Result<(), TelMilleError> {
        (**self).flush()
    }
}

/// In-memory sink holding closed tracks.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tracks: Vec<Vec<DerivativeRecord>>,
    current: Vec<DerivativeRecord>,
}

impl MemorySink {
    /// Closed tracks, in order.
    pub fn tracks(&self) -> &[Vec<DerivativeRecord>] {
        &self.tracks
    }

    pub fn record_count(&self) -> usize {
        self.tracks.iter().map(Vec::len).sum()
    }

    /// Write every closed track into `sink`, preserving track boundaries.
    pub fn replay_into<S: RecordSink + ?Sized>(&self, sink: &mut S) -> Result<(), TelMilleError> {
        for track in &self.tracks {
            for record in track {
                sink.write_record(record)?;
            }
            sink.end_track()?;
        }
        Ok(())
    }

    /// Drop all stored tracks.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current.clear();
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &DerivativeRecord) -> Result<(), TelMilleError> {
        if record.sigma > 0.0 {
            self.current.push(record.clone());
        }
        Ok(())
    }

    fn end_track(&mut self) -> Result<(), TelMilleError> {
        if !self.current.is_empty() {
            self.tracks.push(std::mem::take(&mut self.current));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelMilleError> {
        Ok(())
    }
}
