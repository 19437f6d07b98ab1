use std::{
    fs::File,
    io::{BufWriter, Write},
};

use camino::Utf8Path;
use tracing::debug;

use super::RecordSink;
use crate::{derivatives::DerivativeRecord, telmille_errors::TelMilleError};

/// Writer of the Millepede II binary format.
///
/// Records of the current track are buffered in two parallel arrays and written as one block
/// by [`end_track`](RecordSink::end_track).
#[derive(Debug)]
pub struct MilleBinaryWriter<W: Write> {
    out: W,
    double_precision: bool,
    floats: Vec<f64>,
    ints: Vec<i32>,
    tracks_written: usize,
}

impl MilleBinaryWriter<BufWriter<File>> {
    /// Create (truncate) the binary file at `path`.
    pub fn create(path: &Utf8Path, double_precision: bool) -> Result<Self, TelMilleError> {
        let file = File::create(path)?;
        debug!(path = %path, double_precision, "mille binary file created");
        Ok(Self::new(BufWriter::new(file), double_precision))
    }
}

impl<W: Write> MilleBinaryWriter<W> {
    pub fn new(out: W, double_precision: bool) -> Self {
        MilleBinaryWriter {
            out,
            double_precision,
            floats: vec![0.0],
            ints: vec![0],
            tracks_written: 0,
        }
    }

    /// Number of non-empty tracks written so far.
    pub fn tracks_written(&self) -> usize {
        self.tracks_written
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W, TelMilleError> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn push(&mut self, value: f64, index: i32) {
        self.floats.push(value);
        self.ints.push(index);
    }

    fn reset(&mut self) {
        self.floats.truncate(1);
        self.ints.truncate(1);
    }
}

impl<W: Write> RecordSink for MilleBinaryWriter<W> {
    fn write_record(&mut self, record: &DerivativeRecord) -> Result<(), TelMilleError> {
        if record.sigma <= 0.0 {
            return Ok(());
        }

        self.push(record.residual, 0);
        for (i, &d) in record.local.iter().enumerate() {
            if d != 0.0 {
                self.push(d, i as i32 + 1);
            }
        }
        self.push(record.sigma, 0);
        for &(label, d) in &record.global {
            if d != 0.0 {
                self.push(d, label as i32);
            }
        }
        Ok(())
    }

    fn end_track(&mut self) -> Result<(), TelMilleError> {
        let pos = self.floats.len() - 1;
        if pos == 0 {
            return Ok(());
        }

        let nwords = ((pos + 1) * 2) as i32;
        let mut block = Vec::with_capacity(4 + self.floats.len() * 12);
        if self.double_precision {
            block.extend_from_slice(&(-nwords).to_le_bytes());
            for v in &self.floats {
                block.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            block.extend_from_slice(&nwords.to_le_bytes());
            for v in &self.floats {
                block.extend_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        for i in &self.ints {
            block.extend_from_slice(&i.to_le_bytes());
        }

        self.out.write_all(&block)?;
        self.tracks_written += 1;
        self.reset();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelMilleError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod mille_writer_tests {
    use super::*;
    use crate::mille::test_records::record;

    fn words(bytes: &[u8]) -> Vec<[u8; 4]> {
        bytes
            .chunks(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect()
    }

    #[test]
    fn single_record_layout() {
        let mut writer = MilleBinaryWriter::new(Vec::new(), false);
        writer.write_record(&record(1.5, 3.0)).unwrap();
        writer.end_track().unwrap();
        let bytes = writer.into_inner().unwrap();

        // (0,0) (1.5,0) (1,1) (150000.5,3) (3,0) (-1,2) (25,12): 7 pairs
        let w = words(&bytes);
        assert_eq!(i32::from_le_bytes(w[0]), 14);
        assert_eq!(w.len(), 1 + 7 + 7);

        let floats: Vec<f32> = w[1..8].iter().map(|b| f32::from_le_bytes(*b)).collect();
        let ints: Vec<i32> = w[8..].iter().map(|b| i32::from_le_bytes(*b)).collect();
        assert_eq!(floats, vec![0.0, 1.5, 1.0, 150_000.5, 3.0, -1.0, 25.0]);
        assert_eq!(ints, vec![0, 0, 1, 3, 0, 2, 12]);
    }

    #[test]
    fn double_precision_negates_nwords() {
        let mut writer = MilleBinaryWriter::new(Vec::new(), true);
        writer.write_record(&record(1.5, 3.0)).unwrap();
        writer.end_track().unwrap();
        let bytes = writer.into_inner().unwrap();

        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), -14);
        assert_eq!(bytes.len(), 4 + 7 * 8 + 7 * 4);
    }

    #[test]
    fn empty_tracks_and_invalid_sigma_write_nothing() {
        let mut writer = MilleBinaryWriter::new(Vec::new(), false);
        writer.end_track().unwrap();
        writer.write_record(&record(1.0, 0.0)).unwrap();
        writer.write_record(&record(1.0, -2.0)).unwrap();
        writer.end_track().unwrap();

        assert_eq!(writer.tracks_written(), 0);
        assert!(writer.into_inner().unwrap().is_empty());
    }

    #[test]
    fn buffers_reset_between_tracks() {
        let mut writer = MilleBinaryWriter::new(Vec::new(), false);
        for _ in 0..2 {
            writer.write_record(&record(1.5, 3.0)).unwrap();
            writer.end_track().unwrap();
        }
        assert_eq!(writer.tracks_written(), 2);
        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes.len(), 2 * (4 + 14 * 4));
    }
}
