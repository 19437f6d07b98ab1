use std::io::{ErrorKind, Read};

use crate::{constants::Label, telmille_errors::TelMilleError};

/// One decoded measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MilleRecord {
    pub residual: f64,
    /// `(local index starting at 1, derivative)`, non-zero entries only.
    pub local: Vec<(u32, f64)>,
    pub sigma: f64,
    /// `(label, derivative)`, non-zero entries only.
    pub global: Vec<(Label, f64)>,
}

/// One decoded track block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MilleTrack {
    pub records: Vec<MilleRecord>,
    pub double_precision: bool,
}

/// Decoder of a Mille binary stream, one track per [`Iterator::next`].
#[derive(Debug)]
pub struct MilleReader<R: Read> {
    input: R,
}

impl<R: Read> MilleReader<R> {
    pub fn new(input: R) -> Self {
        MilleReader { input }
    }

    /// Read the next track block, `Ok(None)` at a clean end of stream.
    pub fn next_track(&mut self) -> Result<Option<MilleTrack>, TelMilleError> {
        let mut head = [0u8; 4];
        match self.input.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let nwords = i32::from_le_bytes(head);
        let double_precision = nwords < 0;
        let nwords = nwords.unsigned_abs() as usize;
        if nwords == 0 || nwords % 2 != 0 {
            return Err(TelMilleError::MalformedMilleStream(format!(
                "invalid word count {nwords}"
            )));
        }
        let n = nwords / 2;

        let floats = if double_precision {
            self.read_words::<8>(n)?
                .into_iter()
                .map(f64::from_le_bytes)
                .collect::<Vec<_>>()
        } else {
            self.read_words::<4>(n)?
                .into_iter()
                .map(|b| f32::from_le_bytes(b) as f64)
                .collect()
        };
        let ints: Vec<i32> = self
            .read_words::<4>(n)?
            .into_iter()
            .map(i32::from_le_bytes)
            .collect();

        Ok(Some(MilleTrack {
            records: decode_records(&floats, &ints)?,
            double_precision,
        }))
    }

    /// `count` words of `N` bytes. The buffer grows with what the stream actually holds, so a
    /// corrupt word count ends in a truncation error instead of a huge allocation.
    fn read_words<const N: usize>(&mut self, count: usize) -> Result<Vec<[u8; N]>, TelMilleError> {
        let expected = count
            .checked_mul(N)
            .ok_or_else(|| TelMilleError::MalformedMilleStream("word count overflow".into()))?;
        let mut bytes = Vec::new();
        (&mut self.input)
            .take(expected as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != expected {
            return Err(TelMilleError::MalformedMilleStream(
                "truncated track block".into(),
            ));
        }

        Ok(bytes
            .chunks_exact(N)
            .filter_map(|chunk| <[u8; N]>::try_from(chunk).ok())
            .collect())
    }
}

impl<R: Read> Iterator for MilleReader<R> {
    type Item = Result<MilleTrack, TelMilleError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_track().transpose()
    }
}

fn decode_records(floats: &[f64], ints: &[i32]) -> Result<Vec<MilleRecord>, TelMilleError> {
    let malformed = |what: &str| TelMilleError::MalformedMilleStream(what.to_string());

    if floats.first() != Some(&0.0) || ints.first() != Some(&0) {
        return Err(malformed("track block does not start with (0.0, 0)"));
    }

    let mut records = Vec::new();
    let mut i = 1;
    while i < ints.len() {
        if ints[i] != 0 {
            return Err(malformed("expected a measurement marker"));
        }
        let residual = floats[i];
        i += 1;

        let mut local = Vec::new();
        while i < ints.len() && ints[i] != 0 {
            let index = u32::try_from(ints[i]).map_err(|_| malformed("negative local index"))?;
            local.push((index, floats[i]));
            i += 1;
        }

        if i >= ints.len() {
            return Err(malformed("record without sigma"));
        }
        let sigma = floats[i];
        i += 1;

        let mut global = Vec::new();
        while i < ints.len() && ints[i] != 0 {
            let label = Label::try_from(ints[i]).map_err(|_| malformed("negative label"))?;
            global.push((label, floats[i]));
            i += 1;
        }

        records.push(MilleRecord {
            residual,
            local,
            sigma,
            global,
        });
    }
    Ok(records)
}
