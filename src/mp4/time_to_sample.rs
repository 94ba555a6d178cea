use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};

/// One `stts` run: `count` consecutive samples, each `delta` decode-time
/// units long.
#[derive(Debug, Clone, Copy)]
pub struct TimeToSampleEntry {
    pub count: u32,
    pub delta: u32,
}

/// Decode-time deltas (`stts`), loaded in full: the table is small and is
/// scanned on every timed query.
pub struct TimeToSample {
    entries: Vec<TimeToSampleEntry>,
}

impl TimeToSample {
    pub fn parse(source: &dyn ByteSource, data_offset: u64, data_size: u64) -> Result<Self> {
        if data_size < 8 {
            bail!("time-to-sample box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 8];
        read_exact_at(source, data_offset, &mut header)?;

        if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) != 0 {
            // Expected version = 0, flags = 0.
            bail!("time-to-sample box has nonzero version/flags");
        }

        let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        let mut raw = vec![0u8; count as usize * 8];
        read_exact_at(source, data_offset + 8, &mut raw)?;

        let entries = raw
            .chunks_exact(8)
            .map(|pair| TimeToSampleEntry {
                count: u32::from_be_bytes([pair[0], pair[1], pair[2], pair[3]]),
                delta: u32::from_be_bytes([pair[4], pair[5], pair[6], pair[7]]),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[TimeToSampleEntry] {
        &self.entries
    }
}
