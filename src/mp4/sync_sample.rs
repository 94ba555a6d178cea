use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};
use log::debug;

/// Sync-sample index list (`stss`), 0-based in memory (1-based on disk).
pub struct SyncSamples {
    entries: Vec<u32>,
}

impl SyncSamples {
    pub fn parse(source: &dyn ByteSource, data_offset: u64, data_size: u64) -> Result<Self> {
        if data_size < 8 {
            bail!("sync sample box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 8];
        read_exact_at(source, data_offset, &mut header)?;

        if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) != 0 {
            // Expected version = 0, flags = 0.
            bail!("sync sample box has nonzero version/flags");
        }

        let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if count < 2 {
            debug!("sync sample table is empty or has a single entry");
        }

        let mut raw = vec![0u8; count as usize * 4];
        read_exact_at(source, data_offset + 8, &mut raw)?;

        let entries = raw
            .chunks_exact(4)
            .map(|e| u32::from_be_bytes([e[0], e[1], e[2], e[3]]).wrapping_sub(1))
            .collect();

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
