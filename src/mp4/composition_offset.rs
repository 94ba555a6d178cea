use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};
use log::info;
use std::sync::Mutex;

/// Composition-time offsets (`ctts`), run-length encoded.
///
/// Offsets are kept as the raw 32-bit field for either box version; callers
/// widen them with [`widen_offset`] so version-1 negative offsets keep their
/// sign through 64-bit arithmetic.
pub struct CompositionOffsets {
    /// (sample count, raw offset) pairs.
    entries: Vec<(u32, u32)>,
    cursor: Mutex<Cursor>,
}

/// Lookup cursor: queries are mostly monotonic, so remember the run the last
/// query landed in and only rewind when asked for an earlier sample.
#[derive(Default)]
struct Cursor {
    run: usize,
    run_start: u64,
}

impl CompositionOffsets {
    pub fn parse(source: &dyn ByteSource, data_offset: u64, data_size: u64) -> Result<Self> {
        info!("there are reordered frames present");

        if data_size < 8 {
            bail!("composition offset box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 8];
        read_exact_at(source, data_offset, &mut header)?;

        let version_flags = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if version_flags != 0 && version_flags != 0x0100_0000 {
            // Expected version = 0 or 1, flags = 0.
            bail!("composition offset box has unsupported version/flags {version_flags:#x}");
        }

        let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if data_size != (u64::from(count) + 1) * 8 {
            bail!("composition offset box declares {count} entries but holds {data_size} bytes");
        }

        let mut raw = vec![0u8; count as usize * 8];
        read_exact_at(source, data_offset + 8, &mut raw)?;

        let entries = raw
            .chunks_exact(8)
            .map(|pair| {
                (
                    u32::from_be_bytes([pair[0], pair[1], pair[2], pair[3]]),
                    u32::from_be_bytes([pair[4], pair[5], pair[6], pair[7]]),
                )
            })
            .collect();

        Ok(Self {
            entries,
            cursor: Mutex::new(Cursor::default()),
        })
    }

    /// Raw composition offset of `sample_index`; 0 once the table runs out.
    pub fn offset_at(&self, sample_index: u32) -> u32 {
        let mut cursor = self.cursor.lock().unwrap();

        if u64::from(sample_index) < cursor.run_start {
            cursor.run = 0;
            cursor.run_start = 0;
        }

        while cursor.run < self.entries.len() {
            let (count, offset) = self.entries[cursor.run];
            if u64::from(sample_index) < cursor.run_start + u64::from(count) {
                return offset;
            }

            cursor.run_start += u64::from(count);
            cursor.run += 1;
        }

        0
    }
}

/// Widen a raw composition offset through the signed low 32 bits.
pub fn widen_offset(raw: u32) -> i64 {
    i64::from(raw as i32)
}
