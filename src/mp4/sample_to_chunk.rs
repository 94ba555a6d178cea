use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};

/// One `stsc` run: chunks `[start_chunk, next run's start_chunk)` each hold
/// `samples_per_chunk` samples described by `sample_desc_index`.
#[derive(Debug, Clone, Copy)]
pub struct SampleToChunkEntry {
    /// First chunk of the run, 0-based (the file stores it 1-based).
    pub start_chunk: u32,
    pub samples_per_chunk: u32,
    /// 1-based index into the sample description list.
    pub sample_desc_index: u32,
}

/// Sample-to-chunk mapping (`stsc`), run-length encoded.
pub struct SampleToChunk {
    entries: Vec<SampleToChunkEntry>,
}

impl SampleToChunk {
    pub fn parse(source: &dyn ByteSource, data_offset: u64, data_size: u64) -> Result<Self> {
        if data_size < 8 {
            bail!("sample-to-chunk box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 8];
        read_exact_at(source, data_offset, &mut header)?;

        if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) != 0 {
            // Expected version = 0, flags = 0.
            bail!("sample-to-chunk box has nonzero version/flags");
        }

        let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if data_size < 8 + u64::from(count) * 12 {
            bail!("sample-to-chunk box declares {count} entries but holds {data_size} bytes");
        }

        let mut entries: Vec<SampleToChunkEntry> = Vec::with_capacity(count as usize);
        for i in 0..count {
            let mut buf = [0u8; 12];
            read_exact_at(source, data_offset + 8 + u64::from(i) * 12, &mut buf)?;

            let first_chunk = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
            if first_chunk < 1 {
                // Chunk indices are 1-based on disk.
                bail!("sample-to-chunk entry {i} has first_chunk 0");
            }

            let entry = SampleToChunkEntry {
                start_chunk: first_chunk - 1,
                samples_per_chunk: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
                sample_desc_index: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            };

            if let Some(prev) = entries.last() {
                if entry.start_chunk <= prev.start_chunk {
                    bail!(
                        "sample-to-chunk first_chunk not increasing at entry {i}: {} after {}",
                        entry.start_chunk + 1,
                        prev.start_chunk + 1
                    );
                }
            }

            entries.push(entry);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SampleToChunkEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
