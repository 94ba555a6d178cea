use super::composition_offset::widen_offset;
use super::table::TableIndex;
use crate::{Error, Result};

/// Hysteretic cursor over logical samples.
///
/// Resolving a sample touches four tables; the cursor keeps the
/// sample-to-chunk run, the current chunk's per-sample sizes and the
/// time-to-sample position between calls so mostly-forward access patterns
/// stay cheap. Seeking backwards past the cached window rewinds to the start.
pub(crate) struct SampleIterator {
    initialized: bool,

    // Sample-to-chunk run cursor. Sample boundaries accumulate in u64 so a
    // hostile (stop_chunk - first_chunk) * samples_per_chunk cannot wrap.
    run_index: usize,
    first_chunk: u32,
    first_chunk_sample_index: u64,
    stop_chunk_sample_index: u64,
    samples_per_chunk: u32,
    chunk_desc: u32,

    // Current chunk cache.
    current_chunk_index: u32,
    current_chunk_offset: u64,
    current_chunk_sample_sizes: Vec<u32>,

    // Time-to-sample run cursor.
    time_to_sample_index: usize,
    tts_sample_index: u64,
    tts_sample_time: u64,
    tts_count: u64,
    tts_duration: u32,

    current_sample_index: u32,
    current_sample_offset: u64,
    current_sample_size: u32,
    current_sample_time: u64,
}

impl SampleIterator {
    pub fn new() -> Self {
        Self {
            initialized: false,
            run_index: 0,
            first_chunk: 0,
            first_chunk_sample_index: 0,
            stop_chunk_sample_index: 0,
            samples_per_chunk: 0,
            chunk_desc: 0,
            current_chunk_index: 0,
            current_chunk_offset: 0,
            current_chunk_sample_sizes: Vec::new(),
            time_to_sample_index: 0,
            tts_sample_index: 0,
            tts_sample_time: 0,
            tts_count: 0,
            tts_duration: 0,
            current_sample_index: 0,
            current_sample_offset: 0,
            current_sample_size: 0,
            current_sample_time: 0,
        }
    }

    fn reset(&mut self) {
        self.initialized = false;
        self.run_index = 0;
        self.first_chunk = 0;
        self.first_chunk_sample_index = 0;
        self.stop_chunk_sample_index = 0;
        self.samples_per_chunk = 0;
        self.chunk_desc = 0;
        self.current_chunk_sample_sizes.clear();
        self.reset_time_cursor();
    }

    fn reset_time_cursor(&mut self) {
        self.time_to_sample_index = 0;
        self.tts_sample_index = 0;
        self.tts_sample_time = 0;
        self.tts_count = 0;
        self.tts_duration = 0;
    }

    /// Position the cursor on `sample_index`, resolving offset, size, time
    /// and description index.
    pub fn seek_to(&mut self, index: &TableIndex, sample_index: u32) -> Result<()> {
        if sample_index >= index.num_samples() {
            return Err(Error::BadIndex);
        }

        let sample_to_chunk = index.sample_to_chunk()?;
        let chunk_offsets = index.chunk_offsets()?;

        if self.initialized && self.current_sample_index == sample_index {
            return Ok(());
        }

        if !self.initialized || u64::from(sample_index) < self.first_chunk_sample_index {
            self.reset();
        }

        if u64::from(sample_index) >= self.stop_chunk_sample_index {
            self.find_chunk_range(sample_to_chunk.entries(), sample_index)?;
        }

        let chunk = self.first_chunk
            + ((u64::from(sample_index) - self.first_chunk_sample_index)
                / u64::from(self.samples_per_chunk)) as u32;

        if self.current_chunk_sample_sizes.is_empty() || chunk != self.current_chunk_index {
            self.current_chunk_offset = chunk_offsets.offset_at(index.source(), chunk)?;

            self.current_chunk_sample_sizes.clear();
            let first_chunk_sample = self.first_chunk_sample_index
                + u64::from(self.samples_per_chunk) * u64::from(chunk - self.first_chunk);
            for i in 0..self.samples_per_chunk {
                let sample = first_chunk_sample + u64::from(i);
                if sample >= u64::from(index.num_samples()) {
                    // A trailing chunk may be cut short by the size table.
                    break;
                }
                self.current_chunk_sample_sizes
                    .push(index.sample_size_at(sample as u32)?);
            }

            self.current_chunk_index = chunk;
        }

        let chunk_relative = ((u64::from(sample_index) - self.first_chunk_sample_index)
            % u64::from(self.samples_per_chunk)) as usize;

        self.current_sample_offset = self.current_chunk_offset;
        for &size in &self.current_chunk_sample_sizes[..chunk_relative] {
            self.current_sample_offset += u64::from(size);
        }
        self.current_sample_size = self.current_chunk_sample_sizes[chunk_relative];

        if u64::from(sample_index) < self.tts_sample_index {
            self.reset_time_cursor();
        }
        self.current_sample_time = self.find_sample_time(index, sample_index)?;

        self.current_sample_index = sample_index;
        self.initialized = true;

        Ok(())
    }

    /// Advance the sample-to-chunk run cursor until it covers `sample_index`.
    fn find_chunk_range(
        &mut self,
        entries: &[super::sample_to_chunk::SampleToChunkEntry],
        sample_index: u32,
    ) -> Result<()> {
        while u64::from(sample_index) >= self.stop_chunk_sample_index {
            if self.run_index == entries.len() {
                return Err(Error::OutOfRange);
            }

            let entry = entries[self.run_index];
            if entry.samples_per_chunk == 0 {
                return Err(crate::err!(
                    "sample-to-chunk run {} has zero samples per chunk",
                    self.run_index
                ));
            }

            self.first_chunk_sample_index = self.stop_chunk_sample_index;
            self.first_chunk = entry.start_chunk;
            self.samples_per_chunk = entry.samples_per_chunk;
            self.chunk_desc = entry.sample_desc_index;

            if self.run_index + 1 < entries.len() {
                let stop_chunk = entries[self.run_index + 1].start_chunk;
                self.stop_chunk_sample_index = self.first_chunk_sample_index
                    + u64::from(stop_chunk - self.first_chunk) * u64::from(self.samples_per_chunk);
            } else {
                // The last run covers every remaining chunk.
                self.stop_chunk_sample_index = u64::MAX;
            }

            self.run_index += 1;
        }

        Ok(())
    }

    /// Decode time of `sample_index` plus its composition offset, widened to
    /// 64 bits through the signed low 32 bits.
    fn find_sample_time(&mut self, index: &TableIndex, sample_index: u32) -> Result<u64> {
        let entries = index.time_to_sample()?;

        while u64::from(sample_index) >= self.tts_sample_index + self.tts_count {
            if self.time_to_sample_index == entries.len() {
                return Err(Error::OutOfRange);
            }

            self.tts_sample_index += self.tts_count;
            self.tts_sample_time += self.tts_count * u64::from(self.tts_duration);

            let entry = entries[self.time_to_sample_index];
            self.tts_count = u64::from(entry.count);
            self.tts_duration = entry.delta;
            self.time_to_sample_index += 1;
        }

        let decode_time = self.tts_sample_time
            + u64::from(self.tts_duration) * (u64::from(sample_index) - self.tts_sample_index);

        Ok(decode_time.wrapping_add_signed(widen_offset(
            index.composition_offset_at(sample_index),
        )))
    }

    pub fn sample_offset(&self) -> u64 {
        self.current_sample_offset
    }

    pub fn sample_size(&self) -> u32 {
        self.current_sample_size
    }

    pub fn sample_time(&self) -> u64 {
        self.current_sample_time
    }

    pub fn desc_index(&self) -> u32 {
        self.chunk_desc
    }
}
