//! Sample-table façade over the `stbl` sub-box indices.
//!
//! The table owns every index, answers per-sample metadata queries through a
//! cached iterator and resolves temporal searches over a lazily built,
//! composition-time-sorted lookup table.

use super::chunk_offsets::{ChunkOffsetKind, ChunkOffsets};
use super::composition_offset::{widen_offset, CompositionOffsets};
use super::iterator::SampleIterator;
use super::sample_desc::SampleDescriptions;
use super::sample_size::{SampleSizeKind, SampleSizes};
use super::sample_to_chunk::SampleToChunk;
use super::sync_sample::SyncSamples;
use super::time_to_sample::{TimeToSample, TimeToSampleEntry};
use crate::source::ByteSource;
use crate::{bail, Error, Result};
use log::error;
use std::sync::{Arc, Mutex};

/// Direction constraint for temporal searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// The result must not lie after the requested time.
    Before,
    /// The result must not lie before the requested time.
    After,
    /// Whichever side is closer; ties resolve to the earlier time.
    Closest,
}

/// Everything known about one sample.
#[derive(Debug, Clone, Copy)]
pub struct SampleMetadata {
    /// Absolute file offset of the sample payload.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u32,
    /// Composition time in decode-time units.
    pub composition_time: u64,
    /// Whether the sample can be decoded without references.
    pub is_sync: bool,
    /// 1-based index into the sample description list.
    pub sample_desc_index: u32,
}

/// Loaded indices; immutable once the `set_*` loading phase is over.
pub(crate) struct TableIndex {
    source: Arc<dyn ByteSource>,
    chunk_offsets: Option<ChunkOffsets>,
    sample_to_chunk: Option<SampleToChunk>,
    sample_sizes: Option<SampleSizes>,
    time_to_sample: Option<TimeToSample>,
    composition_offsets: Option<CompositionOffsets>,
    sync_samples: Option<SyncSamples>,
    sample_descs: SampleDescriptions,
}

impl TableIndex {
    pub fn source(&self) -> &dyn ByteSource {
        self.source.as_ref()
    }

    pub fn num_samples(&self) -> u32 {
        self.sample_sizes.as_ref().map_or(0, SampleSizes::count)
    }

    pub fn chunk_offsets(&self) -> Result<&ChunkOffsets> {
        self.chunk_offsets
            .as_ref()
            .ok_or_else(|| crate::err!("chunk offsets not loaded"))
    }

    pub fn sample_to_chunk(&self) -> Result<&SampleToChunk> {
        self.sample_to_chunk
            .as_ref()
            .ok_or_else(|| crate::err!("sample-to-chunk table not loaded"))
    }

    pub fn time_to_sample(&self) -> Result<&[TimeToSampleEntry]> {
        self.time_to_sample
            .as_ref()
            .map(TimeToSample::entries)
            .ok_or_else(|| crate::err!("time-to-sample table not loaded"))
    }

    /// Raw composition offset for `sample_index`; 0 without a `ctts` box.
    pub fn composition_offset_at(&self, sample_index: u32) -> u32 {
        self.composition_offsets
            .as_ref()
            .map_or(0, |c| c.offset_at(sample_index))
    }

    pub fn sample_size_at(&self, sample_index: u32) -> Result<u32> {
        self.sample_sizes
            .as_ref()
            .ok_or_else(|| crate::err!("sample size table not loaded"))?
            .size_at(self.source.as_ref(), sample_index)
    }
}

/// (sample index, composition time), sorted by time once built.
#[derive(Clone, Copy)]
struct SampleTimeEntry {
    sample_index: u32,
    composition_time: u64,
}

struct TableCache {
    iter: SampleIterator,
    sample_time_entries: Option<Vec<SampleTimeEntry>>,
    last_sync_sample_index: usize,
}

/// Sample table (`stbl`) query engine.
///
/// Loading runs through the `set_*` methods, each accepted at most once;
/// queries may then run from multiple threads.
pub struct SampleTable {
    index: TableIndex,
    cache: Mutex<TableCache>,
}

impl SampleTable {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            index: TableIndex {
                source,
                chunk_offsets: None,
                sample_to_chunk: None,
                sample_sizes: None,
                time_to_sample: None,
                composition_offsets: None,
                sync_samples: None,
                sample_descs: SampleDescriptions::default(),
            },
            cache: Mutex::new(TableCache {
                iter: SampleIterator::new(),
                sample_time_entries: None,
                last_sync_sample_index: 0,
            }),
        }
    }

    /// True once every mandatory index is loaded.
    pub fn is_valid(&self) -> bool {
        self.index.chunk_offsets.is_some()
            && self.index.sample_to_chunk.is_some()
            && self.index.sample_sizes.is_some()
            && self.index.time_to_sample.is_some()
    }

    pub fn set_chunk_offset_params(
        &mut self,
        kind: ChunkOffsetKind,
        data_offset: u64,
        data_size: u64,
    ) -> Result<()> {
        if self.index.chunk_offsets.is_some() {
            bail!("chunk offset box loaded twice");
        }
        self.index.chunk_offsets = Some(ChunkOffsets::parse(
            self.index.source.as_ref(),
            kind,
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    pub fn set_sample_to_chunk_params(&mut self, data_offset: u64, data_size: u64) -> Result<()> {
        if self.index.sample_to_chunk.is_some() {
            bail!("sample-to-chunk box loaded twice");
        }
        self.index.sample_to_chunk = Some(SampleToChunk::parse(
            self.index.source.as_ref(),
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    pub fn set_sample_size_params(
        &mut self,
        kind: SampleSizeKind,
        data_offset: u64,
        data_size: u64,
    ) -> Result<()> {
        if self.index.sample_sizes.is_some() {
            bail!("sample size box loaded twice");
        }
        self.index.sample_sizes = Some(SampleSizes::parse(
            self.index.source.as_ref(),
            kind,
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    pub fn set_time_to_sample_params(&mut self, data_offset: u64, data_size: u64) -> Result<()> {
        if self.index.time_to_sample.is_some() {
            bail!("time-to-sample box loaded twice");
        }
        self.index.time_to_sample = Some(TimeToSample::parse(
            self.index.source.as_ref(),
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    pub fn set_composition_time_to_sample_params(
        &mut self,
        data_offset: u64,
        data_size: u64,
    ) -> Result<()> {
        if self.index.composition_offsets.is_some() {
            bail!("composition offset box loaded twice");
        }
        self.index.composition_offsets = Some(CompositionOffsets::parse(
            self.index.source.as_ref(),
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    pub fn set_sync_sample_params(&mut self, data_offset: u64, data_size: u64) -> Result<()> {
        if self.index.sync_samples.is_some() {
            bail!("sync sample box loaded twice");
        }
        self.index.sync_samples = Some(SyncSamples::parse(
            self.index.source.as_ref(),
            data_offset,
            data_size,
        )?);
        Ok(())
    }

    /// Load `count` sample description entries starting at `offset`.
    pub fn set_sample_desc_params(&mut self, count: u32, offset: u64) -> Result<()> {
        if !self.index.sample_descs.is_empty() {
            bail!("sample description box loaded twice");
        }
        self.index.sample_descs =
            SampleDescriptions::parse(self.index.source.as_ref(), count, offset)?;
        Ok(())
    }

    pub fn count_chunk_offsets(&self) -> u32 {
        self.index
            .chunk_offsets
            .as_ref()
            .map_or(0, ChunkOffsets::count)
    }

    pub fn count_samples(&self) -> u32 {
        self.index.num_samples()
    }

    pub fn num_sync_samples(&self) -> u32 {
        self.index
            .sync_samples
            .as_ref()
            .map_or(0, |s| s.len() as u32)
    }

    /// Raw composition offset of `sample_index` (hysteretic ctts lookup).
    pub fn composition_time_offset(&self, sample_index: u32) -> u32 {
        self.index.composition_offset_at(sample_index)
    }

    /// Configuration payload for 1-based description `index`.
    pub fn sample_desc(&self, index: u32) -> Option<&[u8]> {
        self.index.sample_descs.get(index)
    }

    /// Largest sample description payload, in bytes.
    pub fn max_sample_desc_size(&self) -> usize {
        self.index.sample_descs.max_size()
    }

    /// Largest sample in the track, in bytes.
    pub fn max_sample_size(&self) -> Result<u32> {
        let _cache = self.cache.lock().unwrap();

        let mut max_size = 0;
        for i in 0..self.index.num_samples() {
            let size = self.index.sample_size_at(i)?;
            if size > max_size {
                max_size = size;
            }
        }

        Ok(max_size)
    }

    /// Fresh cursor borrowing this table's indices.
    pub fn cursor(&self) -> SampleCursor<'_> {
        SampleCursor {
            index: &self.index,
            state: SampleIterator::new(),
        }
    }

    /// Resolve offset, size, composition time, sync membership and
    /// description index for one sample.
    pub fn sample_metadata(&self, sample_index: u32) -> Result<SampleMetadata> {
        let mut cache = self.cache.lock().unwrap();
        let TableCache {
            iter,
            last_sync_sample_index,
            ..
        } = &mut *cache;

        iter.seek_to(&self.index, sample_index)?;

        let is_sync = match &self.index.sync_samples {
            // Every sample is a sync sample.
            None => true,
            Some(sync) => {
                let entries = sync.entries();
                let mut i = if *last_sync_sample_index < entries.len()
                    && entries[*last_sync_sample_index] <= sample_index
                {
                    *last_sync_sample_index
                } else {
                    0
                };

                while i < entries.len() && entries[i] < sample_index {
                    i += 1;
                }

                let found = i < entries.len() && entries[i] == sample_index;
                *last_sync_sample_index = i;
                found
            }
        };

        Ok(SampleMetadata {
            offset: iter.sample_offset(),
            size: iter.sample_size(),
            composition_time: iter.sample_time(),
            is_sync,
            sample_desc_index: iter.desc_index(),
        })
    }

    /// Sample whose composition time matches `req_time` under `mode`.
    pub fn find_sample_at_time(&self, req_time: u64, mode: SeekMode) -> Result<u32> {
        let mut cache = self.cache.lock().unwrap();
        self.build_sample_time_entries(&mut cache)?;
        let entries = cache.sample_time_entries.as_deref().unwrap();

        if entries.is_empty() {
            return Err(Error::OutOfRange);
        }

        let mut left = 0;
        let mut right = entries.len();
        while left < right {
            let center = (left + right) / 2;
            let center_time = entries[center].composition_time;

            if req_time < center_time {
                right = center;
            } else if req_time > center_time {
                left = center + 1;
            } else {
                left = center;
                break;
            }
        }

        if left == entries.len() {
            if mode == SeekMode::After {
                return Err(Error::OutOfRange);
            }
            left -= 1;
        }

        let mut closest = left;
        match mode {
            SeekMode::Before => {
                while closest > 0 && entries[closest].composition_time > req_time {
                    closest -= 1;
                }
            }
            SeekMode::After => {
                while closest + 1 < entries.len() && entries[closest].composition_time < req_time {
                    closest += 1;
                }
            }
            SeekMode::Closest => {
                if closest > 0 {
                    // Check the left neighbour and pick the closer one,
                    // preferring the earlier entry when equidistant.
                    let found = abs_difference(entries[closest].composition_time, req_time);
                    let neighbour = abs_difference(entries[closest - 1].composition_time, req_time);

                    if found >= neighbour {
                        closest -= 1;
                    }
                }
            }
        }

        Ok(entries[closest].sample_index)
    }

    /// Sync sample nearest `start_index`, refined by `mode`.
    pub fn find_sync_sample_near(&self, start_index: u32, mode: SeekMode) -> Result<u32> {
        let mut cache = self.cache.lock().unwrap();

        let sync = match &self.index.sync_samples {
            // All samples are sync samples.
            None => return Ok(start_index),
            Some(sync) => sync,
        };

        if sync.is_empty() {
            return Ok(0);
        }

        let entries = sync.entries();
        let mut left = 0;
        while left < entries.len() {
            if entries[left] >= start_index {
                break;
            }
            left += 1;
        }

        if left == entries.len() && mode == SeekMode::After {
            error!("tried to find a sync frame after the last one: {left}");
            return Err(Error::OutOfRange);
        }

        if left > 0 {
            left -= 1;
        }

        let mut x = entries[left];

        if left + 1 < entries.len() {
            let y = entries[left + 1];

            // The start sample lies between sync samples x and y; pick the
            // one closer in time, later one on a tie.
            let iter = &mut cache.iter;

            iter.seek_to(&self.index, start_index)?;
            let sample_time = iter.sample_time();

            iter.seek_to(&self.index, x)?;
            let x_time = iter.sample_time();

            iter.seek_to(&self.index, y)?;
            let y_time = iter.sample_time();

            if abs_difference(x_time, sample_time) >= abs_difference(y_time, sample_time) {
                x = y;
                left += 1;
            }
        }

        match mode {
            SeekMode::Before => {
                if x > start_index {
                    if left == 0 {
                        return Err(Error::OutOfRange);
                    }
                    x = entries[left - 1];
                }
            }
            SeekMode::After => {
                if x < start_index {
                    if left + 1 >= entries.len() {
                        return Err(Error::OutOfRange);
                    }
                    x = entries[left + 1];
                }
            }
            SeekMode::Closest => {}
        }

        Ok(x)
    }

    /// Of the first (up to) 20 sync samples, the one with the largest
    /// compressed size.
    pub fn find_thumbnail_sample(&self) -> Result<u32> {
        const MAX_NUM_SYNC_SAMPLES_TO_SCAN: usize = 20;

        let _cache = self.cache.lock().unwrap();

        let sync = match &self.index.sync_samples {
            // All samples are sync samples.
            None => return Ok(0),
            Some(sync) => sync,
        };

        let mut best_sample_index = 0;
        let mut max_sample_size = 0;

        for (i, &x) in sync
            .entries()
            .iter()
            .take(MAX_NUM_SYNC_SAMPLES_TO_SCAN)
            .enumerate()
        {
            let size = self.index.sample_size_at(x)?;
            if i == 0 || size > max_sample_size {
                best_sample_index = x;
                max_sample_size = size;
            }
        }

        Ok(best_sample_index)
    }

    /// Build the composition-time-sorted lookup table once.
    fn build_sample_time_entries(&self, cache: &mut TableCache) -> Result<()> {
        if cache.sample_time_entries.is_some() {
            return Ok(());
        }

        let num_samples = self.index.num_samples();
        let stts = self.index.time_to_sample()?;

        // Samples past the end of stts keep composition time 0; malformed
        // content with mismatched counts exists and is tolerated here.
        let mut entries: Vec<SampleTimeEntry> = (0..num_samples)
            .map(|sample_index| SampleTimeEntry {
                sample_index,
                composition_time: 0,
            })
            .collect();

        let mut sample_index: u32 = 0;
        let mut sample_time: u64 = 0;

        'runs: for entry in stts {
            for _ in 0..entry.count {
                if sample_index >= num_samples {
                    break 'runs;
                }

                entries[sample_index as usize].composition_time = sample_time.wrapping_add_signed(
                    widen_offset(self.index.composition_offset_at(sample_index)),
                );

                sample_index += 1;
                sample_time += u64::from(entry.delta);
            }
        }

        entries.sort_unstable_by_key(|entry| entry.composition_time);
        cache.sample_time_entries = Some(entries);

        Ok(())
    }
}

fn abs_difference(a: u64, b: u64) -> u64 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Non-owning cursor over a table's samples.
pub struct SampleCursor<'a> {
    index: &'a TableIndex,
    state: SampleIterator,
}

impl SampleCursor<'_> {
    /// Position the cursor on `sample_index`.
    pub fn seek_to(&mut self, sample_index: u32) -> Result<()> {
        self.state.seek_to(self.index, sample_index)
    }

    pub fn sample_offset(&self) -> u64 {
        self.state.sample_offset()
    }

    pub fn sample_size(&self) -> u32 {
        self.state.sample_size()
    }

    /// Composition time in decode-time units.
    pub fn sample_time(&self) -> u64 {
        self.state.sample_time()
    }

    pub fn desc_index(&self) -> u32 {
        self.state.desc_index()
    }
}
