//! ISO Base Media sample-table engine.
//!
//! Decodes the `stbl` sub-boxes (`stco`/`co64`, `stsc`, `stsz`/`stz2`,
//! `stts`, `ctts`, `stss`, `stsd`) over a random-access byte source and
//! answers per-sample queries: byte offset, size, timing, sync membership
//! and temporal seeks. Box layouts follow ISO/IEC 14496-12 §8.5–8.7.

mod chunk_offsets;
mod composition_offset;
mod iterator;
mod sample_desc;
mod sample_size;
mod sample_to_chunk;
mod sync_sample;
mod table;
mod time_to_sample;

pub use chunk_offsets::ChunkOffsetKind;
pub use sample_size::SampleSizeKind;
pub use table::{SampleCursor, SampleMetadata, SampleTable, SeekMode};
