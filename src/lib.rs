//! Navigation engines for the two container formats a progressive-download
//! player has to index on the fly: ISO Base Media (MP4) sample tables and
//! MPEG-2 transport streams.
//!
//! Both engines operate over an opaque random-access [`ByteSource`]; neither
//! decodes media. The MP4 side answers per-sample queries (offset, size,
//! timing, sync membership, temporal seeks) by fusing the `stbl` sub-box
//! indices; the TS side discovers elementary streams, derives the clip
//! duration from its first and last PTS, and seeks by walking PTS values
//! through the unindexed packet stream.

mod error;
mod source;

pub mod mp4;
pub mod ts;

pub use error::{Error, Result};
pub use source::{ByteSource, MemSource};
