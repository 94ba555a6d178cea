//! MPEG-2 transport-stream navigation engine.
//!
//! Packetizes a 188-byte-aligned clip, drives an external protocol parser
//! (PAT/PMT discovery, PES reassembly) to find the elementary streams, and
//! answers duration and PTS-keyed seek queries over the unindexed container.

mod cache;
mod cursor;
mod extractor;
mod packet;
mod parser;

pub use cache::PacketCache;
pub use cursor::{SeekRequest, TsStreamCursor};
pub use extractor::{
    TsExtractor, TsExtractorConfig, CAN_PAUSE, CAN_SEEK, CAN_SEEK_BACKWARD, CAN_SEEK_FORWARD,
};
pub use packet::{
    parse_pid, parse_pts, sniff_mpeg2ts, MIME_TYPE_MPEG2TS, TS_PACKET_SIZE, TS_SYNC_BYTE,
};
pub use parser::{
    AccessUnit, Discontinuity, PacketQueue, QueueInfo, SourceKind, TrackFormat, TsParser,
};
