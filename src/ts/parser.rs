//! The seam to the external transport-stream protocol parser.
//!
//! PAT/PMT discovery and PES reassembly live behind [`TsParser`]; the
//! navigation engine only feeds it aligned packets and drains the
//! per-elementary-stream [`PacketQueue`]s it exposes.

use super::packet;
use crate::{Error, Result};
use bytes::Bytes;

/// Which elementary stream to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Video,
    Audio,
}

/// Discontinuity signals forwarded to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discontinuity {
    /// A player-initiated seek: flush buffered PES data.
    PlayerSeek,
}

/// Identity of the elementary stream behind a queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueInfo {
    pub stream_pid: u16,
    pub program_pid: u16,
    /// PTS of the first access unit seen, in 90 kHz units.
    pub first_pts: u64,
}

/// Format of one track.
#[derive(Debug, Clone)]
pub struct TrackFormat {
    pub mime: String,
    /// Clip duration in microseconds, once discovered.
    pub duration_us: Option<i64>,
}

/// One decoder-parseable unit reassembled from PES payloads.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub data: Bytes,
    /// Presentation time in microseconds.
    pub time_us: i64,
    /// Whether the unit is decodable without references.
    pub is_sync: bool,
}

/// A per-elementary-stream access-unit queue fed by the parser.
pub trait PacketQueue: Send + Sync {
    fn stream_info(&self) -> QueueInfo;

    fn format(&self) -> TrackFormat;

    /// `Ok(true)` if a unit can be dequeued, `Ok(false)` if the parser needs
    /// more packets, `Err` once the queue is terminally closed.
    fn has_unit_available(&self) -> Result<bool>;

    fn next_unit_is_sync(&self) -> Result<bool>;

    fn next_unit_time_us(&self) -> Result<i64>;

    fn dequeue_unit(&self) -> Result<AccessUnit>;

    /// Close the queue; subsequent availability checks fail terminally.
    fn signal_eos(&self, error: Error);
}

/// The transport-stream protocol parser.
pub trait TsParser: Send {
    /// Consume one aligned 188-byte packet.
    fn feed_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Queue for the given stream kind, once its program has been seen.
    fn source(&mut self, kind: SourceKind) -> Option<std::sync::Arc<dyn PacketQueue>>;

    fn signal_discontinuity(&mut self, kind: Discontinuity);

    /// PID of a raw packet, without consuming it.
    fn parse_pid(&self, packet: &[u8]) -> Result<u16> {
        packet::parse_pid(packet)
    }

    /// PTS carried by a raw packet of `stream_pid`, without consuming it.
    fn parse_pts(&self, packet: &[u8], stream_pid: u16) -> Result<Option<u64>> {
        packet::parse_pts(packet, stream_pid)
    }
}
