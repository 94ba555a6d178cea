//! Raw 188-byte transport packet helpers.
//!
//! Layout per ISO/IEC 13818-1: sync byte `0x47`, 13-bit PID, adaptation
//! field, then (for a payload-unit start) the PES header carrying the
//! 33-bit PTS in 90 kHz units.

use crate::source::ByteSource;
use crate::{Error, Result};

/// Size of one transport packet.
pub const TS_PACKET_SIZE: usize = 188;

/// Leading byte of every transport packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// MIME type reported for MPEG-2 transport stream clips.
pub const MIME_TYPE_MPEG2TS: &str = "video/mp2ts";

/// Extract the PID of a raw transport packet.
pub fn parse_pid(packet: &[u8]) -> Result<u16> {
    if packet.len() != TS_PACKET_SIZE {
        return Err(Error::BadValue(format!(
            "transport packet is {} bytes",
            packet.len()
        )));
    }
    if packet[0] != TS_SYNC_BYTE {
        return Err(Error::BadValue(format!(
            "transport packet starts with {:#04x}",
            packet[0]
        )));
    }

    Ok((u16::from(packet[1] & 0x1f) << 8) | u16::from(packet[2]))
}

/// Extract the PTS carried by a raw transport packet, if it belongs to
/// `stream_pid` and starts a PES packet with a PTS field.
///
/// `Ok(None)` means "no PTS here" and is not an error; callers walking the
/// file simply skip on. A packet that is not transport data at all reports
/// `DeadObject`.
pub fn parse_pts(packet: &[u8], stream_pid: u16) -> Result<Option<u64>> {
    if packet.len() != TS_PACKET_SIZE || packet[0] != TS_SYNC_BYTE {
        return Err(Error::DeadObject("invalid transport packet".into()));
    }

    let payload_unit_start = packet[1] & 0x40 != 0;
    let pid = (u16::from(packet[1] & 0x1f) << 8) | u16::from(packet[2]);
    let adaptation_field_control = (packet[3] >> 4) & 0x03;

    if pid != stream_pid || !payload_unit_start {
        return Ok(None);
    }

    // Skip the adaptation field, if any.
    let mut offset = 4;
    if adaptation_field_control == 2 || adaptation_field_control == 3 {
        let adaptation_field_length = packet[offset] as usize;
        offset += 1 + adaptation_field_length;
    }
    if adaptation_field_control == 2 || offset + 14 > TS_PACKET_SIZE {
        // No payload, or not enough of it to hold a PES header with PTS.
        return Ok(None);
    }

    let pes = &packet[offset..];

    // PES start code prefix.
    if pes[0] != 0x00 || pes[1] != 0x00 || pes[2] != 0x01 {
        return Ok(None);
    }

    // Optional PES header marker bits.
    if pes[6] & 0xc0 != 0x80 {
        return Ok(None);
    }

    let pts_dts_flags = (pes[7] >> 6) & 0x03;
    if pts_dts_flags < 2 {
        return Ok(None);
    }

    Ok(Some(parse_timestamp(&pes[9..14])))
}

/// Assemble a 33-bit timestamp from its five-byte PES encoding.
fn parse_timestamp(data: &[u8]) -> u64 {
    (u64::from(data[0] >> 1) & 0x07) << 30
        | u64::from(data[1]) << 22
        | u64::from(data[2] >> 1) << 15
        | u64::from(data[3]) << 7
        | u64::from(data[4]) >> 1
}

/// Trivial transport-stream sniffer: five 188-byte-aligned slots must each
/// begin with the sync byte. Returns the MIME type and a 0.6 confidence.
pub fn sniff_mpeg2ts(source: &dyn ByteSource) -> Option<(&'static str, f32)> {
    for i in 0..5 {
        let mut header = [0u8; 1];
        match source.read_at((TS_PACKET_SIZE * i) as u64, &mut header) {
            Ok(1) if header[0] == TS_SYNC_BYTE => (),
            _ => return None,
        }
    }

    Some((MIME_TYPE_MPEG2TS, 0.6))
}
