//! Shared builders for synthetic sample tables and transport clips.

#![allow(dead_code)]

use medianav::mp4::{ChunkOffsetKind, SampleSizeKind, SampleTable};
use medianav::ts::TS_PACKET_SIZE;
use medianav::{ByteSource, MemSource};
use std::sync::Arc;

// ==========================================
// MP4 box payload builders
// ==========================================

pub fn full_box_header(version: u8) -> Vec<u8> {
    vec![version, 0, 0, 0]
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut data = full_box_header(0);
    data.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for offset in offsets {
        data.extend_from_slice(&offset.to_be_bytes());
    }
    data
}

/// Entries are (first_chunk 1-based, samples_per_chunk, desc_index).
pub fn stsc(entries: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut data = full_box_header(0);
    data.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (first_chunk, samples_per_chunk, desc) in entries {
        data.extend_from_slice(&first_chunk.to_be_bytes());
        data.extend_from_slice(&samples_per_chunk.to_be_bytes());
        data.extend_from_slice(&desc.to_be_bytes());
    }
    data
}

/// With `default_size != 0`, `count` stands alone; otherwise one entry per
/// size.
pub fn stsz(default_size: u32, count: u32, sizes: &[u32]) -> Vec<u8> {
    let mut data = full_box_header(0);
    data.extend_from_slice(&default_size.to_be_bytes());
    data.extend_from_slice(&count.to_be_bytes());
    if default_size == 0 {
        for size in sizes {
            data.extend_from_slice(&size.to_be_bytes());
        }
    }
    data
}

pub fn stts(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = full_box_header(0);
    data.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (count, delta) in entries {
        data.extend_from_slice(&count.to_be_bytes());
        data.extend_from_slice(&delta.to_be_bytes());
    }
    data
}

pub fn ctts(version: u8, entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = full_box_header(version);
    data.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (count, offset) in entries {
        data.extend_from_slice(&count.to_be_bytes());
        data.extend_from_slice(&offset.to_be_bytes());
    }
    data
}

/// 1-based sync sample indices.
pub fn stss(samples: &[u32]) -> Vec<u8> {
    let mut data = full_box_header(0);
    data.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for sample in samples {
        data.extend_from_slice(&sample.to_be_bytes());
    }
    data
}

/// Assembles box payloads into one byte source and loads a `SampleTable`.
#[derive(Default)]
pub struct TableBuilder {
    data: Vec<u8>,
    stco: Option<(u64, u64)>,
    stsc: Option<(u64, u64)>,
    stsz: Option<(u64, u64)>,
    stts: Option<(u64, u64)>,
    ctts: Option<(u64, u64)>,
    stss: Option<(u64, u64)>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&mut self, payload: Vec<u8>) -> (u64, u64) {
        let range = (self.data.len() as u64, payload.len() as u64);
        self.data.extend_from_slice(&payload);
        range
    }

    pub fn stco(mut self, offsets: &[u32]) -> Self {
        self.stco = Some(self.append(stco(offsets)));
        self
    }

    pub fn stsc(mut self, entries: &[(u32, u32, u32)]) -> Self {
        self.stsc = Some(self.append(stsc(entries)));
        self
    }

    pub fn stsz(mut self, default_size: u32, count: u32, sizes: &[u32]) -> Self {
        self.stsz = Some(self.append(stsz(default_size, count, sizes)));
        self
    }

    pub fn stts(mut self, entries: &[(u32, u32)]) -> Self {
        self.stts = Some(self.append(stts(entries)));
        self
    }

    pub fn ctts(mut self, entries: &[(u32, u32)]) -> Self {
        self.ctts = Some(self.append(ctts(0, entries)));
        self
    }

    pub fn stss(mut self, samples: &[u32]) -> Self {
        self.stss = Some(self.append(stss(samples)));
        self
    }

    pub fn build(self) -> SampleTable {
        let source = Arc::new(MemSource::new(self.data));
        let mut table = SampleTable::new(source);

        if let Some((offset, size)) = self.stco {
            table
                .set_chunk_offset_params(ChunkOffsetKind::Stco, offset, size)
                .unwrap();
        }
        if let Some((offset, size)) = self.stsc {
            table.set_sample_to_chunk_params(offset, size).unwrap();
        }
        if let Some((offset, size)) = self.stsz {
            table
                .set_sample_size_params(SampleSizeKind::Stsz, offset, size)
                .unwrap();
        }
        if let Some((offset, size)) = self.stts {
            table.set_time_to_sample_params(offset, size).unwrap();
        }
        if let Some((offset, size)) = self.ctts {
            table
                .set_composition_time_to_sample_params(offset, size)
                .unwrap();
        }
        if let Some((offset, size)) = self.stss {
            table.set_sync_sample_params(offset, size).unwrap();
        }

        table
    }
}

// ==========================================
// Transport packet builders
// ==========================================

/// One aligned packet: adaptation field (with the random-access flag) plus
/// payload, padded to 188 bytes.
pub fn ts_packet(pid: u16, pusi: bool, random_access: bool, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![
        0x47,
        (if pusi { 0x40 } else { 0x00 }) | (pid >> 8) as u8,
        pid as u8,
        0x30, // adaptation field + payload
    ];

    // Fixed two-byte adaptation field carrying the random-access bit.
    pkt.push(1);
    pkt.push(if random_access { 0x40 } else { 0x00 });

    pkt.extend_from_slice(payload);
    assert!(pkt.len() <= TS_PACKET_SIZE, "payload too large");
    pkt.resize(TS_PACKET_SIZE, 0xff);
    pkt
}

/// A null packet (PID 0x1fff) used as filler.
pub fn null_packet() -> Vec<u8> {
    ts_packet(0x1fff, false, false, &[])
}

/// Minimal PES header with a PTS, followed by `data`.
pub fn pes(stream_id: u8, pts: u64, data: &[u8]) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, stream_id];

    let pes_length = 3 + 5 + data.len();
    pes.push((pes_length >> 8) as u8);
    pes.push(pes_length as u8);

    pes.push(0x80); // marker bits
    pes.push(0x80); // PTS only
    pes.push(5);

    pes.push(0x21 | ((((pts >> 30) as u8) & 0x07) << 1));
    pes.push((pts >> 22) as u8);
    pes.push(0x01 | ((((pts >> 15) as u8) & 0x7f) << 1));
    pes.push((pts >> 7) as u8);
    pes.push(0x01 | (((pts as u8) & 0x7f) << 1));

    pes.extend_from_slice(data);
    pes
}

/// A stream packet carrying a PES start with `pts` and a payload marker.
pub fn stream_packet(pid: u16, pts: u64, sync: bool, marker: &[u8]) -> Vec<u8> {
    ts_packet(pid, true, sync, &pes(0xe0, pts, marker))
}

pub fn mem_source(data: Vec<u8>) -> Arc<dyn ByteSource> {
    Arc::new(MemSource::new(data))
}
