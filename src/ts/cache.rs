use super::packet::TS_PACKET_SIZE;
use crate::source::ByteSource;
use crate::{Error, Result};
use log::warn;

/// Packets held by a cache at its default capacity.
const DEFAULT_CAPACITY_PACKETS: usize = 1000;

/// Fixed-capacity read-ahead buffer yielding aligned 188-byte packets.
///
/// Reading one packet at a time from the byte source is wasteful; the cache
/// refills in capacity-sized gulps bounded by the clip size. The returned
/// slice borrows the cache, so it is valid exactly until the next
/// [`get_packet`](Self::get_packet) call.
pub struct PacketCache {
    data: Vec<u8>,
    offset: usize,
    size: usize,
    clip_size: u64,
}

impl PacketCache {
    /// A cache over a clip of `clip_size` bytes; zero means unsized, which
    /// bounds each refill by one cache capacity instead.
    pub fn new(clip_size: u64) -> Self {
        let capacity = DEFAULT_CAPACITY_PACKETS * TS_PACKET_SIZE;
        Self {
            data: vec![0; capacity],
            offset: 0,
            size: 0,
            clip_size: if clip_size == 0 {
                capacity as u64
            } else {
                clip_size
            },
        }
    }

    /// Next aligned packet, refilling from `source_offset` when drained.
    ///
    /// `source_offset` must be the absolute clip offset of the packet being
    /// requested; it is only consulted on a refill.
    pub fn get_packet(&mut self, source: &dyn ByteSource, source_offset: u64) -> Result<&[u8]> {
        if self.size - self.offset < TS_PACKET_SIZE {
            let mut size = self.data.len() as u64;
            if source_offset + size > self.clip_size {
                size = self.clip_size.saturating_sub(source_offset);
            }
            if size < TS_PACKET_SIZE as u64 {
                warn!("completed reading, end of stream");
                return Err(Error::EndOfStream);
            }

            let wanted = size as usize;
            let read = source
                .read_at(source_offset, &mut self.data[..wanted])
                .map_err(Error::Io)?;
            if read < wanted {
                return Err(Error::EndOfStream);
            }

            self.size = read;
            self.offset = 0;
        }

        let packet = &self.data[self.offset..self.offset + TS_PACKET_SIZE];
        self.offset += TS_PACKET_SIZE;
        Ok(packet)
    }

    /// Drop any buffered data; the next read refills.
    pub fn flush(&mut self) {
        self.offset = 0;
        self.size = 0;
    }
}
