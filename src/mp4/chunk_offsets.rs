use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};

/// Which chunk-offset box backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOffsetKind {
    /// `stco`, 32-bit offsets.
    Stco,
    /// `co64`, 64-bit offsets.
    Co64,
}

/// Chunk byte offsets (`stco`/`co64`).
///
/// Only the header is decoded up front; individual entries are read from the
/// byte source on demand so that very large tracks do not pin the whole table
/// in memory.
pub struct ChunkOffsets {
    kind: ChunkOffsetKind,
    data_offset: u64,
    count: u32,
}

impl ChunkOffsets {
    pub fn parse(
        source: &dyn ByteSource,
        kind: ChunkOffsetKind,
        data_offset: u64,
        data_size: u64,
    ) -> Result<Self> {
        if data_size < 8 {
            bail!("chunk offset box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 8];
        read_exact_at(source, data_offset, &mut header)?;

        if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) != 0 {
            // Expected version = 0, flags = 0.
            bail!("chunk offset box has nonzero version/flags");
        }

        let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let entry_width = match kind {
            ChunkOffsetKind::Stco => 4,
            ChunkOffsetKind::Co64 => 8,
        };

        if data_size < 8 + u64::from(count) * entry_width {
            bail!("chunk offset box declares {count} entries but holds {data_size} bytes");
        }

        Ok(Self {
            kind,
            data_offset,
            count,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Read the absolute file offset of chunk `index`.
    pub fn offset_at(&self, source: &dyn ByteSource, index: u32) -> Result<u64> {
        if index >= self.count {
            return Err(crate::Error::BadIndex);
        }

        match self.kind {
            ChunkOffsetKind::Stco => {
                let mut buf = [0u8; 4];
                read_exact_at(source, self.data_offset + 8 + u64::from(index) * 4, &mut buf)?;
                Ok(u64::from(u32::from_be_bytes(buf)))
            }
            ChunkOffsetKind::Co64 => {
                let mut buf = [0u8; 8];
                read_exact_at(source, self.data_offset + 8 + u64::from(index) * 8, &mut buf)?;
                Ok(u64::from_be_bytes(buf))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;
    use crate::Error;

    fn stco_box(offsets: &[u32]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
        for offset in offsets {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        data
    }

    #[test]
    fn reads_32_bit_entries_lazily() {
        let data = stco_box(&[0, 100, 200, 300]);
        let len = data.len() as u64;
        let src = MemSource::new(data);

        let index = ChunkOffsets::parse(&src, ChunkOffsetKind::Stco, 0, len).unwrap();
        assert_eq!(index.count(), 4);
        assert_eq!(index.offset_at(&src, 2).unwrap(), 200);
        assert!(matches!(index.offset_at(&src, 4), Err(Error::BadIndex)));
    }

    #[test]
    fn reads_64_bit_entries() {
        let mut data = vec![0, 0, 0, 0, 0, 0, 0, 1];
        data.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        let len = data.len() as u64;
        let src = MemSource::new(data);

        let index = ChunkOffsets::parse(&src, ChunkOffsetKind::Co64, 0, len).unwrap();
        assert_eq!(index.offset_at(&src, 0).unwrap(), 0x1_0000_0000);
    }

    #[test]
    fn rejects_nonzero_version() {
        let mut data = stco_box(&[10]);
        data[0] = 1;
        let len = data.len() as u64;
        let src = MemSource::new(data);

        assert!(matches!(
            ChunkOffsets::parse(&src, ChunkOffsetKind::Stco, 0, len),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_undersized_payload() {
        let data = stco_box(&[10, 20]);
        let src = MemSource::new(data);

        // Claims 2 entries but the range is one entry short.
        assert!(matches!(
            ChunkOffsets::parse(&src, ChunkOffsetKind::Stco, 0, 12),
            Err(Error::Malformed(_))
        ));
    }
}
