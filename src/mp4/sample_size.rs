use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Error, Result};

/// Which sample-size box backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSizeKind {
    /// `stsz`, 32-bit sizes or a single default size.
    Stsz,
    /// `stz2`, sizes bit-packed at 4, 8 or 16 bits per sample.
    Stz2,
}

/// Per-sample byte sizes (`stsz`/`stz2`).
///
/// With a nonzero default size there is no table at all; otherwise entries
/// are read from the byte source on demand, including the packed `stz2`
/// variants (4-bit sizes store the earlier sample in the high nibble).
pub struct SampleSizes {
    data_offset: u64,
    /// Bits per stored size: 32 for `stsz`, 4/8/16 for `stz2`.
    field_size: u32,
    default_size: u32,
    count: u32,
}

impl SampleSizes {
    pub fn parse(
        source: &dyn ByteSource,
        kind: SampleSizeKind,
        data_offset: u64,
        data_size: u64,
    ) -> Result<Self> {
        if data_size < 12 {
            bail!("sample size box truncated: {data_size} bytes");
        }

        let mut header = [0u8; 12];
        read_exact_at(source, data_offset, &mut header)?;

        if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) != 0 {
            // Expected version = 0, flags = 0.
            bail!("sample size box has nonzero version/flags");
        }

        let mut default_size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        let field_size = match kind {
            SampleSizeKind::Stsz => {
                if default_size == 0 && data_size < 12 + u64::from(count) * 4 {
                    bail!("sample size box declares {count} entries but holds {data_size} bytes");
                }
                32
            }
            SampleSizeKind::Stz2 => {
                if default_size & 0xffff_ff00 != 0 {
                    // The high 24 bits are reserved.
                    bail!("compact sample size box has reserved bits set");
                }

                let field_size = default_size & 0xff;
                default_size = 0;

                if field_size != 4 && field_size != 8 && field_size != 16 {
                    bail!("compact sample size box has unsupported field size {field_size}");
                }

                if data_size < 12 + (u64::from(count) * u64::from(field_size) + 4) / 8 {
                    bail!("compact sample size box declares {count} entries but holds {data_size} bytes");
                }

                field_size
            }
        };

        Ok(Self {
            data_offset,
            field_size,
            default_size,
            count,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn default_size(&self) -> u32 {
        self.default_size
    }

    /// Read the size of sample `index` in bytes.
    pub fn size_at(&self, source: &dyn ByteSource, index: u32) -> Result<u32> {
        if index >= self.count {
            return Err(Error::BadIndex);
        }

        if self.default_size > 0 {
            return Ok(self.default_size);
        }

        let table = self.data_offset + 12;
        match self.field_size {
            32 => {
                let mut buf = [0u8; 4];
                read_exact_at(source, table + u64::from(index) * 4, &mut buf)?;
                Ok(u32::from_be_bytes(buf))
            }
            16 => {
                let mut buf = [0u8; 2];
                read_exact_at(source, table + u64::from(index) * 2, &mut buf)?;
                Ok(u32::from(u16::from_be_bytes(buf)))
            }
            8 => {
                let mut buf = [0u8; 1];
                read_exact_at(source, table + u64::from(index), &mut buf)?;
                Ok(u32::from(buf[0]))
            }
            4 => {
                let mut buf = [0u8; 1];
                read_exact_at(source, table + u64::from(index) / 2, &mut buf)?;
                // High nibble holds the even-indexed sample.
                Ok(u32::from(if index & 1 == 0 {
                    buf[0] >> 4
                } else {
                    buf[0] & 0x0f
                }))
            }
            _ => Err(crate::err!("unsupported sample size field width")),
        }
    }
}
