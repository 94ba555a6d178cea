use crate::source::{read_exact_at, ByteSource};
use crate::{bail, Result};
use log::{debug, error};

/// Offset of the `avcC` child within an `avc1` sample entry body.
const AVCC_OFFSET: usize = 78;

/// AVC decoder configuration payloads from `stsd`, indexed from 1 by the
/// sample-to-chunk description field.
#[derive(Default)]
pub struct SampleDescriptions {
    atoms: Vec<Vec<u8>>,
}

impl SampleDescriptions {
    /// Walk `count` sample entries starting at `offset`. Only `avc1` entries
    /// carrying an `avcC` child are accepted; anything else is malformed.
    pub fn parse(source: &dyn ByteSource, count: u32, mut offset: u64) -> Result<Self> {
        let mut atoms = Vec::new();

        for _ in 0..count {
            let mut header = [0u8; 8];
            read_exact_at(source, offset, &mut header)?;

            let mut entry_size =
                u64::from(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
            let entry_type = [header[4], header[5], header[6], header[7]];
            let mut data_offset = offset + 8;

            if entry_size == 0 {
                bail!("sample description entry has zero size");
            }

            if entry_size == 1 {
                let mut extended = [0u8; 8];
                read_exact_at(source, offset + 8, &mut extended)?;
                entry_size = u64::from_be_bytes(extended);
                data_offset += 8;

                if entry_size < 16 {
                    // The smallest valid entry is 16 bytes long in this case.
                    bail!("sample description entry too small: {entry_size} bytes");
                }
            } else if entry_size < 8 {
                // The smallest valid entry is 8 bytes long.
                bail!("sample description entry too small: {entry_size} bytes");
            }

            if &entry_type != b"avc1" {
                error!(
                    "unsupported sample entry {}",
                    String::from_utf8_lossy(&entry_type)
                );
                bail!("only avc1 sample entries are supported");
            }

            let body_size = offset + entry_size - data_offset;
            if body_size < (AVCC_OFFSET + 8) as u64 {
                bail!("avc1 entry too small to hold an avcC child: {body_size} bytes");
            }

            let mut body = vec![0u8; body_size as usize];
            read_exact_at(source, data_offset, &mut body)?;

            debug!(
                "avc1 entry: data_ref_index {} size {}x{}",
                u16::from_be_bytes([body[6], body[7]]),
                u16::from_be_bytes([body[24], body[25]]),
                u16::from_be_bytes([body[26], body[27]]),
            );

            let avcc_size = u64::from(u32::from_be_bytes([
                body[AVCC_OFFSET],
                body[AVCC_OFFSET + 1],
                body[AVCC_OFFSET + 2],
                body[AVCC_OFFSET + 3],
            ]));
            let avcc_type = &body[AVCC_OFFSET + 4..AVCC_OFFSET + 8];

            if avcc_size < 8 || AVCC_OFFSET as u64 + avcc_size > body_size {
                bail!("avcC child has invalid size {avcc_size}");
            }

            if avcc_type != b"avcC" {
                bail!("avcC child expected inside avc1 entry, but not found");
            }

            atoms.push(body[AVCC_OFFSET + 8..AVCC_OFFSET + avcc_size as usize].to_vec());

            offset += entry_size;
        }

        Ok(Self { atoms })
    }

    /// Configuration payload for 1-based description `index`.
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        if index == 0 {
            return None;
        }
        self.atoms.get(index as usize - 1).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Largest configuration payload, in bytes.
    pub fn max_size(&self) -> usize {
        self.atoms.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;
    use crate::Error;

    fn avc1_entry(avcc_payload: &[u8]) -> Vec<u8> {
        let body_len = AVCC_OFFSET + 8 + avcc_payload.len();
        let mut entry = Vec::new();
        entry.extend_from_slice(&((8 + body_len) as u32).to_be_bytes());
        entry.extend_from_slice(b"avc1");

        let mut body = vec![0u8; AVCC_OFFSET];
        body.extend_from_slice(&((8 + avcc_payload.len()) as u32).to_be_bytes());
        body.extend_from_slice(b"avcC");
        body.extend_from_slice(avcc_payload);
        entry.extend_from_slice(&body);
        entry
    }

    #[test]
    fn extracts_avcc_payload() {
        let payload = [0x01, 0x64, 0x00, 0x1f, 0xff];
        let src = MemSource::new(avc1_entry(&payload));

        let descs = SampleDescriptions::parse(&src, 1, 0).unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs.get(1).unwrap(), &payload);
        assert!(descs.get(0).is_none());
        assert!(descs.get(2).is_none());
        assert_eq!(descs.max_size(), payload.len());
    }

    #[test]
    fn rejects_non_avc_entries() {
        let mut entry = avc1_entry(&[0x01]);
        entry[4..8].copy_from_slice(b"hvc1");
        let src = MemSource::new(entry);

        assert!(matches!(
            SampleDescriptions::parse(&src, 1, 0),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_avcc_child() {
        let mut entry = avc1_entry(&[0x01]);
        let kind = 8 + AVCC_OFFSET + 4;
        entry[kind..kind + 4].copy_from_slice(b"btrt");
        let src = MemSource::new(entry);

        assert!(matches!(
            SampleDescriptions::parse(&src, 1, 0),
            Err(Error::Malformed(_))
        ));
    }
}
