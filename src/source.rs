//! Random-access byte sources.

use crate::{Error, Result};
use std::fs::File;
use std::io;

/// Bounded random-access reads over an opaque backing store.
///
/// Every call carries an absolute offset; implementations must not keep a
/// shared read cursor, because the sample-table loaders, the sample iterator
/// and the transport-stream extractor may all read concurrently.
pub trait ByteSource: Send + Sync {
    /// Read up to `buf.len()` bytes at `offset`. A short count is returned
    /// only at end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total length of the backing store in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// An in-memory byte source.
#[derive(Clone, Default)]
pub struct MemSource {
    data: Vec<u8>,
}

impl MemSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

impl ByteSource for File {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;

        let mut read = 0;
        while read < buf.len() {
            match FileExt::read_at(self, &mut buf[read..], offset + read as u64) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;

        let mut read = 0;
        while read < buf.len() {
            match self.seek_read(&mut buf[read..], offset + read as u64) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl<T: ByteSource + ?Sized> ByteSource for std::sync::Arc<T> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

/// Fill `buf` exactly from `offset`; a short read surfaces as `Error::Io`.
pub(crate) fn read_exact_at(source: &dyn ByteSource, offset: u64, buf: &mut [u8]) -> Result<()> {
    let n = source.read_at(offset, buf).map_err(Error::Io)?;
    if n < buf.len() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: wanted {} bytes at offset {offset}, got {n}", buf.len()),
        )));
    }
    Ok(())
}
