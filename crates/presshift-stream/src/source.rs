//! Concrete byte sources behind the stream buffer.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A random-access byte producer.
///
/// Sources are only ever driven forward by [`ByteStream`](crate::ByteStream);
/// `read_at` with a decreasing offset occurs only after an explicit seek
/// outside the retained window.
pub trait ByteSource {
    /// Read bytes starting at `offset` into `buf`, returning how many were
    /// written. A return of 0 with a non-empty `buf` means end of data.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total length of the underlying data, when known up front.
    fn len_hint(&self) -> Option<u64>;

    /// Whether the source can serve offsets below the current read position.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Whether a zero-byte read means the data is over. Push-fed sources
    /// return false: more bytes may still be appended by the caller.
    fn end_on_empty_read(&self) -> bool {
        true
    }
}

/// The no-op source behind push-fed streams. All bytes arrive through
/// [`ByteStream::append_bytes`](crate::ByteStream::append_bytes); end of data
/// is signaled by `input_finished`, never by an empty read.
#[derive(Debug, Default)]
pub struct PushSource;

impl ByteSource for PushSource {
    fn read_at(&mut self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn len_hint(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn end_on_empty_read(&self) -> bool {
        false
    }
}

/// A source over a fully materialized byte buffer.
///
/// Also serves as the backing for push-style feeding: an empty memory source
/// plus [`ByteStream::append_bytes`](crate::ByteStream::append_bytes) gives a
/// growable stream.
#[derive(Debug, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// An empty source for push-fed streams.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// A source over a file on disk.
pub struct FileSource {
    file: File,
    position: u64,
    length: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            position: 0,
            length,
        })
    }

    pub fn from_file(file: File) -> io::Result<Self> {
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            position: 0,
            length,
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset != self.position {
            self.file.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_source_reads() {
        let mut src = MemorySource::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        assert_eq!(src.read_at(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(src.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(src.read_at(11, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_file_source_reads() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let mut src = FileSource::open(tmp.path()).unwrap();
        assert_eq!(src.len_hint(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(src.read_at(3, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");
        // Backward read after a forward one still works.
        assert_eq!(src.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
    }
}
