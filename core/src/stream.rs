//! Seekable byte storage used to persist and load traces

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte-addressable storage with a cursor.
///
/// Reads past the end return fewer bytes than requested rather than failing;
/// only a failure of the underlying medium is an error.
pub trait ByteStream {
    fn seek(&mut self, offset: u64) -> io::Result<()>;
    fn size(&mut self) -> io::Result<u64>;
    fn position(&mut self) -> io::Result<u64>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;

    /// Truncate or zero-extend the stream to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Write the whole buffer, failing if the stream stops accepting bytes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "stream accepted no bytes",
                    ));
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fill as much of `buf` as the stream can provide, returning the count.
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

impl<S: ByteStream + ?Sized> ByteStream for &mut S {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek(offset)
    }
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }
    fn position(&mut self) -> io::Result<u64> {
        (**self).position()
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek(offset)
    }
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }
    fn position(&mut self) -> io::Result<u64> {
        (**self).position()
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

/// Growable in-memory stream.
///
/// Seeking past the end zero-extends the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    buffer: Vec<u8>,
    pos: u64,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes with the cursor at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            pos: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn ensure(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "stream too large"))?;
        if len > self.buffer.len() {
            self.buffer.resize(len, 0);
        }
        Ok(())
    }
}

impl ByteStream for MemoryStream {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.ensure(offset)?;
        self.pos = offset;
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = (self.pos as usize).min(self.buffer.len());
        let n = buf.len().min(self.buffer.len() - start);
        buf[..n].copy_from_slice(&self.buffer[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.pos + buf.len() as u64;
        self.ensure(end)?;
        let start = self.pos as usize;
        self.buffer[start..start + buf.len()].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "stream too large"))?;
        self.buffer.resize(len, 0);
        Ok(())
    }
}

/// File-backed stream.
#[derive(Debug)]
pub struct FileStream {
    file: File,
}

impl FileStream {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(file))
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

impl ByteStream for FileStream {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }
}
