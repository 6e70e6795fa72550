//! Trace container
//!
//! Owns the ordered word buffer of a trace and moves it to and from a
//! [`ByteStream`]. Persistence can happen all at once ([`Trace::save`]) or
//! incrementally ([`Trace::flush_chunk`]), where each flush writes only the
//! words appended since the previous one.

use byteorder::{ByteOrder, LittleEndian};

use crate::command::RawCommands;
use crate::error::{Result, TraceError};
use crate::stream::ByteStream;

/// Words reserved up front for a capture (4 MiB).
pub const DEFAULT_CAPACITY_WORDS: usize = 1024 * 1024;

/// Bytes moved per stream call during load/save.
const IO_BLOCK_BYTES: usize = 64 * 1024;

/// A region of the trace already written to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset in the stream.
    pub offset: u64,
    /// Number of words in the region.
    pub size: usize,
}

impl Chunk {
    pub fn byte_len(&self) -> u64 {
        self.size as u64 * 4
    }

    pub fn end(&self) -> u64 {
        self.offset + self.byte_len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Trace {
    words: Vec<u32>,
    chunks: Vec<Chunk>,
    /// Words already covered by `chunks`.
    flushed: usize,
}

impl Trace {
    /// Create an empty trace without reserving capacity.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(words: usize) -> Self {
        Self {
            words: Vec::with_capacity(words),
            chunks: Vec::new(),
            flushed: 0,
        }
    }

    /// Build a trace from words already in memory. Nothing is marked flushed.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self {
            words,
            chunks: Vec::new(),
            flushed: 0,
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        self.words.len() as u64 * 4
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Words appended since the last flush.
    pub fn unflushed_len(&self) -> usize {
        self.words.len() - self.flushed
    }

    pub fn append(&mut self, words: &[u32]) {
        self.words.extend_from_slice(words);
    }

    pub fn push(&mut self, word: u32) {
        self.words.push(word);
    }

    /// Mutable access to the tail for encoders that write in place.
    pub(crate) fn buffer_mut(&mut self) -> &mut Vec<u32> {
        &mut self.words
    }

    /// Drop all words and chunk bookkeeping, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.clear();
        self.chunks.clear();
        self.flushed = 0;
    }

    pub fn reserve(&mut self, additional: usize) {
        self.words.reserve(additional);
    }

    pub fn raw_commands(&self) -> RawCommands<'_> {
        RawCommands::new(&self.words)
    }

    /// Read the whole stream into a new trace.
    ///
    /// The stream's declared size must be a whole number of words and every
    /// byte of it must be readable.
    pub fn load<S: ByteStream>(mut stream: S) -> Result<Self> {
        let size = stream.size()?;
        if size % 4 != 0 {
            return Err(TraceError::TruncatedStream {
                expected: size.next_multiple_of(4),
                actual: size,
            });
        }
        let word_count = usize::try_from(size / 4).map_err(|_| {
            TraceError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "trace does not fit in memory",
            ))
        })?;

        stream.seek(0)?;
        let mut words = vec![0u32; word_count];
        let mut block = vec![0u8; IO_BLOCK_BYTES];
        let mut read_total: u64 = 0;
        for dst in words.chunks_mut(IO_BLOCK_BYTES / 4) {
            let bytes = &mut block[..dst.len() * 4];
            let n = stream.read_up_to(bytes)?;
            read_total += n as u64;
            if n < bytes.len() {
                return Err(TraceError::TruncatedStream {
                    expected: size,
                    actual: read_total,
                });
            }
            LittleEndian::read_u32_into(bytes, dst);
        }

        tracing::debug!(words = word_count, "loaded trace");
        let chunks = if word_count > 0 {
            vec![Chunk {
                offset: 0,
                size: word_count,
            }]
        } else {
            Vec::new()
        };
        Ok(Self {
            words,
            chunks,
            flushed: word_count,
        })
    }

    /// Replace the stream's contents with every word, in order.
    ///
    /// Writing starts at offset 0 whatever the cursor position, and the
    /// stream is cut to [`Trace::byte_len`] afterwards.
    pub fn save<S: ByteStream>(&self, mut stream: S) -> Result<()> {
        stream.seek(0)?;
        write_words(&mut stream, &self.words)?;
        stream.set_len(self.byte_len())?;
        stream.flush()?;
        Ok(())
    }

    /// Write only the words appended since the last flush.
    ///
    /// The region lands directly after the previous chunk, so a stream built
    /// entirely from `flush_chunk` calls reloads into the same word sequence.
    /// Returns `None` when there is nothing new to write.
    pub fn flush_chunk<S: ByteStream>(&mut self, mut stream: S) -> Result<Option<Chunk>> {
        if self.flushed == self.words.len() {
            return Ok(None);
        }
        let chunk = Chunk {
            offset: self.flushed as u64 * 4,
            size: self.words.len() - self.flushed,
        };
        stream.seek(chunk.offset)?;
        write_words(&mut stream, &self.words[self.flushed..])?;
        stream.flush()?;

        self.flushed = self.words.len();
        self.chunks.push(chunk);
        tracing::debug!(
            offset = chunk.offset,
            words = chunk.size,
            total_chunks = self.chunks.len(),
            "flushed trace chunk"
        );
        Ok(Some(chunk))
    }
}

fn write_words<S: ByteStream>(stream: &mut S, words: &[u32]) -> Result<()> {
    let mut block = vec![0u8; IO_BLOCK_BYTES];
    for src in words.chunks(IO_BLOCK_BYTES / 4) {
        let bytes = &mut block[..src.len() * 4];
        LittleEndian::write_u32_into(src, bytes);
        stream.write_all(bytes)?;
    }
    Ok(())
}
