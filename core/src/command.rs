//! Command codec
//!
//! Every command is one header word followed by `blocks` payload words.
//!
//! # Header layout
//!
//! ```text
//! bits  0..8   opcode
//! bits  8..16  extra (access kind for reads/writes, 0 otherwise)
//! bits 16..32  block count (payload words that follow)
//! ```
//!
//! Words are stored little-endian on disk. Byte payloads (the state blob) are
//! packed little-endian into words and zero-padded to a word boundary, so the
//! blob bytes appear verbatim in the file. The header only carries the word
//! count; the exact byte length comes from the trace header's state size.

use crate::error::{Result, TraceError};

/// Largest block count the 16-bit header field can hold.
pub const MAX_BLOCKS: usize = u16::MAX as usize;

/// Largest byte payload a single command can carry.
pub const MAX_PAYLOAD_BYTES: usize = MAX_BLOCKS * 4;

/// Command opcodes. Discriminants are the on-disk values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Header = 0,
    Footer = 1,
    SetState = 2,
    Execute = 3,
    Interrupt = 4,
    Signal = 5,
    Read8 = 6,
    Read16 = 7,
    Read32 = 8,
    Write8 = 9,
    Write16 = 10,
    Write32 = 11,
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::Header,
        Opcode::Footer,
        Opcode::SetState,
        Opcode::Execute,
        Opcode::Interrupt,
        Opcode::Signal,
        Opcode::Read8,
        Opcode::Read16,
        Opcode::Read32,
        Opcode::Write8,
        Opcode::Write16,
        Opcode::Write32,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Header => "Header",
            Opcode::Footer => "Footer",
            Opcode::SetState => "SetState",
            Opcode::Execute => "Execute",
            Opcode::Interrupt => "Interrupt",
            Opcode::Signal => "Signal",
            Opcode::Read8 => "Read8",
            Opcode::Read16 => "Read16",
            Opcode::Read32 => "Read32",
            Opcode::Write8 => "Write8",
            Opcode::Write16 => "Write16",
            Opcode::Write32 => "Write32",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unpacked form of a command header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub opcode: Opcode,
    pub extra: u8,
    pub blocks: u16,
}

impl CommandHeader {
    pub fn new(opcode: Opcode, extra: u8, blocks: u16) -> Self {
        Self {
            opcode,
            extra,
            blocks,
        }
    }

    pub fn pack(self) -> u32 {
        (self.opcode as u32) | ((self.extra as u32) << 8) | ((self.blocks as u32) << 16)
    }

    /// Returns `None` for an unknown opcode byte.
    pub fn unpack(word: u32) -> Option<Self> {
        let opcode = Opcode::from_u8((word & 0xFF) as u8)?;
        Some(Self {
            opcode,
            extra: ((word >> 8) & 0xFF) as u8,
            blocks: (word >> 16) as u16,
        })
    }
}

/// Number of payload words needed for `byte_len` bytes.
pub fn block_count(byte_len: usize) -> usize {
    byte_len.div_ceil(4)
}

fn checked_blocks(words: usize, bytes: usize) -> Result<u16> {
    u16::try_from(words).map_err(|_| TraceError::PayloadTooLarge {
        bytes,
        max: MAX_PAYLOAD_BYTES,
    })
}

/// Encode a fixed-argument command, one payload word per argument.
pub fn encode_args<const N: usize>(
    opcode: Opcode,
    extra: u8,
    args: [u32; N],
    out: &mut Vec<u32>,
) {
    const { assert!(N <= MAX_BLOCKS) };
    out.reserve(1 + N);
    out.push(CommandHeader::new(opcode, extra, N as u16).pack());
    out.extend_from_slice(&args);
}

/// Encode a byte payload, zero-padding the last word.
pub fn encode_bytes(
    opcode: Opcode,
    extra: u8,
    payload: &[u8],
    out: &mut Vec<u32>,
) -> Result<()> {
    let words = block_count(payload.len());
    let blocks = checked_blocks(words, payload.len())?;
    out.reserve(1 + words);
    out.push(CommandHeader::new(opcode, extra, blocks).pack());
    let mut chunks = payload.chunks_exact(4);
    for chunk in &mut chunks {
        out.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut last = [0u8; 4];
        last[..tail.len()].copy_from_slice(tail);
        out.push(u32::from_le_bytes(last));
    }
    Ok(())
}

/// Unpack the first `byte_len` bytes of a word payload.
///
/// Fails if the payload holds fewer than `byte_len` bytes.
pub fn payload_bytes(payload: &[u32], byte_len: usize) -> Option<Vec<u8>> {
    if byte_len > payload.len() * 4 {
        return None;
    }
    let mut bytes = Vec::with_capacity(payload.len() * 4);
    for word in payload {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.truncate(byte_len);
    Some(bytes)
}

/// A decoded command borrowing its payload from the word buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCommand<'a> {
    pub opcode: Opcode,
    pub extra: u8,
    pub payload: &'a [u32],
}

impl RawCommand<'_> {
    /// Total words this command occupies, header included.
    pub fn word_len(&self) -> usize {
        1 + self.payload.len()
    }
}

/// Decode the command starting at `cursor`, returning it with the cursor of
/// the next command.
pub fn decode(words: &[u32], cursor: usize) -> Result<(RawCommand<'_>, usize)> {
    let Some(&word) = words.get(cursor) else {
        return Err(TraceError::malformed(cursor, "cursor past end of buffer"));
    };
    let header = CommandHeader::unpack(word)
        .ok_or_else(|| TraceError::malformed(cursor, "unknown opcode"))?;
    let start = cursor + 1;
    let end = start + header.blocks as usize;
    if end > words.len() {
        return Err(TraceError::malformed(
            cursor,
            "block count reads past end of buffer",
        ));
    }
    Ok((
        RawCommand {
            opcode: header.opcode,
            extra: header.extra,
            payload: &words[start..end],
        },
        end,
    ))
}

/// Iterator over the raw commands of a word buffer.
///
/// Yields one error and then stops if the buffer is malformed.
pub struct RawCommands<'a> {
    words: &'a [u32],
    cursor: usize,
    failed: bool,
}

impl<'a> RawCommands<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            cursor: 0,
            failed: false,
        }
    }

    /// Word offset of the next command.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for RawCommands<'a> {
    type Item = Result<RawCommand<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.words.len() {
            return None;
        }
        match decode(self.words, self.cursor) {
            Ok((command, next)) => {
                self.cursor = next;
                Some(Ok(command))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
