//! Typed trace decoding
//!
//! [`TraceReader`] walks a word buffer from offset 0, checks the opening
//! Header, and turns each raw command into a [`Command`]. The state size
//! announced by the Header is what lets SetState payloads be trimmed back to
//! their exact byte length.

use serde::{Deserialize, Serialize};

use crate::command::{self, CommandHeader, Opcode, block_count, encode_args, encode_bytes};
use crate::error::{Result, TraceError};
use crate::fingerprint::Fingerprint;

/// First payload word of every trace.
pub const TRACE_MAGIC: u32 = 0x2016_0729;

/// Version of the command protocol written by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Payload of the opening Header command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub magic: u32,
    pub protocol_version: u32,
    pub device_version: u32,
    /// Size of the device state blob in bytes.
    pub state_size: u32,
}

impl TraceHeader {
    pub fn new(device_version: u32, state_size: u32) -> Self {
        Self {
            magic: TRACE_MAGIC,
            protocol_version: PROTOCOL_VERSION,
            device_version,
            state_size,
        }
    }

    pub fn state_size(&self) -> usize {
        self.state_size as usize
    }

    pub fn words(&self) -> [u32; 4] {
        [
            self.magic,
            self.protocol_version,
            self.device_version,
            self.state_size,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessWidth {
    U8,
    U16,
    U32,
}

impl AccessWidth {
    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::U8 => 1,
            AccessWidth::U16 => 2,
            AccessWidth::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDirection {
    Read,
    Write,
}

/// A recorded memory read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccess {
    pub direction: AccessDirection,
    pub width: AccessWidth,
    pub addr: u32,
    pub value: u32,
    /// Device-defined access classification (code, data, DMA, ...).
    pub kind: u8,
}

impl MemoryAccess {
    pub fn read(width: AccessWidth, addr: u32, value: u32, kind: u8) -> Self {
        Self {
            direction: AccessDirection::Read,
            width,
            addr,
            value,
            kind,
        }
    }

    pub fn write(width: AccessWidth, addr: u32, value: u32, kind: u8) -> Self {
        Self {
            direction: AccessDirection::Write,
            width,
            addr,
            value,
            kind,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match (self.direction, self.width) {
            (AccessDirection::Read, AccessWidth::U8) => Opcode::Read8,
            (AccessDirection::Read, AccessWidth::U16) => Opcode::Read16,
            (AccessDirection::Read, AccessWidth::U32) => Opcode::Read32,
            (AccessDirection::Write, AccessWidth::U8) => Opcode::Write8,
            (AccessDirection::Write, AccessWidth::U16) => Opcode::Write16,
            (AccessDirection::Write, AccessWidth::U32) => Opcode::Write32,
        }
    }

    fn from_opcode(opcode: Opcode, addr: u32, value: u32, kind: u8) -> Option<Self> {
        let (direction, width) = match opcode {
            Opcode::Read8 => (AccessDirection::Read, AccessWidth::U8),
            Opcode::Read16 => (AccessDirection::Read, AccessWidth::U16),
            Opcode::Read32 => (AccessDirection::Read, AccessWidth::U32),
            Opcode::Write8 => (AccessDirection::Write, AccessWidth::U8),
            Opcode::Write16 => (AccessDirection::Write, AccessWidth::U16),
            Opcode::Write32 => (AccessDirection::Write, AccessWidth::U32),
            _ => return None,
        };
        Some(Self {
            direction,
            width,
            addr,
            value,
            kind,
        })
    }
}

/// A fully decoded command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Command {
    Header(TraceHeader),
    Footer,
    SetState { state: Vec<u8> },
    Execute { fingerprint: Fingerprint },
    Interrupt { kind: u32 },
    Signal { kind: u32 },
    Access(MemoryAccess),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Header(_) => Opcode::Header,
            Command::Footer => Opcode::Footer,
            Command::SetState { .. } => Opcode::SetState,
            Command::Execute { .. } => Opcode::Execute,
            Command::Interrupt { .. } => Opcode::Interrupt,
            Command::Signal { .. } => Opcode::Signal,
            Command::Access(access) => access.opcode(),
        }
    }

    /// Append this command's words to `out`.
    pub fn encode(&self, out: &mut Vec<u32>) -> Result<()> {
        match self {
            Command::Header(header) => encode_args(Opcode::Header, 0, header.words(), out),
            Command::Footer => encode_args(Opcode::Footer, 0, [], out),
            Command::SetState { state } => {
                return encode_bytes(Opcode::SetState, 0, state, out);
            }
            Command::Execute { fingerprint } => {
                encode_args(Opcode::Execute, 0, fingerprint.0, out)
            }
            Command::Interrupt { kind } => encode_args(Opcode::Interrupt, 0, [*kind], out),
            Command::Signal { kind } => encode_args(Opcode::Signal, 0, [*kind], out),
            Command::Access(access) => {
                encode_args(access.opcode(), access.kind, [access.addr, access.value], out)
            }
        }
        Ok(())
    }
}

/// Result of decoding a whole trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedTrace {
    pub header: TraceHeader,
    /// Commands after the Header, including the Footer when present.
    pub commands: Vec<Command>,
    /// Whether the trace ends with a Footer.
    pub terminated: bool,
}

impl DecodedTrace {
    /// Number of Execute commands.
    pub fn steps(&self) -> u64 {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Execute { .. }))
            .count() as u64
    }
}

/// Decode every command of a trace.
///
/// A trace without a Footer still decodes; it is reported through
/// [`DecodedTrace::terminated`].
pub fn decode_trace(words: &[u32]) -> Result<DecodedTrace> {
    let mut reader = TraceReader::new(words)?;
    let mut commands = Vec::new();
    while let Some(command) = reader.next_command()? {
        commands.push(command);
    }
    if !reader.is_terminated() {
        tracing::warn!(words = words.len(), "trace has no footer");
    }
    Ok(DecodedTrace {
        header: *reader.header(),
        commands,
        terminated: reader.is_terminated(),
    })
}

pub struct TraceReader<'a> {
    words: &'a [u32],
    cursor: usize,
    header: TraceHeader,
    terminated: bool,
}

impl<'a> TraceReader<'a> {
    /// Start reading, validating the opening Header.
    pub fn new(words: &'a [u32]) -> Result<Self> {
        if words.is_empty() {
            return Err(TraceError::malformed(0, "empty trace"));
        }
        let mut reader = Self {
            words,
            cursor: 0,
            header: TraceHeader::new(0, 0),
            terminated: false,
        };
        let (opcode, _, payload) = reader.next_raw()?;
        if opcode != Opcode::Header {
            return Err(TraceError::malformed(0, "trace does not start with a header"));
        }
        let [magic, protocol_version, device_version, state_size] =
            <[u32; 4]>::try_from(payload)
                .map_err(|_| TraceError::malformed(0, "header payload is not 4 words"))?;
        if magic != TRACE_MAGIC {
            return Err(TraceError::InvalidMagic(magic));
        }
        if protocol_version == 0 || protocol_version > PROTOCOL_VERSION {
            return Err(TraceError::UnsupportedVersion(protocol_version));
        }
        reader.header = TraceHeader {
            magic,
            protocol_version,
            device_version,
            state_size,
        };
        Ok(reader)
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// Word offset of the next command.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Decode the next raw command, reporting an overrun as truncation.
    fn next_raw(&mut self) -> Result<(Opcode, u8, &'a [u32])> {
        let start = self.cursor;
        let word = self.words[start];
        let header = CommandHeader::unpack(word)
            .ok_or_else(|| TraceError::malformed(start, "unknown opcode"))?;
        let end = start + 1 + header.blocks as usize;
        if end > self.words.len() {
            return Err(TraceError::TruncatedStream {
                expected: end as u64 * 4,
                actual: self.words.len() as u64 * 4,
            });
        }
        let (raw, next) = command::decode(self.words, start)?;
        self.cursor = next;
        Ok((raw.opcode, raw.extra, raw.payload))
    }

    /// Decode the next command, or `None` at the end of the buffer.
    pub fn next_command(&mut self) -> Result<Option<Command>> {
        if self.cursor >= self.words.len() {
            return Ok(None);
        }
        let offset = self.cursor;
        if self.terminated {
            return Err(TraceError::malformed(offset, "data after footer"));
        }
        let (opcode, extra, payload) = self.next_raw()?;

        let command = match opcode {
            Opcode::Header => return Err(TraceError::malformed(offset, "duplicate header")),
            Opcode::Footer => {
                expect_words(offset, payload, 0)?;
                self.terminated = true;
                Command::Footer
            }
            Opcode::SetState => {
                let size = self.header.state_size();
                if payload.len() != block_count(size) {
                    return Err(TraceError::malformed(
                        offset,
                        "state payload does not match header state size",
                    ));
                }
                let state = command::payload_bytes(payload, size).ok_or_else(|| {
                    TraceError::malformed(offset, "state payload shorter than state size")
                })?;
                Command::SetState { state }
            }
            Opcode::Execute => {
                expect_words(offset, payload, 4)?;
                Command::Execute {
                    fingerprint: Fingerprint([payload[0], payload[1], payload[2], payload[3]]),
                }
            }
            Opcode::Interrupt => {
                expect_words(offset, payload, 1)?;
                Command::Interrupt { kind: payload[0] }
            }
            Opcode::Signal => {
                expect_words(offset, payload, 1)?;
                Command::Signal { kind: payload[0] }
            }
            Opcode::Read8
            | Opcode::Read16
            | Opcode::Read32
            | Opcode::Write8
            | Opcode::Write16
            | Opcode::Write32 => {
                expect_words(offset, payload, 2)?;
                let access = MemoryAccess::from_opcode(opcode, payload[0], payload[1], extra)
                    .ok_or_else(|| TraceError::malformed(offset, "not a memory access"))?;
                Command::Access(access)
            }
        };
        Ok(Some(command))
    }
}

impl Iterator for TraceReader<'_> {
    type Item = Result<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_command() {
            Ok(Some(command)) => Some(Ok(command)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error.
                self.cursor = self.words.len();
                Some(Err(e))
            }
        }
    }
}

fn expect_words(offset: usize, payload: &[u32], count: usize) -> Result<()> {
    if payload.len() != count {
        return Err(TraceError::malformed(offset, "unexpected payload length"));
    }
    Ok(())
}
