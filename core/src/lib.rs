//! cputrace Core - Compact binary CPU execution traces
//!
//! This crate records what an instrumented CPU did (state snapshots,
//! per-instruction state fingerprints, interrupts, signals and memory
//! accesses) into a flat stream of little-endian 32-bit words, and reads
//! such streams back for inspection or deterministic replay.
//!
//! # Architecture
//!
//! - [`command`] - Word-level codec: one header word plus payload words per command
//! - [`Trace`] - Ordered word buffer with whole and chunked persistence
//! - [`ByteStream`] - Seekable storage ([`MemoryStream`], [`FileStream`])
//! - [`CaptureSession`] - Turns CPU events into a trace for one [`CaptureDevice`]
//! - [`TraceReader`] - Typed decoding with header validation
//! - [`Replayer`] - Drives a [`ReplayDevice`] through a trace, checking fingerprints

pub mod capture;
pub mod command;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod fingerprint;
#[cfg(test)]
mod integration;
pub mod reader;
pub mod replay;
pub mod stream;
#[cfg(test)]
pub mod test_utils;
pub mod trace;

pub use capture::{Capture, CaptureSession};
pub use command::{CommandHeader, MAX_BLOCKS, MAX_PAYLOAD_BYTES, Opcode, RawCommand};
pub use config::TraceConfig;
pub use context::Context;
pub use device::{CaptureDevice, CaptureInfo, Device, ReplayDevice};
pub use error::{Result, TraceError};
pub use fingerprint::Fingerprint;
pub use reader::{
    AccessDirection, AccessWidth, Command, DecodedTrace, MemoryAccess, PROTOCOL_VERSION,
    TRACE_MAGIC, TraceHeader, TraceReader, decode_trace,
};
pub use replay::{ReplaySummary, Replayer, StepOutcome};
pub use stream::{ByteStream, FileStream, MemoryStream};
pub use trace::{Chunk, DEFAULT_CAPACITY_WORDS, Trace};
