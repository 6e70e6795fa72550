//! Error types for trace encoding, persistence, capture and replay

use std::io;

use thiserror::Error;

use crate::fingerprint::Fingerprint;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    /// The stream ended before the data it promised was available.
    #[error("truncated stream: expected {expected} bytes, got {actual}")]
    TruncatedStream { expected: u64, actual: u64 },

    /// The word buffer does not decode into well-formed commands.
    #[error("malformed stream at word {offset}: {reason}")]
    MalformedStream { offset: usize, reason: &'static str },

    /// The underlying byte stream failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The device reported a zero state size, or a size that changed mid-session.
    #[error("state size mismatch: {reason} (expected {expected} bytes, found {found} bytes)")]
    StateSizeMismatch {
        expected: usize,
        found: usize,
        reason: &'static str,
    },

    /// A single command payload does not fit in the 16-bit block count.
    #[error("payload of {bytes} bytes exceeds the {max} byte command limit")]
    PayloadTooLarge { bytes: usize, max: usize },

    #[error("invalid trace magic {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported trace protocol version {0}")]
    UnsupportedVersion(u32),

    /// The trace was recorded against a device with a different state layout.
    #[error(
        "device mismatch (trace version {trace_version} / {trace_state_size} bytes, device version {device_version} / {device_state_size} bytes)"
    )]
    DeviceMismatch {
        trace_version: u32,
        trace_state_size: usize,
        device_version: u32,
        device_state_size: usize,
    },

    /// Replayed state no longer matches the recorded fingerprint.
    #[error("state divergence at step {step}: expected {expected}, got {actual}")]
    StateDivergence {
        step: u64,
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl TraceError {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        Self::MalformedStream { offset, reason }
    }

    /// Whether this error leaves a partially usable trace behind.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedStream { .. })
    }
}
