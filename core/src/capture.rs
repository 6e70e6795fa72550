//! Capture session
//!
//! A [`CaptureSession`] turns the event stream of an instrumented CPU into a
//! trace. It opens the trace with a Header, snapshots the device state the
//! first time it executes after an invalidation, fingerprints the state at
//! every Execute, and closes the trace with a Footer when finished (or
//! dropped).
//!
//! The state blob is only written when something outside the instruction
//! stream may have changed it: the host calls
//! [`Capture::invalidate_state`] after a reset, a debugger poke, a savestate
//! load and so on, and the next Execute carries a fresh SetState.

use std::mem;

use crate::command::{MAX_PAYLOAD_BYTES, Opcode, encode_args, encode_bytes};
use crate::config::TraceConfig;
use crate::device::{CaptureDevice, CaptureInfo};
use crate::error::{Result, TraceError};
use crate::fingerprint::Fingerprint;
use crate::reader::TraceHeader;
use crate::stream::ByteStream;
use crate::trace::Trace;

pub use crate::reader::{PROTOCOL_VERSION, TRACE_MAGIC};

/// Event entry points called by CPU instrumentation.
///
/// `kind` on memory accesses is a device-defined classification stored in
/// the command's extra byte.
pub trait Capture {
    /// Mark the device state as externally modified.
    fn invalidate_state(&mut self);

    /// Record that the device is about to execute.
    fn execute(&mut self) -> Result<()>;

    fn interrupt(&mut self, kind: u32);
    fn signal(&mut self, kind: u32);

    fn read8(&mut self, addr: u32, value: u8, kind: u8);
    fn read16(&mut self, addr: u32, value: u16, kind: u8);
    fn read32(&mut self, addr: u32, value: u32, kind: u8);
    fn write8(&mut self, addr: u32, value: u8, kind: u8);
    fn write16(&mut self, addr: u32, value: u16, kind: u8);
    fn write32(&mut self, addr: u32, value: u32, kind: u8);
}

/// Records one device into one trace.
///
/// Events append to an in-memory [`Trace`]. With a non-zero
/// `flush_threshold_words` the session also streams chunks to the target
/// while recording; otherwise everything is written once by
/// [`CaptureSession::finish`].
///
/// I/O failures during incremental flushing are not retried. The first one
/// is kept and returned by `finish`.
pub struct CaptureSession<D: CaptureDevice, S: ByteStream> {
    device: D,
    target: S,
    trace: Trace,
    state: Vec<u8>,
    info: CaptureInfo,
    invalidated: bool,
    flush_threshold: usize,
    steps: u64,
    deferred_error: Option<TraceError>,
    /// Size the device switched to mid-session, if it did.
    resized_to: Option<usize>,
    finished: bool,
}

impl<D: CaptureDevice, S: ByteStream> CaptureSession<D, S> {
    /// Start a session with the default configuration.
    pub fn new(device: D, target: S) -> Result<Self> {
        Self::with_config(device, target, &TraceConfig::default())
    }

    /// Start a session, emitting the Header immediately.
    ///
    /// # Errors
    ///
    /// Fails with [`TraceError::StateSizeMismatch`] if the device reports an
    /// empty state, and with [`TraceError::PayloadTooLarge`] if its state
    /// cannot fit in a single SetState command.
    pub fn with_config(mut device: D, target: S, config: &TraceConfig) -> Result<Self> {
        let state_size = device.state_size();
        if state_size == 0 {
            return Err(TraceError::StateSizeMismatch {
                expected: 0,
                found: 0,
                reason: "device reports an empty state",
            });
        }
        if state_size > MAX_PAYLOAD_BYTES {
            return Err(TraceError::PayloadTooLarge {
                bytes: state_size,
                max: MAX_PAYLOAD_BYTES,
            });
        }
        let version = device.version();

        let info = CaptureInfo {
            protocol_version: PROTOCOL_VERSION,
            state_size,
        };
        device.start_capture(&info);

        let mut trace = Trace::with_capacity(config.initial_capacity_words);
        // state_size <= MAX_PAYLOAD_BYTES, which fits in u32
        let header = TraceHeader::new(version, state_size as u32);
        encode_args(Opcode::Header, 0, header.words(), trace.buffer_mut());

        tracing::info!(
            device = device.name(),
            version,
            state_size,
            flush_threshold = config.flush_threshold_words,
            "capture started"
        );

        Ok(Self {
            device,
            target,
            trace,
            state: vec![0; state_size],
            info,
            invalidated: true,
            flush_threshold: config.flush_threshold_words,
            steps: 0,
            deferred_error: None,
            resized_to: None,
            finished: false,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The words recorded so far, Header included.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Number of Execute events recorded.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn state_size(&self) -> usize {
        self.state.len()
    }

    /// Whether the next Execute will carry a SetState.
    pub fn is_state_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Close the trace and write whatever has not been written yet.
    ///
    /// Returns the complete in-memory trace. If an earlier incremental flush
    /// failed, that error is returned instead and nothing more is written.
    pub fn finish(mut self) -> Result<Trace> {
        let result = self.finalize();
        self.finished = true;
        result.map(|()| mem::take(&mut self.trace))
    }

    fn finalize(&mut self) -> Result<()> {
        encode_args(Opcode::Footer, 0, [], self.trace.buffer_mut());
        self.device.stop_capture(&self.info);

        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        self.trace.flush_chunk(&mut self.target)?;
        // Drop any bytes the target held past the end of this trace.
        self.target.set_len(self.trace.byte_len())?;
        self.target.flush()?;

        tracing::info!(
            steps = self.steps,
            words = self.trace.len(),
            chunks = self.trace.chunks().len(),
            "capture finished"
        );

        match self.resized_to {
            Some(found) => Err(self.size_mismatch(found)),
            None => Ok(()),
        }
    }

    fn size_mismatch(&self, found: usize) -> TraceError {
        TraceError::StateSizeMismatch {
            expected: self.state.len(),
            found,
            reason: "device state size changed during capture",
        }
    }

    fn access(&mut self, opcode: Opcode, addr: u32, value: u32, kind: u8) {
        encode_args(opcode, kind, [addr, value], self.trace.buffer_mut());
        self.maybe_flush();
    }

    fn maybe_flush(&mut self) {
        if self.flush_threshold == 0 || self.deferred_error.is_some() {
            return;
        }
        if self.trace.unflushed_len() < self.flush_threshold {
            return;
        }
        if let Err(err) = self.trace.flush_chunk(&mut self.target) {
            tracing::warn!(error = %err, "trace flush failed, incremental flushing stopped");
            self.deferred_error = Some(err);
        }
    }
}

impl<D: CaptureDevice, S: ByteStream> Capture for CaptureSession<D, S> {
    fn invalidate_state(&mut self) {
        self.invalidated = true;
    }

    /// Fingerprint the current state, preceded by a SetState if the state was
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Fails with [`TraceError::StateSizeMismatch`] if the device's state size
    /// differs from the one sampled when the session started. The session
    /// stays unusable for Execute afterwards.
    fn execute(&mut self) -> Result<()> {
        if let Some(found) = self.resized_to {
            return Err(self.size_mismatch(found));
        }
        let found = self.device.state_size();
        if found != self.state.len() {
            tracing::warn!(
                expected = self.state.len(),
                found,
                "device state size changed during capture"
            );
            self.resized_to = Some(found);
            return Err(self.size_mismatch(found));
        }

        self.device.get_state(&mut self.state);
        if self.invalidated {
            encode_bytes(Opcode::SetState, 0, &self.state, self.trace.buffer_mut())?;
            self.invalidated = false;
        }
        let fingerprint = Fingerprint::of(&self.state);
        encode_args(Opcode::Execute, 0, fingerprint.words(), self.trace.buffer_mut());
        self.steps += 1;
        self.maybe_flush();
        Ok(())
    }

    fn interrupt(&mut self, kind: u32) {
        encode_args(Opcode::Interrupt, 0, [kind], self.trace.buffer_mut());
        self.maybe_flush();
    }

    fn signal(&mut self, kind: u32) {
        encode_args(Opcode::Signal, 0, [kind], self.trace.buffer_mut());
        self.maybe_flush();
    }

    fn read8(&mut self, addr: u32, value: u8, kind: u8) {
        self.access(Opcode::Read8, addr, value.into(), kind);
    }

    fn read16(&mut self, addr: u32, value: u16, kind: u8) {
        self.access(Opcode::Read16, addr, value.into(), kind);
    }

    fn read32(&mut self, addr: u32, value: u32, kind: u8) {
        self.access(Opcode::Read32, addr, value, kind);
    }

    fn write8(&mut self, addr: u32, value: u8, kind: u8) {
        self.access(Opcode::Write8, addr, value.into(), kind);
    }

    fn write16(&mut self, addr: u32, value: u16, kind: u8) {
        self.access(Opcode::Write16, addr, value.into(), kind);
    }

    fn write32(&mut self, addr: u32, value: u32, kind: u8) {
        self.access(Opcode::Write32, addr, value, kind);
    }
}

impl<D: CaptureDevice, S: ByteStream> Drop for CaptureSession<D, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(err) = self.finalize() {
            tracing::warn!(error = %err, "failed to finalize dropped capture session");
        }
    }
}
