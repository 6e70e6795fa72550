//! Shared test utilities for integration and unit tests

use std::io;

use crate::device::{CaptureDevice, CaptureInfo, Device, ReplayDevice};
use crate::reader::{AccessDirection, AccessWidth, MemoryAccess};
use crate::stream::{ByteStream, MemoryStream};

// ============================================================================
// Mock Device
// ============================================================================

/// A device whose state is a plain byte buffer.
///
/// Replayed writes whose address falls inside the buffer are stored in it,
/// little-endian, so a replay can reproduce state changes made during capture
/// with [`MockDevice::poke`].
pub struct MockDevice {
    pub version: u32,
    pub state: Vec<u8>,
    /// Size reported by `state_size`; starts equal to `state.len()`.
    pub reported_size: usize,
    pub starts: u32,
    pub stops: u32,
    pub last_info: Option<CaptureInfo>,
    /// Access kinds `can_skip` accepts.
    pub skip_kinds: Vec<u8>,
    pub applied: Vec<MemoryAccess>,
    pub interrupts: Vec<u32>,
    pub signals: Vec<u32>,
}

impl MockDevice {
    /// State bytes are `0, 1, 2, ...` so fingerprints are non-trivial.
    pub fn new(version: u32, state_size: usize) -> Self {
        Self {
            version,
            state: (0..state_size).map(|i| i as u8).collect(),
            reported_size: state_size,
            starts: 0,
            stops: 0,
            last_info: None,
            skip_kinds: Vec::new(),
            applied: Vec::new(),
            interrupts: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Change one state byte, as a host would outside the instruction stream.
    pub fn poke(&mut self, offset: usize, value: u8) {
        self.state[offset] = value;
    }
}

impl Device for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn state_size(&self) -> usize {
        self.reported_size
    }

    fn get_state(&mut self, state: &mut [u8]) {
        let n = state.len().min(self.state.len());
        state[..n].copy_from_slice(&self.state[..n]);
    }
}

impl CaptureDevice for MockDevice {
    fn start_capture(&mut self, info: &CaptureInfo) {
        self.starts += 1;
        self.last_info = Some(*info);
    }

    fn stop_capture(&mut self, _info: &CaptureInfo) {
        self.stops += 1;
    }
}

impl ReplayDevice for MockDevice {
    fn load_state(&mut self, state: &[u8]) {
        let n = state.len().min(self.state.len());
        self.state[..n].copy_from_slice(&state[..n]);
    }

    fn can_skip(&mut self, access: &MemoryAccess) -> bool {
        self.skip_kinds.contains(&access.kind)
    }

    fn replay_access(&mut self, access: &MemoryAccess) {
        self.applied.push(*access);
        if access.direction != AccessDirection::Write {
            return;
        }
        let width = access.width.bytes() as usize;
        let start = access.addr as usize;
        if let Some(dst) = self.state.get_mut(start..start + width) {
            dst.copy_from_slice(&access.value.to_le_bytes()[..width]);
        }
    }

    fn interrupt(&mut self, kind: u32) {
        self.interrupts.push(kind);
    }

    fn signal(&mut self, kind: u32) {
        self.signals.push(kind);
    }
}

// ============================================================================
// Failing Stream
// ============================================================================

/// Accepts `limit` bytes, then fails every write.
pub struct FailingStream {
    inner: MemoryStream,
    limit: usize,
}

impl FailingStream {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: MemoryStream::new(),
            limit,
        }
    }
}

impl ByteStream for FailingStream {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(offset)
    }

    fn size(&mut self) -> io::Result<u64> {
        self.inner.size()
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.position()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.as_bytes().len();
        let room = self.limit.saturating_sub(written);
        if room == 0 {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "stream is full"));
        }
        let n = buf.len().min(room);
        self.inner.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }
}

#[test]
fn test_mock_write_lands_in_state() {
    let mut device = MockDevice::new(1, 8);
    device.replay_access(&MemoryAccess::write(AccessWidth::U16, 4, 0xBBAA, 0));
    assert_eq!(&device.state[4..6], &[0xAA, 0xBB]);
    // Out of range writes are recorded but not stored.
    device.replay_access(&MemoryAccess::write(AccessWidth::U32, 6, 0xFFFF_FFFF, 0));
    assert_eq!(device.state[6], 6);
    assert_eq!(device.applied.len(), 2);
}
