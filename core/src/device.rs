//! Device capabilities consumed by capture and replay
//!
//! A device exposes a fixed-size, opaque state blob. The core never looks
//! inside it; it only copies and fingerprints it.

use crate::reader::MemoryAccess;

/// Identity and state access shared by capture and replay devices.
pub trait Device {
    fn name(&self) -> &str;

    /// Version of the device's state layout.
    fn version(&self) -> u32;

    /// Size in bytes of the state blob.
    fn state_size(&self) -> usize;

    /// Copy `min(state.len(), state_size())` bytes of state into `state`.
    fn get_state(&mut self, state: &mut [u8]);
}

/// Passed to capture lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub protocol_version: u32,
    pub state_size: usize,
}

/// A device that can be recorded.
pub trait CaptureDevice: Device {
    fn start_capture(&mut self, info: &CaptureInfo);
    fn stop_capture(&mut self, info: &CaptureInfo);
}

/// A device that can be driven from a recorded trace.
pub trait ReplayDevice: Device {
    /// Overwrite the device state with a recorded blob.
    fn load_state(&mut self, state: &[u8]);

    /// Whether a recorded memory access can be skipped during replay.
    fn can_skip(&mut self, access: &MemoryAccess) -> bool;

    /// Apply a recorded memory access that was not skipped.
    fn replay_access(&mut self, _access: &MemoryAccess) {}

    fn interrupt(&mut self, _kind: u32) {}

    fn signal(&mut self, _kind: u32) {}
}

impl<D: Device + ?Sized> Device for &mut D {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn version(&self) -> u32 {
        (**self).version()
    }
    fn state_size(&self) -> usize {
        (**self).state_size()
    }
    fn get_state(&mut self, state: &mut [u8]) {
        (**self).get_state(state)
    }
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for &mut D {
    fn start_capture(&mut self, info: &CaptureInfo) {
        (**self).start_capture(info)
    }
    fn stop_capture(&mut self, info: &CaptureInfo) {
        (**self).stop_capture(info)
    }
}

impl<D: ReplayDevice + ?Sized> ReplayDevice for &mut D {
    fn load_state(&mut self, state: &[u8]) {
        (**self).load_state(state)
    }
    fn can_skip(&mut self, access: &MemoryAccess) -> bool {
        (**self).can_skip(access)
    }
    fn replay_access(&mut self, access: &MemoryAccess) {
        (**self).replay_access(access)
    }
    fn interrupt(&mut self, kind: u32) {
        (**self).interrupt(kind)
    }
    fn signal(&mut self, kind: u32) {
        (**self).signal(kind)
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn version(&self) -> u32 {
        (**self).version()
    }
    fn state_size(&self) -> usize {
        (**self).state_size()
    }
    fn get_state(&mut self, state: &mut [u8]) {
        (**self).get_state(state)
    }
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn start_capture(&mut self, info: &CaptureInfo) {
        (**self).start_capture(info)
    }
    fn stop_capture(&mut self, info: &CaptureInfo) {
        (**self).stop_capture(info)
    }
}
