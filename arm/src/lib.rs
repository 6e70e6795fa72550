//! cputrace ARM - ARM register-state device adapter
//!
//! Exposes the banked ARM register file as the trace state blob. Hosts
//! implement [`ArmCaptureHandler`] (and [`ArmReplayHandler`] for replay) to
//! read and write their CPU model's registers; the adapters here take care of
//! the blob layout and the device identity recorded in the trace header.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use cputrace_core::{CaptureDevice, CaptureInfo, Device, MemoryAccess, ReplayDevice};

/// Version of the [`ArmState`] layout.
pub const ARM_DEVICE_VERSION: u32 = 1;

/// Size of the state blob in bytes.
pub const ARM_STATE_SIZE: usize = size_of::<ArmState>();

/// Interrupt kinds recorded for an ARM core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Interrupt {
    Irq = 0,
    Fiq = 1,
}

impl Interrupt {
    pub fn from_u32(kind: u32) -> Option<Self> {
        match kind {
            0 => Some(Self::Irq),
            1 => Some(Self::Fiq),
            _ => None,
        }
    }
}

impl From<Interrupt> for u32 {
    fn from(value: Interrupt) -> Self {
        value as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Signal {
    /// The core left a halted/wait-for-interrupt state.
    Unhalted = 0,
}

impl Signal {
    pub fn from_u32(kind: u32) -> Option<Self> {
        match kind {
            0 => Some(Self::Unhalted),
            _ => None,
        }
    }
}

impl From<Signal> for u32 {
    fn from(value: Signal) -> Self {
        value as u32
    }
}

/// Classification stored in the extra byte of memory access commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MemoryAccessKind {
    #[default]
    Unknown = 0,
    Code = 1,
    Data = 2,
    Gpu = 3,
    Dma = 4,
    Debug = 5,
}

impl MemoryAccessKind {
    /// Unrecognized values map to [`MemoryAccessKind::Unknown`].
    pub fn from_u8(kind: u8) -> Self {
        match kind {
            1 => Self::Code,
            2 => Self::Data,
            3 => Self::Gpu,
            4 => Self::Dma,
            5 => Self::Debug,
            _ => Self::Unknown,
        }
    }

    pub fn of(access: &MemoryAccess) -> Self {
        Self::from_u8(access.kind)
    }
}

impl From<MemoryAccessKind> for u8 {
    fn from(value: MemoryAccessKind) -> Self {
        value as u8
    }
}

// ============================================================================
// Register state
// ============================================================================

/// User/system mode registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct UserBank {
    pub r: [u32; 16],
    pub cpsr: u32,
}

/// FIQ mode banks r8-r14.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FiqBank {
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub r12: u32,
    pub r13: u32,
    pub r14: u32,
    pub spsr: u32,
}

/// Banked stack pointer, link register and saved status of one mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ModeBank {
    pub r13: u32,
    pub r14: u32,
    pub spsr: u32,
}

/// Full banked register file. The in-memory layout is the blob layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ArmState {
    pub usr: UserBank,
    pub fiq: FiqBank,
    pub svc: ModeBank,
    pub abt: ModeBank,
    pub irq: ModeBank,
    pub und: ModeBank,
}

impl ArmState {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Build a state from a blob. Missing trailing bytes stay zero.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut state = Self::zeroed();
        let n = bytes.len().min(ARM_STATE_SIZE);
        bytemuck::bytes_of_mut(&mut state)[..n].copy_from_slice(&bytes[..n]);
        state
    }

    /// Program counter (r15).
    pub fn pc(&self) -> u32 {
        self.usr.r[15]
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Host hooks for recording an ARM core.
pub trait ArmCaptureHandler {
    fn start(&mut self, _info: &CaptureInfo) {}
    fn stop(&mut self, _info: &CaptureInfo) {}
    fn get_state(&mut self, state: &mut ArmState);
}

pub struct ArmCaptureDevice<H> {
    name: String,
    handler: H,
}

impl<H: ArmCaptureHandler> ArmCaptureDevice<H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

fn copy_state(state: &ArmState, out: &mut [u8]) {
    let n = out.len().min(ARM_STATE_SIZE);
    out[..n].copy_from_slice(&state.as_bytes()[..n]);
}

impl<H: ArmCaptureHandler> Device for ArmCaptureDevice<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        ARM_DEVICE_VERSION
    }

    fn state_size(&self) -> usize {
        ARM_STATE_SIZE
    }

    fn get_state(&mut self, out: &mut [u8]) {
        let mut state = ArmState::zeroed();
        self.handler.get_state(&mut state);
        copy_state(&state, out);
    }
}

impl<H: ArmCaptureHandler> CaptureDevice for ArmCaptureDevice<H> {
    fn start_capture(&mut self, info: &CaptureInfo) {
        tracing::debug!(device = %self.name, "arm capture started");
        self.handler.start(info);
    }

    fn stop_capture(&mut self, info: &CaptureInfo) {
        self.handler.stop(info);
        tracing::debug!(device = %self.name, "arm capture stopped");
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Host hooks for replaying a trace onto an ARM core.
pub trait ArmReplayHandler {
    fn load_state(&mut self, state: &ArmState);
    fn get_state(&mut self, state: &mut ArmState);

    /// Whether a recorded access can be ignored, e.g. instruction fetches
    /// when the core re-executes the program itself.
    fn can_skip(&mut self, access: &MemoryAccess) -> bool;

    fn replay_access(&mut self, _access: &MemoryAccess) {}
    fn interrupt(&mut self, _interrupt: Interrupt) {}
    fn signal(&mut self, _signal: Signal) {}
}

pub struct ArmReplayDevice<H> {
    name: String,
    handler: H,
}

impl<H: ArmReplayHandler> ArmReplayDevice<H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<H: ArmReplayHandler> Device for ArmReplayDevice<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        ARM_DEVICE_VERSION
    }

    fn state_size(&self) -> usize {
        ARM_STATE_SIZE
    }

    fn get_state(&mut self, out: &mut [u8]) {
        let mut state = ArmState::zeroed();
        self.handler.get_state(&mut state);
        copy_state(&state, out);
    }
}

impl<H: ArmReplayHandler> ReplayDevice for ArmReplayDevice<H> {
    fn load_state(&mut self, state: &[u8]) {
        self.handler.load_state(&ArmState::from_bytes(state));
    }

    fn can_skip(&mut self, access: &MemoryAccess) -> bool {
        self.handler.can_skip(access)
    }

    fn replay_access(&mut self, access: &MemoryAccess) {
        self.handler.replay_access(access);
    }

    fn interrupt(&mut self, kind: u32) {
        match Interrupt::from_u32(kind) {
            Some(interrupt) => self.handler.interrupt(interrupt),
            None => tracing::warn!(kind, "unknown arm interrupt kind"),
        }
    }

    fn signal(&mut self, kind: u32) {
        match Signal::from_u32(kind) {
            Some(signal) => self.handler.signal(signal),
            None => tracing::warn!(kind, "unknown arm signal kind"),
        }
    }
}
