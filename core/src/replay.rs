//! Trace replay
//!
//! Drives a [`ReplayDevice`] through a recorded trace and checks, at every
//! Execute, that the device arrived at the recorded state.

use crate::device::ReplayDevice;
use crate::error::{Result, TraceError};
use crate::fingerprint::Fingerprint;
use crate::reader::{Command, TraceHeader, TraceReader};

/// Result of a single [`Replayer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An Execute was replayed and its fingerprint matched.
    Executed { step: u64 },
    /// No commands remain.
    Finished { terminated: bool },
}

/// Counters collected over a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: u64,
    pub state_loads: u64,
    pub accesses_applied: u64,
    pub accesses_skipped: u64,
    pub interrupts: u64,
    pub signals: u64,
    /// Whether the trace ended with a Footer.
    pub terminated: bool,
}

pub struct Replayer<'a, D: ReplayDevice> {
    device: D,
    reader: TraceReader<'a>,
    state: Vec<u8>,
    summary: ReplaySummary,
    finished: bool,
}

impl<'a, D: ReplayDevice> Replayer<'a, D> {
    /// Prepare to replay `words` on `device`.
    ///
    /// # Errors
    ///
    /// Header validation errors from [`TraceReader::new`], or
    /// [`TraceError::DeviceMismatch`] if the trace was recorded with a
    /// different device version or state size.
    pub fn new(device: D, words: &'a [u32]) -> Result<Self> {
        let reader = TraceReader::new(words)?;
        let header = *reader.header();
        if header.device_version != device.version() || header.state_size() != device.state_size()
        {
            return Err(TraceError::DeviceMismatch {
                trace_version: header.device_version,
                trace_state_size: header.state_size(),
                device_version: device.version(),
                device_state_size: device.state_size(),
            });
        }
        tracing::info!(
            device = device.name(),
            version = header.device_version,
            state_size = header.state_size,
            words = words.len(),
            "replay started"
        );
        Ok(Self {
            device,
            reader,
            state: vec![0; header.state_size()],
            summary: ReplaySummary::default(),
            finished: false,
        })
    }

    pub fn header(&self) -> &TraceHeader {
        self.reader.header()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Counters so far.
    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    /// Replay commands up to and including the next Execute.
    ///
    /// # Errors
    ///
    /// [`TraceError::StateDivergence`] if the device state after the Execute
    /// does not match the recorded fingerprint, or any decode error.
    pub fn step(&mut self) -> Result<StepOutcome> {
        while let Some(command) = self.reader.next_command()? {
            match command {
                Command::SetState { state } => {
                    self.device.load_state(&state);
                    self.summary.state_loads += 1;
                }
                Command::Execute { fingerprint } => {
                    let step = self.summary.steps;
                    self.verify(step, fingerprint)?;
                    self.summary.steps += 1;
                    return Ok(StepOutcome::Executed { step });
                }
                Command::Interrupt { kind } => {
                    self.device.interrupt(kind);
                    self.summary.interrupts += 1;
                }
                Command::Signal { kind } => {
                    self.device.signal(kind);
                    self.summary.signals += 1;
                }
                Command::Access(access) => {
                    if self.device.can_skip(&access) {
                        self.summary.accesses_skipped += 1;
                    } else {
                        self.device.replay_access(&access);
                        self.summary.accesses_applied += 1;
                    }
                }
                // The reader rejects a second Header; the Footer ends the loop
                // on the next call.
                Command::Header(_) | Command::Footer => {}
            }
        }

        let terminated = self.reader.is_terminated();
        if !self.finished {
            self.finished = true;
            self.summary.terminated = terminated;
            if !terminated {
                tracing::warn!(steps = self.summary.steps, "replayed trace has no footer");
            }
            tracing::info!(steps = self.summary.steps, "replay finished");
        }
        Ok(StepOutcome::Finished { terminated })
    }

    /// Replay every remaining command.
    pub fn run(&mut self) -> Result<ReplaySummary> {
        while let StepOutcome::Executed { .. } = self.step()? {}
        Ok(self.summary)
    }

    fn verify(&mut self, step: u64, expected: Fingerprint) -> Result<()> {
        self.device.get_state(&mut self.state);
        let actual = Fingerprint::of(&self.state);
        if actual != expected {
            tracing::warn!(step, %expected, %actual, "replay diverged");
            return Err(TraceError::StateDivergence {
                step,
                expected,
                actual,
            });
        }
        Ok(())
    }
}
