//! Emulation core contract
//!
//! The run loop only needs a handful of operations from a core: advance one
//! video frame, expose the rendered pixels, hand over the audio produced for
//! that frame and accept normalized input. Everything else about the core is
//! opaque to the runtime.

pub mod test_pattern;

pub use test_pattern::{TestPatternFactory, TestPatternMachine};

use crate::config::MachineConfig;
use crate::error::{CoreFault, InitError};
use crate::frame::Frame;
use crate::input::InputState;

/// Interleaved signed 16-bit PCM format produced by a core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of interleaved samples covering `duration_ms`
    pub fn samples_for_ms(&self, duration_ms: u32) -> usize {
        self.sample_rate as usize * self.channels as usize * duration_ms as usize / 1000
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(44100, 2)
    }
}

/// An emulation core driven one video frame at a time
pub trait Machine: Send {
    /// Short driver name, used in logs
    fn name(&self) -> &str;

    /// Native refresh rate in Hz
    fn frame_rate(&self) -> f64;

    /// Format of the samples returned by [`Machine::drain_audio_samples`]
    fn audio_format(&self) -> AudioFormat;

    /// Latch the control state used by the next step
    fn set_input(&mut self, input: &InputState);

    /// Run one frame's worth of emulated cycles
    fn step(&mut self) -> Result<(), CoreFault>;

    /// Pixels produced by the last step
    fn current_frame(&self) -> Frame<'_>;

    /// Move the samples produced by the last step into `out`
    fn drain_audio_samples(&mut self, out: &mut Vec<i16>);
}

/// Builds cores from a machine configuration
pub trait MachineFactory: Send {
    fn create(&self, config: &MachineConfig) -> Result<Box<dyn Machine>, InitError>;
}

impl<F> MachineFactory for F
where
    F: Fn(&MachineConfig) -> Result<Box<dyn Machine>, InitError> + Send,
{
    fn create(&self, config: &MachineConfig) -> Result<Box<dyn Machine>, InitError> {
        self(config)
    }
}
