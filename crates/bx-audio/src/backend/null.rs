//! Sink that discards everything

use crate::sink::AudioSink;
use bx_core::error::AudioError;
use bx_core::machine::AudioFormat;

/// Accepts and discards samples. Used when audio is disabled.
#[derive(Debug, Default)]
pub struct NullAudioSink {
    format: AudioFormat,
    discarded: u64,
}

impl NullAudioSink {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            discarded: 0,
        }
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl AudioSink for NullAudioSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn submit(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.discarded += samples.len() as u64;
        Ok(())
    }
}
