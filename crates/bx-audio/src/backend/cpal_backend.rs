//! cpal audio backend
//!
//! Plays the queue behind an [`AudioConsumer`] on the host's default output
//! device. The stream is opened at the core's own format; no resampling is
//! performed, so a device that cannot run at that format is reported as a
//! backend error and the caller decides what to fall back to.

use crate::sink::AudioConsumer;
use bx_core::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

/// An open output stream fed from a sample queue
pub struct CpalAudioOutput {
    stream: Option<Stream>,
    device_name: String,
}

impl CpalAudioOutput {
    /// Open the default output device and start playing from `consumer`
    pub fn start(consumer: AudioConsumer) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Backend("No output device available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        tracing::info!("Audio device: {}", device_name);

        let format = consumer.format();
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let mut scratch: Vec<i16> = Vec::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0);
                    consumer.fill(&mut scratch);
                    for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = src as f32 / 32768.0;
                    }
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::Backend(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Backend(format!("Failed to play stream: {}", e)))?;
        tracing::info!(
            "Audio stream started: {} Hz, {} channels",
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            stream: Some(stream),
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stop playback. Safe to call more than once.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| AudioError::Backend(format!("Failed to pause stream: {}", e)))?;
            tracing::info!("Audio stream stopped");
        }
        Ok(())
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RingAudioSink;
    use bx_core::machine::AudioFormat;

    #[test]
    fn test_output_start() {
        // No output device in headless CI; either outcome is fine as long
        // as failure is reported rather than panicking
        let (_sink, consumer) = RingAudioSink::with_capacity(AudioFormat::default(), 4096);
        match CpalAudioOutput::start(consumer) {
            Ok(mut output) => assert!(output.stop().is_ok()),
            Err(e) => assert!(matches!(e, AudioError::Backend(_))),
        }
    }
}
