//! Sample queue between the run loop and the output device

use bx_core::error::AudioError;
use bx_core::machine::AudioFormat;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Destination for the interleaved samples a core produces each step
pub trait AudioSink: Send {
    /// Format every submitted buffer is in
    fn format(&self) -> AudioFormat;

    /// Queue samples for output. Must not block. When only part of the
    /// buffer fits, the accepted prefix is kept and the rest is reported
    /// as an overrun.
    fn submit(&mut self, samples: &[i16]) -> Result<(), AudioError>;
}

/// Counters shared by a sink and its consumer
#[derive(Debug, Default)]
pub struct AudioStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
}

impl AudioStats {
    /// Samples accepted into the queue
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Samples discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Submissions that could not be queued in full
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Output samples filled with silence because the queue ran dry
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

struct Shared {
    queue: Mutex<VecDeque<i16>>,
    capacity: usize,
    stats: AudioStats,
}

/// Producer half of a bounded sample queue
///
/// Overflow drops the newest samples; what is already queued is never
/// overwritten, so playback stays continuous.
pub struct RingAudioSink {
    format: AudioFormat,
    shared: Arc<Shared>,
}

/// Consumer half of a bounded sample queue, drained by the output device
#[derive(Clone)]
pub struct AudioConsumer {
    format: AudioFormat,
    shared: Arc<Shared>,
}

impl RingAudioSink {
    /// Create a queue holding at most `capacity` interleaved samples
    pub fn with_capacity(format: AudioFormat, capacity: usize) -> (Self, AudioConsumer) {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            stats: AudioStats::default(),
        });

        let sink = Self {
            format,
            shared: Arc::clone(&shared),
        };
        let consumer = AudioConsumer { format, shared };
        (sink, consumer)
    }

    /// Create a queue sized to hold `duration_ms` of audio
    pub fn with_duration(format: AudioFormat, duration_ms: u32) -> (Self, AudioConsumer) {
        let capacity = format.samples_for_ms(duration_ms).max(format.channels as usize);
        Self::with_capacity(format, capacity)
    }

    pub fn stats(&self) -> &AudioStats {
        &self.shared.stats
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl AudioSink for RingAudioSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn submit(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if samples.is_empty() {
            return Ok(());
        }

        let accepted = {
            let mut queue = self.shared.queue.lock();
            let free = self.shared.capacity.saturating_sub(queue.len());
            // Keep whole interleaved frames so channels stay aligned
            let channels = self.format.channels.max(1) as usize;
            let accepted = samples.len().min(free) / channels * channels;
            queue.extend(&samples[..accepted]);
            accepted
        };

        let stats = &self.shared.stats;
        stats.submitted.fetch_add(accepted as u64, Ordering::Relaxed);

        let dropped = samples.len() - accepted;
        if dropped > 0 {
            stats.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            stats.overruns.fetch_add(1, Ordering::Relaxed);
            return Err(AudioError::Overrun { dropped });
        }
        Ok(())
    }
}

impl AudioConsumer {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn stats(&self) -> &AudioStats {
        &self.shared.stats
    }

    pub fn available(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Fill `out` from the queue, padding with silence when it runs dry.
    /// Returns the number of queued samples consumed.
    pub fn fill(&self, out: &mut [i16]) -> usize {
        let taken = {
            let mut queue = self.shared.queue.lock();
            let taken = out.len().min(queue.len());
            for (dst, src) in out.iter_mut().zip(queue.drain(..taken)) {
                *dst = src;
            }
            taken
        };

        let missing = out.len() - taken;
        if missing > 0 {
            out[taken..].fill(0);
            self.shared
                .stats
                .underruns
                .fetch_add(missing as u64, Ordering::Relaxed);
        }
        taken
    }

    /// Move everything queued into `out`
    pub fn drain_into(&self, out: &mut Vec<i16>) -> usize {
        let mut queue = self.shared.queue.lock();
        let count = queue.len();
        out.extend(queue.drain(..));
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> AudioFormat {
        AudioFormat::new(44100, 2)
    }

    #[test]
    fn test_submit_and_fill() {
        let (mut sink, consumer) = RingAudioSink::with_capacity(stereo(), 8);
        sink.submit(&[1, 2, 3, 4]).unwrap();
        assert_eq!(consumer.available(), 4);

        let mut out = [9i16; 6];
        assert_eq!(consumer.fill(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4, 0, 0]);
        assert_eq!(consumer.stats().underruns(), 2);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let (mut sink, consumer) = RingAudioSink::with_capacity(stereo(), 6);
        sink.submit(&[1, 2, 3, 4]).unwrap();

        let err = sink.submit(&[5, 6, 7, 8]).unwrap_err();
        assert_eq!(err, AudioError::Overrun { dropped: 2 });

        let mut queued = Vec::new();
        consumer.drain_into(&mut queued);
        assert_eq!(queued, vec![1, 2, 3, 4, 5, 6]);

        let stats = sink.stats();
        assert_eq!(stats.submitted(), 6);
        assert_eq!(stats.dropped(), 2);
        assert_eq!(stats.overruns(), 1);
    }

    #[test]
    fn test_overflow_keeps_frames_aligned() {
        let (mut sink, _consumer) = RingAudioSink::with_capacity(stereo(), 5);
        let err = sink.submit(&[1, 2, 3, 4, 5, 6]).unwrap_err();
        assert_eq!(err, AudioError::Overrun { dropped: 2 });
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn test_full_queue_never_blocks() {
        let (mut sink, _consumer) = RingAudioSink::with_capacity(stereo(), 4);
        sink.submit(&[0; 4]).unwrap();
        for _ in 0..100 {
            assert!(sink.submit(&[1; 4]).is_err());
        }
        assert_eq!(sink.stats().dropped(), 400);
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn test_with_duration() {
        let (sink, consumer) = RingAudioSink::with_duration(stereo(), 100);
        assert_eq!(sink.capacity(), 8820);
        assert_eq!(consumer.format(), stereo());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_empty_submit() {
        let (mut sink, _consumer) = RingAudioSink::with_capacity(stereo(), 0);
        assert!(sink.submit(&[]).is_ok());
        assert_eq!(sink.stats().overruns(), 0);
    }
}
