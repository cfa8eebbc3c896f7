//! Run loop counters, readable from any thread

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LoopStats {
    steps: AtomicU64,
    frames_delivered: AtomicU64,
    audio_samples: AtomicU64,
    audio_dropped: AtomicU64,
    audio_overruns: AtomicU64,
    audio_errors: AtomicU64,
    late_resyncs: AtomicU64,
    /// f32 bits
    fps: AtomicU32,
}

/// Point-in-time copy of [`LoopStats`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopStatsSnapshot {
    /// Core steps completed
    pub steps: u64,
    /// Frames handed to the frame sink
    pub frames_delivered: u64,
    /// Audio samples accepted by the audio sink
    pub audio_samples: u64,
    /// Audio samples dropped on overrun
    pub audio_dropped: u64,
    /// Steps whose audio did not fit in full
    pub audio_overruns: u64,
    /// Audio backend failures
    pub audio_errors: u64,
    /// Times pacing gave up on a schedule it had fallen behind
    pub late_resyncs: u64,
    /// Measured frame rate
    pub fps: f32,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audio(&self, accepted: usize) {
        self.audio_samples.fetch_add(accepted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self, dropped: usize) {
        self.audio_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        self.audio_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audio_error(&self) {
        self.audio_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_pacing(&self, resyncs: u64, fps: f32) {
        self.late_resyncs.store(resyncs, Ordering::Relaxed);
        self.fps.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            steps: self.steps(),
            frames_delivered: self.frames_delivered(),
            audio_samples: self.audio_samples.load(Ordering::Relaxed),
            audio_dropped: self.audio_dropped.load(Ordering::Relaxed),
            audio_overruns: self.audio_overruns.load(Ordering::Relaxed),
            audio_errors: self.audio_errors.load(Ordering::Relaxed),
            late_resyncs: self.late_resyncs.load(Ordering::Relaxed),
            fps: f32::from_bits(self.fps.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = LoopStats::new();
        stats.record_step();
        stats.record_frame();
        stats.record_audio(1470);
        stats.record_overrun(30);
        stats.set_pacing(2, 59.9);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.steps, 1);
        assert_eq!(snapshot.frames_delivered, 1);
        assert_eq!(snapshot.audio_samples, 1470);
        assert_eq!(snapshot.audio_dropped, 30);
        assert_eq!(snapshot.audio_overruns, 1);
        assert_eq!(snapshot.late_resyncs, 2);
        assert_eq!(snapshot.fps, 59.9);
    }
}
