//! Frame pacing
//!
//! Keeps the run loop at the core's native refresh rate. Deadlines advance
//! by a fixed interval so small sleep inaccuracies average out; when the
//! loop falls behind by more than one whole interval the debt is dropped
//! instead of being worked off in a burst.

use std::time::{Duration, Instant};

/// Deadline tracker for a fixed frame rate
#[derive(Debug)]
pub struct FramePacer {
    /// Target time between frames
    interval: Duration,
    /// When the next frame is due
    next: Instant,
    /// Total frames paced
    frame_count: u64,
    /// Times the schedule was abandoned because the loop fell behind
    resyncs: u64,
    /// Measured frames per second
    fps: f32,
    fps_start: Instant,
    fps_frame_count: u64,
}

impl FramePacer {
    /// Create a pacer for `frame_rate` Hz, starting at `now`
    pub fn new(frame_rate: f64, now: Instant) -> Self {
        let frame_rate = if frame_rate > 0.0 && frame_rate.is_finite() {
            frame_rate
        } else {
            60.0
        };

        Self {
            interval: Duration::from_secs_f64(1.0 / frame_rate),
            next: now,
            frame_count: 0,
            resyncs: 0,
            fps: 0.0,
            fps_start: now,
            fps_frame_count: 0,
        }
    }

    /// Restart the schedule, e.g. after a pause
    pub fn reset(&mut self, now: Instant) {
        self.next = now;
        self.fps_start = now;
        self.fps_frame_count = 0;
    }

    /// Record a finished frame and return when the next one is due. A
    /// deadline at or before `now` means the next frame should start
    /// immediately.
    pub fn frame_done(&mut self, now: Instant) -> Instant {
        self.frame_count += 1;
        self.fps_frame_count += 1;
        self.next += self.interval;

        if now > self.next && now - self.next > self.interval {
            tracing::trace!(
                "Frame pacer behind by {:.2}ms, resyncing",
                (now - self.next).as_secs_f64() * 1000.0
            );
            self.next = now;
            self.resyncs += 1;
        }

        // Update the measured rate roughly once per second
        let fps_elapsed = now.duration_since(self.fps_start);
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_start = now;
        }

        self.next
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}
