//! Emulation run loop
//!
//! The loop owns the core and runs on its own thread. It reacts to
//! [`Command`]s queued by the session between steps, so a step that has
//! started always finishes its deliveries. Its state is published through
//! an atomic so other threads can read it without taking a lock.

use crate::events::{LastState, SessionEvent};
use crate::input::InputAdapter;
use crate::pacer::FramePacer;
use crate::stats::LoopStats;
use bx_audio::AudioSink;
use bx_core::error::{AudioError, CoreFault};
use bx_core::frame::{FrameBuffer, Geometry};
use bx_core::machine::Machine;
use bx_video::FrameSink;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Run loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunLoopState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Stopping = 3,
    Stopped = 4,
}

impl RunLoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Published copy of the loop's state
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: RunLoopState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> RunLoopState {
        RunLoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: RunLoopState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Requests from the session to the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
}

enum Flow {
    Continue,
    Stop,
}

pub struct RunLoop {
    machine: Box<dyn Machine>,
    video: Arc<FrameSink>,
    audio: Box<dyn AudioSink>,
    input: Arc<InputAdapter>,
    buffer: FrameBuffer,
    samples: Vec<i16>,
    pacer: FramePacer,
    throttle: bool,
    max_frames: Option<u64>,
    commands: Receiver<Command>,
    events: Sender<SessionEvent>,
    published: Arc<StateCell>,
    stats: Arc<LoopStats>,
    state: RunLoopState,
}

impl RunLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        machine: Box<dyn Machine>,
        video: Arc<FrameSink>,
        audio: Box<dyn AudioSink>,
        input: Arc<InputAdapter>,
        commands: Receiver<Command>,
        events: Sender<SessionEvent>,
        published: Arc<StateCell>,
        stats: Arc<LoopStats>,
    ) -> Self {
        let pacer = FramePacer::new(machine.frame_rate(), Instant::now());
        Self {
            machine,
            video,
            audio,
            input,
            // Empty geometry, so the first real frame is announced
            buffer: FrameBuffer::new(Geometry::new(0, 0, 0)),
            samples: Vec::new(),
            pacer,
            throttle: true,
            max_frames: None,
            commands,
            events,
            published,
            stats,
            state: RunLoopState::Idle,
        }
    }

    /// Pace to the core's frame rate (true) or run flat out (false)
    pub fn with_throttle(mut self, throttle: bool) -> Self {
        self.throttle = throttle;
        self
    }

    /// Stop on its own after this many steps
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Enter the initial state. Called before the loop thread starts so the
    /// session reads a meaningful state right away.
    pub(crate) fn prepare(&mut self, start_paused: bool) {
        self.set_state(if start_paused {
            RunLoopState::Paused
        } else {
            RunLoopState::Running
        });
    }

    /// Run until stopped or until the core faults
    pub fn run(mut self) {
        if self.state == RunLoopState::Idle {
            self.prepare(false);
        }
        tracing::info!(
            "Run loop started: {} at {:.2} Hz",
            self.machine.name(),
            self.machine.frame_rate()
        );
        self.send(SessionEvent::Started {
            machine: self.machine.name().to_string(),
        });
        self.pacer.reset(Instant::now());

        loop {
            if let Flow::Stop = self.drain_commands() {
                break;
            }

            if let Err(fault) = self.step() {
                self.terminate(fault);
                return;
            }

            if self
                .max_frames
                .is_some_and(|max| self.stats.steps() >= max)
            {
                tracing::info!("Frame limit reached after {} steps", self.stats.steps());
                self.set_state(RunLoopState::Stopping);
                break;
            }

            if let Flow::Stop = self.pace() {
                break;
            }
        }

        self.set_state(RunLoopState::Stopped);
        let last_state = self.last_state(RunLoopState::Stopping);
        tracing::info!(
            "Run loop stopped after {} steps ({} frames)",
            last_state.steps,
            last_state.frames_delivered
        );
        self.send(SessionEvent::Stopped { last_state });
    }

    /// Apply queued commands. Blocks while paused.
    fn drain_commands(&mut self) -> Flow {
        loop {
            let command = if self.state == RunLoopState::Paused {
                match self.commands.recv() {
                    Ok(command) => command,
                    Err(_) => Command::Stop,
                }
            } else {
                match self.commands.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => return Flow::Continue,
                    Err(TryRecvError::Disconnected) => Command::Stop,
                }
            };

            if let Flow::Stop = self.apply(command) {
                return Flow::Stop;
            }
        }
    }

    fn apply(&mut self, command: Command) -> Flow {
        match (command, self.state) {
            (Command::Pause, RunLoopState::Running) => {
                self.set_state(RunLoopState::Paused);
                tracing::info!("Run loop paused");
                self.send(SessionEvent::Paused);
            }
            (Command::Resume, RunLoopState::Paused) => {
                self.set_state(RunLoopState::Running);
                // Time spent paused is not debt
                self.pacer.reset(Instant::now());
                tracing::info!("Run loop resumed");
                self.send(SessionEvent::Resumed);
            }
            (Command::Stop, _) => {
                self.set_state(RunLoopState::Stopping);
                return Flow::Stop;
            }
            (command, state) => {
                tracing::trace!("Ignoring {:?} while {:?}", command, state);
            }
        }
        Flow::Continue
    }

    /// Advance the core one frame and deliver its output
    fn step(&mut self) -> Result<(), CoreFault> {
        let input = self.input.snapshot();
        self.machine.set_input(&input);

        let machine = &mut self.machine;
        panic::catch_unwind(AssertUnwindSafe(|| machine.step())).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CoreFault::Panicked(message))
        })?;
        self.stats.record_step();

        let frame = self.machine.current_frame();
        if self.buffer.copy_from(&frame)? {
            let geometry = self.buffer.geometry();
            tracing::debug!(
                "Frame geometry {}x{} ({} bpp, rotated: {})",
                geometry.width,
                geometry.height,
                geometry.bytes_per_pixel,
                geometry.rotated
            );
            self.video.screen_size_did_change(geometry.display_size());
            self.video.init_texture(&geometry);
        }
        self.video.render_frame(&self.buffer);
        self.stats.record_frame();

        self.samples.clear();
        self.machine.drain_audio_samples(&mut self.samples);
        self.submit_audio();

        tracing::trace!("Step {} done", self.stats.steps());
        Ok(())
    }

    fn submit_audio(&mut self) {
        if self.samples.is_empty() {
            return;
        }

        match self.audio.submit(&self.samples) {
            Ok(()) => self.stats.record_audio(self.samples.len()),
            Err(AudioError::Overrun { dropped }) => {
                // A sink cannot drop more than it was given
                let dropped = dropped.min(self.samples.len());
                self.stats.record_audio(self.samples.len() - dropped);
                self.stats.record_overrun(dropped);
                tracing::trace!("Audio overrun, dropped {} samples", dropped);
            }
            Err(e) => {
                self.stats.record_audio_error();
                tracing::warn!("{}", e);
            }
        }
    }

    /// Wait out the rest of the frame interval, still answering commands
    fn pace(&mut self) -> Flow {
        let deadline = self.pacer.frame_done(Instant::now());
        self.stats.set_pacing(self.pacer.resyncs(), self.pacer.fps());
        if !self.throttle {
            return Flow::Continue;
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }

            match self.commands.recv_timeout(deadline - now) {
                Ok(command) => {
                    if let Flow::Stop = self.apply(command) {
                        return Flow::Stop;
                    }
                    if self.state == RunLoopState::Paused {
                        return Flow::Continue;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                Err(RecvTimeoutError::Disconnected) => return self.apply(Command::Stop),
            }
        }
    }

    fn terminate(&mut self, fault: CoreFault) {
        let last_state = self.last_state(self.state);
        self.set_state(RunLoopState::Stopped);
        tracing::error!(
            "Core fault after {} steps: {}",
            last_state.steps,
            fault
        );
        self.send(SessionEvent::Terminated { fault, last_state });
    }

    fn last_state(&self, state: RunLoopState) -> LastState {
        LastState {
            state,
            frames_delivered: self.stats.frames_delivered(),
            steps: self.stats.steps(),
        }
    }

    fn set_state(&mut self, state: RunLoopState) {
        self.state = state;
        self.published.store(state);
    }

    fn send(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_audio::{NullAudioSink, RingAudioSink};
    use bx_core::config::{TestPatternConfig, VideoConfig};
    use bx_core::frame::{Frame, Size};
    use bx_core::input::InputState;
    use bx_core::machine::{AudioFormat, TestPatternMachine};
    use bx_video::FrameObserver;
    use crossbeam::channel::unbounded;
    use parking_lot::Mutex;

    struct Harness {
        runloop: RunLoop,
        commands: Sender<Command>,
        events: Receiver<SessionEvent>,
        published: Arc<StateCell>,
        stats: Arc<LoopStats>,
        video: Arc<FrameSink>,
    }

    fn harness(machine: Box<dyn Machine>, audio: Box<dyn AudioSink>) -> Harness {
        let (commands, command_rx) = unbounded();
        let (event_tx, events) = unbounded();
        let published = Arc::new(StateCell::new(RunLoopState::Idle));
        let stats = Arc::new(LoopStats::new());
        let video = Arc::new(FrameSink::new(&VideoConfig::default()));
        let runloop = RunLoop::new(
            machine,
            Arc::clone(&video),
            audio,
            Arc::new(InputAdapter::default()),
            command_rx,
            event_tx,
            Arc::clone(&published),
            Arc::clone(&stats),
        )
        .with_throttle(false);

        Harness {
            runloop,
            commands,
            events,
            published,
            stats,
            video,
        }
    }

    fn test_pattern(config: TestPatternConfig) -> Box<dyn Machine> {
        Box::new(TestPatternMachine::new(&config).unwrap())
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<&'static str>>);

    impl FrameObserver for Log {
        fn screen_size_did_change(&self, _size: Size) {
            self.0.lock().push("size");
        }
        fn init_texture(&self, _geometry: &Geometry) {
            self.0.lock().push("texture");
        }
        fn render_frame(&self, _frame: &FrameBuffer) {
            self.0.lock().push("frame");
        }
    }

    /// Alternates between two geometries every other step
    struct Flipper {
        step: u64,
        small: Vec<u8>,
        large: Vec<u8>,
    }

    impl Machine for Flipper {
        fn name(&self) -> &str {
            "flipper"
        }
        fn frame_rate(&self) -> f64 {
            60.0
        }
        fn audio_format(&self) -> AudioFormat {
            AudioFormat::default()
        }
        fn set_input(&mut self, _input: &InputState) {}
        fn step(&mut self) -> Result<(), CoreFault> {
            self.step += 1;
            Ok(())
        }
        fn current_frame(&self) -> Frame<'_> {
            if (self.step / 2) % 2 == 0 {
                Frame::new(Geometry::new(2, 2, 4), &self.small)
            } else {
                Frame::new(Geometry::new(4, 4, 4), &self.large)
            }
        }
        fn drain_audio_samples(&mut self, _out: &mut Vec<i16>) {}
    }

    struct Panicky;

    impl Machine for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn frame_rate(&self) -> f64 {
            60.0
        }
        fn audio_format(&self) -> AudioFormat {
            AudioFormat::default()
        }
        fn set_input(&mut self, _input: &InputState) {}
        fn step(&mut self) -> Result<(), CoreFault> {
            panic!("bus error");
        }
        fn current_frame(&self) -> Frame<'_> {
            Frame::new(Geometry::new(0, 0, 0), &[])
        }
        fn drain_audio_samples(&mut self, _out: &mut Vec<i16>) {}
    }

    #[test]
    fn test_frame_limit() {
        let config = TestPatternConfig::default();
        let h = harness(test_pattern(config), Box::new(NullAudioSink::default()));
        let log = Arc::new(Log::default());
        let observer: Arc<dyn FrameObserver> = log.clone();
        h.video.add_observer(&observer);

        h.runloop.with_max_frames(Some(10)).run();

        assert_eq!(h.published.load(), RunLoopState::Stopped);
        let stats = h.stats.snapshot();
        assert_eq!(stats.steps, 10);
        assert_eq!(stats.frames_delivered, 10);
        assert_eq!(stats.audio_samples, 10 * 735 * 2);

        let events = log.0.lock().clone();
        assert_eq!(&events[..3], &["size", "texture", "frame"]);
        assert_eq!(events.iter().filter(|e| **e == "frame").count(), 10);
        assert_eq!(events.iter().filter(|e| **e == "texture").count(), 1);

        let events: Vec<_> = h.events.try_iter().collect();
        assert!(matches!(events.first(), Some(SessionEvent::Started { .. })));
        assert!(matches!(events.last(), Some(SessionEvent::Stopped { .. })));
    }

    #[test]
    fn test_geometry_change_announced_before_frame() {
        let machine = Box::new(Flipper {
            step: 0,
            small: vec![0; 16],
            large: vec![0; 64],
        });
        let h = harness(machine, Box::new(NullAudioSink::default()));
        let log = Arc::new(Log::default());
        let observer: Arc<dyn FrameObserver> = log.clone();
        h.video.add_observer(&observer);

        h.runloop.with_max_frames(Some(6)).run();

        // steps 1..=6 produce geometries: small, large, large, small, small, large
        let events = log.0.lock().clone();
        assert_eq!(
            events,
            vec![
                "size", "texture", "frame", "size", "texture", "frame", "frame", "size",
                "texture", "frame", "frame", "size", "texture", "frame",
            ]
        );
    }

    #[test]
    fn test_fault_stops_loop() {
        let config = TestPatternConfig {
            fault_after: Some(3),
            ..TestPatternConfig::default()
        };
        let h = harness(test_pattern(config), Box::new(NullAudioSink::default()));
        h.runloop.run();

        assert_eq!(h.published.load(), RunLoopState::Stopped);
        let terminal = h.events.try_iter().last().unwrap();
        match terminal {
            SessionEvent::Terminated { fault, last_state } => {
                assert!(matches!(fault, CoreFault::UnsupportedOpcode { .. }));
                assert_eq!(last_state.state, RunLoopState::Running);
                assert_eq!(last_state.steps, 3);
                assert_eq!(last_state.frames_delivered, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_panicking_core_is_a_fault() {
        let h = harness(Box::new(Panicky), Box::new(NullAudioSink::default()));
        h.runloop.run();

        let terminal = h.events.try_iter().last().unwrap();
        assert!(matches!(
            terminal,
            SessionEvent::Terminated {
                fault: CoreFault::Panicked(ref message),
                ..
            } if message == "bus error"
        ));
    }

    #[test]
    fn test_audio_overrun_is_counted_not_fatal() {
        let config = TestPatternConfig::default();
        let (sink, _consumer) = RingAudioSink::with_capacity(AudioFormat::default(), 2000);
        let h = harness(test_pattern(config), Box::new(sink));
        h.runloop.with_max_frames(Some(5)).run();

        let stats = h.stats.snapshot();
        assert_eq!(stats.frames_delivered, 5);
        assert_eq!(stats.audio_samples, 2000);
        assert_eq!(stats.audio_dropped, 5 * 1470 - 2000);
        assert_eq!(stats.audio_overruns, 4);
    }

    /// Claims to drop more samples than it was handed
    struct OverreportingSink;

    impl AudioSink for OverreportingSink {
        fn format(&self) -> AudioFormat {
            AudioFormat::default()
        }

        fn submit(&mut self, samples: &[i16]) -> Result<(), AudioError> {
            Err(AudioError::Overrun {
                dropped: samples.len() * 2,
            })
        }
    }

    #[test]
    fn test_overrun_count_clamped_to_submitted() {
        let h = harness(
            test_pattern(TestPatternConfig::default()),
            Box::new(OverreportingSink),
        );
        h.runloop.with_max_frames(Some(3)).run();

        let stats = h.stats.snapshot();
        assert_eq!(stats.frames_delivered, 3);
        assert_eq!(stats.audio_samples, 0);
        assert_eq!(stats.audio_dropped, 3 * 1470);
        assert_eq!(stats.audio_overruns, 3);
    }

    #[test]
    fn test_stop_before_first_step() {
        let h = harness(
            test_pattern(TestPatternConfig::default()),
            Box::new(NullAudioSink::default()),
        );
        h.commands.send(Command::Stop).unwrap();
        h.runloop.run();

        assert_eq!(h.stats.snapshot().frames_delivered, 0);
        assert_eq!(h.published.load(), RunLoopState::Stopped);
    }

    #[test]
    fn test_paused_loop_waits_for_resume() {
        let mut h = harness(
            test_pattern(TestPatternConfig::default()),
            Box::new(NullAudioSink::default()),
        );
        h.runloop.prepare(true);
        assert_eq!(h.published.load(), RunLoopState::Paused);

        // Queued before the thread runs: a duplicate pause, then resume
        h.commands.send(Command::Pause).unwrap();
        h.commands.send(Command::Resume).unwrap();
        h.commands.send(Command::Resume).unwrap();
        h.runloop.with_max_frames(Some(3)).run();

        let events: Vec<_> = h.events.try_iter().collect();
        let resumed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Resumed))
            .count();
        assert_eq!(resumed, 1);
        assert_eq!(h.stats.snapshot().frames_delivered, 3);
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            RunLoopState::Idle,
            RunLoopState::Running,
            RunLoopState::Paused,
            RunLoopState::Stopping,
            RunLoopState::Stopped,
        ] {
            let cell = StateCell::new(state);
            assert_eq!(cell.load(), state);
        }
    }
}
