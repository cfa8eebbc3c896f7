//! Emulator session
//!
//! The session is the front end's handle on a running game. It builds the
//! core through a [`MachineFactory`], owns the run loop thread and the
//! audio, video and input adapters, and turns UI commands into run loop
//! commands.

use crate::events::SessionEvent;
use crate::input::InputAdapter;
use crate::runloop::{Command, RunLoop, RunLoopState, StateCell};
use crate::stats::{LoopStats, LoopStatsSnapshot};
use bx_audio::{AudioConsumer, AudioSink, NullAudioSink, RingAudioSink};
use bx_core::config::{AudioBackend, AudioConfig, Config};
use bx_core::error::InitError;
use bx_core::frame::Size;
use bx_core::machine::{AudioFormat, MachineFactory};
use bx_video::{FrameObserver, FrameSink};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "cpal")]
use bx_audio::CpalAudioOutput;

struct Worker {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
    /// Disconnects when the loop thread exits
    done: Receiver<()>,
}

/// Audio plumbing opened for one run
struct AudioOutput {
    sink: Box<dyn AudioSink>,
    consumer: Option<AudioConsumer>,
    #[cfg(feature = "cpal")]
    device: Option<CpalAudioOutput>,
}

pub struct EmulatorSession {
    factory: Box<dyn MachineFactory>,
    video: Arc<FrameSink>,
    input: Arc<InputAdapter>,
    state: Arc<StateCell>,
    stats: Arc<LoopStats>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    worker: Option<Worker>,
    audio_consumer: Option<AudioConsumer>,
    #[cfg(feature = "cpal")]
    audio_device: Option<CpalAudioOutput>,
}

impl EmulatorSession {
    /// Create an idle session. Video and input adapters live as long as the
    /// session, so observers and gamepads can be set up before `start`.
    pub fn new<F>(config: &Config, factory: F) -> Self
    where
        F: MachineFactory + 'static,
    {
        let (events_tx, events_rx) = unbounded();
        Self {
            factory: Box::new(factory),
            video: Arc::new(FrameSink::new(&config.video)),
            input: Arc::new(InputAdapter::from_config(&config.input)),
            state: Arc::new(StateCell::new(RunLoopState::Idle)),
            stats: Arc::new(LoopStats::new()),
            events_tx,
            events_rx,
            worker: None,
            audio_consumer: None,
            #[cfg(feature = "cpal")]
            audio_device: None,
        }
    }

    /// Build the core and start the run loop thread.
    ///
    /// On failure the session stays as it was and no thread is left behind.
    pub fn start(&mut self, config: &Config) -> Result<(), InitError> {
        match self.state() {
            RunLoopState::Running | RunLoopState::Paused | RunLoopState::Stopping => {
                return Err(InitError::AlreadyStarted);
            }
            RunLoopState::Idle | RunLoopState::Stopped => {}
        }
        // A previous run that ended on its own still has a thread to reap
        self.stop();

        let machine = self.factory.create(&config.machine).map_err(|e| {
            tracing::error!("Failed to create machine '{}': {}", config.machine.rom_name, e);
            e
        })?;

        let audio = open_audio(&config.audio, machine.audio_format())?;

        let (commands, command_rx) = unbounded();
        let (done_tx, done) = unbounded::<()>();
        let stats = Arc::new(LoopStats::new());

        let mut runloop = RunLoop::new(
            machine,
            Arc::clone(&self.video),
            audio.sink,
            Arc::clone(&self.input),
            command_rx,
            self.events_tx.clone(),
            Arc::clone(&self.state),
            Arc::clone(&stats),
        )
        .with_throttle(config.general.throttle)
        .with_max_frames(config.general.max_frames);
        runloop.prepare(config.general.start_paused);

        let spawned = std::thread::Builder::new()
            .name("bx-runloop".to_string())
            .spawn(move || {
                let _done = done_tx;
                runloop.run();
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.store(RunLoopState::Idle);
                return Err(InitError::Thread(e.to_string()));
            }
        };

        self.stats = stats;
        self.audio_consumer = audio.consumer;
        #[cfg(feature = "cpal")]
        {
            self.audio_device = audio.device;
        }
        self.worker = Some(Worker {
            commands,
            handle,
            done,
        });
        Ok(())
    }

    /// Suspend emulation. No-op unless running.
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Continue after [`pause`](Self::pause). No-op unless paused.
    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Stop the run loop and wait for its thread. The step in progress, if
    /// any, finishes its deliveries first. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(Command::Stop);
            if worker.handle.join().is_err() {
                tracing::error!("Run loop thread panicked");
                self.state.store(RunLoopState::Stopped);
            }
        }

        #[cfg(feature = "cpal")]
        if let Some(mut device) = self.audio_device.take() {
            if let Err(e) = device.stop() {
                tracing::warn!("{}", e);
            }
        }
        self.audio_consumer = None;
    }

    /// Wait up to `timeout` for the run loop to end on its own (frame
    /// limit or core fault). Returns true once it has.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        match &self.worker {
            Some(worker) => matches!(
                worker.done.recv_timeout(timeout),
                Err(RecvTimeoutError::Disconnected)
            ),
            None => true,
        }
    }

    /// Forward a new output surface size to the video side
    pub fn resize_output(&self, size: Size) {
        self.video.resize_output(size);
    }

    pub fn state(&self) -> RunLoopState {
        self.state.load()
    }

    /// Notifications produced since the last call
    pub fn poll_events(&self) -> Vec<SessionEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Process pending gamepad hot-plug events
    pub fn poll_devices(&self) -> usize {
        self.input.poll_devices()
    }

    pub fn add_observer(&self, observer: &Arc<dyn FrameObserver>) -> bool {
        self.video.add_observer(observer)
    }

    pub fn remove_observer(&self, observer: &Arc<dyn FrameObserver>) -> bool {
        self.video.remove_observer(observer)
    }

    pub fn video(&self) -> &Arc<FrameSink> {
        &self.video
    }

    pub fn input(&self) -> &Arc<InputAdapter> {
        &self.input
    }

    /// Queue read side, when audio goes to a buffer the host drains
    pub fn audio_consumer(&self) -> Option<AudioConsumer> {
        self.audio_consumer.clone()
    }

    pub fn stats(&self) -> LoopStatsSnapshot {
        self.stats.snapshot()
    }

    fn send(&self, command: Command) {
        if let Some(worker) = &self.worker {
            // The loop may already have ended on its own
            let _ = worker.commands.send(command);
        }
    }
}

impl Drop for EmulatorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_audio(config: &AudioConfig, format: AudioFormat) -> Result<AudioOutput, InitError> {
    let null = || AudioOutput {
        sink: Box::new(NullAudioSink::new(format)),
        consumer: None,
        #[cfg(feature = "cpal")]
        device: None,
    };
    let buffer = || {
        let (sink, consumer) = RingAudioSink::with_duration(format, config.buffer_duration_ms);
        AudioOutput {
            sink: Box::new(sink),
            consumer: Some(consumer),
            #[cfg(feature = "cpal")]
            device: None,
        }
    };

    if !config.enable {
        tracing::info!("Audio disabled");
        return Ok(null());
    }

    match config.backend {
        AudioBackend::Null => Ok(null()),
        AudioBackend::Buffer => Ok(buffer()),
        AudioBackend::Cpal => open_device(buffer()),
        AudioBackend::Auto => match open_device(buffer()) {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::warn!("{}, audio goes to a buffer only", e);
                Ok(buffer())
            }
        },
    }
}

#[cfg(feature = "cpal")]
fn open_device(mut output: AudioOutput) -> Result<AudioOutput, InitError> {
    let consumer = output
        .consumer
        .clone()
        .ok_or_else(|| InitError::AudioOutput("no sample queue".to_string()))?;
    let device = CpalAudioOutput::start(consumer).map_err(|e| InitError::AudioOutput(e.to_string()))?;
    output.device = Some(device);
    Ok(output)
}

#[cfg(not(feature = "cpal"))]
fn open_device(_output: AudioOutput) -> Result<AudioOutput, InitError> {
    Err(InitError::AudioOutput(
        "built without the cpal feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::machine::TestPatternFactory;

    #[test]
    fn test_open_audio_backends() {
        let format = AudioFormat::default();
        let mut config = AudioConfig {
            backend: AudioBackend::Null,
            ..AudioConfig::default()
        };
        assert!(open_audio(&config, format).unwrap().consumer.is_none());

        config.backend = AudioBackend::Buffer;
        let output = open_audio(&config, format).unwrap();
        assert_eq!(output.consumer.unwrap().format(), format);

        // Auto always yields something usable
        config.backend = AudioBackend::Auto;
        assert!(open_audio(&config, format).is_ok());

        config.enable = false;
        config.backend = AudioBackend::Buffer;
        assert!(open_audio(&config, format).unwrap().consumer.is_none());
    }

    #[cfg(not(feature = "cpal"))]
    #[test]
    fn test_explicit_device_without_support() {
        let config = AudioConfig {
            backend: AudioBackend::Cpal,
            ..AudioConfig::default()
        };
        assert!(matches!(
            open_audio(&config, AudioFormat::default()),
            Err(InitError::AudioOutput(_))
        ));
    }

    #[test]
    fn test_commands_before_start_are_ignored() {
        let mut session = EmulatorSession::new(&Config::default(), TestPatternFactory);
        session.pause();
        session.resume();
        session.stop();
        assert_eq!(session.state(), RunLoopState::Idle);
        assert!(session.wait_for_stop(Duration::from_millis(1)));
    }
}
