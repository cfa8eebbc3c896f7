//! burnx - headless runner
//!
//! Starts a session for the configured game, runs it for a fixed number of
//! frames or seconds and reports what the run loop delivered.

use anyhow::{bail, Context};
use bx_core::config::Config;
use bx_core::frame::{FrameBuffer, Geometry, Size};
use bx_core::logging;
use bx_core::machine::TestPatternFactory;
use bx_runtime::{EmulatorSession, SessionEvent};
use bx_video::FrameObserver;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "burnx", version, about = "Arcade emulation front end runtime")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ROM set to run
    #[arg(short, long)]
    rom: Option<String>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long, default_value_t = 5)]
    seconds: u64,

    /// Run as fast as the core allows
    #[arg(long)]
    unthrottled: bool,
}

/// Counts deliveries in place of a real presentation surface
#[derive(Default)]
struct FrameCounter {
    frames: AtomicU64,
}

impl FrameObserver for FrameCounter {
    fn screen_size_did_change(&self, size: Size) {
        tracing::info!("Screen size {}x{}", size.width, size.height);
    }

    fn init_texture(&self, geometry: &Geometry) {
        tracing::info!(
            "Texture {}x{}, {} bytes per pixel{}",
            geometry.width,
            geometry.height,
            geometry.bytes_per_pixel,
            if geometry.rotated { ", rotated" } else { "" }
        );
    }

    fn render_frame(&self, _frame: &FrameBuffer) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(rom) = args.rom {
        config.machine.rom_name = rom;
    }
    if args.frames.is_some() {
        config.general.max_frames = args.frames;
    }
    if args.unthrottled {
        config.general.throttle = false;
    }

    logging::init(&config.debug)?;
    tracing::info!("Starting burnx {}", env!("CARGO_PKG_VERSION"));

    let mut session = EmulatorSession::new(&config, TestPatternFactory);
    let counter = Arc::new(FrameCounter::default());
    let observer: Arc<dyn FrameObserver> = counter.clone();
    session.add_observer(&observer);

    let found = session.poll_devices();
    if found > 0 {
        tracing::info!("{} gamepad event(s) at startup", found);
    }

    session
        .start(&config)
        .with_context(|| format!("failed to start '{}'", config.machine.rom_name))?;

    if !session.wait_for_stop(Duration::from_secs(args.seconds)) {
        session.stop();
    }

    let stats = session.stats();
    tracing::info!(
        "{} steps, {} frames observed, {} audio samples ({} dropped), {:.1} fps",
        stats.steps,
        counter.frames.load(Ordering::Relaxed),
        stats.audio_samples,
        stats.audio_dropped,
        stats.fps
    );

    for event in session.poll_events() {
        if let SessionEvent::Terminated { fault, last_state } = event {
            bail!("core fault after {} steps: {}", last_state.steps, fault);
        }
    }
    Ok(())
}
