//! Logging setup
//!
//! Installs a `tracing` subscriber. `RUST_LOG` takes precedence over the
//! configured level so individual modules can be turned up while debugging.

use crate::config::DebugConfig;
use crate::error::{EmulatorError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already installed or the log file
/// cannot be created.
pub fn init(config: &DebugConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(config))
        .with_thread_names(true);

    let installed = if config.log_to_file {
        let file = std::fs::File::create(&config.log_path)?;
        builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EmulatorError::Config(format!("failed to install logger: {}", e)))
}

/// Route log output through the test harness. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn filter_for(config: &DebugConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()))
}
