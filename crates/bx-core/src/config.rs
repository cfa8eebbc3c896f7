//! Configuration system for the burnx runtime

use crate::error::{EmulatorError, Result};
use crate::frame::Size;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub machine: MachineConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub input: InputConfig,
    pub debug: DebugConfig,
}

/// General session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enter the Paused state right after start
    pub start_paused: bool,
    /// Pace the run loop to the core's native frame rate
    pub throttle: bool,
    /// Stop the run loop on its own after this many steps
    pub max_frames: Option<u64>,
}

/// Emulation core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Driver/ROM set name
    pub rom_name: String,
    /// Directory searched for ROM sets
    pub rom_path: PathBuf,
    /// Parameters of the built-in test pattern machine
    pub test_pattern: TestPatternConfig,
}

/// Output shape of the built-in test pattern machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternConfig {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub rotated: bool,
    pub frame_rate: f64,
    pub sample_rate: u32,
    /// Raise a core fault after this many steps (diagnostics)
    pub fault_after: Option<u64>,
}

/// Video presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Initial size of the output surface
    pub output_size: Size,
    /// Preserve the frame's aspect ratio when scaling
    pub keep_aspect: bool,
    /// Only scale by whole multiples
    pub integer_scale: bool,
}

/// Audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioBackend,
    pub enable: bool,
    /// Size of the sample queue between the run loop and the output device
    pub buffer_duration_ms: u32,
}

/// Audio backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum AudioBackend {
    /// Device output when available, plain buffer otherwise
    #[default]
    Auto,
    /// Host audio device
    Cpal,
    /// Bounded queue drained by the host application
    Buffer,
    /// Discard everything
    Null,
}

/// Input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Normalized axis magnitude below which a stick reads as centered
    pub deadzone: f32,
    /// File holding per-device control mappings
    pub mapping_path: PathBuf,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            start_paused: false,
            throttle: true,
            max_frames: None,
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rom_name: "testpattern".to_string(),
            rom_path: data_dir().join("roms"),
            test_pattern: TestPatternConfig::default(),
        }
    }
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 384,
            height: 224,
            bytes_per_pixel: 4,
            rotated: false,
            frame_rate: 60.0,
            sample_rate: 44100,
            fault_after: None,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            output_size: Size::new(768, 448),
            keep_aspect: true,
            integer_scale: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::default(),
            enable: true,
            buffer_duration_ms: 100,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.15,
            mapping_path: config_dir().join("mappings.toml"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("burnx.log"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or create it if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EmulatorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| EmulatorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("burnx")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("burnx")
}
