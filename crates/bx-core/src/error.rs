//! Error types for the burnx runtime

use thiserror::Error;

/// Main error type for the runtime
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Initialization error: {0}")]
    Initialization(#[from] InitError),

    #[error("Core fault: {0}")]
    Core(#[from] CoreFault),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl EmulatorError {
    /// Whether the error ends the session it occurred in.
    ///
    /// Device and audio errors are absorbed by the run loop; everything
    /// that invalidates the core or prevents it from starting is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Input(_) | Self::Audio(_) => false,
            Self::Initialization(_) | Self::Core(_) => true,
            Self::Io(_) | Self::Config(_) => true,
        }
    }
}

/// Game controller errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Device unavailable at location 0x{location_id:08x}")]
    DeviceUnavailable { location_id: u32 },

    #[error("Device at location 0x{0:08x} is already registered")]
    AlreadyRegistered(u32),

    #[error("Mapping error: {0}")]
    Mapping(String),
}

/// Session construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Audio output unavailable: {0}")]
    AudioOutput(String),

    #[error("Failed to spawn run loop thread: {0}")]
    Thread(String),

    #[error("Session already started")]
    AlreadyStarted,
}

/// Unrecoverable errors raised by an emulation core mid-step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreFault {
    #[error("Unsupported opcode 0x{opcode:04x} at 0x{addr:08x}")]
    UnsupportedOpcode { addr: u32, opcode: u32 },

    #[error("Corrupted core state: {0}")]
    CorruptState(String),

    #[error("Core panicked: {0}")]
    Panicked(String),
}

/// Audio output errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio overrun: {dropped} samples dropped")]
    Overrun { dropped: usize },

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
