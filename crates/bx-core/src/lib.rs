//! Core types for the burnx emulation runtime
//!
//! This crate provides the foundational types, error handling,
//! configuration, and logging infrastructure shared by the input,
//! video, audio and runtime crates, together with the narrow
//! contract an emulation core has to implement to be driven by
//! the run loop.

pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod logging;
pub mod machine;

pub use config::Config;
pub use error::{AudioError, CoreFault, EmulatorError, InitError, InputError, Result};
pub use frame::{Frame, FrameBuffer, Geometry, Size};
pub use input::{InputState, LogicalAxis, LogicalButtons, PlayerInput, MAX_PLAYERS};
pub use machine::{AudioFormat, Machine, MachineFactory, TestPatternFactory, TestPatternMachine};
