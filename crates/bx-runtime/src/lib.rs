//! Run loop and session management for burnx
//!
//! An [`EmulatorSession`] owns one emulation core for its lifetime. It runs
//! the core on a dedicated thread (the [`RunLoop`]), fans frames out through
//! a [`FrameSink`](bx_video::FrameSink), queues audio and feeds the core
//! with input gathered from connected gamepads.

pub mod events;
pub mod input;
pub mod pacer;
pub mod runloop;
pub mod session;
pub mod stats;

pub use events::{LastState, SessionEvent};
pub use input::InputAdapter;
pub use pacer::FramePacer;
pub use runloop::{Command, RunLoop, RunLoopState};
pub use session::EmulatorSession;
pub use stats::{LoopStats, LoopStatsSnapshot};
