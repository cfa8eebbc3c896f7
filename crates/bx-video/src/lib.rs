//! Video fan-out for the burnx runtime
//!
//! The run loop hands every rendered frame to a [`FrameSink`], which
//! forwards it to the registered presentation consumers on the producer
//! thread.

pub mod observer;
pub mod sink;

pub use observer::{ObserverSet, Registered};
pub use sink::{FrameObserver, FrameSink, Rect, TextureState};
