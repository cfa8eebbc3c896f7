//! Audio output for the burnx runtime
//!
//! The run loop hands every step's samples to an [`AudioSink`]. Sinks never
//! block: when the queue towards the output device is full the newest
//! samples are dropped and counted.

pub mod backend;
pub mod sink;

pub use backend::NullAudioSink;
#[cfg(feature = "cpal")]
pub use backend::CpalAudioOutput;
pub use sink::{AudioConsumer, AudioSink, AudioStats, RingAudioSink};
