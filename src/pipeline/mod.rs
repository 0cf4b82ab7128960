//! Playback pipeline
//!
//! The engine behind the session control surface, organized the same way
//! data flows through it:
//! - The reader task demuxes the container and feeds two bounded packet
//!   channels, absorbing backpressure instead of dropping data.
//! - One decode worker per stream pops packets, decodes them, and paces each
//!   frame against the shared playback clock before handing it to its sink.
//! - The session context carries the clock, counters, and the cancellation
//!   token that every suspension point observes.
//!
//! Control flows the other way: the session flips clock and state flags, and
//! the tasks pick them up within one polling interval.

pub mod channel;
pub mod clock;
pub mod context;
pub mod decode;
pub mod reader;
pub mod stage;
pub mod state;
pub mod stats;
pub mod types;

pub use channel::PacketChannel;
pub use clock::PlaybackClock;
pub use context::SessionContext;
pub use stage::PipelineStage;
pub use state::PlayerState;
pub use stats::{PipelineStats, StatsSummary};
pub use types::{
    AudioFrame, DecodedFrame, Packet, SampleFormat, StreamKind, Timestamp, VideoFrame,
};
