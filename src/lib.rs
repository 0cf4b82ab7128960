//! Playhead: a desktop media playback engine
//!
//! Opens a local or network media container, decodes its audio and video
//! streams on background tasks, and paces decoded frames against a shared,
//! pause- and seek-aware virtual clock so that both streams stay in sync
//! with wall-clock time.
//!
//! The crate is the engine only. The window, the render surface, and the
//! audio device belong to the embedding application and plug in through the
//! [`sink`] traits; demuxing and codec work plug in through the [`decoder`]
//! traits (a production FFmpeg backend ships behind the `ffmpeg` feature, a
//! cpal audio sink behind `playback`).
//!
//! # Overview
//!
//! ```text
//! container ──> ReaderStage ──> PacketChannel ──> DecodeStage ──> VideoSink
//!                         \                  \
//!                          ──> PacketChannel ──> DecodeStage ──> AudioSink
//!
//! UI ──> PlayerSession ──> PlaybackClock flags / CancellationToken
//! ```
//!
//! Data flows one way through bounded channels; control flows the other way
//! through the session's clock and stop flags. See [`session::PlayerSession`]
//! for the entry point.

pub mod config;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod sink;

pub use config::PlayerConfig;
pub use error::{DecodeError, PlayerError};
pub use pipeline::{PlayerState, StatsSummary, Timestamp};
pub use session::{PlayerEvent, PlayerSession};
