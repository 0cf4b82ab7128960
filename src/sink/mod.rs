//! Output sinks for decoded frames
//!
//! Sinks consume a frame synchronously before the worker proceeds, so at
//! most one frame per stream is ever in flight past the pipeline boundary.
//! The render surface and the audio device of the embedding application
//! implement these traits; the engine ships a cpal-backed audio sink behind
//! the `playback` feature and no-op sinks for headless use.

#[cfg(feature = "playback")]
pub mod cpal;

use crate::pipeline::types::{AudioFrame, VideoFrame};

/// Consumes decoded video frames at presentation time.
pub trait VideoSink: Send {
    /// Paint one frame. The sink must copy what it needs before returning.
    fn present(&mut self, frame: &VideoFrame);
}

/// Consumes decoded PCM at presentation time.
///
/// The sink is expected to keep a small internal buffer of its own and to
/// tolerate being fed at roughly real-time cadence.
pub trait AudioSink: Send {
    /// Queue one frame of interleaved PCM for playback.
    fn play(&mut self, frame: &AudioFrame);
}

/// Discards video frames. Useful for audio-only playback and tests.
#[derive(Debug, Default)]
pub struct NullVideoSink;

impl VideoSink for NullVideoSink {
    fn present(&mut self, _frame: &VideoFrame) {}
}

/// Discards audio frames. Useful for muted playback and tests.
#[derive(Debug, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&mut self, _frame: &AudioFrame) {}
}
