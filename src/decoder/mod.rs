//! Demux and decode capability boundary
//!
//! The engine never touches a codec library directly. A [`MediaBackend`]
//! opens a source and yields a demuxer plus one decoder per tracked stream;
//! the reader owns the demuxer, each decode worker owns its decoder, and the
//! control thread touches neither while the pipeline runs.
//!
//! The calls wrap blocking I/O and are invoked inline from the pipeline
//! tasks. Decoders must emit frames in presentation order; a backend wrapping
//! a codec without that guarantee has to reorder internally.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use crate::error::DecodeError;
use crate::pipeline::types::{DecodedFrame, Packet, Timestamp};
use std::time::Duration;

/// Hint for how the container should position itself on seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Land on the nearest sync point at or before the target
    Backward,
    /// Land as close to the target as the container allows
    Precise,
}

/// One demux step.
#[derive(Debug)]
pub enum ReadEvent {
    /// The next packet in timestamp order
    Packet(Packet),
    /// The container is exhausted
    Eof,
}

/// Pull-based access to a container's packet stream. Owned by the reader.
pub trait Demuxer: Send {
    /// Read the next packet from the container.
    ///
    /// `Err(DecodeError::Again)` means a transient stall; the reader retries.
    fn read_packet(&mut self) -> Result<ReadEvent, DecodeError>;

    /// Reposition the container near `target`.
    fn seek(&mut self, target: Timestamp, direction: SeekDirection) -> Result<(), DecodeError>;
}

/// Turns compressed packets of one stream into decoded frames. Owned by the
/// decode worker for that stream.
pub trait StreamDecoder: Send {
    /// Decode one packet into zero or more frames, in presentation order.
    ///
    /// An empty vec means the decoder is still buffering; that is not an
    /// error.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError>;

    /// Discard all buffered decoder state. Called when a seek invalidates
    /// in-flight packets.
    fn flush(&mut self);
}

/// Static facts about an opened source.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Container stream index of the tracked audio stream
    pub audio_stream: usize,
    /// Container stream index of the tracked video stream
    pub video_stream: usize,
    /// Total length of the media
    pub duration: Duration,
}

/// Everything needed to play one source: the demuxer, one decoder per
/// tracked stream, and the stream facts.
pub struct OpenedMedia {
    pub demuxer: Box<dyn Demuxer>,
    pub video_decoder: Box<dyn StreamDecoder>,
    pub audio_decoder: Box<dyn StreamDecoder>,
    pub info: MediaInfo,
}

/// Factory for opening local or network media sources.
pub trait MediaBackend: Send {
    /// Open `source` and locate exactly one audio and one video stream.
    fn open(&self, source: &str) -> Result<OpenedMedia, DecodeError>;
}
