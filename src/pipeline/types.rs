//! Core types for the playback pipeline

use bytes::Bytes;
use std::time::{Duration, Instant};

/// Timestamp representation for media packets and frames
///
/// All stream positions inside the engine are normalized to microseconds
/// since the start of the media, regardless of the container time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Microseconds since the start of the stream
    pub micros: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { micros: 0 };

    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a new timestamp from milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self {
            micros: millis.saturating_mul(1_000),
        }
    }

    /// Create a timestamp from a duration since stream start
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    /// Create a timestamp from an instant relative to a base instant
    pub fn from_instant(instant: Instant, base: Instant) -> Self {
        Self::from_duration(instant.saturating_duration_since(base))
    }

    /// Whole milliseconds of this timestamp
    pub fn as_millis(&self) -> i64 {
        self.micros / 1_000
    }

    /// Convert to a duration, clamping negative values to zero
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }

    /// Add a duration to this timestamp
    pub fn add(&self, duration: Duration) -> Self {
        Self {
            micros: self.micros + duration.as_micros() as i64,
        }
    }

    /// Subtract a duration from this timestamp
    pub fn sub(&self, duration: Duration) -> Self {
        Self {
            micros: self.micros - duration.as_micros() as i64,
        }
    }

    /// Absolute difference between two timestamps
    pub fn diff(&self, other: Timestamp) -> Duration {
        Duration::from_micros((self.micros - other.micros).unsigned_abs())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Compressed video stream
    Video,
    /// Compressed audio stream
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "Video"),
            StreamKind::Audio => write!(f, "Audio"),
        }
    }
}

/// A compressed, timestamped unit of one elementary stream
///
/// Produced by the demuxer, owned by exactly one channel slot until a decode
/// worker pops it. Dropping the packet releases its payload.
#[derive(Clone)]
pub struct Packet {
    /// Container stream index this packet belongs to
    pub stream_index: usize,
    /// Presentation timestamp
    pub pts: Timestamp,
    /// Nominal duration of the content in this packet
    pub duration: Duration,
    /// Compressed payload
    pub data: Bytes,
    /// Whether this packet starts at a decodable sync point
    pub is_keyframe: bool,
}

impl Packet {
    /// Size of the compressed payload in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index)
            .field("pts", &self.pts)
            .field("duration", &self.duration)
            .field("size", &self.size())
            .field("is_keyframe", &self.is_keyframe)
            .finish()
    }
}

/// A decoded video frame in planar YUV 4:2:0 layout
///
/// The luma plane is `width` x `height`; the two chroma planes are half
/// resolution in both dimensions. Strides may exceed the visible width when
/// the decoder pads rows.
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Plane buffers: luma, blue-difference chroma, red-difference chroma
    pub planes: [Vec<u8>; 3],
    /// Row stride of each plane, in bytes
    pub strides: [usize; 3],
    /// Presentation timestamp
    pub pts: Timestamp,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("strides", &self.strides)
            .field("pts", &self.pts)
            .finish()
    }
}

/// Sample format of decoded PCM audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit interleaved
    S16,
    /// 32-bit float interleaved
    F32,
}

impl SampleFormat {
    /// Bytes per sample for a single channel
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// A decoded audio frame of interleaved PCM
#[derive(Clone)]
pub struct AudioFrame {
    /// Interleaved PCM bytes
    pub data: Bytes,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    /// Presentation timestamp
    pub pts: Timestamp,
}

impl AudioFrame {
    /// Number of samples per channel in this frame
    pub fn samples(&self) -> usize {
        let frame_size = self.format.bytes_per_sample() * self.channels.max(1) as usize;
        self.data.len() / frame_size
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples", &self.samples())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("format", &self.format)
            .field("pts", &self.pts)
            .finish()
    }
}

/// A decoded, presentable unit of either stream
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl DecodedFrame {
    /// Presentation timestamp of the frame
    pub fn pts(&self) -> Timestamp {
        match self {
            DecodedFrame::Video(frame) => frame.pts,
            DecodedFrame::Audio(frame) => frame.pts,
        }
    }

    /// Kind of stream this frame belongs to
    pub fn kind(&self) -> StreamKind {
        match self {
            DecodedFrame::Video(_) => StreamKind::Video,
            DecodedFrame::Audio(_) => StreamKind::Audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_millis(1_500);
        assert_eq!(ts.micros, 1_500_000);
        assert_eq!(ts.as_millis(), 1_500);

        let later = ts.add(Duration::from_millis(40));
        assert_eq!(later.as_millis(), 1_540);
        assert_eq!(later.sub(Duration::from_millis(40)), ts);

        assert_eq!(ts.diff(later), Duration::from_millis(40));
        assert_eq!(later.diff(ts), Duration::from_millis(40));
    }

    #[test]
    fn test_negative_timestamp_clamps_to_zero_duration() {
        let ts = Timestamp::from_micros(-250);
        assert_eq!(ts.as_duration(), Duration::ZERO);
    }

    #[test]
    fn test_audio_frame_sample_count() {
        let frame = AudioFrame {
            data: Bytes::from(vec![0u8; 1_024 * 4]),
            sample_rate: 44_100,
            channels: 2,
            format: SampleFormat::S16,
            pts: Timestamp::ZERO,
        };
        assert_eq!(frame.samples(), 1_024);
    }
}
