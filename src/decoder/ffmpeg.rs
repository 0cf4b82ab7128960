//! FFmpeg-backed media backend
//!
//! Production implementation of the capability traits over `ffmpeg-next`:
//! container demuxing with best-stream selection, software decode to planar
//! YUV and interleaved PCM, and container-level seeking. Timestamps are
//! normalized to microseconds at this boundary so the pipeline never sees a
//! stream time base.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use log::{debug, warn};
use std::time::Duration;

use super::{Demuxer, MediaBackend, MediaInfo, OpenedMedia, ReadEvent, SeekDirection, StreamDecoder};
use crate::error::DecodeError;
use crate::pipeline::types::{
    AudioFrame, DecodedFrame, Packet, SampleFormat, Timestamp, VideoFrame,
};

/// Output rate of the audio resampler. Matches common device defaults.
const AUDIO_OUT_RATE: u32 = 44_100;
/// Give up on a stalled container after this many consecutive read errors.
const MAX_READ_FAILURES: u32 = 100;

fn fatal(e: ffmpeg::Error) -> DecodeError {
    DecodeError::Fatal(e.to_string())
}

/// Microseconds for `ticks` counted in `time_base` units.
fn ticks_to_micros(ticks: i64, time_base: ffmpeg::Rational) -> i64 {
    (ticks as f64 * f64::from(time_base) * 1_000_000.0) as i64
}

/// Opens local files and network URLs through libavformat.
#[derive(Debug, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn open(&self, source: &str) -> Result<OpenedMedia, DecodeError> {
        ffmpeg::init().map_err(fatal)?;

        let input = ffmpeg::format::input(&source).map_err(fatal)?;

        let audio_stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or_else(|| DecodeError::Fatal(format!("no audio stream in {source}")))?;
        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| DecodeError::Fatal(format!("no video stream in {source}")))?;

        let audio_index = audio_stream.index();
        let video_index = video_stream.index();
        let audio_time_base = audio_stream.time_base();
        let video_time_base = video_stream.time_base();

        let video_decoder = ffmpeg::codec::context::Context::from_parameters(
            video_stream.parameters(),
        )
        .map_err(fatal)?
        .decoder()
        .video()
        .map_err(fatal)?;
        let audio_decoder = ffmpeg::codec::context::Context::from_parameters(
            audio_stream.parameters(),
        )
        .map_err(fatal)?
        .decoder()
        .audio()
        .map_err(fatal)?;

        // Container duration is reported in AV_TIME_BASE (microsecond) units.
        let duration = Duration::from_micros(input.duration().max(0) as u64);

        debug!(
            "FfmpegBackend: opened {source} (audio stream {audio_index}, \
             video stream {video_index}, {duration:?})"
        );

        Ok(OpenedMedia {
            demuxer: Box::new(FfmpegDemuxer {
                input,
                audio_index,
                video_index,
                audio_time_base,
                video_time_base,
                consecutive_failures: 0,
            }),
            video_decoder: Box::new(FfmpegVideoDecoder {
                decoder: video_decoder,
            }),
            audio_decoder: Box::new(FfmpegAudioDecoder {
                decoder: audio_decoder,
                resampler: None,
            }),
            info: MediaInfo {
                audio_stream: audio_index,
                video_stream: video_index,
                duration,
            },
        })
    }
}

struct FfmpegDemuxer {
    input: ffmpeg::format::context::Input,
    audio_index: usize,
    video_index: usize,
    audio_time_base: ffmpeg::Rational,
    video_time_base: ffmpeg::Rational,
    consecutive_failures: u32,
}

impl FfmpegDemuxer {
    fn time_base_for(&self, stream_index: usize) -> ffmpeg::Rational {
        if stream_index == self.video_index {
            self.video_time_base
        } else {
            self.audio_time_base
        }
    }
}

impl Demuxer for FfmpegDemuxer {
    fn read_packet(&mut self) -> Result<ReadEvent, DecodeError> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                self.consecutive_failures = 0;
                let stream_index = packet.stream();
                let time_base = self.time_base_for(stream_index);
                let pts_ticks = packet.pts().or(packet.dts()).unwrap_or(0);
                Ok(ReadEvent::Packet(Packet {
                    stream_index,
                    pts: Timestamp::from_micros(ticks_to_micros(pts_ticks, time_base)),
                    duration: Duration::from_micros(
                        ticks_to_micros(packet.duration(), time_base).max(0) as u64,
                    ),
                    data: packet
                        .data()
                        .map(Bytes::copy_from_slice)
                        .unwrap_or_default(),
                    is_keyframe: packet.is_key(),
                }))
            }
            Err(ffmpeg::Error::Eof) => Ok(ReadEvent::Eof),
            Err(e) => {
                // libavformat reports transient stalls and corrupt regions
                // the same way; retry a while before declaring the container
                // unreadable.
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_READ_FAILURES {
                    Err(DecodeError::Fatal(format!("read stalled: {e}")))
                } else {
                    Err(DecodeError::Again)
                }
            }
        }
    }

    fn seek(&mut self, target: Timestamp, direction: SeekDirection) -> Result<(), DecodeError> {
        // The seek position is expressed in AV_TIME_BASE (microsecond) units.
        let ts = target.micros;
        let result = match direction {
            SeekDirection::Backward => self.input.seek(ts, ..ts),
            SeekDirection::Precise => self.input.seek(ts, ts..),
        };
        self.consecutive_failures = 0;
        result.map_err(|e| DecodeError::Corrupt(format!("container seek failed: {e}")))
    }
}

/// Lift the decoder's packet into our normalized microsecond time base.
fn compressed_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut compressed = ffmpeg::Packet::copy(&packet.data);
    compressed.set_pts(Some(packet.pts.micros));
    compressed.set_dts(Some(packet.pts.micros));
    compressed
}

struct FfmpegVideoDecoder {
    decoder: ffmpeg::decoder::Video,
}

impl StreamDecoder for FfmpegVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
        match self.decoder.send_packet(&compressed_packet(packet)) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Err(DecodeError::Eof),
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        }

        let mut frames = Vec::new();
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if decoded.planes() < 3 {
                warn!(
                    "FfmpegVideoDecoder: skipping non-planar frame ({:?})",
                    decoded.format()
                );
                continue;
            }
            frames.push(DecodedFrame::Video(VideoFrame {
                width: decoded.width(),
                height: decoded.height(),
                planes: [
                    decoded.data(0).to_vec(),
                    decoded.data(1).to_vec(),
                    decoded.data(2).to_vec(),
                ],
                strides: [decoded.stride(0), decoded.stride(1), decoded.stride(2)],
                pts: Timestamp::from_micros(decoded.pts().unwrap_or(0)),
            }));
        }
        Ok(frames)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

struct FfmpegAudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    resampler: Option<ffmpeg::software::resampling::Context>,
}

impl FfmpegAudioDecoder {
    /// Resample one decoded frame to interleaved stereo S16 at 44.1 kHz.
    fn resample(&mut self, decoded: &ffmpeg::frame::Audio) -> Result<AudioFrame, DecodeError> {
        if self.resampler.is_none() {
            self.resampler = Some(
                ffmpeg::software::resampling::Context::get(
                    decoded.format(),
                    decoded.channel_layout(),
                    decoded.rate(),
                    ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
                    ffmpeg::ChannelLayout::STEREO,
                    AUDIO_OUT_RATE,
                )
                .map_err(|e| DecodeError::Fatal(format!("resampler init failed: {e}")))?,
            );
        }
        let resampler = self.resampler.as_mut().unwrap();

        let mut resampled = ffmpeg::frame::Audio::empty();
        resampler
            .run(decoded, &mut resampled)
            .map_err(|e| DecodeError::Corrupt(format!("resample failed: {e}")))?;

        let byte_len = resampled.samples() * 2 * SampleFormat::S16.bytes_per_sample();
        Ok(AudioFrame {
            data: Bytes::copy_from_slice(&resampled.data(0)[..byte_len]),
            sample_rate: AUDIO_OUT_RATE,
            channels: 2,
            format: SampleFormat::S16,
            pts: Timestamp::from_micros(decoded.pts().unwrap_or(0)),
        })
    }
}

impl StreamDecoder for FfmpegAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
        match self.decoder.send_packet(&compressed_packet(packet)) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Err(DecodeError::Eof),
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        }

        let mut frames = Vec::new();
        let mut decoded = ffmpeg::frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            match self.resample(&decoded) {
                Ok(frame) => frames.push(DecodedFrame::Audio(frame)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("FfmpegAudioDecoder: {e}");
                    continue;
                }
            }
        }
        Ok(frames)
    }

    fn flush(&mut self) {
        self.decoder.flush();
        // The resampler holds converter state tied to the dropped frames.
        self.resampler = None;
    }
}
