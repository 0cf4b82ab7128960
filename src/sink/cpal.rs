//! cpal-backed audio sink
//!
//! Feeds decoded PCM into a bounded ring buffer drained by the device
//! callback. The buffer drops the oldest samples on overflow and plays
//! silence on underrun, so a stalled pipeline can never wedge the device.

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::warn;
use std::sync::{Arc, Mutex};

use super::AudioSink;
use crate::pipeline::types::{AudioFrame, SampleFormat};

/// Maximum samples in the ring buffer (at 44.1kHz stereo this is ~190ms of
/// audio). Bounds both memory and the latency added by this sink.
const MAX_BUFFER_SAMPLES: usize = 16384;
const I16_TO_F32: f32 = 1.0 / 32768.0;

/// A ring buffer for audio samples with overflow protection
struct AudioRingBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
    capacity: usize,
    samples_dropped: u64,
}

impl AudioRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0f32; capacity],
            write_pos: 0,
            read_pos: 0,
            len: 0,
            capacity,
            samples_dropped: 0,
        }
    }

    /// Push samples to the buffer, dropping oldest if full
    fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.len >= self.capacity {
                self.read_pos = (self.read_pos + 1) % self.capacity;
                self.samples_dropped += 1;
            } else {
                self.len += 1;
            }
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Read samples from the buffer, zero-filling on underrun
    fn read(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            if self.len > 0 {
                *sample = self.buffer[self.read_pos];
                self.read_pos = (self.read_pos + 1) % self.capacity;
                self.len -= 1;
            } else {
                *sample = 0.0;
            }
        }
    }
}

/// Plays interleaved PCM on the default output device.
pub struct CpalAudioSink {
    sample_buffer: Arc<Mutex<AudioRingBuffer>>,
    _stream: cpal::Stream, // kept alive
    warned_rate: Option<u32>,
}

unsafe impl Send for CpalAudioSink {}

impl CpalAudioSink {
    /// Open the default output device at 44.1 kHz stereo.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No output audio device"))?;
        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: 44_100,
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_buffer = Arc::new(Mutex::new(AudioRingBuffer::new(MAX_BUFFER_SAMPLES)));
        let buffer_clone = Arc::clone(&sample_buffer);

        let stream = device.build_output_stream(
            &config,
            move |output: &mut [f32], _| {
                if let Ok(mut buf) = buffer_clone.lock() {
                    buf.read(output);
                } else {
                    output.fill(0.0);
                }
            },
            |err| log::error!("Audio output error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            sample_buffer,
            _stream: stream,
            warned_rate: None,
        })
    }
}

impl AudioSink for CpalAudioSink {
    fn play(&mut self, frame: &AudioFrame) {
        if frame.sample_rate != 44_100 && self.warned_rate != Some(frame.sample_rate) {
            warn!(
                "CpalAudioSink: stream rate {}Hz fed to a 44100Hz device",
                frame.sample_rate
            );
            self.warned_rate = Some(frame.sample_rate);
        }

        let samples: Vec<f32> = match frame.format {
            SampleFormat::S16 => frame
                .data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 * I16_TO_F32)
                .collect(),
            SampleFormat::F32 => frame
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        };

        if let Ok(mut buf) = self.sample_buffer.lock() {
            buf.push(&samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_round_trip() {
        let mut buffer = AudioRingBuffer::new(8);
        buffer.push(&[1.0, 2.0, 3.0]);

        let mut out = [0.0f32; 3];
        buffer.read(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ring_buffer_drops_oldest_on_overflow() {
        let mut buffer = AudioRingBuffer::new(4);
        buffer.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buffer.samples_dropped, 2);

        let mut out = [0.0f32; 4];
        buffer.read(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_ring_buffer_zero_fills_on_underrun() {
        let mut buffer = AudioRingBuffer::new(4);
        buffer.push(&[1.0]);

        let mut out = [9.0f32; 3];
        buffer.read(&mut out);
        assert_eq!(out, [1.0, 0.0, 0.0]);
    }
}
