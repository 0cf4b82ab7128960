//! Reader stage
//!
//! Single task that pulls packets from the container in timestamp order,
//! classifies them by stream index, and feeds the two packet channels under
//! backpressure. Seek requests are applied here: drain both channels, ask the
//! demuxer to reposition, then re-anchor the clock.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use super::channel::PacketChannel;
use super::context::SessionContext;
use super::stage::PipelineStage;
use super::types::{Packet, Timestamp};
use crate::decoder::{Demuxer, MediaInfo, ReadEvent, SeekDirection};
use crate::session::PlayerEvent;

pub struct ReaderStage {
    demuxer: Box<dyn Demuxer>,
    info: MediaInfo,
    video_channel: Arc<PacketChannel>,
    audio_channel: Arc<PacketChannel>,
    ctx: Arc<SessionContext>,
    poll: std::time::Duration,
    packets_pushed: u64,
    seeks_applied: u64,
}

impl ReaderStage {
    pub fn new(
        demuxer: Box<dyn Demuxer>,
        info: MediaInfo,
        video_channel: Arc<PacketChannel>,
        audio_channel: Arc<PacketChannel>,
        ctx: Arc<SessionContext>,
        poll: std::time::Duration,
    ) -> Self {
        Self {
            demuxer,
            info,
            video_channel,
            audio_channel,
            ctx,
            poll,
            packets_pushed: 0,
            seeks_applied: 0,
        }
    }

    /// Drain both channels, reposition the container, re-anchor the clock.
    fn apply_seek(&mut self, target: Timestamp) {
        let drained = self.audio_channel.drain_all() + self.video_channel.drain_all();
        self.ctx.stats.record_packets_drained(drained as u64);

        // The pending target has already been taken, so the clock reports
        // the pre-seek position here; it decides the direction hint.
        let current = self.ctx.clock.position(Instant::now());
        let direction = if target <= current {
            SeekDirection::Backward
        } else {
            SeekDirection::Precise
        };

        match self.demuxer.seek(target, direction) {
            Ok(()) => {
                self.seeks_applied += 1;
                self.ctx.clock.complete_seek(Instant::now(), target);
                info!(
                    "ReaderStage: seek to {} ({:?}, {} packets drained)",
                    target, direction, drained
                );
            }
            Err(e) if e.is_fatal() => {
                self.ctx.publish_fatal(format!("seek failed: {e}"));
            }
            Err(e) => {
                // Stay where we were; the clock must still leave the seeking
                // state or the workers idle forever.
                warn!("ReaderStage: seek to {target} failed: {e}");
                self.ctx.clock.complete_seek(Instant::now(), current);
            }
        }
    }

    /// Push one packet to its channel, retrying under backpressure.
    ///
    /// A newly-arrived seek or a close preempts a blocked push: the packet
    /// is dropped without entering the channel, keeping seeks responsive
    /// even when both channels are full.
    async fn dispatch(&mut self, packet: Packet) {
        let channel = if packet.stream_index == self.info.video_stream {
            &self.video_channel
        } else if packet.stream_index == self.info.audio_stream {
            &self.audio_channel
        } else {
            self.ctx.stats.record_packet_discarded();
            return;
        };

        let mut packet = packet;
        loop {
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            if self.ctx.clock.is_seeking() {
                debug!(
                    "ReaderStage: dropping packet at {} for pending seek",
                    packet.pts
                );
                self.ctx.stats.record_packet_discarded();
                return;
            }
            match channel.try_push(packet) {
                Ok(()) => {
                    self.ctx.stats.record_packet_read();
                    self.packets_pushed += 1;
                    return;
                }
                Err(returned) => {
                    packet = returned;
                    channel.wait_not_full(self.poll).await;
                }
            }
        }
    }
}

#[async_trait]
impl PipelineStage for ReaderStage {
    async fn run(&mut self) -> Result<()> {
        info!(
            "ReaderStage: started (audio stream {}, video stream {})",
            self.info.audio_stream, self.info.video_stream
        );

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            if let Some(target) = self.ctx.clock.take_seek_target() {
                self.apply_seek(target);
                continue;
            }

            match self.demuxer.read_packet() {
                Ok(ReadEvent::Packet(packet)) => self.dispatch(packet).await,
                Ok(ReadEvent::Eof) => {
                    info!("ReaderStage: end of stream");
                    self.ctx.mark_reader_done();
                    self.ctx.emit(PlayerEvent::EndOfStream);
                    break;
                }
                Err(e) if e.is_transient() => {
                    tokio::time::sleep(self.poll).await;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("ReaderStage: skipping unreadable packet: {e}");
                    self.ctx.stats.record_decode_failure();
                }
                Err(e) => {
                    self.ctx.publish_fatal(format!("read failed: {e}"));
                    break;
                }
            }
        }

        info!(
            "ReaderStage: finished ({} packets pushed, {} seeks)",
            self.packets_pushed, self.seeks_applied
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReaderStage"
    }
}
