//! Decode worker stage
//!
//! One instance per elementary stream. Pops compressed packets, asks the
//! stream decoder for frames, and paces each frame against the shared clock
//! before handing it to the sink. Pacing is timestamp-driven rather than
//! tick-driven: container timestamps are not evenly spaced, so every frame
//! gets its own deadline.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::channel::PacketChannel;
use super::context::SessionContext;
use super::stage::PipelineStage;
use super::types::{DecodedFrame, Packet, StreamKind};
use crate::decoder::StreamDecoder;
use crate::sink::{AudioSink, VideoSink};

/// The sink side of one worker.
pub enum StageSink {
    Video(Box<dyn VideoSink>),
    Audio(Box<dyn AudioSink>),
}

/// Result of pacing one frame.
enum Delivery {
    /// Presented to the sink at its deadline
    Presented,
    /// Dropped without presentation (stale after a seek)
    Dropped,
    /// A seek arrived mid-wait; the packet's remaining frames are stale
    SeekAborted,
    /// The session is shutting down
    Shutdown,
}

/// Result of one packet.
enum PacketOutcome {
    Continue,
    Stop,
}

pub struct DecodeStage {
    kind: StreamKind,
    decoder: Box<dyn StreamDecoder>,
    channel: Arc<PacketChannel>,
    sink: StageSink,
    ctx: Arc<SessionContext>,
    poll: Duration,
    pause_poll: Duration,
    frames_presented: u64,
    frames_dropped: u64,
}

impl DecodeStage {
    pub fn new(
        kind: StreamKind,
        decoder: Box<dyn StreamDecoder>,
        channel: Arc<PacketChannel>,
        sink: StageSink,
        ctx: Arc<SessionContext>,
        poll: Duration,
        pause_poll: Duration,
    ) -> Self {
        Self {
            kind,
            decoder,
            channel,
            sink,
            ctx,
            poll,
            pause_poll,
            frames_presented: 0,
            frames_dropped: 0,
        }
    }

    async fn process_packet(&mut self, packet: &Packet) -> PacketOutcome {
        let frames = match self.decoder.decode(packet) {
            Ok(frames) => frames,
            Err(e) if e.is_transient() => return PacketOutcome::Continue,
            Err(e) if e.is_recoverable() => {
                warn!("DecodeStage[{}]: dropping packet: {e}", self.kind);
                self.ctx.stats.record_decode_failure();
                return PacketOutcome::Continue;
            }
            Err(crate::error::DecodeError::Eof) => return PacketOutcome::Stop,
            Err(e) => {
                self.ctx
                    .publish_fatal(format!("{} decode failed: {e}", self.kind));
                return PacketOutcome::Stop;
            }
        };

        for frame in frames {
            match self.pace_and_deliver(frame, packet.duration).await {
                Delivery::Presented | Delivery::Dropped => {}
                Delivery::SeekAborted => break,
                Delivery::Shutdown => return PacketOutcome::Stop,
            }
        }
        PacketOutcome::Continue
    }

    /// Wait for the frame's presentation deadline, then hand it to the sink.
    ///
    /// The wait re-checks the session flags on every iteration: a pause
    /// parks on the pause gate, a seek abandons the frame, and the deadline
    /// is recomputed whenever the clock epoch changes (a resume or a seek
    /// shifts every pending deadline).
    async fn pace_and_deliver(&mut self, frame: DecodedFrame, frame_duration: Duration) -> Delivery {
        let pts = frame.pts();

        // Frames that end before the seek floor are pre-seek leftovers.
        let floor = self.ctx.clock.seek_floor_micros();
        if pts.micros < floor.saturating_sub(frame_duration.as_micros() as i64) {
            self.drop_frame();
            return Delivery::Dropped;
        }

        let mut epoch = self.ctx.clock.epoch();
        let mut deadline = self.ctx.clock.deadline_for(pts);

        loop {
            if self.ctx.cancel.is_cancelled() {
                return Delivery::Shutdown;
            }
            if self.ctx.clock.is_seeking() {
                self.drop_frame();
                return Delivery::SeekAborted;
            }

            if self.ctx.clock.is_paused() {
                self.ctx.clock.pause_gate_wait(self.pause_poll).await;
            } else {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let remaining = deadline.duration_since(now);
                tokio::time::sleep(remaining.min(self.poll)).await;
            }

            let current = self.ctx.clock.epoch();
            if current != epoch {
                epoch = current;
                deadline = self.ctx.clock.deadline_for(pts);
            }
        }

        match (&mut self.sink, frame) {
            (StageSink::Video(sink), DecodedFrame::Video(frame)) => sink.present(&frame),
            (StageSink::Audio(sink), DecodedFrame::Audio(frame)) => sink.play(&frame),
            (_, frame) => {
                warn!(
                    "DecodeStage[{}]: decoder produced a {} frame, dropping",
                    self.kind,
                    frame.kind()
                );
                self.drop_frame();
                return Delivery::Dropped;
            }
        }
        self.frames_presented += 1;
        self.ctx.stats.record_frame_presented();
        Delivery::Presented
    }

    fn drop_frame(&mut self) {
        self.frames_dropped += 1;
        self.ctx.stats.record_frame_dropped();
    }
}

#[async_trait]
impl PipelineStage for DecodeStage {
    async fn run(&mut self) -> Result<()> {
        info!("DecodeStage[{}]: started", self.kind);
        let mut flushed_for_seek = false;

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            // While a seek is applied elsewhere, discard buffered decoder
            // state once and idle until the pipeline is repositioned.
            if self.ctx.clock.is_seeking() {
                if !flushed_for_seek {
                    debug!("DecodeStage[{}]: flushing for seek", self.kind);
                    self.decoder.flush();
                    flushed_for_seek = true;
                }
                tokio::time::sleep(self.poll).await;
                continue;
            }
            flushed_for_seek = false;

            let Some(packet) = self.channel.try_pop() else {
                if self.ctx.is_reader_done() && self.channel.is_empty() {
                    break;
                }
                self.channel.wait_not_empty(self.poll).await;
                continue;
            };

            let outcome = self.process_packet(&packet).await;
            self.ctx.stats.record_packet_released();
            drop(packet);

            if matches!(outcome, PacketOutcome::Stop) {
                break;
            }
        }

        info!(
            "DecodeStage[{}]: finished ({} presented, {} dropped)",
            self.kind, self.frames_presented, self.frames_dropped
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.kind {
            StreamKind::Video => "VideoDecodeStage",
            StreamKind::Audio => "AudioDecodeStage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::pipeline::types::{Timestamp, VideoFrame};
    use crate::session::PlayerEvent;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct OneToOneDecoder;

    impl StreamDecoder for OneToOneDecoder {
        fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
            Ok(vec![DecodedFrame::Video(VideoFrame {
                width: 16,
                height: 16,
                planes: [vec![0; 256], vec![0; 64], vec![0; 64]],
                strides: [16, 8, 8],
                pts: packet.pts,
            })])
        }

        fn flush(&mut self) {}
    }

    #[derive(Clone, Default)]
    struct CollectingVideoSink {
        frames: Arc<Mutex<Vec<(Timestamp, Instant)>>>,
    }

    impl VideoSink for CollectingVideoSink {
        fn present(&mut self, frame: &VideoFrame) {
            self.frames
                .lock()
                .unwrap()
                .push((frame.pts, Instant::now()));
        }
    }

    fn make_packet(pts_ms: i64) -> Packet {
        Packet {
            stream_index: 0,
            pts: Timestamp::from_millis(pts_ms),
            duration: Duration::from_millis(20),
            data: Bytes::from_static(&[0u8; 8]),
            is_keyframe: true,
        }
    }

    fn make_ctx() -> (Arc<SessionContext>, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SessionContext::new(tx)), rx)
    }

    fn make_stage(
        channel: Arc<PacketChannel>,
        ctx: Arc<SessionContext>,
        sink: CollectingVideoSink,
    ) -> DecodeStage {
        DecodeStage::new(
            StreamKind::Video,
            Box::new(OneToOneDecoder),
            channel,
            StageSink::Video(Box::new(sink)),
            ctx,
            Duration::from_millis(2),
            Duration::from_millis(10),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_are_paced_by_timestamp() {
        let (ctx, _rx) = make_ctx();
        let channel = Arc::new(PacketChannel::new(8));
        for pts in [0, 30, 60] {
            channel.try_push(make_packet(pts)).unwrap();
        }
        ctx.mark_reader_done();

        let sink = CollectingVideoSink::default();
        let frames = Arc::clone(&sink.frames);
        let mut stage = make_stage(Arc::clone(&channel), Arc::clone(&ctx), sink);

        ctx.clock.start(Instant::now());
        let started = Instant::now();
        stage.run().await.unwrap();
        let elapsed = started.elapsed();

        let presented = frames.lock().unwrap();
        assert_eq!(presented.len(), 3);
        // The last frame is due 60ms after the clock started.
        assert!(elapsed >= Duration::from_millis(55), "ran in {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "ran in {elapsed:?}");
        // Presentation order follows timestamp order.
        let pts: Vec<i64> = presented.iter().map(|(ts, _)| ts.as_millis()).collect();
        assert_eq!(pts, vec![0, 30, 60]);

        assert_eq!(ctx.stats.packets_in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_before_seek_floor_are_dropped() {
        let (ctx, _rx) = make_ctx();
        let channel = Arc::new(PacketChannel::new(8));
        // Leftover pre-seek packet and the first post-seek packet.
        channel.try_push(make_packet(100)).unwrap();
        channel.try_push(make_packet(5_000)).unwrap();
        ctx.mark_reader_done();

        let sink = CollectingVideoSink::default();
        let frames = Arc::clone(&sink.frames);
        let mut stage = make_stage(Arc::clone(&channel), Arc::clone(&ctx), sink);

        ctx.clock.start(Instant::now());
        ctx.clock.begin_seek(Timestamp::from_millis(5_000));
        let target = ctx.clock.take_seek_target().unwrap();
        ctx.clock.complete_seek(Instant::now(), target);

        stage.run().await.unwrap();

        let presented = frames.lock().unwrap();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].0.as_millis(), 5_000);
        assert_eq!(ctx.stats.summary().frames_dropped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_stops_quickly_on_cancel() {
        let (ctx, _rx) = make_ctx();
        let channel = Arc::new(PacketChannel::new(8));
        // A frame due far in the future keeps the worker in its pacing wait.
        channel.try_push(make_packet(60_000)).unwrap();

        let sink = CollectingVideoSink::default();
        let mut stage = make_stage(Arc::clone(&channel), Arc::clone(&ctx), sink);

        ctx.clock.start(Instant::now());
        let handle = tokio::spawn(async move { stage.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel.cancel();

        let join = tokio::time::timeout(Duration::from_millis(200), handle).await;
        assert!(join.is_ok(), "worker did not stop within 200ms");
        assert_eq!(ctx.stats.packets_in_flight(), 0);
    }
}
