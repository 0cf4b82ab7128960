//! Session control surface
//!
//! `PlayerSession` is what the embedding application talks to: open a source,
//! toggle playback, seek, poll the position, close. Commands return
//! immediately; the audible and visible effects happen in the background
//! tasks, which report back through the [`PlayerEvent`] stream.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PlayerConfig;
use crate::decoder::{MediaBackend, OpenedMedia};
use crate::error::PlayerError;
use crate::pipeline::channel::PacketChannel;
use crate::pipeline::context::SessionContext;
use crate::pipeline::decode::{DecodeStage, StageSink};
use crate::pipeline::reader::ReaderStage;
use crate::pipeline::stage::PipelineStage;
use crate::pipeline::state::PlayerState;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::types::{StreamKind, Timestamp};
use crate::sink::{AudioSink, VideoSink};

/// One-way notifications from the engine to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// The session state changed
    StateChanged(PlayerState),
    /// The container is exhausted; the workers drain and stop on their own
    EndOfStream,
    /// A fatal error stopped the session
    Error(String),
}

/// Media plus sinks waiting for the first Play.
struct PendingPipeline {
    media: OpenedMedia,
    video_sink: Box<dyn VideoSink>,
    audio_sink: Box<dyn AudioSink>,
}

/// Everything tied to one opened source.
struct ActiveSession {
    ctx: Arc<SessionContext>,
    duration: Duration,
    video_channel: Arc<PacketChannel>,
    audio_channel: Arc<PacketChannel>,
    pending: Option<PendingPipeline>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

/// A playback session over one media backend.
///
/// All methods are cheap and non-blocking except [`close`](Self::close),
/// which awaits the background tasks. None of the background tasks ever
/// blocks the caller's thread.
pub struct PlayerSession {
    backend: Box<dyn MediaBackend>,
    config: PlayerConfig,
    events_tx: mpsc::UnboundedSender<PlayerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PlayerEvent>>,
    active: Option<ActiveSession>,
}

impl PlayerSession {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self::with_config(backend, PlayerConfig::default())
    }

    pub fn with_config(backend: Box<dyn MediaBackend>, config: PlayerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            config,
            events_tx,
            events_rx: Some(events_rx),
            active: None,
        }
    }

    /// Take the notification stream. Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PlayerEvent>> {
        self.events_rx.take()
    }

    /// Current externally visible state.
    pub fn state(&self) -> PlayerState {
        match &self.active {
            Some(active) => active.ctx.state(),
            None => PlayerState::Idle,
        }
    }

    /// Counters of the current session, if one is open.
    pub fn stats(&self) -> Option<Arc<PipelineStats>> {
        self.active.as_ref().map(|a| Arc::clone(&a.ctx.stats))
    }

    /// Open a source and prepare the pipeline without starting it.
    ///
    /// The sinks receive frames once playback starts; they are dropped on
    /// Close.
    pub fn open(
        &mut self,
        source: &str,
        video_sink: Box<dyn VideoSink>,
        audio_sink: Box<dyn AudioSink>,
    ) -> Result<(), PlayerError> {
        if self.active.is_some() {
            return Err(self.invalid("open"));
        }

        info!("Session: opening {source}");
        let media = self
            .backend
            .open(source)
            .map_err(|e| PlayerError::Open(e.to_string()))?;

        let ctx = Arc::new(SessionContext::new(self.events_tx.clone()));
        ctx.emit(PlayerEvent::StateChanged(PlayerState::Ready));

        self.active = Some(ActiveSession {
            ctx,
            duration: media.info.duration,
            video_channel: Arc::new(PacketChannel::new(self.config.video_channel_capacity)),
            audio_channel: Arc::new(PacketChannel::new(self.config.audio_channel_capacity)),
            pending: Some(PendingPipeline {
                media,
                video_sink,
                audio_sink,
            }),
            handles: Vec::new(),
        });
        Ok(())
    }

    /// Start playback, or toggle between Playing and Paused.
    ///
    /// The first call after `open` spawns the reader and both decode workers
    /// and starts the clock; later calls only flip the clock's pause gate.
    pub fn toggle_play(&mut self) -> Result<(), PlayerError> {
        let state = self.state();
        let Some(active) = self.active.as_mut() else {
            return Err(PlayerError::InvalidState {
                command: "play",
                state: state.to_string(),
            });
        };

        match state {
            PlayerState::Ready => {
                let pending = active
                    .pending
                    .take()
                    .expect("pipeline already consumed in Ready state");
                // The clock must be running before any worker computes a
                // deadline.
                active.ctx.clock.start(Instant::now());
                Self::spawn_pipeline(active, &self.config, pending);
                active.ctx.set_state(PlayerState::Playing);
                Ok(())
            }
            PlayerState::Playing => {
                active.ctx.clock.pause(Instant::now());
                active.ctx.set_state(PlayerState::Paused);
                Ok(())
            }
            PlayerState::Paused => {
                active.ctx.clock.resume(Instant::now());
                active.ctx.set_state(PlayerState::Playing);
                Ok(())
            }
            other => Err(PlayerError::InvalidState {
                command: "play",
                state: other.to_string(),
            }),
        }
    }

    /// Request a seek. Returns as soon as the request is flagged; the reader
    /// drains the channels and repositions the container asynchronously.
    ///
    /// The observable state flips to Seeking and synchronously back so the
    /// UI gets instantaneous feedback.
    pub fn seek_to(&mut self, position_ms: u64) -> Result<(), PlayerError> {
        let state = self.state();
        if !matches!(state, PlayerState::Playing | PlayerState::Paused) {
            return Err(PlayerError::InvalidState {
                command: "seek",
                state: state.to_string(),
            });
        }
        let active = self.active.as_mut().expect("active session in Playing/Paused");

        let mut target = Timestamp::from_millis(position_ms as i64);
        if active.duration > Duration::ZERO {
            target = target.min(Timestamp::from_duration(active.duration));
        }

        active.ctx.set_state(PlayerState::Seeking);
        active.ctx.clock.begin_seek(target);
        active.ctx.set_state(state);
        Ok(())
    }

    /// Current position as `(elapsed_ms, total_ms)`.
    pub fn position(&self) -> (u64, u64) {
        let Some(active) = self.active.as_ref() else {
            return (0, 0);
        };
        let total_ms = active.duration.as_millis() as u64;
        let mut elapsed_ms = active
            .ctx
            .clock
            .position(Instant::now())
            .as_millis()
            .max(0) as u64;
        if total_ms > 0 {
            elapsed_ms = elapsed_ms.min(total_ms);
        }
        (elapsed_ms, total_ms)
    }

    /// Stop all background tasks, release the channels, and return to Idle.
    ///
    /// Waits up to the configured shutdown timeout for each task; every
    /// packet still queued is drained and released.
    pub async fn close(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.ctx.cancel.cancel();

        for (name, handle) in active.handles.drain(..) {
            match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Session: {name} panicked: {e}"),
                Err(_) => warn!("Session: {name} did not stop within timeout"),
            }
        }

        let drained = active.video_channel.drain_all() + active.audio_channel.drain_all();
        active.ctx.stats.record_packets_drained(drained as u64);

        active.ctx.set_state(PlayerState::Idle);
        info!("Session: closed ({})", active.ctx.stats.summary());
    }

    fn spawn_pipeline(active: &mut ActiveSession, config: &PlayerConfig, pending: PendingPipeline) {
        let PendingPipeline {
            media,
            video_sink,
            audio_sink,
        } = pending;

        let reader = ReaderStage::new(
            media.demuxer,
            media.info.clone(),
            Arc::clone(&active.video_channel),
            Arc::clone(&active.audio_channel),
            Arc::clone(&active.ctx),
            config.poll_interval,
        );
        let video = DecodeStage::new(
            StreamKind::Video,
            media.video_decoder,
            Arc::clone(&active.video_channel),
            StageSink::Video(video_sink),
            Arc::clone(&active.ctx),
            config.poll_interval,
            config.pause_poll_interval,
        );
        let audio = DecodeStage::new(
            StreamKind::Audio,
            media.audio_decoder,
            Arc::clone(&active.audio_channel),
            StageSink::Audio(audio_sink),
            Arc::clone(&active.ctx),
            config.poll_interval,
            config.pause_poll_interval,
        );

        let stages: Vec<Box<dyn PipelineStage>> =
            vec![Box::new(reader), Box::new(video), Box::new(audio)];
        for mut stage in stages {
            let name = stage.name();
            let handle = tokio::spawn(async move {
                if let Err(e) = stage.run().await {
                    error!("{}: {e}", stage.name());
                }
            });
            active.handles.push((name, handle));
        }
    }

    fn invalid(&self, command: &'static str) -> PlayerError {
        PlayerError::InvalidState {
            command,
            state: self.state().to_string(),
        }
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            // Best effort: tasks observe the flag within one poll interval.
            active.ctx.cancel.cancel();
        }
    }
}
