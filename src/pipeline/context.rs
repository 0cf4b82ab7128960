//! Shared state hub for one playback session
//!
//! Everything the three background tasks and the control surface share lives
//! here: the clock, the counters, the cancellation token, and the
//! authoritative state cell. The context is created at Open and dropped after
//! Close, so no state can leak between sessions.

use log::{info, warn};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::clock::PlaybackClock;
use super::state::PlayerState;
use super::stats::PipelineStats;
use crate::session::PlayerEvent;

pub struct SessionContext {
    /// Shared virtual clock, consulted by both decode workers on every frame
    pub clock: PlaybackClock,

    /// Shared counters
    pub stats: Arc<PipelineStats>,

    /// Session stop flag; cancelled by Close and by fatal errors
    pub cancel: CancellationToken,

    /// Set by the reader at end-of-stream so workers exit once drained
    reader_done: AtomicBool,

    /// Authoritative session state
    state: Mutex<PlayerState>,

    /// Ensures at most one fatal error is published, and none after Close
    error_published: AtomicBool,

    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl SessionContext {
    pub fn new(events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self {
            clock: PlaybackClock::new(),
            stats: Arc::new(PipelineStats::new()),
            cancel: CancellationToken::new(),
            reader_done: AtomicBool::new(false),
            state: Mutex::new(PlayerState::Ready),
            error_published: AtomicBool::new(false),
            events,
        }
    }

    /// Current session state.
    pub fn state(&self) -> PlayerState {
        self.state.lock().unwrap().clone()
    }

    /// Apply a state transition and notify observers.
    ///
    /// Invalid transitions are rejected and logged, keeping the machine the
    /// single place where ordering of externally-triggered commands is
    /// enforced.
    pub fn set_state(&self, target: PlayerState) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition_to(&target) {
            warn!(
                "Session: rejected state transition {} -> {}",
                *state, target
            );
            return false;
        }
        if *state == target {
            return true;
        }
        *state = target.clone();
        drop(state);
        self.emit(PlayerEvent::StateChanged(target));
        true
    }

    /// Publish a fatal pipeline error and stop the session.
    ///
    /// A close that is already in progress wins over the error: once the
    /// cancellation token fires, no error transition is published.
    pub fn publish_fatal(&self, message: impl Into<String>) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.error_published.swap(true, Ordering::Relaxed) {
            return;
        }
        let message = message.into();
        info!("Session: fatal error: {message}");
        self.set_state(PlayerState::Error(message.clone()));
        self.emit(PlayerEvent::Error(message));
        self.cancel.cancel();
    }

    /// Send a notification to the control surface. Best effort: a detached
    /// receiver only means nobody is listening.
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Mark the container as exhausted.
    pub fn mark_reader_done(&self) {
        self.reader_done.store(true, Ordering::Relaxed);
    }

    pub fn is_reader_done(&self) -> bool {
        self.reader_done.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("reader_done", &self.is_reader_done())
            .finish()
    }
}
