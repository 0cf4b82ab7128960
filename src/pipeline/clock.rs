//! Virtual clock for pause- and seek-aware presentation pacing
//!
//! Maps a stream timestamp to the wall-clock instant at which the frame is
//! due. Both decode workers consult the same clock, so audio and video cannot
//! drift apart across pause/resume or seek: the presentation deadline for a
//! timestamp `pts` is `start_instant + pause_offset + pts`, where the pause
//! offset absorbs every paused interval and is re-anchored by seeks.
//!
//! # Thread safety
//!
//! The clock is cloned via `Arc` into every pipeline task. Deadline reads are
//! lock-free atomic loads; the two mutexes guard rarely-written instants and
//! are never held across a wait.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::types::Timestamp;

/// Sentinel for "no seek floor": every timestamp is presentable.
const NO_FLOOR: i64 = i64::MIN;

#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    /// Wall instant at which playback started; `None` before the first Play
    base: Mutex<Option<Instant>>,

    /// Accumulated pause time in microseconds, signed: seeks re-anchor it and
    /// a forward seek past the elapsed wall time drives it negative
    pause_offset: AtomicI64,

    paused: AtomicBool,
    /// Wall instant the current pause began, while paused
    pause_began: Mutex<Option<Instant>>,

    seeking: AtomicBool,
    /// Pending seek target, consumed by the reader
    seek_target: Mutex<Option<Timestamp>>,

    /// Minimum presentable timestamp after the last seek, in microseconds
    seek_floor: AtomicI64,

    /// Bumped by every pause/resume/seek transition; workers capture it
    /// before a wait and re-evaluate when it changes
    epoch: AtomicU64,

    /// Wakes workers parked on the pause gate
    pause_gate: Notify,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                base: Mutex::new(None),
                pause_offset: AtomicI64::new(0),
                paused: AtomicBool::new(false),
                pause_began: Mutex::new(None),
                seeking: AtomicBool::new(false),
                seek_target: Mutex::new(None),
                seek_floor: AtomicI64::new(NO_FLOOR),
                epoch: AtomicU64::new(0),
                pause_gate: Notify::new(),
            }),
        }
    }

    /// Anchor the timeline at `now`. Called once per Ready→Playing
    /// transition; resets pause and seek state.
    pub fn start(&self, now: Instant) {
        *self.inner.base.lock().unwrap() = Some(now);
        self.inner.pause_offset.store(0, Ordering::Relaxed);
        self.inner.paused.store(false, Ordering::Relaxed);
        *self.inner.pause_began.lock().unwrap() = None;
        self.inner.seeking.store(false, Ordering::Relaxed);
        *self.inner.seek_target.lock().unwrap() = None;
        self.inner.seek_floor.store(NO_FLOOR, Ordering::Relaxed);
        self.bump_epoch();
    }

    /// True once `start` has been called.
    pub fn is_started(&self) -> bool {
        self.inner.base.lock().unwrap().is_some()
    }

    /// Freeze the timeline. Idempotent while already paused.
    pub fn pause(&self, now: Instant) {
        if self.inner.paused.swap(true, Ordering::Relaxed) {
            return;
        }
        *self.inner.pause_began.lock().unwrap() = Some(now);
        self.bump_epoch();
    }

    /// Unfreeze the timeline, crediting the paused interval to the offset.
    ///
    /// The credit is a single atomic add, safe against concurrent deadline
    /// reads from the decode workers.
    pub fn resume(&self, now: Instant) {
        if !self.inner.paused.load(Ordering::Relaxed) {
            return;
        }
        let began = self.inner.pause_began.lock().unwrap().take();
        if let Some(began) = began {
            let delta = now.saturating_duration_since(began).as_micros() as i64;
            self.inner.pause_offset.fetch_add(delta, Ordering::Relaxed);
        }
        self.inner.paused.store(false, Ordering::Relaxed);
        self.bump_epoch();
        self.inner.pause_gate.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    /// Flag a seek request. Presentation stops until the reader repositions
    /// the container and calls [`complete_seek`](Self::complete_seek).
    pub fn begin_seek(&self, target: Timestamp) {
        *self.inner.seek_target.lock().unwrap() = Some(target);
        self.inner.seeking.store(true, Ordering::Relaxed);
        self.bump_epoch();
        // Wake workers parked on the pause gate so they observe the seek.
        self.inner.pause_gate.notify_waiters();
    }

    /// Consume the pending seek target, if any. Reader-side.
    pub fn take_seek_target(&self) -> Option<Timestamp> {
        self.inner.seek_target.lock().unwrap().take()
    }

    pub fn is_seeking(&self) -> bool {
        self.inner.seeking.load(Ordering::Relaxed)
    }

    /// Re-anchor the timeline so that `target` is due exactly at `now`, then
    /// leave the seeking state unless another target arrived meanwhile.
    pub fn complete_seek(&self, now: Instant, target: Timestamp) {
        let base = self
            .inner
            .base
            .lock()
            .unwrap()
            .unwrap_or(now);
        let elapsed = now.saturating_duration_since(base).as_micros() as i64;
        self.inner
            .pause_offset
            .store(elapsed - target.micros, Ordering::Relaxed);
        self.inner.seek_floor.store(target.micros, Ordering::Relaxed);

        // A pause that started before the seek must only be credited from
        // the seek completion onward.
        if self.inner.paused.load(Ordering::Relaxed) {
            *self.inner.pause_began.lock().unwrap() = Some(now);
        }

        if self.inner.seek_target.lock().unwrap().is_none() {
            self.inner.seeking.store(false, Ordering::Relaxed);
        }
        self.bump_epoch();
        self.inner.pause_gate.notify_waiters();
    }

    /// Minimum presentable timestamp after the last seek, in microseconds.
    pub fn seek_floor_micros(&self) -> i64 {
        self.inner.seek_floor.load(Ordering::Relaxed)
    }

    /// Wall instant at which a frame with timestamp `pts` is due.
    pub fn deadline_for(&self, pts: Timestamp) -> Instant {
        let base = match *self.inner.base.lock().unwrap() {
            Some(base) => base,
            None => return Instant::now(),
        };
        let offset = self.inner.pause_offset.load(Ordering::Relaxed);
        let due = (pts.micros + offset).max(0) as u64;
        base + Duration::from_micros(due)
    }

    /// Current stream position.
    ///
    /// Frozen while paused; reports the pending target while a seek is in
    /// flight so observers never see stale intermediate positions.
    pub fn position(&self, now: Instant) -> Timestamp {
        if self.is_seeking()
            && let Some(target) = *self.inner.seek_target.lock().unwrap()
        {
            return target;
        }
        let base = match *self.inner.base.lock().unwrap() {
            Some(base) => base,
            None => return Timestamp::ZERO,
        };
        let anchor = if self.inner.paused.load(Ordering::Relaxed) {
            self.inner.pause_began.lock().unwrap().unwrap_or(now)
        } else {
            now
        };
        let offset = self.inner.pause_offset.load(Ordering::Relaxed);
        let elapsed = anchor.saturating_duration_since(base).as_micros() as i64;
        Timestamp::from_micros((elapsed - offset).max(0))
    }

    /// Current epoch. Changes whenever pause/resume/seek state changes.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Relaxed)
    }

    /// Park on the pause gate for at most `tick`, waking early on any
    /// pause/seek transition. The caller re-checks its flags afterwards.
    pub async fn pause_gate_wait(&self, tick: Duration) {
        if !self.is_paused() || self.is_seeking() {
            return;
        }
        let _ = tokio::time::timeout(tick, self.inner.pause_gate.notified()).await;
    }

    fn bump_epoch(&self) {
        self.inner.epoch.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("started", &self.is_started())
            .field("paused", &self.is_paused())
            .field("seeking", &self.is_seeking())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_position_advances_while_playing() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());

        thread::sleep(ms(20));
        let pos = clock.position(Instant::now());
        assert!(pos.as_millis() >= 15, "position was {pos}");
    }

    #[test]
    fn test_pause_freezes_position_and_resume_continues() {
        let clock = PlaybackClock::new();
        let t0 = Instant::now();
        clock.start(t0);

        thread::sleep(ms(20));
        clock.pause(Instant::now());
        let frozen = clock.position(Instant::now());

        thread::sleep(ms(30));
        let still_frozen = clock.position(Instant::now());
        assert_eq!(frozen, still_frozen);

        clock.resume(Instant::now());
        thread::sleep(ms(20));
        let resumed = clock.position(Instant::now());

        // Paused time must not be counted.
        assert!(resumed > frozen);
        assert!(
            resumed.diff(frozen) < ms(35),
            "paused interval leaked into position: {frozen} -> {resumed}"
        );
    }

    #[test]
    fn test_deadline_shifts_by_paused_interval() {
        let clock = PlaybackClock::new();
        let t0 = Instant::now();
        clock.start(t0);

        let before = clock.deadline_for(Timestamp::from_millis(500));

        clock.pause(Instant::now());
        thread::sleep(ms(25));
        clock.resume(Instant::now());

        let after = clock.deadline_for(Timestamp::from_millis(500));
        let shift = after.duration_since(before);
        assert!(
            shift >= ms(20) && shift < ms(100),
            "deadline shifted by {shift:?}"
        );
    }

    #[test]
    fn test_pause_is_idempotent() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());

        clock.pause(Instant::now());
        let epoch = clock.epoch();
        clock.pause(Instant::now());
        assert_eq!(clock.epoch(), epoch);
        assert!(clock.is_paused());
    }

    #[test]
    fn test_seek_reanchors_position() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());
        thread::sleep(ms(10));

        let target = Timestamp::from_millis(8_000);
        clock.begin_seek(target);
        assert!(clock.is_seeking());
        // While the seek is pending the position reports the target.
        assert_eq!(clock.position(Instant::now()), target);

        let taken = clock.take_seek_target().unwrap();
        assert_eq!(taken, target);
        clock.complete_seek(Instant::now(), taken);
        assert!(!clock.is_seeking());

        let pos = clock.position(Instant::now());
        assert!(pos.diff(target) < ms(10), "position after seek: {pos}");

        // The target itself is due immediately.
        assert!(clock.deadline_for(target) <= Instant::now() + ms(5));
        assert_eq!(clock.seek_floor_micros(), target.micros);
    }

    #[test]
    fn test_seek_while_paused_stays_frozen_at_target() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());
        thread::sleep(ms(10));
        clock.pause(Instant::now());

        let target = Timestamp::from_millis(2_000);
        clock.begin_seek(target);
        let taken = clock.take_seek_target().unwrap();
        clock.complete_seek(Instant::now(), taken);

        thread::sleep(ms(20));
        let pos = clock.position(Instant::now());
        assert!(pos.diff(target) < ms(10), "position while paused: {pos}");

        // Resuming must not credit the pre-seek pause interval.
        clock.resume(Instant::now());
        let pos = clock.position(Instant::now());
        assert!(pos.diff(target) < ms(10), "position after resume: {pos}");
    }

    #[test]
    fn test_epoch_changes_on_transitions() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());
        let e0 = clock.epoch();

        clock.pause(Instant::now());
        let e1 = clock.epoch();
        assert_ne!(e0, e1);

        clock.resume(Instant::now());
        let e2 = clock.epoch();
        assert_ne!(e1, e2);

        clock.begin_seek(Timestamp::from_millis(100));
        let e3 = clock.epoch();
        assert_ne!(e2, e3);

        let target = clock.take_seek_target().unwrap();
        clock.complete_seek(Instant::now(), target);
        assert_ne!(e3, clock.epoch());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_gate_wakes_on_resume() {
        let clock = PlaybackClock::new();
        clock.start(Instant::now());
        clock.pause(Instant::now());

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                while clock.is_paused() && !clock.is_seeking() {
                    clock.pause_gate_wait(Duration::from_millis(50)).await;
                }
                started.elapsed()
            })
        };

        tokio::time::sleep(ms(10)).await;
        clock.resume(Instant::now());

        let waited = waiter.await.unwrap();
        assert!(waited < ms(100), "pause gate held for {waited:?}");
    }
}
