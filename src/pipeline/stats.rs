//! Pipeline counters
//!
//! Shared atomic counters recorded by the reader and the decode workers,
//! logged by each stage when it exits. Every compressed packet the reader
//! pushes is eventually accounted for as released, drained, or discarded.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one playback session. All fields use atomic operations for
/// thread-safe access.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Packets read from the container and pushed to a channel
    pub packets_read: AtomicU64,

    /// Packets dropped by the reader: foreign streams, or a pending seek
    /// preempting a blocked push
    pub packets_discarded: AtomicU64,

    /// Packets popped and fully processed by a decode worker
    pub packets_released: AtomicU64,

    /// Packets flushed out of the channels by a seek or close
    pub packets_drained: AtomicU64,

    /// Frames delivered to a sink
    pub frames_presented: AtomicU64,

    /// Decoded frames dropped without presentation (seek abort or floor)
    pub frames_dropped: AtomicU64,

    /// Recoverable decode failures (packet dropped, playback continued)
    pub decode_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_read(&self) {
        self.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet_discarded(&self) {
        self.packets_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet_released(&self) {
        self.packets_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packets_drained(&self, count: u64) {
        self.packets_drained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_frame_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Packets pushed into the channels that have not yet been popped or
    /// drained. Zero once the session is fully torn down.
    pub fn packets_in_flight(&self) -> u64 {
        let read = self.packets_read.load(Ordering::Relaxed);
        let released = self.packets_released.load(Ordering::Relaxed);
        let drained = self.packets_drained.load(Ordering::Relaxed);
        read.saturating_sub(released + drained)
    }

    /// Snapshot of all counters.
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            packets_released: self.packets_released.load(Ordering::Relaxed),
            packets_drained: self.packets_drained.load(Ordering::Relaxed),
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSummary {
    pub packets_read: u64,
    pub packets_discarded: u64,
    pub packets_released: u64,
    pub packets_drained: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub decode_failures: u64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets read ({} discarded, {} drained), {} released, \
             {} frames presented ({} dropped), {} decode failures",
            self.packets_read,
            self.packets_discarded,
            self.packets_drained,
            self.packets_released,
            self.frames_presented,
            self.frames_dropped,
            self.decode_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();

        stats.record_packet_read();
        stats.record_packet_read();
        stats.record_packet_read();
        stats.record_packet_released();
        stats.record_packets_drained(1);

        assert_eq!(stats.packets_in_flight(), 1);

        stats.record_packet_released();
        assert_eq!(stats.packets_in_flight(), 0);

        stats.record_frame_presented();
        stats.record_frame_dropped();
        stats.record_decode_failure();

        let summary = stats.summary();
        assert_eq!(summary.packets_read, 3);
        assert_eq!(summary.packets_released, 2);
        assert_eq!(summary.packets_drained, 1);
        assert_eq!(summary.frames_presented, 1);
        assert_eq!(summary.frames_dropped, 1);
        assert_eq!(summary.decode_failures, 1);
    }
}
