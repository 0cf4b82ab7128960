//! Bounded packet channel between the reader and a decode worker
//!
//! One instance per elementary stream. The channel never drops data on its
//! own: a full channel pushes backpressure onto the reader, which retries
//! until a slot frees up or a seek/shutdown signal preempts the push.
//! `drain_all` empties the channel during a seek and releases every queued
//! packet.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use super::types::Packet;

/// Capacity-limited FIFO of compressed packets.
///
/// The queue itself is guarded by a short-held mutex; waiting for a slot or
/// an item happens outside the lock on [`Notify`] wakers so that waits stay
/// cancellable and never stall the other side.
pub struct PacketChannel {
    queue: Mutex<VecDeque<Packet>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl PacketChannel {
    /// Create a channel holding at most `capacity` packets.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "packet channel capacity must be non-zero");
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Append a packet, or hand it back if the channel is full.
    pub fn try_push(&self, packet: Packet) -> Result<(), Packet> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            return Err(packet);
        }
        queue.push_back(packet);
        drop(queue);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest packet, if any.
    pub fn try_pop(&self) -> Option<Packet> {
        let packet = self.queue.lock().unwrap().pop_front();
        if packet.is_some() {
            self.not_full.notify_one();
        }
        packet
    }

    /// Wait until a slot may be free, bounded by `timeout`.
    ///
    /// Wakes early when a pop happens; the caller re-checks with `try_push`.
    pub async fn wait_not_full(&self, timeout: Duration) {
        if self.len() < self.capacity {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.not_full.notified()).await;
    }

    /// Wait until an item may be available, bounded by `timeout`.
    ///
    /// Wakes early when a push happens; the caller re-checks with `try_pop`.
    pub async fn wait_not_empty(&self, timeout: Duration) {
        if !self.is_empty() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.not_empty.notified()).await;
    }

    /// Empty the channel, releasing every queued packet.
    ///
    /// Returns how many packets were released. Used during seek and close.
    pub fn drain_all(&self) -> usize {
        let drained = {
            let mut queue = self.queue.lock().unwrap();
            let count = queue.len();
            queue.clear();
            count
        };
        if drained > 0 {
            self.not_full.notify_waiters();
        }
        drained
    }

    /// Number of packets currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// True when no packet is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Maximum number of packets this channel holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for PacketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Timestamp;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_packet(pts_ms: i64) -> Packet {
        Packet {
            stream_index: 0,
            pts: Timestamp::from_millis(pts_ms),
            duration: Duration::from_millis(20),
            data: Bytes::from_static(&[0u8; 16]),
            is_keyframe: false,
        }
    }

    #[test]
    fn test_push_pop_fifo_order() {
        let channel = PacketChannel::new(4);
        for pts in [0, 20, 40] {
            channel.try_push(make_packet(pts)).unwrap();
        }
        assert_eq!(channel.len(), 3);

        for expected in [0, 20, 40] {
            let packet = channel.try_pop().unwrap();
            assert_eq!(packet.pts.as_millis(), expected);
        }
        assert!(channel.try_pop().is_none());
    }

    #[test]
    fn test_push_full_returns_packet() {
        let channel = PacketChannel::new(2);
        channel.try_push(make_packet(0)).unwrap();
        channel.try_push(make_packet(20)).unwrap();

        let rejected = channel.try_push(make_packet(40)).unwrap_err();
        assert_eq!(rejected.pts.as_millis(), 40);
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn test_drain_all_empties_channel() {
        let channel = PacketChannel::new(8);
        for pts in 0..5 {
            channel.try_push(make_packet(pts * 20)).unwrap();
        }
        assert_eq!(channel.drain_all(), 5);
        assert!(channel.is_empty());
        assert_eq!(channel.drain_all(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_length_stays_bounded_under_load() {
        // Producer runs much faster than the consumer; the channel length
        // must never exceed its capacity at any observation point.
        let channel = Arc::new(PacketChannel::new(8));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let total = 200usize;

        let producer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let mut pushed = 0usize;
                let mut packet = Some(make_packet(0));
                while pushed < total {
                    match channel.try_push(packet.take().unwrap()) {
                        Ok(()) => {
                            pushed += 1;
                            packet = Some(make_packet((pushed as i64) * 20));
                        }
                        Err(returned) => {
                            packet = Some(returned);
                            channel.wait_not_full(Duration::from_millis(5)).await;
                        }
                    }
                }
            })
        };

        let consumer = {
            let channel = Arc::clone(&channel);
            let max_seen = Arc::clone(&max_seen);
            tokio::spawn(async move {
                let mut popped = 0usize;
                while popped < total {
                    let len = channel.len();
                    max_seen.fetch_max(len, Ordering::Relaxed);
                    assert!(len <= channel.capacity());

                    match channel.try_pop() {
                        Some(_) => {
                            popped += 1;
                            // Vary the consumer speed to exercise both the
                            // full and empty edges of the queue.
                            if popped % 7 == 0 {
                                tokio::time::sleep(Duration::from_millis(1)).await;
                            }
                        }
                        None => channel.wait_not_empty(Duration::from_millis(5)).await,
                    }
                }
            })
        };

        producer.await.unwrap();
        consumer.await.unwrap();

        assert!(channel.is_empty());
        assert!(max_seen.load(Ordering::Relaxed) <= 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_not_empty_wakes_on_push() {
        let channel = Arc::new(PacketChannel::new(2));

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel.wait_not_empty(Duration::from_secs(1)).await;
                channel.try_pop()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.try_push(make_packet(0)).unwrap();

        let popped = waiter.await.unwrap();
        assert!(popped.is_some());
    }
}
