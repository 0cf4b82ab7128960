//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for one playback session.
///
/// The defaults suit ordinary desktop playback; embedders with unusual
/// containers (very long GOPs, very small audio packets) may want to widen
/// the channel capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Capacity of the compressed video packet channel
    pub video_channel_capacity: usize,
    /// Capacity of the compressed audio packet channel
    pub audio_channel_capacity: usize,
    /// Polling interval for channel and deadline waits
    pub poll_interval: Duration,
    /// Re-check interval while parked on the pause gate
    pub pause_poll_interval: Duration,
    /// How long `close` waits for the background tasks to finish
    pub shutdown_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_channel_capacity: 64,
            audio_channel_capacity: 128,
            poll_interval: Duration::from_millis(2),
            pause_poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_millis(200),
        }
    }
}

/// Returns the crate version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_bounded() {
        let config = PlayerConfig::default();
        assert!(config.video_channel_capacity > 0);
        assert!(config.audio_channel_capacity > 0);
        assert!(config.poll_interval <= Duration::from_millis(10));
        assert!(config.shutdown_timeout >= Duration::from_millis(100));
    }
}
