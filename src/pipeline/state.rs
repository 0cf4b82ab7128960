//! Session state machine
//!
//! One authoritative enum, mutated only under external command (or a fatal
//! pipeline error) and observed read-only by the background tasks.

use serde::{Deserialize, Serialize};

/// Externally visible state of a playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    /// No media open
    Idle,

    /// Media opened, pipeline not yet started
    Ready,

    /// Pipeline running, clock advancing
    Playing,

    /// Pipeline running, clock frozen
    Paused,

    /// A seek request is being applied
    Seeking,

    /// A fatal error stopped the session; only Close is accepted
    Error(String),
}

impl PlayerState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PlayerState) -> bool {
        use PlayerState::*;

        match (self, target) {
            // Opening media
            (Idle, Ready) => true,

            // Starting and toggling playback
            (Ready, Playing) => true,
            (Playing, Paused) => true,
            (Paused, Playing) => true,

            // Seeking flips to Seeking and synchronously back
            (Playing, Seeking) | (Paused, Seeking) => true,
            (Seeking, Playing) | (Seeking, Paused) => true,

            // Closing tears down from any active or failed state
            (Ready, Idle) => true,
            (Playing, Idle) | (Paused, Idle) | (Seeking, Idle) => true,
            (Error(_), Idle) => true,

            // Fatal errors may interrupt any active state
            (Ready, Error(_)) => true,
            (Playing, Error(_)) | (Paused, Error(_)) | (Seeking, Error(_)) => true,

            // Self-transitions
            (a, b) if a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PlayerState::Idle => "Idle",
            PlayerState::Ready => "Ready",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Seeking => "Seeking",
            PlayerState::Error(_) => "Error",
        }
    }

    /// Check if media is open and the pipeline may be running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Seeking
        )
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlayerState::Paused)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlayerState::Error(_))
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Error(message) => write!(f, "Error: {message}"),
            other => write!(f, "{}", other.description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let error = PlayerState::Error("decode failed".into());

        assert!(PlayerState::Idle.can_transition_to(&PlayerState::Ready));
        assert!(PlayerState::Ready.can_transition_to(&PlayerState::Playing));
        assert!(PlayerState::Playing.can_transition_to(&PlayerState::Paused));
        assert!(PlayerState::Paused.can_transition_to(&PlayerState::Playing));
        assert!(PlayerState::Playing.can_transition_to(&PlayerState::Seeking));
        assert!(PlayerState::Seeking.can_transition_to(&PlayerState::Playing));
        assert!(PlayerState::Seeking.can_transition_to(&PlayerState::Paused));
        assert!(PlayerState::Playing.can_transition_to(&PlayerState::Idle));
        assert!(PlayerState::Playing.can_transition_to(&error));
        assert!(error.can_transition_to(&PlayerState::Idle));

        // Self-transitions
        assert!(PlayerState::Idle.can_transition_to(&PlayerState::Idle));
        assert!(PlayerState::Playing.can_transition_to(&PlayerState::Playing));
    }

    #[test]
    fn test_invalid_transitions() {
        let error = PlayerState::Error("decode failed".into());

        // Must open before playing
        assert!(!PlayerState::Idle.can_transition_to(&PlayerState::Playing));
        assert!(!PlayerState::Idle.can_transition_to(&PlayerState::Paused));
        // Cannot seek without an active pipeline
        assert!(!PlayerState::Ready.can_transition_to(&PlayerState::Seeking));
        assert!(!PlayerState::Idle.can_transition_to(&PlayerState::Seeking));
        // An errored session only accepts Close
        assert!(!error.can_transition_to(&PlayerState::Playing));
        assert!(!error.can_transition_to(&PlayerState::Ready));
    }

    #[test]
    fn test_state_checks() {
        assert!(PlayerState::Playing.is_active());
        assert!(PlayerState::Playing.is_playing());
        assert!(PlayerState::Paused.is_active());
        assert!(PlayerState::Paused.is_paused());
        assert!(PlayerState::Seeking.is_active());
        assert!(!PlayerState::Ready.is_active());
        assert!(!PlayerState::Idle.is_active());
        assert!(PlayerState::Error("x".into()).is_error());
    }
}
