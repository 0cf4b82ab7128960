//! Error taxonomy for the playback engine
//!
//! Errors split along the two boundaries of the crate: `DecodeError` for the
//! demux/decode capability (where transient and recoverable conditions are
//! handled inside the pipeline) and `PlayerError` for the control surface.

use thiserror::Error;

/// Errors reported by demuxers and stream decoders.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The call cannot make progress right now; retry shortly.
    #[error("resource temporarily unavailable")]
    Again,

    /// A single packet or frame is unusable; drop it and continue.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// End of the container. Not a failure.
    #[error("end of stream")]
    Eof,

    /// The source or codec is unusable; playback cannot continue.
    #[error("{0}")]
    Fatal(String),
}

impl DecodeError {
    /// True for conditions that are retried locally and never surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, DecodeError::Again)
    }

    /// True for single-packet failures that are dropped and skipped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::Corrupt(_))
    }

    /// True when the whole session must transition to the error state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Fatal(_))
    }
}

/// Errors reported by the session control surface.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The requested command is not valid in the current state.
    #[error("invalid command in state {state}: {command}")]
    InvalidState {
        command: &'static str,
        state: String,
    },

    /// The source could not be opened.
    #[error("failed to open source: {0}")]
    Open(String),

    /// The session already hit a fatal error.
    #[error("session failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_classes() {
        assert!(DecodeError::Again.is_transient());
        assert!(!DecodeError::Again.is_recoverable());

        let corrupt = DecodeError::Corrupt("bad packet".into());
        assert!(corrupt.is_recoverable());
        assert!(!corrupt.is_fatal());

        let fatal = DecodeError::Fatal("no such codec".into());
        assert!(fatal.is_fatal());
        assert!(!fatal.is_transient());

        assert!(!DecodeError::Eof.is_fatal());
    }
}
