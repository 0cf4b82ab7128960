//! Pipeline stage trait
//!
//! Each background task of a session (the reader and the two decode workers)
//! implements this interface; the session spawns one tokio task per stage and
//! awaits them on close.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for pipeline stages that process media data
#[async_trait]
pub trait PipelineStage: Send {
    /// Run the stage until end-of-stream, a fatal error, or cancellation.
    async fn run(&mut self) -> Result<()>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}
