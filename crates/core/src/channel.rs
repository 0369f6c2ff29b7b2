//! Tool channel traits: the seam between orchestration and the tool process.
//!
//! A [`ToolChannel`] is exclusively owned by one orchestration run and talks
//! to exactly one tool process. A [`ChannelOpener`] produces a fresh channel
//! (hence a fresh process) for every run; nothing is pooled or shared.

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::ChannelError;
use crate::tool::{ToolCallRequest, ToolCallResult};

#[async_trait]
pub trait ToolChannel: Send {
    /// Issue one call and wait for its correlated result.
    ///
    /// Any `Err` leaves the channel unusable.
    async fn call(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, ChannelError>;

    /// Close the channel and terminate the process. Safe to call twice.
    async fn close(&mut self);

    /// Terminate the process at once, skipping any graceful wind-down.
    /// Used when the run has no time left.
    async fn abort(&mut self) {
        self.close().await;
    }

    /// OS process id of the tool process, if it is still known.
    fn process_id(&self) -> Option<u32> {
        None
    }
}

#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Spawn a new tool process bound to `credential` and complete the
    /// handshake. The credential is moved in and never handed back.
    async fn open(&self, credential: Credential) -> Result<Box<dyn ToolChannel>, ChannelError>;
}
