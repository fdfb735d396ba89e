//! Seam between the conversation core and a hosted chat API.

use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::{GroundedAnswer, MessagePart, StreamChunk};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a conversational context bound to one system instruction.
    fn create_session(&self, system_instruction: &str) -> Result<Arc<dyn ChatSession>>;

    /// One blocking completion with web-search grounding.
    async fn generate_grounded(&self, prompt: &str) -> Result<GroundedAnswer>;
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one user message and stream the reply into `tx`.
    ///
    /// Contract: if the request fails before any chunk is produced, returns
    /// `Err(...)`. Once streaming starts, failures are reported as
    /// `StreamChunk::Error` and the method returns `Ok(())`. A successful
    /// stream always ends with `StreamChunk::Done`.
    async fn send_streaming(
        &self,
        parts: Vec<MessagePart>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;
}
