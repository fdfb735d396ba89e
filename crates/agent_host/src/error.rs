use thiserror::Error;

/// Shown when a failure carries no message of its own.
pub const GENERIC_ERROR: &str = "An unknown error occurred while contacting the AI service.";

#[derive(Debug, Error)]
pub enum ConversationError {
    /// The chat session for a persona could not be created.
    #[error("failed to start chat session: {0}")]
    Initialization(String),
    /// A turn failed after it was dispatched.
    #[error("{0}")]
    Send(String),
    #[error("attachment error: {0}")]
    Attachment(String),
    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
}

impl ConversationError {
    pub fn send(err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.trim().is_empty() {
            ConversationError::Send(GENERIC_ERROR.to_string())
        } else {
            ConversationError::Send(msg)
        }
    }
}
