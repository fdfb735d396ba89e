//! Conversation core for the EcoIuris chat client.
//!
//! - `session`: the active persona, its chat session and the transcript
//! - `dispatcher`: runs user turns on the streaming or deep-search path
//! - `markup`, `export`: sanitized rendering and plain-text export
//! - `attachment`: the pending file and its inline-data encoding

pub mod attachment;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod markup;
pub mod session;
pub mod welcome;

pub use attachment::Attachment;
pub use dispatcher::{
    Conversation, TurnEvent, TurnEventKind, TurnJob, DEEP_SEARCH_PLACEHOLDER, STREAM_PLACEHOLDER,
};
pub use error::ConversationError;
pub use session::{SessionManager, SessionToken};
