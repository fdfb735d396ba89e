pub mod backend;
pub mod gemini;
pub mod sse;

pub use backend::{ChatBackend, ChatSession};
pub use gemini::GeminiClient;
