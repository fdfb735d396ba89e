//! Turn dispatch: runs one user message against the chat API.
//!
//! `Conversation::begin_send` does the synchronous bookkeeping and hands back
//! a `TurnJob`. The job talks to the backend (possibly on another task) and
//! reports `TurnEvent`s, which the owner of the conversation feeds back
//! through `Conversation::apply` in arrival order.

use crate::attachment::Attachment;
use crate::error::ConversationError;
use crate::session::{SessionManager, SessionToken};
use providers::{ChatBackend, ChatSession};
use shared::agent_api::{GroundingSource, MessagePart, StreamChunk};
use shared::personas::Persona;
use shared::transcript::{Citation, TranscriptEntry};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

pub const STREAM_PLACEHOLDER: &str = "...";
pub const DEEP_SEARCH_PLACEHOLDER: &str = "Performing deep search...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEventKind {
    /// A streamed text delta
    Chunk(String),
    /// The stream completed; the accumulated text is final
    StreamFinished,
    /// A grounded answer with its usable citations
    Answer {
        text: String,
        citations: Vec<Citation>,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnEvent {
    pub token: SessionToken,
    pub kind: TurnEventKind,
}

enum Strategy {
    Stream {
        session: Arc<dyn ChatSession>,
        text: String,
        attachment: Option<Attachment>,
    },
    DeepSearch {
        backend: Arc<dyn ChatBackend>,
        prompt: String,
    },
}

/// The backend half of one turn.
pub struct TurnJob {
    token: SessionToken,
    strategy: Strategy,
}

struct InFlight {
    token: SessionToken,
    model_index: usize,
    placeholder: &'static str,
    buffer: String,
}

/// Keep only citations that have both a uri and a title, in source order.
pub fn usable_citations(sources: Vec<GroundingSource>) -> Vec<Citation> {
    sources
        .into_iter()
        .filter_map(|s| match (s.uri, s.title) {
            (Some(uri), Some(title)) if !uri.trim().is_empty() && !title.trim().is_empty() => {
                Some(Citation { uri, title })
            }
            _ => None,
        })
        .collect()
}

impl TurnJob {
    pub fn is_deep_search(&self) -> bool {
        matches!(self.strategy, Strategy::DeepSearch { .. })
    }

    /// Execute the turn, reporting progress on `tx`. Always ends with
    /// exactly one `StreamFinished`, `Answer` or `Failed` event.
    pub async fn run(self, tx: UnboundedSender<TurnEvent>) {
        let token = self.token;
        let emit = |kind: TurnEventKind| {
            let _ = tx.send(TurnEvent { token, kind });
        };

        match self.strategy {
            Strategy::Stream {
                session,
                text,
                attachment,
            } => {
                let mut parts = Vec::new();
                if let Some(att) = &attachment {
                    match att.to_inline_part().await {
                        Ok(part) => parts.push(part),
                        Err(e) => return emit(TurnEventKind::Failed(e.to_string())),
                    }
                }
                if !text.is_empty() {
                    parts.push(MessagePart::Text(text));
                }

                let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
                let send = session.send_streaming(parts, chunk_tx);
                let forward = async {
                    let mut failure = None;
                    while let Some(chunk) = chunk_rx.recv().await {
                        match chunk {
                            StreamChunk::Text(delta) if failure.is_none() => {
                                emit(TurnEventKind::Chunk(delta));
                            }
                            StreamChunk::Text(_) => {}
                            StreamChunk::Done { stop_reason } => {
                                debug!(?stop_reason, "stream done");
                            }
                            StreamChunk::Error(msg) => {
                                failure.get_or_insert(msg);
                            }
                        }
                    }
                    failure
                };
                let (sent, failure) = tokio::join!(send, forward);

                let outcome = match (sent, failure) {
                    (Err(e), _) => Err(ConversationError::send(e)),
                    (Ok(()), Some(msg)) => Err(ConversationError::send(msg)),
                    (Ok(()), None) => Ok(()),
                };
                match outcome {
                    Ok(()) => emit(TurnEventKind::StreamFinished),
                    Err(e) => emit(TurnEventKind::Failed(e.to_string())),
                }
            }
            Strategy::DeepSearch { backend, prompt } => {
                if prompt.is_empty() {
                    return emit(TurnEventKind::Failed(
                        "Deep search needs a text query.".to_string(),
                    ));
                }
                match backend.generate_grounded(&prompt).await {
                    Ok(answer) => emit(TurnEventKind::Answer {
                        text: answer.text,
                        citations: usable_citations(answer.sources),
                    }),
                    Err(e) => emit(TurnEventKind::Failed(ConversationError::send(e).to_string())),
                }
            }
        }
    }
}

/// The session manager plus the per-send UI state.
pub struct Conversation {
    sessions: SessionManager,
    deep_search_requested: bool,
    is_sending: bool,
    last_error: Option<String>,
    pending_attachment: Option<Attachment>,
    in_flight: Option<InFlight>,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>, persona_key: &str) -> Self {
        Self {
            sessions: SessionManager::new(backend, persona_key),
            deep_search_requested: false,
            is_sending: false,
            last_error: None,
            pending_attachment: None,
            in_flight: None,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.sessions.transcript()
    }

    pub fn persona(&self) -> &'static Persona {
        self.sessions.persona()
    }

    pub fn token(&self) -> SessionToken {
        self.sessions.token()
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn init_error(&self) -> Option<&str> {
        self.sessions.init_error()
    }

    /// Sending is disabled while no session is bound.
    pub fn can_send(&self) -> bool {
        !self.is_sending && self.sessions.session().is_some()
    }

    pub fn deep_search_requested(&self) -> bool {
        self.deep_search_requested
    }

    pub fn set_deep_search(&mut self, on: bool) {
        self.deep_search_requested = on;
    }

    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.pending_attachment.as_ref()
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.pending_attachment = Some(attachment);
    }

    pub fn discard_attachment(&mut self) -> Option<Attachment> {
        self.pending_attachment.take()
    }

    pub fn is_animating(&self) -> bool {
        self.sessions.is_animating()
    }

    pub fn tick_welcome(&mut self, token: SessionToken) -> bool {
        self.sessions.tick_welcome(token)
    }

    pub fn finish_welcome(&mut self) {
        self.sessions.finish_welcome();
    }

    /// Switch persona. Any send in flight belongs to the old session and its
    /// results will be discarded.
    pub fn select_persona(&mut self, key: &str) -> Result<bool, ConversationError> {
        let switched = self.sessions.select_persona(key);
        if !matches!(switched, Ok(false)) {
            if self.in_flight.take().is_some() {
                debug!("abandoning in-flight turn on persona switch");
            }
            self.is_sending = false;
        }
        switched
    }

    /// Whether the entry at `index` is still being produced: the last entry
    /// of an in-flight send still showing its placeholder, or a welcome frame
    /// with a trailing cursor.
    pub fn is_in_progress(&self, index: usize) -> bool {
        let transcript = self.transcript();
        let Some(entry) = transcript.get(index) else {
            return false;
        };
        if entry.has_cursor() {
            return true;
        }
        match &self.in_flight {
            Some(flight) => {
                index + 1 == transcript.len()
                    && flight.model_index == index
                    && entry.text == flight.placeholder
            }
            None => false,
        }
    }

    /// Start a send. Returns `None` (and changes nothing) when there is
    /// nothing to send, a send is already running, or no session is bound.
    pub fn begin_send(&mut self, input: &str) -> Option<TurnJob> {
        let text = input.trim().to_string();
        if text.is_empty() && self.pending_attachment.is_none() {
            return None;
        }
        if self.is_sending {
            return None;
        }
        let session = self.sessions.session()?;

        self.sessions.finish_welcome();
        self.is_sending = true;
        self.last_error = None;

        let attachment = self.pending_attachment.take();
        let deep = self.deep_search_requested;
        self.sessions
            .append_user_turn(&text, attachment.as_ref().map(|a| a.name.as_str()));

        let placeholder = if deep {
            DEEP_SEARCH_PLACEHOLDER
        } else {
            STREAM_PLACEHOLDER
        };
        let model_index = self.sessions.append_provisional_model_turn(placeholder);
        let token = self.sessions.token();
        self.in_flight = Some(InFlight {
            token,
            model_index,
            placeholder,
            buffer: String::new(),
        });

        let strategy = if deep {
            if attachment.is_some() {
                debug!("deep search ignores the attachment");
            }
            Strategy::DeepSearch {
                backend: self.sessions.backend(),
                prompt: text,
            }
        } else {
            Strategy::Stream {
                session,
                text,
                attachment,
            }
        };
        Some(TurnJob { token, strategy })
    }

    /// Apply a job event to the transcript. Events from a replaced session or
    /// with no matching send are dropped. Returns whether anything changed.
    pub fn apply(&mut self, event: TurnEvent) -> bool {
        let current = self.sessions.token();
        let Some(flight) = self.in_flight.as_mut() else {
            debug!("dropping turn event with no send in flight");
            return false;
        };
        if event.token != flight.token || event.token != current {
            warn!("dropping turn event from a previous session");
            return false;
        }
        let index = flight.model_index;

        match event.kind {
            TurnEventKind::Chunk(delta) => {
                flight.buffer.push_str(&delta);
                let text = flight.buffer.clone();
                self.sessions.update_model_turn(index, &text, None)
            }
            TurnEventKind::StreamFinished => {
                let text = std::mem::take(&mut flight.buffer);
                self.sessions.update_model_turn(index, &text, None);
                self.settle();
                true
            }
            TurnEventKind::Answer { text, citations } => {
                self.sessions.update_model_turn(index, &text, Some(citations));
                self.settle();
                true
            }
            TurnEventKind::Failed(msg) => {
                warn!(error = %msg, "send failed");
                self.sessions.remove_model_turn(index);
                self.last_error = Some(msg);
                self.settle();
                true
            }
        }
    }

    fn settle(&mut self) {
        self.in_flight = None;
        self.is_sending = false;
        self.pending_attachment = None;
        self.deep_search_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_citations_filters_and_keeps_order() {
        let src = |uri: Option<&str>, title: Option<&str>| GroundingSource {
            uri: uri.map(String::from),
            title: title.map(String::from),
        };
        let cites = usable_citations(vec![
            src(Some("https://a"), Some("A")),
            src(Some("https://b"), None),
            src(None, Some("C")),
            src(Some(""), Some("D")),
            src(Some("https://e"), Some("  ")),
            src(Some("https://f"), Some("F")),
        ]);
        assert_eq!(
            cites,
            vec![
                Citation {
                    uri: "https://a".into(),
                    title: "A".into()
                },
                Citation {
                    uri: "https://f".into(),
                    title: "F".into()
                },
            ]
        );
    }
}
