//! Session management for the active persona.
//!
//! Exactly one persona is active at a time and exactly one chat session is
//! bound to it. Switching personas discards the old session and transcript;
//! anything still addressed to the old session is rejected by token.

use crate::error::ConversationError;
use crate::welcome::WelcomeAnimation;
use providers::{ChatBackend, ChatSession};
use shared::personas::{self, Persona};
use shared::transcript::{Citation, Role, TranscriptEntry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies the session a piece of work was issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

pub struct SessionManager {
    backend: Arc<dyn ChatBackend>,
    persona: &'static Persona,
    session: Option<Arc<dyn ChatSession>>,
    token: SessionToken,
    transcript: Vec<TranscriptEntry>,
    welcome: Option<WelcomeAnimation>,
    init_error: Option<String>,
}

impl SessionManager {
    /// Start on `persona_key`, falling back to the default persona when the
    /// key is unknown. A failed session start is kept in `init_error`.
    pub fn new(backend: Arc<dyn ChatBackend>, persona_key: &str) -> Self {
        let persona = personas::find(persona_key)
            .or_else(|| personas::find(personas::DEFAULT_PERSONA))
            .unwrap_or(&personas::PERSONAS[0]);
        let mut mgr = Self {
            backend,
            persona,
            session: None,
            token: SessionToken(0),
            transcript: Vec::new(),
            welcome: None,
            init_error: None,
        };
        let _ = mgr.start_session(persona);
        mgr
    }

    /// Switch to another persona. Unknown keys are ignored (`Ok(false)`).
    pub fn select_persona(&mut self, key: &str) -> Result<bool, ConversationError> {
        let Some(persona) = personas::find(key) else {
            debug!(key, "ignoring unknown persona");
            return Ok(false);
        };
        self.start_session(persona)?;
        Ok(true)
    }

    fn start_session(&mut self, persona: &'static Persona) -> Result<(), ConversationError> {
        // stop the previous animation before seeding the new transcript
        self.welcome = None;
        self.session = None;
        self.token = SessionToken(self.token.0 + 1);
        self.persona = persona;

        let banner = personas::welcome_banner(persona);
        let anim = WelcomeAnimation::new(&banner);
        self.transcript = vec![TranscriptEntry::model(if anim.is_finished() {
            banner
        } else {
            String::new()
        })];
        if !anim.is_finished() {
            self.welcome = Some(anim);
        }

        match self.backend.create_session(persona.system_instruction) {
            Ok(session) => {
                info!(persona = persona.key, "chat session started");
                self.session = Some(session);
                self.init_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(persona = persona.key, error = %e, "chat session failed to start");
                let err = ConversationError::Initialization(e.to_string());
                self.init_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn persona(&self) -> &'static Persona {
        self.persona
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn session(&self) -> Option<Arc<dyn ChatSession>> {
        self.session.clone()
    }

    pub fn backend(&self) -> Arc<dyn ChatBackend> {
        self.backend.clone()
    }

    pub fn init_error(&self) -> Option<&str> {
        self.init_error.as_deref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_animating(&self) -> bool {
        self.welcome.is_some()
    }

    /// Advance the welcome banner by one frame. Ticks carrying a superseded
    /// token are ignored. Returns whether the animation is still running.
    pub fn tick_welcome(&mut self, token: SessionToken) -> bool {
        if token != self.token {
            debug!("dropping welcome tick from a previous session");
            return false;
        }
        let Some(anim) = self.welcome.as_mut() else {
            return false;
        };
        if let (Some(frame), Some(entry)) = (anim.next_frame(), self.transcript.first_mut()) {
            entry.text = frame;
        }
        if anim.is_finished() {
            self.welcome = None;
        }
        self.welcome.is_some()
    }

    /// Jump straight to the final banner frame.
    pub fn finish_welcome(&mut self) {
        if let Some(anim) = self.welcome.take() {
            if let Some(entry) = self.transcript.first_mut() {
                entry.text = anim.banner();
            }
        }
    }

    /// Append the user's message, annotated with the attachment name if any.
    pub fn append_user_turn(&mut self, text: &str, attachment_name: Option<&str>) -> usize {
        let mut text = text.to_string();
        if let Some(name) = attachment_name {
            text.push_str(&format!("\n\n[File Attached: {}]", name));
        }
        self.transcript.push(TranscriptEntry::user(text));
        self.transcript.len() - 1
    }

    pub fn append_provisional_model_turn(&mut self, placeholder: &str) -> usize {
        self.transcript.push(TranscriptEntry::model(placeholder));
        self.transcript.len() - 1
    }

    fn is_last_model(&self, index: usize) -> bool {
        index + 1 == self.transcript.len() && self.transcript[index].role == Role::Model
    }

    /// Replace the last (model) entry in place. Returns false when `index`
    /// is not the last model entry.
    pub fn update_model_turn(
        &mut self,
        index: usize,
        text: &str,
        citations: Option<Vec<Citation>>,
    ) -> bool {
        if !self.is_last_model(index) {
            warn!(index, len = self.transcript.len(), "refusing to update non-final entry");
            return false;
        }
        let entry = &mut self.transcript[index];
        entry.text = text.to_string();
        entry.citations = citations;
        true
    }

    /// Roll back a provisional model entry. Only the last entry can go.
    pub fn remove_model_turn(&mut self, index: usize) -> bool {
        if !self.is_last_model(index) {
            warn!(index, len = self.transcript.len(), "refusing to remove non-final entry");
            return false;
        }
        self.transcript.pop();
        true
    }
}
