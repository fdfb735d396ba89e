//! Transcript entries for the active conversation.

use serde::{Deserialize, Serialize};

/// Trailing glyph shown while the welcome banner is being typed out.
pub const CURSOR_GLYPH: char = '▋';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            citations: None,
        }
    }

    /// Citations, treating an empty list the same as none.
    pub fn sources(&self) -> &[Citation] {
        self.citations.as_deref().unwrap_or(&[])
    }

    pub fn has_cursor(&self) -> bool {
        self.text.ends_with(CURSOR_GLYPH)
    }

    /// Text with a trailing cursor glyph removed.
    pub fn display_text(&self) -> &str {
        self.text.strip_suffix(CURSOR_GLYPH).unwrap_or(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_strips_cursor() {
        let e = TranscriptEntry::model(format!("Hello{}", CURSOR_GLYPH));
        assert!(e.has_cursor());
        assert_eq!(e.display_text(), "Hello");

        let done = TranscriptEntry::model("Hello");
        assert!(!done.has_cursor());
        assert_eq!(done.display_text(), "Hello");
    }

    #[test]
    fn test_sources_empty_when_missing() {
        let mut e = TranscriptEntry::model("x");
        assert!(e.sources().is_empty());
        e.citations = Some(vec![Citation {
            uri: "https://a".into(),
            title: "A".into(),
        }]);
        assert_eq!(e.sources().len(), 1);
    }
}
