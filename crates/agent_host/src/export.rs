//! Plain-text transcript export.

use crate::error::ConversationError;
use crate::markup;
use chrono::{DateTime, SecondsFormat, Utc};
use shared::transcript::{Role, TranscriptEntry};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

fn render_entry(entry: &TranscriptEntry) -> String {
    let label = match entry.role {
        Role::User => "> User:",
        Role::Model => "< AI:",
    };
    let mut out = format!("{}\n{}", label, markup::to_plain(entry.display_text()));

    let sources = entry.sources();
    if !sources.is_empty() {
        out.push_str("\n\nSources:");
        for (i, c) in sources.iter().enumerate() {
            out.push_str(&format!("\n[{}] {}: {}", i + 1, c.title, c.uri));
        }
    }
    out
}

/// The whole transcript as plain text, entries in conversation order.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(render_entry)
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// `ecoiuris-chat-<ISO 8601 timestamp>.txt`, with `:` replaced so the name is
/// valid on every filesystem.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("ecoiuris-chat-{}.txt", stamp)
}

/// Write the transcript into `dir` and return the file path.
pub fn write_transcript(
    dir: &Path,
    entries: &[TranscriptEntry],
    now: DateTime<Utc>,
) -> Result<PathBuf, ConversationError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    fs::write(&path, render_transcript(entries))?;
    info!(path = %path.display(), entries = entries.len(), "transcript exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::transcript::{Citation, CURSOR_GLYPH};

    fn sample() -> Vec<TranscriptEntry> {
        let mut answer = TranscriptEntry::model("**Force majeure** excuses *performance*.");
        answer.citations = Some(vec![
            Citation {
                uri: "https://law.example/fm".into(),
                title: "FM overview".into(),
            },
            Citation {
                uri: "https://courts.example/123".into(),
                title: "Case 123".into(),
            },
        ]);
        vec![
            TranscriptEntry::model("Welcome"),
            TranscriptEntry::user("What is `force majeure`?"),
            answer,
        ]
    }

    #[test]
    fn test_render_transcript_layout() {
        let text = render_transcript(&sample());
        assert_eq!(
            text,
            "< AI:\nWelcome\n\n---\n\n\
             > User:\nWhat is force majeure?\n\n---\n\n\
             < AI:\nForce majeure excuses performance.\n\n\
             Sources:\n[1] FM overview: https://law.example/fm\n[2] Case 123: https://courts.example/123"
        );
    }

    #[test]
    fn test_labels_appear_once_per_entry_in_order() {
        let text = render_transcript(&sample());
        assert_eq!(text.matches("> User:").count(), 1);
        assert_eq!(text.matches("< AI:").count(), 2);
        assert_eq!(text.matches("Sources:").count(), 1);
        let user = text.find("> User:").unwrap();
        let last_ai = text.rfind("< AI:").unwrap();
        assert!(user < last_ai);
    }

    #[test]
    fn test_cursor_and_empty_citations_are_dropped() {
        let mut e = TranscriptEntry::model(format!("Typing{}", CURSOR_GLYPH));
        e.citations = Some(Vec::new());
        assert_eq!(render_transcript(&[e]), "< AI:\nTyping");
    }

    #[test]
    fn test_file_name_and_write() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        assert_eq!(
            export_file_name(now),
            "ecoiuris-chat-2026-10-19T08-30-05.000Z.txt"
        );

        let dir = tempfile::tempdir().unwrap();
        let path = write_transcript(&dir.path().join("exports"), &sample(), now).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_transcript(&sample()));
    }
}
