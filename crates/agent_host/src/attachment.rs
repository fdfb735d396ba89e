//! Pending file attachment and its conversion to inline request data.

use crate::error::ConversationError;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use shared::agent_api::MessagePart;
use std::path::{Path, PathBuf};

/// A file the user picked for the next send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
}

/// PDF, image, video and audio files are accepted.
pub fn is_accepted_mime(mime: &str) -> bool {
    mime == "application/pdf"
        || ["image/", "video/", "audio/"]
            .iter()
            .any(|family| mime.starts_with(family))
}

impl Attachment {
    /// Validate a user-supplied path. The file is not read until the send.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConversationError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConversationError::Attachment(format!(
                "{} is not a readable file",
                path.display()
            )));
        }
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        if !is_accepted_mime(&mime_type) {
            return Err(ConversationError::Attachment(format!(
                "unsupported file type {} (PDF, image, video or audio only)",
                mime_type
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime_type,
        })
    }

    /// Read the file and encode it as base64 inline data.
    pub async fn to_inline_part(&self) -> Result<MessagePart, ConversationError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ConversationError::Attachment(format!("could not read {}: {}", self.name, e))
        })?;
        Ok(MessagePart::InlineData {
            mime_type: self.mime_type.clone(),
            data: BASE64_STANDARD.encode(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_accepted_families() {
        assert!(is_accepted_mime("application/pdf"));
        assert!(is_accepted_mime("image/png"));
        assert!(is_accepted_mime("audio/mpeg"));
        assert!(is_accepted_mime("video/mp4"));
        assert!(!is_accepted_mime("text/plain"));
        assert!(!is_accepted_mime("application/zip"));
    }

    #[test]
    fn test_from_path_rejects_unsupported_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "hello").unwrap();
        assert!(matches!(
            Attachment::from_path(&notes),
            Err(ConversationError::Attachment(_))
        ));
        assert!(Attachment::from_path(dir.path().join("missing.pdf")).is_err());
        assert!(Attachment::from_path(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_inline_part_is_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        fs::write(&path, b"%PDF-1.4").unwrap();

        let att = Attachment::from_path(&path).unwrap();
        assert_eq!(att.name, "contract.pdf");
        assert_eq!(att.mime_type, "application/pdf");

        let part = att.to_inline_part().await.unwrap();
        assert_eq!(
            part,
            MessagePart::InlineData {
                mime_type: "application/pdf".into(),
                data: "JVBERi0xLjQ=".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_inline_part_fails_when_file_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        fs::write(&path, [0u8; 4]).unwrap();
        let att = Attachment::from_path(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(att.to_inline_part().await.is_err());
    }
}
