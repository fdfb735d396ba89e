pub mod personas;
pub mod transcript;

pub mod settings {
    use serde::{Deserialize, Serialize};

    fn default_model() -> String {
        "gemini-2.5-flash".into()
    }

    fn default_welcome_interval_ms() -> u64 {
        5
    }

    fn default_persona() -> String {
        crate::personas::DEFAULT_PERSONA.into()
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        /// Model used for streamed chat turns, e.g. "gemini-2.5-flash"
        #[serde(default = "default_model")]
        pub gemini_model: String,
        /// Model used for grounded (deep search) completions
        #[serde(default = "default_model")]
        pub search_model: String,
        #[serde(default)]
        pub gemini_auth: ProviderAuth,
        /// Delay between welcome banner frames
        #[serde(default = "default_welcome_interval_ms")]
        pub welcome_interval_ms: u64,
        #[serde(default = "default_persona")]
        pub default_persona: String,
        /// Where transcripts are exported; current directory when unset
        #[serde(default)]
        pub export_dir: Option<String>,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                gemini_model: default_model(),
                search_model: default_model(),
                gemini_auth: ProviderAuth::default(),
                welcome_interval_ms: default_welcome_interval_ms(),
                default_persona: default_persona(),
                export_dir: None,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_partial_settings_fill_defaults() {
            let s: AppSettings =
                serde_json::from_str(r#"{"gemini_model":"gemini-2.5-pro"}"#).unwrap();
            assert_eq!(s.gemini_model, "gemini-2.5-pro");
            assert_eq!(s.search_model, "gemini-2.5-flash");
            assert_eq!(s.welcome_interval_ms, 5);
            assert_eq!(s.default_persona, "legal_pro");
            assert!(s.gemini_auth.api_key.is_none());
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// One piece of a user message sent to the model.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum MessagePart {
        Text(String),
        /// Base64-encoded file contents with their MIME type
        InlineData { mime_type: String, data: String },
    }

    /// Incremental output of a streamed reply.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamChunk {
        Text(String),
        Done { stop_reason: Option<String> },
        Error(String),
    }

    /// A web source backing a grounded answer. Either field may be missing in
    /// the raw API payload.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GroundingSource {
        pub uri: Option<String>,
        pub title: Option<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GroundedAnswer {
        pub text: String,
        pub sources: Vec<GroundingSource>,
    }
}
