use crate::backend::{ChatBackend, ChatSession};
use crate::sse::SseParser;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::agent_api::{GroundedAnswer, GroundingSource, MessagePart, StreamChunk};
use shared::settings::ProviderAuth;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![GeminiPart::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<MessagePart> for GeminiPart {
    fn from(part: MessagePart) -> Self {
        match part {
            MessagePart::Text(text) => GeminiPart::Text { text },
            MessagePart::InlineData { mime_type, data } => GeminiPart::InlineData {
                inline_data: InlineData { mime_type, data },
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize)]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Default, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: &'a [GeminiContent],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiResponse {
    fn block_reason(&self) -> Option<&str> {
        if !self.candidates.is_empty() {
            return None;
        }
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }

    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>(),
        )
    }
}

// ── Parsing helpers ──────────────────────────────────────────────────

/// Text delta and finish reason carried by one streamed event.
#[derive(Debug, Default, PartialEq, Eq)]
struct StreamDelta {
    text: Option<String>,
    finish_reason: Option<String>,
}

fn parse_stream_event(data: &str) -> Result<StreamDelta> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return Err(anyhow!("gemini error: {}", envelope.error.describe()));
    }
    let resp: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| anyhow!("malformed gemini stream payload: {}", e))?;
    if let Some(reason) = resp.block_reason() {
        return Err(anyhow!("gemini blocked the prompt: {}", reason));
    }
    Ok(StreamDelta {
        text: resp.first_text().filter(|t| !t.is_empty()),
        finish_reason: resp.candidates.first().and_then(|c| c.finish_reason.clone()),
    })
}

/// Decode one event, forward its text and remember the finish reason.
fn forward_event(
    data: &str,
    reply: &mut String,
    stop_reason: &mut Option<String>,
    tx: &UnboundedSender<StreamChunk>,
) -> Result<()> {
    let delta = parse_stream_event(data)?;
    if let Some(text) = delta.text {
        reply.push_str(&text);
        let _ = tx.send(StreamChunk::Text(text));
    }
    if delta.finish_reason.is_some() {
        *stop_reason = delta.finish_reason;
    }
    Ok(())
}

fn grounded_answer(resp: GeminiResponse) -> Result<GroundedAnswer> {
    if let Some(reason) = resp.block_reason() {
        return Err(anyhow!("gemini blocked the prompt: {}", reason));
    }
    let text = resp
        .first_text()
        .ok_or_else(|| anyhow!("gemini returned no answer"))?;
    let sources = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.grounding_metadata)
        .map(|m| m.grounding_chunks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .map(|web| GroundingSource {
            uri: web.uri,
            title: web.title,
        })
        .collect();
    Ok(GroundedAnswer { text, sources })
}

impl ErrorBody {
    fn describe(&self) -> String {
        match (&self.status, &self.message) {
            (Some(status), Some(msg)) => format!("{} ({})", msg, status),
            (None, Some(msg)) => msg.clone(),
            (Some(status), None) => status.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let body = body.trim();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return anyhow!("gemini error: {}\n{}", status, envelope.error.describe());
    }
    if body.is_empty() {
        return anyhow!("gemini error: {}", status);
    }
    let detail: String = body.chars().take(800).collect();
    anyhow!("gemini error: {}\n{}", status, detail)
}

// ── Client ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
    search_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn from_auth(model: &str, search_model: &str, auth: &ProviderAuth) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow!("No Gemini API key configured (set GEMINI_API_KEY)"))?,
        };

        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(120)).build()?,
            auth_token,
            model: model.to_string(),
            search_model: search_model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post(&self, url: &str, req: &GeminiRequest<'_>) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.auth_token)
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    fn create_session(&self, system_instruction: &str) -> Result<Arc<dyn ChatSession>> {
        debug!(model = %self.model, "opening gemini chat session");
        Ok(Arc::new(GeminiSession {
            client: self.clone(),
            system_instruction: system_instruction.to_string(),
            history: Mutex::new(Vec::new()),
        }))
    }

    async fn generate_grounded(&self, prompt: &str) -> Result<GroundedAnswer> {
        let contents = [GeminiContent::text("user", prompt)];
        let req = GeminiRequest {
            contents: &contents,
            system_instruction: None,
            tools: vec![GeminiTool::default()],
        };
        let url = self.endpoint(&self.search_model, "generateContent");
        let resp = self.post(&url, &req).await?;
        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("malformed gemini response: {}", e))?;
        let answer = grounded_answer(body)?;
        debug!(sources = answer.sources.len(), "grounded answer received");
        Ok(answer)
    }
}

/// Chat context for one persona. Gemini's REST API is stateless, so the
/// user/model history is kept here and replayed with every request.
pub struct GeminiSession {
    client: GeminiClient,
    system_instruction: String,
    history: Mutex<Vec<GeminiContent>>,
}

impl GeminiSession {
    fn report(tx: &UnboundedSender<StreamChunk>, err: anyhow::Error) {
        let _ = tx.send(StreamChunk::Error(err.to_string()));
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send_streaming(
        &self,
        parts: Vec<MessagePart>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let user = GeminiContent {
            role: "user".to_string(),
            parts: parts.into_iter().map(GeminiPart::from).collect(),
        };
        let mut contents = self.history.lock().clone();
        contents.push(user.clone());

        let req = GeminiRequest {
            contents: &contents,
            system_instruction: Some(SystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: self.system_instruction.clone(),
                }],
            }),
            tools: Vec::new(),
        };
        let url = format!(
            "{}?alt=sse",
            self.client
                .endpoint(&self.client.model, "streamGenerateContent")
        );
        let resp = self.client.post(&url, &req).await?;

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();
        let mut reply = String::new();
        let mut stop_reason = None;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    Self::report(&tx, anyhow!("stream read error: {}", e));
                    return Ok(());
                }
            };
            for event in parser.feed(&bytes) {
                if let Err(e) = forward_event(&event.data, &mut reply, &mut stop_reason, &tx) {
                    Self::report(&tx, e);
                    return Ok(());
                }
            }
        }
        if let Some(event) = parser.finish() {
            if let Err(e) = forward_event(&event.data, &mut reply, &mut stop_reason, &tx) {
                Self::report(&tx, e);
                return Ok(());
            }
        }

        debug!(chars = reply.len(), ?stop_reason, "gemini stream finished");
        let mut history = self.history.lock();
        history.push(user);
        history.push(GeminiContent::text("model", reply));
        drop(history);
        let _ = tx.send(StreamChunk::Done { stop_reason });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_text_chunk() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Force "}]}}]}"#;
        let delta = parse_stream_event(data).unwrap();
        assert_eq!(delta.text.as_deref(), Some("Force "));
        assert!(delta.finish_reason.is_none());
    }

    #[test]
    fn test_parse_stream_finish_without_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":""}]},"finishReason":"STOP"}]}"#;
        let delta = parse_stream_event(data).unwrap();
        assert!(delta.text.is_none());
        assert_eq!(delta.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_stream_errors() {
        let err = parse_stream_event("not json").unwrap_err();
        assert!(err.to_string().contains("malformed"));

        let err = parse_stream_event(
            r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Resource exhausted"));

        let err = parse_stream_event(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_grounded_answer_keeps_raw_sources_in_order() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{
              "candidates": [{
                "content": {"parts": [{"text": "Force majeure "}, {"text": "excuses performance."}]},
                "groundingMetadata": {
                  "groundingChunks": [
                    {"web": {"uri": "https://a.example", "title": "A"}},
                    {"web": {"uri": "https://b.example"}},
                    {"retrievedContext": {"uri": "gs://x"}},
                    {"web": {"uri": "https://c.example", "title": "C"}}
                  ]
                }
              }]
            }"#,
        )
        .unwrap();
        let answer = grounded_answer(body).unwrap();
        assert_eq!(answer.text, "Force majeure excuses performance.");
        assert_eq!(answer.sources.len(), 3);
        assert_eq!(answer.sources[0].title.as_deref(), Some("A"));
        assert!(answer.sources[1].title.is_none());
        assert_eq!(answer.sources[2].uri.as_deref(), Some("https://c.example"));
    }

    #[test]
    fn test_grounded_answer_without_candidates_fails() {
        let err = grounded_answer(GeminiResponse::default()).unwrap_err();
        assert!(err.to_string().contains("no answer"));
    }

    #[test]
    fn test_api_error_prefers_envelope_message() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
        );
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("API key not valid"));

        let long = "x".repeat(2000);
        let msg = api_error(StatusCode::BAD_GATEWAY, &long).to_string();
        assert!(msg.len() < 900);
        assert_eq!(
            api_error(StatusCode::BAD_GATEWAY, "  ").to_string(),
            "gemini error: 502 Bad Gateway"
        );
    }

    #[test]
    fn test_request_serialization() {
        let contents = [GeminiContent {
            role: "user".into(),
            parts: vec![
                MessagePart::InlineData {
                    mime_type: "application/pdf".into(),
                    data: "QUJD".into(),
                }
                .into(),
                MessagePart::Text("Summarise".into()).into(),
            ],
        }];
        let req = GeminiRequest {
            contents: &contents,
            system_instruction: Some(SystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: "be brief".into(),
                }],
            }),
            tools: Vec::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "application/pdf"
        );
        assert_eq!(json["contents"][0]["parts"][1]["text"], "Summarise");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(json.get("tools").is_none());

        let search = GeminiRequest {
            contents: &contents,
            system_instruction: None,
            tools: vec![GeminiTool::default()],
        };
        let json = serde_json::to_value(&search).unwrap();
        assert!(json["tools"][0]["google_search"].is_object());
        assert!(json.get("systemInstruction").is_none());
    }
}
