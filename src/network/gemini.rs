//! Streaming client for the Gemini `streamGenerateContent` endpoint.
//!
//! Each conversation gets its own [`GeminiSession`] holding the multi-turn
//! history, created on first use and cached for the life of the client.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::model::{FragmentStream, LanguageModel, ModelError};
use super::sse::SseDecoder;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_instruction: String,
}

/// One turn of a conversation as the API sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    fn turn(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    fn instruction(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    system_instruction: &'a Content,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Finish reasons that mean the candidate was withheld.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// Non-2xx bodies come as one envelope or, from the streaming endpoint, as
/// an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorPayload {
    Many(Vec<ApiErrorEnvelope>),
    One(ApiErrorEnvelope),
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

/// Decode one SSE payload into the text it carries. `Ok(None)` for events
/// without text, such as the trailing usage-metadata chunk.
fn parse_event(data: &str) -> Result<Option<String>, ModelError> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;

    if let Some(error) = response.error {
        return Err(ModelError::Api {
            status: error.code,
            message: error.message,
        });
    }

    let candidate = response.candidates.first();
    if let Some(reason) = candidate
        .and_then(|candidate| candidate.finish_reason.as_deref())
        .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
    {
        return Err(ModelError::Blocked(reason.to_string()));
    }

    let text: String = candidate
        .and_then(|candidate| candidate.content.as_ref())
        .map(Content::text)
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(ModelError::Blocked(reason));
        }
        return Ok(None);
    }
    Ok(Some(text))
}

/// Build an error from a non-2xx response body, which may be a bare error
/// envelope or an array of them.
fn api_error(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<ApiErrorPayload>(body)
        .ok()
        .and_then(|payload| match payload {
            ApiErrorPayload::Many(envelopes) => envelopes.into_iter().next(),
            ApiErrorPayload::One(envelope) => Some(envelope),
        })
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    ModelError::Api { status, message }
}

/// Caches one session per conversation id.
pub struct GeminiClient {
    http: reqwest::Client,
    config: Arc<GeminiConfig>,
    sessions: Mutex<HashMap<String, Arc<GeminiSession>>>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get the session for `conversation_id`, creating it on first use.
    pub fn session(&self, conversation_id: &str) -> Arc<GeminiSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                log::debug!("Creating Gemini session for {conversation_id}");
                Arc::new(GeminiSession {
                    conversation_id: conversation_id.to_string(),
                    http: self.http.clone(),
                    config: Arc::clone(&self.config),
                    history: Mutex::new(Vec::new()),
                })
            })
            .clone()
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn send_message_stream(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<FragmentStream, ModelError> {
        self.session(conversation_id).send_message_stream(text).await
    }
}

pub struct GeminiSession {
    conversation_id: String,
    http: reqwest::Client,
    config: Arc<GeminiConfig>,
    history: Mutex<Vec<Content>>,
}

impl GeminiSession {
    /// Completed turns, oldest first.
    pub fn history(&self) -> Vec<Content> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    pub async fn send_message_stream(
        self: Arc<Self>,
        text: &str,
    ) -> Result<FragmentStream, ModelError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey)?;

        let user_turn = Content::turn("user", text);
        let mut contents = self.history();
        contents.push(user_turn.clone());
        let system_instruction = Content::instruction(&self.config.system_instruction);

        log::debug!(
            "Sending turn {} of session {} to {}",
            contents.len(),
            self.conversation_id,
            self.config.model
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&GenerateContentRequest {
                contents: &contents,
                system_instruction: &system_instruction,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(fragment_stream(bytes, self, user_turn))
    }

    fn commit_turn(&self, user_turn: Content, reply: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(user_turn);
        history.push(Content::turn("model", reply));
    }
}

struct ReplyStream {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ModelError>>,
    reply: String,
    session: Arc<GeminiSession>,
    user_turn: Option<Content>,
    finished: bool,
}

impl ReplyStream {
    fn absorb(&mut self, events: impl IntoIterator<Item = String>) {
        for data in events {
            match parse_event(&data) {
                Ok(Some(text)) => {
                    self.reply.push_str(&text);
                    self.pending.push_back(Ok(text));
                }
                Ok(None) => {}
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, err: ModelError) {
        self.pending.push_back(Err(err));
        self.user_turn = None;
        self.finished = true;
    }
}

/// Turn the raw body into text fragments. The turn is recorded in the
/// session only when the body ends without an error and with some text.
fn fragment_stream(
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    session: Arc<GeminiSession>,
    user_turn: Content,
) -> FragmentStream {
    let state = ReplyStream {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        reply: String::new(),
        session,
        user_turn: Some(user_turn),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(&chunk);
                    state.absorb(events);
                }
                Some(Err(err)) => state.fail(err.into()),
                None => {
                    let tail = state.decoder.finish();
                    state.absorb(tail);
                    if state.finished {
                        continue;
                    }
                    if state.reply.is_empty() {
                        state.fail(ModelError::EmptyReply);
                        continue;
                    }
                    if let Some(user_turn) = state.user_turn.take() {
                        state.session.commit_turn(user_turn, &state.reply);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key: api_key.map(str::to_string),
            base_url: "http://127.0.0.1:9/".to_string(),
            model: "gemini-test".to_string(),
            system_instruction: "be brief".to_string(),
        }
    }

    fn body(chunks: &[&str]) -> BoxStream<'static, reqwest::Result<Vec<u8>>> {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = chunks
            .iter()
            .map(|chunk| Ok(chunk.as_bytes().to_vec()))
            .collect();
        stream::iter(chunks).boxed()
    }

    fn event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":{}}}]}}}}]}}\r\n\r\n",
            serde_json::to_string(text).unwrap()
        )
    }

    #[test]
    fn parse_event_concatenates_text_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"},{"text":"!"}]}}]}"#;
        assert_eq!(parse_event(data).unwrap().as_deref(), Some("Hi!"));
    }

    #[test]
    fn parse_event_without_text_is_skipped() {
        let data = r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":3}}"#;
        assert_eq!(parse_event(data).unwrap(), None);
    }

    #[test]
    fn parse_event_reports_blocked_prompt() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(parse_event(data), Err(ModelError::Blocked(reason)) if reason == "SAFETY"));
    }

    #[test]
    fn parse_event_reports_inline_error() {
        let data = r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#;
        assert!(matches!(
            parse_event(data),
            Err(ModelError::Api { status: 503, message }) if message == "overloaded"
        ));
    }

    #[test]
    fn api_error_reads_envelope_or_falls_back_to_body() {
        let envelope = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            api_error(400, envelope),
            ModelError::Api { status: 400, message } if message == "API key not valid"
        ));

        let array = format!("[{envelope}]");
        assert!(matches!(
            api_error(400, &array),
            ModelError::Api { message, .. } if message == "API key not valid"
        ));

        assert!(matches!(
            api_error(502, " Bad Gateway \n"),
            ModelError::Api { status: 502, message } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn api_error_reads_streaming_endpoint_array_body() {
        let response = "[{\n  \"error\": {\n    \"code\": 429,\n    \"message\": \"Resource has been exhausted\",\n    \"status\": \"RESOURCE_EXHAUSTED\"\n  }\n}\n]\n";
        assert!(matches!(
            api_error(429, response),
            ModelError::Api { status: 429, message } if message == "Resource has been exhausted"
        ));

        assert!(matches!(
            api_error(500, "[]"),
            ModelError::Api { status: 500, message } if message == "[]"
        ));
    }

    #[test]
    fn parse_event_reports_candidate_level_block() {
        let data = r#"{"candidates":[{"finishReason":"SAFETY","index":0}]}"#;
        assert!(matches!(parse_event(data), Err(ModelError::Blocked(reason)) if reason == "SAFETY"));

        let recitation = r#"{"candidates":[{"content":{"parts":[{"text":"x"}]},"finishReason":"RECITATION"}]}"#;
        assert!(matches!(parse_event(recitation), Err(ModelError::Blocked(reason)) if reason == "RECITATION"));
    }

    #[test]
    fn session_is_created_once_per_conversation() {
        let client = GeminiClient::new(config(Some("key")));
        let first = client.session("conv_1");
        let again = client.session("conv_1");
        let other = client.session("conv_2");

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn endpoint_targets_configured_model() {
        let client = GeminiClient::new(config(Some("key")));
        assert_eq!(
            client.session("conv_1").endpoint(),
            "http://127.0.0.1:9/v1beta/models/gemini-test:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new(config(None));
        let result = client.send_message_stream("conv_1", "hello").await;
        assert!(matches!(result, Err(ModelError::MissingApiKey)));
    }

    #[tokio::test]
    async fn completed_stream_yields_fragments_and_records_turn() {
        let client = GeminiClient::new(config(Some("key")));
        let session = client.session("conv_1");

        let first = event("Hi");
        let second = event("! ");
        let (second_head, second_tail) = second.split_at(10);
        let chunks = [first.as_str(), second_head, second_tail, "data: {\"candidates\":[]}\n\n"];
        let fragments: Vec<String> = fragment_stream(
            body(&chunks),
            Arc::clone(&session),
            Content::turn("user", "hello"),
        )
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;

        assert_eq!(fragments, vec!["Hi", "! "]);
        assert_eq!(
            session.history(),
            vec![Content::turn("user", "hello"), Content::turn("model", "Hi! ")]
        );
    }

    #[tokio::test]
    async fn failed_stream_keeps_history_untouched() {
        let client = GeminiClient::new(config(Some("key")));
        let session = client.session("conv_1");

        let first = event("partial");
        let never = event("never");
        let chunks = [first.as_str(), "data: {broken\n\n", never.as_str()];
        let mut fragments = fragment_stream(
            body(&chunks),
            Arc::clone(&session),
            Content::turn("user", "hello"),
        );

        assert_eq!(fragments.next().await.unwrap().unwrap(), "partial");
        assert!(matches!(fragments.next().await, Some(Err(ModelError::Decode(_)))));
        assert!(fragments.next().await.is_none());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn blocked_candidate_fails_without_recording_turn() {
        let client = GeminiClient::new(config(Some("key")));
        let session = client.session("conv_1");

        let chunks = ["data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n"];
        let results: Vec<Result<String, ModelError>> = fragment_stream(
            body(&chunks),
            Arc::clone(&session),
            Content::turn("user", "hello"),
        )
        .collect()
        .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Err(ModelError::Blocked(reason)) if reason == "SAFETY"));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn stream_without_text_fails_without_recording_turn() {
        let client = GeminiClient::new(config(Some("key")));
        let session = client.session("conv_1");

        let chunks = [
            "data: {\"candidates\":[{\"content\":{\"parts\":[]}}]}\n\n",
            "data: {\"candidates\":[{\"finishReason\":\"STOP\"}],\"usageMetadata\":{}}\n\n",
        ];
        let results: Vec<Result<String, ModelError>> = fragment_stream(
            body(&chunks),
            Arc::clone(&session),
            Content::turn("user", "hello"),
        )
        .collect()
        .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ModelError::EmptyReply)));
        assert!(session.history().is_empty());
    }
}
