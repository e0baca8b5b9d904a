//! LLM provider abstraction
//!
//! Three call shapes over one chat-completion primitive:
//! - `chat`: single non-streaming call
//! - `chat_stream`: lazy sequence of content deltas (one pass per call)
//! - `chat_json`: JSON-constrained call with a single repair round
//!
//! Provider failures are surfaced, never retried here. The one retry-shaped
//! step is the JSON repair call, which is content repair, not fault handling.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Options for a chat call
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Temperature (0.0 - 1.0)
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// A lazy stream of content deltas. Single pass: re-invoking `chat_stream`
/// issues a new request.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for chat-completion providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Single non-streaming call; returns the full response text
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String>;

    /// Streaming call; yields content deltas as they arrive
    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions)
        -> Result<TokenStream>;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    /// Create a new client
    pub fn new(endpoint: String, api_key: String, model: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, endpoint, api_key, model })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            stream,
        };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmProvider {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmProvider {
                message: format!("API error {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String> {
        let response = self.send(messages, opts, false).await?;

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            AppError::LlmProvider {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LlmProvider {
                message: "Empty response from LLM".to_string(),
            })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<TokenStream> {
        let response = self.send(messages, opts, true).await?;

        let (tx, rx) = mpsc::unbounded::<Result<String>>();

        // Forward SSE lines from the network stream into the channel. The
        // task ends when the stream closes or the receiver is dropped.
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            'outer: while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(Err(AppError::LlmProvider {
                            message: format!("Stream error: {}", e),
                        }));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        break 'outer;
                    }

                    let token = serde_json::from_str::<StreamChunk>(data)
                        .ok()
                        .and_then(|c| c.choices.into_iter().next())
                        .and_then(|c| c.delta.content);

                    if let Some(token) = token {
                        if !token.is_empty() && tx.unbounded_send(Ok(token)).is_err() {
                            // Receiver dropped; stop reading
                            break 'outer;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(rx))
    }
}

/// System instruction prepended to every JSON-constrained call
const JSON_SYSTEM_INSTRUCTION: &str =
    "You are a JSON generator. Respond with raw JSON only. \
     Do not wrap the output in markdown code fences and do not add commentary.";

/// Call the provider expecting JSON output, with one repair round.
///
/// The system instruction demanding raw JSON is prepended, temperature is
/// forced to 0, and markdown code fences are stripped before parsing. On a
/// parse failure the malformed output is appended together with a fix request
/// and the call is retried exactly once; a second failure propagates as
/// `LlmJsonParse`. Shape validation against a concrete schema is the caller's
/// job (deserialize the returned value into typed structs).
pub async fn chat_json(
    provider: &dyn ChatProvider,
    messages: &[ChatMessage],
    max_tokens: Option<u32>,
) -> Result<serde_json::Value> {
    let opts = ChatOptions {
        temperature: 0.0,
        max_tokens,
    };

    let mut full: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 3);
    full.push(ChatMessage::system(JSON_SYSTEM_INSTRUCTION));
    full.extend_from_slice(messages);

    let raw = provider.chat(&full, &opts).await?;

    match parse_json_output(&raw) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            tracing::warn!(error = %first_err, "LLM output was not valid JSON, attempting repair");

            full.push(ChatMessage::assistant(raw.as_str()));
            full.push(ChatMessage::user(
                "The previous output was not valid JSON. \
                 Respond again with the corrected raw JSON only.",
            ));

            let repaired = provider.chat(&full, &opts).await?;
            parse_json_output(&repaired).map_err(|e| AppError::LlmJsonParse {
                message: format!("{} (after one repair attempt)", e),
            })
        }
    }
}

/// Strip markdown code fences and parse
fn parse_json_output(raw: &str) -> std::result::Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw).as_ref())
}

fn strip_code_fences(raw: &str) -> std::borrow::Cow<'_, str> {
    let fence = regex_lite::Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap();
    match fence.captures(raw) {
        Some(caps) => std::borrow::Cow::Owned(caps[1].to_string()),
        None => std::borrow::Cow::Borrowed(raw.trim()),
    }
}

/// Scripted chat provider for testing. Responses are consumed front to back;
/// every call's messages are recorded for assertions.
pub struct MockChat {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChat {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Messages of the nth call
    pub fn call_messages(&self, n: usize) -> Vec<ChatMessage> {
        self.calls.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ChatProvider for MockChat {
    async fn chat(&self, messages: &[ChatMessage], _opts: &ChatOptions) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::LlmProvider {
                message: "MockChat has no scripted response left".to_string(),
            })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<TokenStream> {
        let text = self.chat(messages, opts).await?;
        let tokens: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(tokens)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_chat_json_parses_directly() {
        let mock = MockChat::new(vec![r#"{"ok": true}"#]);
        let value = chat_json(&mock, &[ChatMessage::user("give me json")], None)
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(mock.call_count(), 1);
        // The raw-JSON system instruction is prepended
        assert_eq!(mock.call_messages(0)[0].role, "system");
    }

    #[tokio::test]
    async fn test_chat_json_repairs_once() {
        let mock = MockChat::new(vec!["not json at all", r#"{"fixed": 1}"#]);
        let value = chat_json(&mock, &[ChatMessage::user("go")], None)
            .await
            .unwrap();
        assert_eq!(value["fixed"], 1);
        assert_eq!(mock.call_count(), 2);
        // The repair call carries the malformed output back
        let repair_call = mock.call_messages(1);
        assert!(repair_call.iter().any(|m| m.content == "not json at all"));
    }

    #[tokio::test]
    async fn test_chat_json_fails_after_one_repair() {
        let mock = MockChat::new(vec!["still bad", "also bad"]);
        let err = chat_json(&mock, &[ChatMessage::user("go")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LlmJsonParse { .. }));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_stream_accumulates_to_full_text() {
        let mock = MockChat::new(vec!["alpha beta gamma"]);
        let mut stream = mock
            .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();

        let mut acc = String::new();
        while let Some(token) = stream.next().await {
            acc.push_str(&token.unwrap());
        }
        assert_eq!(acc, "alpha beta gamma");
    }
}
