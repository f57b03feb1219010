/// LLM client: the single point of entry for all completion API calls.
///
/// No other module may call the Anthropic API directly. Handlers and flows
/// depend on the `CompletionService` trait so tests can script replies.
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::message::{ChatMessage, Role};

pub mod sse;

use sse::{parse_stream_payload, SseDecoder};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;
const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(55);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Conversation has no user message to answer")]
    EmptyConversation,
}

/// One event decoded from a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    /// The provider closed the message normally.
    Finished,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// A hosted chat-completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// One-shot completion returning the full reply text.
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Streaming completion. Dropping the returned stream closes the upstream
    /// connection.
    async fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// The completion client used by all flows.
/// Wraps the Anthropic Messages API with retry logic for one-shot calls.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(
        &'a self,
        system: &'a str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<AnthropicRequest<'a>, LlmError> {
        let messages = to_wire_messages(messages);
        if messages.is_empty() {
            return Err(LlmError::EmptyConversation);
        }
        Ok(AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages,
            stream,
        })
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    /// Makes a raw call to the API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse, LlmError> {
        let request_body = self.request(system, messages, false)?;

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .post()
                .timeout(ONE_SHOT_TIMEOUT)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                return Err(api_error(response).await);
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let response = self.call(system, messages).await?;
        response.text().ok_or(LlmError::EmptyContent)
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, LlmError> {
        let request_body = self.request(system, messages, true)?;
        let response = self.post().json(&request_body).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        debug!("LLM stream opened (model: {})", self.model);
        Ok(decode_event_stream(response))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Turns the provider's server-sent event body into `StreamEvent`s.
fn decode_event_stream(response: Response) -> CompletionStream {
    let body: ByteStream = Box::pin(response.bytes_stream());
    let queue: VecDeque<Result<StreamEvent, LlmError>> = VecDeque::new();
    let state = (body, SseDecoder::default(), queue, false);

    let events = futures::stream::unfold(state, |(mut body, mut decoder, mut queue, mut done)| async move {
        loop {
            if let Some(item) = queue.pop_front() {
                return Some((item, (body, decoder, queue, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    for data in decoder.push(chunk.as_ref()) {
                        match parse_stream_payload(&data) {
                            Ok(Some(event)) => queue.push_back(Ok(event)),
                            Ok(None) => {}
                            Err(e) => {
                                queue.push_back(Err(e));
                                done = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    queue.push_back(Err(LlmError::Http(e)));
                    done = true;
                }
                None => done = true,
            }
        }
    });

    Box::pin(events)
}

async fn api_error(response: Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    // Try to parse error message
    let message = serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    LlmError::Api { status, message }
}

/// Maps the client conversation onto the provider's user/assistant turns.
/// System messages and empty turns are dropped, and the conversation must
/// open with a user turn.
fn to_wire_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            let content = m.text();
            (!content.trim().is_empty()).then_some(AnthropicMessage { role, content })
        })
        .skip_while(|m| m.role != "user")
        .collect()
}
