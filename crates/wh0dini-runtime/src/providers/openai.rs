//! OpenAI API Provider
//!
//! Implements the AIProvider trait for OpenAI's Chat Completions API
//! with support for streaming responses.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest_eventsource::{Error as EventSourceError, Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    AIProvider, Candidate, GenerateRequest, GenerateResponse, PromptMessage, ProviderError,
    ProviderStream, StreamChunk, Usage,
};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const MODELS_PATH: &str = "/models";
const STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    pub default_model: String,
}

impl OpenAIProvider {
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ProviderError::Message("OPENAI_API_KEY environment variable must be set".to_string())
        })?;

        let base_url = env::var("OPENAI_API_BASE").unwrap_or_else(|_| OPENAI_API_BASE.to_string());

        let default_model = env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(api_key, base_url, default_model)
    }

    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    /// Rebuilds the HTTP client with a different overall request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProviderError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn get_model(&self, req: &GenerateRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn payload(&self, req: GenerateRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.get_model(&req),
            messages: req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            user: req.user,
            stream,
        }
    }

    async fn parse_error_response(status: StatusCode, response: reqwest::Response) -> ProviderError {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());

        let parsed = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .map_or(body, |err| err.error.message);

        ProviderError::HttpStatus {
            status: status.as_u16(),
            body: parsed,
        }
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Message(format!("failed to create HTTP client: {err}")))
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_decode() {
        ProviderError::Decode(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

async fn event_source_error(err: EventSourceError) -> ProviderError {
    match err {
        EventSourceError::Transport(err) => transport_error(&err),
        EventSourceError::InvalidStatusCode(status, response) => {
            OpenAIProvider::parse_error_response(status, response).await
        }
        EventSourceError::InvalidContentType(content_type, _) => ProviderError::Decode(format!(
            "unexpected content type {content_type:?}"
        )),
        other => ProviderError::Decode(other.to_string()),
    }
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let payload = self.payload(req, false);
        let response = self
            .client
            .post(self.endpoint(CHAT_COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::parse_error_response(status, response).await);
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::Timeout(err.to_string())
            } else {
                ProviderError::Decode(err.to_string())
            }
        })?;

        Ok(GenerateResponse {
            candidates: body
                .choices
                .into_iter()
                .map(|choice| Candidate {
                    content: choice.message.content,
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            model: body.model,
            usage: body.usage,
        })
    }

    async fn generate_stream(&self, req: GenerateRequest) -> Result<ProviderStream, ProviderError> {
        let payload = self.payload(req, true);
        let request = self
            .client
            .post(self.endpoint(CHAT_COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&payload);

        let mut event_source = request
            .eventsource()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let (tx, rx) = mpsc::channel::<Result<StreamChunk, ProviderError>>(STREAM_BUFFER);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = tx.closed() => {
                        debug!("stream consumer went away, closing upstream");
                        break;
                    }
                    event = event_source.next() => event,
                };

                let Some(event) = event else {
                    let _ = tx.send(Ok(StreamChunk::Done)).await;
                    break;
                };

                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            let _ = tx.send(Ok(StreamChunk::Done)).await;
                            break;
                        }

                        let chunk = match serde_json::from_str::<ChatCompletionChunk>(&message.data) {
                            Ok(chunk) => chunk,
                            Err(err) => {
                                let _ = tx.send(Err(ProviderError::Decode(err.to_string()))).await;
                                break;
                            }
                        };

                        // usage-only chunks carry no choices
                        let Some(choice) = chunk.choices.into_iter().next() else {
                            continue;
                        };

                        if let Some(text) = choice.delta.content {
                            if tx.send(Ok(StreamChunk::Delta { text })).await.is_err() {
                                break;
                            }
                        }

                        if choice.finish_reason.is_some() {
                            let _ = tx.send(Ok(StreamChunk::Done)).await;
                            break;
                        }
                    }
                    Err(EventSourceError::StreamEnded) => {
                        let _ = tx.send(Ok(StreamChunk::Done)).await;
                        break;
                    }
                    Err(err) => {
                        let err = event_source_error(err).await;
                        warn!(error = %err, "openai stream failed");
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }

            event_source.close();
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn health(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(self.endpoint(MODELS_PATH))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::parse_error_response(status, response).await)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<PromptMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
