//! Runtime abstractions for model providers.
//!
//! The relay only ever talks to an [`AIProvider`]: given a list of
//! role/content turns and generation parameters, return a completion or a
//! stream of text deltas. [`MockProvider`] is a deterministic stand-in for
//! tests; [`OpenAIProvider`] is the real client.

pub mod providers;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wh0dini_protocol::ErrorKind;

pub use providers::OpenAIProvider;

/// One turn as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<PromptMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Opaque end-user tag forwarded to the provider (the request id).
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

impl GenerateResponse {
    /// Single finished candidate carrying `content`.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(content.into()),
                finish_reason: Some("stop".to_string()),
            }],
            model: None,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunk {
    Delta { text: String },
    Done,
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream timed out: {0}")]
    Timeout(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("provider error: {0}")]
    Message(String),
}

impl ProviderError {
    /// Classification exposed to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Transport(_) => ErrorKind::UpstreamUnavailable,
            ProviderError::Timeout(_) => ErrorKind::UpstreamTimeout,
            ProviderError::Decode(_) => ErrorKind::UpstreamMalformed,
            ProviderError::HttpStatus { status, .. } => match status {
                408 | 504 => ErrorKind::UpstreamTimeout,
                429 | 500..=599 => ErrorKind::UpstreamUnavailable,
                _ => ErrorKind::Internal,
            },
            ProviderError::MockQueueEmpty | ProviderError::Message(_) => ErrorKind::Internal,
        }
    }
}

#[async_trait]
pub trait AIProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    async fn generate_stream(&self, req: GenerateRequest) -> Result<ProviderStream, ProviderError>;

    /// Lightweight reachability probe.
    async fn health(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

type QueuedStream = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

#[derive(Debug, Default)]
pub struct MockProvider {
    generate_queue: Mutex<VecDeque<Result<GenerateResponse, ProviderError>>>,
    stream_queue: Mutex<VecDeque<QueuedStream>>,
    requests: Mutex<Vec<GenerateRequest>>,
    health: Mutex<Option<ProviderError>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_generate(&self, result: Result<GenerateResponse, ProviderError>) {
        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .push_back(result);
    }

    pub fn enqueue_stream(&self, result: Result<Vec<StreamChunk>, ProviderError>) {
        let queued = result.map(|chunks| chunks.into_iter().map(Ok).collect());
        self.stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .push_back(queued);
    }

    /// Stream that yields `chunks` and then fails with `error`.
    pub fn enqueue_stream_failure(&self, chunks: Vec<StreamChunk>, error: ProviderError) {
        let mut items: Vec<_> = chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .push_back(Ok(items));
    }

    pub fn set_health(&self, result: Result<(), ProviderError>) {
        *self.health.lock().expect("mock health poisoned") = result.err();
    }

    /// Every request the provider has received, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }

    fn record(&self, req: GenerateRequest) {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(req);
    }
}

#[async_trait]
impl AIProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.record(req);
        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))
    }

    async fn generate_stream(&self, req: GenerateRequest) -> Result<ProviderStream, ProviderError> {
        self.record(req);
        let next = self
            .stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))?;

        Ok(Box::pin(stream::iter(next)))
    }

    async fn health(&self) -> Result<(), ProviderError> {
        match self.health.lock().expect("mock health poisoned").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
