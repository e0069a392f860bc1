//! Wh0Dini wire protocol types.
//!
//! This crate defines:
//! - the inbound chat request (`ChatRequest`, `ChatMessage`)
//! - the non-streaming reply (`ChatResponse`)
//! - server-sent stream events (`WireEvent`)
//! - the stable, machine-readable failure kinds (`ErrorKind`)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel payload that terminates a successful stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One client-supplied message. The role is kept as raw text so that
/// unknown roles are rejected by validation instead of by the JSON decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub request_id: String,
}

/// Failure classification shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request body is not a well-formed chat request.
    InvalidRequest,
    InvalidRole,
    EmptyContent,
    BlankContent,
    TooLong,
    NoMessages,
    UpstreamUnavailable,
    UpstreamTimeout,
    UpstreamMalformed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidRole => "invalid_role",
            ErrorKind::EmptyContent => "empty_content",
            ErrorKind::BlankContent => "blank_content",
            ErrorKind::TooLong => "too_long",
            ErrorKind::NoMessages => "no_messages",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamMalformed => "upstream_malformed",
            ErrorKind::Internal => "internal",
        }
    }

    /// Client-safe description. Never contains upstream or library text.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "Invalid request data",
            ErrorKind::InvalidRole => "Invalid message role",
            ErrorKind::EmptyContent => "Message content cannot be empty",
            ErrorKind::BlankContent => "Empty message content",
            ErrorKind::TooLong => "Message too long",
            ErrorKind::NoMessages => "No messages provided",
            ErrorKind::UpstreamUnavailable => "Service temporarily unavailable",
            ErrorKind::UpstreamTimeout => "Request timeout",
            ErrorKind::UpstreamMalformed => "Invalid response from AI service",
            ErrorKind::Internal => "Internal server error",
        }
    }

    /// True for kinds raised before any upstream call is made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest
                | ErrorKind::InvalidRole
                | ErrorKind::EmptyContent
                | ErrorKind::BlankContent
                | ErrorKind::TooLong
                | ErrorKind::NoMessages
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON body returned for a failed non-streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One unit of the streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Delta { content: String, request_id: String },
    Error { error: String, kind: ErrorKind },
    Done,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Error { error: String, kind: ErrorKind },
    Delta { content: String, request_id: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireEventParseError {
    #[error("malformed stream event: {0}")]
    Malformed(String),
}

impl WireEvent {
    pub fn delta(content: impl Into<String>, request_id: impl Into<String>) -> Self {
        WireEvent::Delta {
            content: content.into(),
            request_id: request_id.into(),
        }
    }

    pub fn error(kind: ErrorKind, error: impl Into<String>) -> Self {
        WireEvent::Error {
            error: error.into(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WireEvent::Delta { .. })
    }

    /// Payload for the `data:` field of a server-sent event.
    pub fn to_sse_data(&self) -> String {
        let payload = match self {
            WireEvent::Done => return DONE_SENTINEL.to_string(),
            WireEvent::Delta {
                content,
                request_id,
            } => WirePayload::Delta {
                content: content.clone(),
                request_id: request_id.clone(),
            },
            WireEvent::Error { error, kind } => WirePayload::Error {
                error: error.clone(),
                kind: *kind,
            },
        };
        // Plain strings and a unit enum always serialize.
        serde_json::to_string(&payload).unwrap_or_default()
    }

    pub fn from_sse_data(data: &str) -> Result<Self, WireEventParseError> {
        let data = data.trim();
        if data == DONE_SENTINEL {
            return Ok(WireEvent::Done);
        }
        match serde_json::from_str::<WirePayload>(data) {
            Ok(WirePayload::Delta {
                content,
                request_id,
            }) => Ok(WireEvent::Delta {
                content,
                request_id,
            }),
            Ok(WirePayload::Error { error, kind }) => Ok(WireEvent::Error { error, kind }),
            Err(err) => Err(WireEventParseError::Malformed(err.to_string())),
        }
    }
}
