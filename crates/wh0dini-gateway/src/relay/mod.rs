//! Completion and streaming relay
//!
//! Both paths share the same front half: validate the inbound conversation,
//! trim it to the token budget, then prepend the system preamble. Only the
//! upstream call and the shape of the result differ.

mod completion;
mod stream;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use wh0dini_context::{validate_conversation, ContextError, ContextWindow, Turn};
use wh0dini_protocol::{ChatMessage, ErrorKind};
use wh0dini_runtime::{AIProvider, GenerateRequest, PromptMessage, ProviderError};

pub use completion::Completion;
pub use stream::WireStream;

/// Reply used when the model returns a candidate without text.
pub const FALLBACK_REPLY: &str = "I apologize, but I couldn't generate a response. Please try again.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Wh0Dini-AI, a privacy-first, user-centric AI assistant.

Core Principles:
- Always prioritize user privacy: never store or log personal data
- Communicate clearly, respectfully, and empathetically
- Provide helpful, relevant, and safe information
- Avoid harmful, offensive, or biased content
- Encourage positive and ethical use
- Be concise but thorough in responses
- Acknowledge limitations honestly

Remember: You're designed to be helpful while maintaining the highest ethical standards.";

/// Generation and trimming parameters for one relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_message_length: usize,
    pub max_conversation_tokens: usize,
    pub system_prompt: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 500,
            max_message_length: wh0dini_context::DEFAULT_MAX_MESSAGE_LENGTH,
            max_conversation_tokens: wh0dini_context::DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("upstream response contained no choices")]
    NoCandidates,
    #[error("stream relay task panicked")]
    Panicked,
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Context(err) => err.kind(),
            RelayError::Provider(err) => err.kind(),
            RelayError::NoCandidates => ErrorKind::UpstreamMalformed,
            RelayError::Panicked => ErrorKind::Internal,
        }
    }

    /// Text that is safe to hand back to a client.
    ///
    /// Validation failures name the offending turn; upstream failures only
    /// ever expose the sanitized text for their kind.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Context(err) => err.to_string(),
            other => other.kind().public_message().to_string(),
        }
    }
}

/// Shared relay handle. Cloning is cheap.
#[derive(Clone)]
pub struct Relay {
    provider: Arc<dyn AIProvider>,
    settings: Arc<RelaySettings>,
    window: ContextWindow,
}

impl Relay {
    pub fn new(provider: Arc<dyn AIProvider>, settings: RelaySettings) -> Self {
        let window = ContextWindow::new(settings.max_conversation_tokens, settings.model.clone());
        Self {
            provider,
            settings: Arc::new(settings),
            window,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn provider(&self) -> &Arc<dyn AIProvider> {
        &self.provider
    }

    /// Validates every inbound message, failing on the first bad one.
    pub fn prepare(&self, messages: &[ChatMessage]) -> Result<Vec<Turn>, ContextError> {
        validate_conversation(messages, self.settings.max_message_length)
    }

    /// Most recent turns that fit the conversation budget.
    pub fn trim<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        self.window.trim(turns)
    }

    /// Preamble first, then the trimmed history in order.
    fn build_request(&self, trimmed: &[Turn], request_id: &str) -> GenerateRequest {
        let mut messages = Vec::with_capacity(trimmed.len() + 1);
        messages.push(PromptMessage::new("system", self.settings.system_prompt.clone()));
        messages.extend(
            trimmed
                .iter()
                .map(|turn| PromptMessage::new(turn.role().as_str(), turn.content())),
        );

        debug!(
            request_id,
            forwarded = trimmed.len(),
            provider = self.provider.name(),
            "built upstream request"
        );

        GenerateRequest {
            messages,
            model: Some(self.settings.model.clone()),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            user: Some(request_id.to_string()),
        }
    }
}
