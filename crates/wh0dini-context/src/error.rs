//! Error types for context handling

use thiserror::Error;
use wh0dini_protocol::ErrorKind;

/// Rule a single message broke.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    #[error("Invalid message role")]
    InvalidRole,

    #[error("Message content cannot be empty")]
    EmptyContent,

    #[error("Message too long")]
    TooLong,

    #[error("Empty message content")]
    BlankContent,
}

impl ValidationRule {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationRule::InvalidRole => ErrorKind::InvalidRole,
            ValidationRule::EmptyContent => ErrorKind::EmptyContent,
            ValidationRule::TooLong => ErrorKind::TooLong,
            ValidationRule::BlankContent => ErrorKind::BlankContent,
        }
    }
}

/// Context error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("No messages provided")]
    NoMessages,

    /// `index` is zero-based; the message text reports it one-based.
    #[error("message {}: {rule}", .index + 1)]
    Rejected { index: usize, rule: ValidationRule },
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::NoMessages => ErrorKind::NoMessages,
            ContextError::Rejected { rule, .. } => rule.kind(),
        }
    }
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
