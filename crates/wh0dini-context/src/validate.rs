//! Message validation
//!
//! Checks run in a fixed order and the first failing rule is reported:
//! role, empty content, length (raw, before trimming), whitespace-only content.

use wh0dini_protocol::ChatMessage;

use crate::context::{Role, Turn};
use crate::error::{ContextError, ContextResult, ValidationRule};

/// Default upper bound on a single message, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

/// Validates one inbound message and converts it into a [`Turn`].
pub fn validate_message(message: &ChatMessage, max_length: usize) -> Result<Turn, ValidationRule> {
    let role = Role::parse(&message.role).ok_or(ValidationRule::InvalidRole)?;

    if message.content.is_empty() {
        return Err(ValidationRule::EmptyContent);
    }
    if message.content.chars().count() > max_length {
        return Err(ValidationRule::TooLong);
    }
    if message.content.trim().is_empty() {
        return Err(ValidationRule::BlankContent);
    }

    Ok(Turn::new(role, message.content.clone()))
}

/// Validates a whole conversation, stopping at the first bad message.
pub fn validate_conversation(messages: &[ChatMessage], max_length: usize) -> ContextResult<Vec<Turn>> {
    if messages.is_empty() {
        return Err(ContextError::NoMessages);
    }

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            validate_message(message, max_length)
                .map_err(|rule| ContextError::Rejected { index, rule })
        })
        .collect()
}
