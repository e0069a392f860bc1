//! Wh0Dini Context Management - validation, token estimation and trimming
//!
//! This crate provides:
//! - Message validation (`validate_conversation`)
//! - Token estimation with a deterministic fallback (`estimate_tokens`)
//! - Budget-based context window trimming (`ContextWindow`)

pub mod context;
pub mod error;
pub mod token;
pub mod validate;
pub mod window;

pub use context::{Role, Turn};
pub use error::{ContextError, ContextResult, ValidationRule};
pub use token::{estimate_tokens, heuristic_tokens, HeuristicEstimator, ModelTokenEstimator, TokenEstimator};
pub use validate::{validate_conversation, validate_message, DEFAULT_MAX_MESSAGE_LENGTH};
pub use window::{trim_to_budget, ContextWindow, DEFAULT_MAX_TOKENS};

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{Role, Turn};
    pub use crate::error::{ContextError, ContextResult, ValidationRule};
    pub use crate::token::{estimate_tokens, TokenEstimator};
    pub use crate::validate::validate_conversation;
    pub use crate::window::ContextWindow;
}
