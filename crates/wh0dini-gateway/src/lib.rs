//! Wh0Dini Gateway - conversational proxy
//!
//! This crate implements the HTTP side of Wh0Dini:
//! - Conversation validation and trimming before every upstream call
//! - Completion and streaming relay to the model provider
//! - Optional API-key gate, CORS, and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod relay;
pub mod router;

pub use auth::{ApiKey, ApiKeyConfig, AuthError};
pub use config::{ConfigError, LogFormat, Settings};
pub use error::ApiError;
pub use relay::{Completion, Relay, RelayError, RelaySettings, WireStream};
pub use router::{build_routes, cors_layer, AppState};

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
