//! Gateway configuration
//!
//! Every setting can come from a flag or from the environment, after a
//! `.env` file (if any) has been loaded.

use std::net::SocketAddr;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use thiserror::Error;
use wh0dini_runtime::providers::openai::OPENAI_API_BASE;

use crate::relay::{RelaySettings, DEFAULT_SYSTEM_PROMPT};

/// Value shipped in the example `.env`; never a real key.
const PLACEHOLDER_API_KEY: &str = "your-openai-api-key-here";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY must be set to a real key")]
    MissingApiKey,
    #[error("TEMPERATURE must be between 0.0 and 2.0, got {0}")]
    Temperature(f32),
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("REQUIRE_AUTH is enabled but API_KEY is empty")]
    MissingGatewayKey,
    #[error("invalid bind address {0}")]
    BindAddress(String),
}

#[derive(Debug, Clone, Parser)]
#[command(name = "wh0dini-gateway", version, about = "Privacy-first conversational proxy")]
pub struct Settings {
    /// Upstream OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    /// Upstream API base URL
    #[arg(long, env = "OPENAI_API_BASE", default_value = OPENAI_API_BASE)]
    pub openai_api_base: String,

    #[arg(long, env = "MODEL_NAME", default_value = "gpt-4o-mini")]
    pub model_name: String,

    /// Maximum tokens in a generated reply
    #[arg(long, env = "MAX_TOKENS", default_value_t = 500)]
    pub max_tokens: u32,

    #[arg(long, env = "TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    /// Maximum characters in a single message
    #[arg(long, env = "MAX_MESSAGE_LENGTH", default_value_t = 4000)]
    pub max_message_length: usize,

    /// Token budget for forwarded history
    #[arg(long, env = "MAX_CONVERSATION_TOKENS", default_value_t = 3000)]
    pub max_conversation_tokens: usize,

    #[arg(long, env = "API_HOST", default_value = "127.0.0.1")]
    pub api_host: String,

    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub api_port: u16,

    /// Comma separated CORS origins
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = ["http://localhost:3000", "http://localhost:8080", "http://localhost:8000"]
    )]
    pub allowed_origins: Vec<String>,

    /// Require an API key on the chat routes
    #[arg(
        long,
        env = "REQUIRE_AUTH",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub require_auth: bool,

    /// Key clients must present when auth is required
    #[arg(long, env = "API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,

    /// Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT, hide_default_value = true)]
    pub system_prompt: String,
}

impl Settings {
    /// Loads `.env`, parses flags and environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let settings = Settings::parse();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.openai_api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(ConfigError::MissingApiKey);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroLimit("MAX_TOKENS"));
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::ZeroLimit("MAX_MESSAGE_LENGTH"));
        }
        if self.max_conversation_tokens == 0 {
            return Err(ConfigError::ZeroLimit("MAX_CONVERSATION_TOKENS"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::ZeroLimit("UPSTREAM_TIMEOUT_SECS"));
        }
        if self.require_auth && self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingGatewayKey);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        addr.parse().map_err(|_| ConfigError::BindAddress(addr))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            model: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_message_length: self.max_message_length,
            max_conversation_tokens: self.max_conversation_tokens,
            system_prompt: self.system_prompt.clone(),
        }
    }
}
