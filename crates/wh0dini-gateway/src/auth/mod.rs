//! API-key gate for the chat routes
//!
//! A single shared key, checked when `REQUIRE_AUTH` is on. Clients send it
//! either as `Authorization: Bearer <key>` or as `X-API-Key: <key>`.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingKey,
    #[error("Invalid API key")]
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": self.to_string(), "kind": "unauthorized" })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Gate settings shared through the router state.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyConfig {
    key: Option<String>,
}

impl ApiKeyConfig {
    /// Every request passes.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn required(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.key.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = &self.key else {
            return Ok(());
        };

        let presented = presented_key(headers).ok_or(AuthError::MissingKey)?;
        if keys_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        })
        .filter(|key| !key.is_empty())
}

/// Comparison time depends only on the lengths.
fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Extractor that succeeds only when the request carries the configured key.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for ApiKey
where
    ApiKeyConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        ApiKeyConfig::from_ref(state).check(&parts.headers)?;
        Ok(ApiKey)
    }
}
