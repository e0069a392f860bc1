//! HTTP rendering of relay failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use wh0dini_protocol::{ErrorBody, ErrorKind};

use crate::relay::RelayError;

/// Status code for each failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest
        | ErrorKind::InvalidRole
        | ErrorKind::EmptyContent
        | ErrorKind::BlankContent
        | ErrorKind::TooLong
        | ErrorKind::NoMessages => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamMalformed => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A failed chat request, ready to be sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn from_relay(err: &RelayError, request_id: impl Into<String>) -> Self {
        Self {
            kind: err.kind(),
            message: err.public_message(),
            request_id: Some(request_id.into()),
        }
    }

    /// A body that did not deserialize into a chat request.
    pub fn invalid_request(request_id: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidRequest,
            message: ErrorKind::InvalidRequest.public_message().to_string(),
            request_id: Some(request_id.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message,
            kind: self.kind.as_str().to_string(),
            request_id: self.request_id,
        };
        (status, Json(body)).into_response()
    }
}
