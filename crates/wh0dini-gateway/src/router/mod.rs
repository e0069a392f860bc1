//! HTTP routes for the Wh0Dini gateway

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRef, MatchedPath, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;
use wh0dini_protocol::{ChatRequest, ChatResponse, ErrorKind, WireEvent, REQUEST_ID_HEADER};

use crate::auth::{ApiKey, ApiKeyConfig, API_KEY_HEADER};
use crate::error::ApiError;
use crate::metrics;
use crate::relay::{Relay, WireStream};
use crate::GATEWAY_VERSION;

/// Upper bound on the `/health` upstream probe.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub auth: ApiKeyConfig,
}

impl AppState {
    pub fn new(relay: Relay, auth: ApiKeyConfig) -> Self {
        Self { relay, auth }
    }
}

impl FromRef<AppState> for ApiKeyConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Build the main router for the gateway
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_responses))
        .with_state(state)
}

/// CORS policy for the configured origins. `*` allows any origin without
/// credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    if origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "Wh0Dini-AI",
        "version": GATEWAY_VERSION,
        "description": "Privacy-first AI assistant that makes your data disappear like magic",
        "endpoints": {
            "chat": "/chat",
            "stream": "/chat/stream",
            "health": "/health",
            "metrics": "/metrics",
        },
    }))
}

/// Health check endpoint
///
/// Always answers 200; an unreachable upstream only degrades the status.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let provider = state.relay.provider();
    let model = state.relay.settings().model.clone();

    let (status, upstream) =
        match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, provider.health()).await {
            Ok(Ok(())) => ("healthy", json!({ "status": "connected", "model": model })),
            Ok(Err(err)) => {
                warn!(provider = provider.name(), error = %err, "upstream health probe failed");
                (
                    "degraded",
                    json!({ "status": "disconnected", "error": err.kind().public_message() }),
                )
            }
            Err(_) => {
                warn!(provider = provider.name(), "upstream health probe timed out");
                (
                    "degraded",
                    json!({ "status": "timeout", "error": "Upstream API request timed out" }),
                )
            }
        };

    let mut services = serde_json::Map::new();
    services.insert(provider.name().to_string(), upstream);

    Json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": GATEWAY_VERSION,
        "services": services,
    }))
}

async fn chat(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            reject_body(&request_id, "complete", &rejection);
            let mut response = ApiError::invalid_request(request_id.clone()).into_response();
            set_request_id(&mut response, &request_id);
            return response;
        }
    };
    info!(
        request_id = %request_id,
        message_count = request.messages.len(),
        stream = request.stream,
        "chat_request_received"
    );

    if request.stream {
        let events = state.relay.stream_chat(&request.messages, &request_id);
        return stream_response(events, &request_id);
    }

    match state.relay.chat(&request.messages, &request_id).await {
        Ok(completion) => {
            let mut response = Json(ChatResponse {
                response: completion.text,
                request_id: request_id.clone(),
            })
            .into_response();
            set_request_id(&mut response, &request_id);
            response
        }
        Err(err) => {
            warn!(request_id = %request_id, error_kind = %err.kind(), error = %err, "chat_request_failed");
            let mut response = ApiError::from_relay(&err, request_id.clone()).into_response();
            set_request_id(&mut response, &request_id);
            response
        }
    }
}

/// Same body as `/chat`, always answered as an event stream. A body that
/// does not parse is reported in-band like any other failure.
async fn chat_stream(
    State(state): State<AppState>,
    _key: ApiKey,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let events: WireStream = match body {
        Ok(Json(request)) => {
            info!(
                request_id = %request_id,
                message_count = request.messages.len(),
                "stream_request_started"
            );
            state.relay.stream_chat(&request.messages, &request_id)
        }
        Err(rejection) => {
            reject_body(&request_id, "stream", &rejection);
            let kind = ErrorKind::InvalidRequest;
            Box::pin(stream::iter([WireEvent::error(kind, kind.public_message())]))
        }
    };

    stream_response(events, &request_id)
}

fn reject_body(request_id: &str, mode: &'static str, rejection: &JsonRejection) {
    warn!(request_id, error = %rejection.body_text(), "chat_body_rejected");
    metrics::record_error(mode, ErrorKind::InvalidRequest);
}

fn stream_response(events: WireStream, request_id: &str) -> Response {
    let events = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_sse_data())));

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    set_request_id(&mut response, request_id);
    response
}

fn set_request_id(response: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::export(),
    )
}

async fn track_responses(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;
    metrics::record_response(&path, response.status().as_u16());
    response
}
