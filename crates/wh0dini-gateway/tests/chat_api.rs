//! End-to-end chat routes against a mock provider.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wh0dini_gateway::{build_routes, ApiKeyConfig, AppState, Relay, RelaySettings};
use wh0dini_protocol::{ErrorKind, WireEvent, DONE_SENTINEL};
use wh0dini_runtime::{GenerateResponse, MockProvider, ProviderError, StreamChunk};

fn app_with(provider: &Arc<MockProvider>, auth: ApiKeyConfig) -> Router {
    let relay = Relay::new(provider.clone(), RelaySettings::default());
    build_routes(AppState::new(relay, auth))
}

fn app(provider: &Arc<MockProvider>) -> Router {
    app_with(provider, ApiKeyConfig::disabled())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `data:` payloads of an SSE body, in order.
async fn sse_events(response: axum::response::Response) -> Vec<WireEvent> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| WireEvent::from_sse_data(data.trim()).unwrap())
        .collect()
}

fn delta(text: &str) -> StreamChunk {
    StreamChunk::Delta {
        text: text.to_string(),
    }
}

#[tokio::test]
async fn chat_returns_reply_with_request_id() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_generate(Ok(GenerateResponse::text("Hello!")));

    let response = app(&provider)
        .oneshot(post(
            "/chat",
            json!({"messages": [{"role": "user", "content": "Hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let header_id = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = json_body(response).await;

    assert_eq!(body["response"], "Hello!");
    let request_id = body["request_id"].as_str().unwrap();
    assert!(Uuid::parse_str(request_id).is_ok());
    assert_eq!(request_id, header_id);

    let sent = provider.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].messages.len(), 2);
    assert_eq!(sent[0].messages[0].role, "system");
    assert_eq!(sent[0].messages[1].content, "Hi");
    assert_eq!(sent[0].user.as_deref(), Some(request_id));
}

#[tokio::test]
async fn invalid_role_is_rejected_before_upstream() {
    let provider = Arc::new(MockProvider::new());

    let response = app(&provider)
        .oneshot(post(
            "/chat",
            json!({"messages": [{"role": "system-admin", "content": "Hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "invalid_role");
    assert_eq!(body["error"], "message 1: Invalid message role");
    assert!(body["request_id"].is_string());
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn empty_message_list_is_rejected() {
    let provider = Arc::new(MockProvider::new());

    let response = app(&provider)
        .oneshot(post("/chat", json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "no_messages");
}

#[tokio::test]
async fn upstream_failures_map_to_gateway_statuses() {
    let cases = [
        (
            ProviderError::Transport("connection refused".into()),
            StatusCode::SERVICE_UNAVAILABLE,
            "upstream_unavailable",
        ),
        (
            ProviderError::Timeout("deadline".into()),
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_timeout",
        ),
        (
            ProviderError::Decode("expected value at line 1".into()),
            StatusCode::BAD_GATEWAY,
            "upstream_malformed",
        ),
        (
            ProviderError::HttpStatus {
                status: 401,
                body: "invalid api key sk-...".into(),
            },
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
        ),
    ];

    for (error, status, kind) in cases {
        let provider = Arc::new(MockProvider::new());
        provider.enqueue_generate(Err(error));

        let response = app(&provider)
            .oneshot(post(
                "/chat",
                json!({"messages": [{"role": "user", "content": "Hi"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), status, "{kind}");
        let body = json_body(response).await;
        assert_eq!(body["kind"], kind);
        assert!(!body["error"].as_str().unwrap().contains("sk-"));
    }
}

#[tokio::test]
async fn stream_emits_deltas_then_one_sentinel() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_stream(Ok(vec![delta("Hel"), delta("lo"), StreamChunk::Done]));

    let response = app(&provider)
        .oneshot(post(
            "/chat/stream",
            json!({"messages": [{"role": "user", "content": "Hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
    let request_id = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let events = sse_events(response).await;

    assert_eq!(
        events,
        vec![
            WireEvent::delta("Hel", request_id.as_str()),
            WireEvent::delta("lo", request_id.as_str()),
            WireEvent::Done,
        ]
    );
}

#[tokio::test]
async fn stream_sentinel_is_the_literal_done_marker() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_stream(Ok(vec![StreamChunk::Done]));

    let response = app(&provider)
        .oneshot(post(
            "/chat/stream",
            json!({"messages": [{"role": "user", "content": "Hi"}]}),
        ))
        .await
        .unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text
        .lines()
        .any(|line| line.strip_prefix("data:").map(str::trim) == Some(DONE_SENTINEL)));
}

#[tokio::test]
async fn stream_failure_ends_with_single_error_event() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_stream_failure(
        vec![delta("a"), delta("b"), delta("c")],
        ProviderError::Transport("reset".into()),
    );

    let response = app(&provider)
        .oneshot(post(
            "/chat/stream",
            json!({"messages": [{"role": "user", "content": "Hi"}]}),
        ))
        .await
        .unwrap();

    let events = sse_events(response).await;

    assert_eq!(events.len(), 4);
    assert!(events[..3]
        .iter()
        .all(|event| matches!(event, WireEvent::Delta { .. })));
    assert!(matches!(
        &events[3],
        WireEvent::Error { kind, .. } if kind.as_str() == "upstream_unavailable"
    ));
}

#[tokio::test]
async fn stream_validation_failure_is_reported_in_band() {
    let provider = Arc::new(MockProvider::new());

    let response = app(&provider)
        .oneshot(post(
            "/chat/stream",
            json!({"messages": [{"role": "user", "content": "   "}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let events = sse_events(response).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        WireEvent::Error { error, kind } if kind.as_str() == "blank_content"
            && error == "message 1: Empty message content"
    ));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn chat_with_stream_flag_answers_as_event_stream() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_stream(Ok(vec![delta("ok"), StreamChunk::Done]));

    let response = app(&provider)
        .oneshot(post(
            "/chat",
            json!({"messages": [{"role": "user", "content": "Hi"}], "stream": true}),
        ))
        .await
        .unwrap();

    let events = sse_events(response).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1], WireEvent::Done);
}

#[tokio::test]
async fn api_key_gate_protects_chat_routes() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_generate(Ok(GenerateResponse::text("Hello!")));
    let app = app_with(&provider, ApiKeyConfig::required("s3cret"));

    let body = json!({"messages": [{"role": "user", "content": "Hi"}]});

    let denied = app.clone().oneshot(post("/chat", body.clone())).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(denied).await["kind"], "unauthorized");

    let mut request = post("/chat", body);
    request
        .headers_mut()
        .insert("x-api-key", "s3cret".parse().unwrap());
    let allowed = app.clone().oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_chat_body_gets_classified_error() {
    let bodies = [
        json!({"msgs": []}),
        json!({"messages": [{"role": "user", "content": 5}]}),
    ];

    for body in bodies {
        let provider = Arc::new(MockProvider::new());
        let response = app(&provider).oneshot(post("/chat", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let header_id = response.headers().get("x-request-id").cloned().unwrap();
        let body = json_body(response).await;
        assert_eq!(body["kind"], "invalid_request");
        assert_eq!(body["error"], "Invalid request data");
        assert_eq!(body["request_id"], header_id.to_str().unwrap());
        assert!(provider.requests().is_empty());
    }
}

#[tokio::test]
async fn malformed_stream_body_is_reported_in_band() {
    let bodies = [
        json!({"msgs": []}),
        json!({"messages": [{"role": "user", "content": 5}]}),
    ];

    for body in bodies {
        let provider = Arc::new(MockProvider::new());
        let response = app(&provider)
            .oneshot(post("/chat/stream", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_events(response).await;
        assert_eq!(
            events,
            vec![WireEvent::error(
                ErrorKind::InvalidRequest,
                "Invalid request data"
            )]
        );
        assert!(provider.requests().is_empty());
    }
}
