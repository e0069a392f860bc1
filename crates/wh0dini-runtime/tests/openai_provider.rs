//! OpenAI provider against a local mock of the Chat Completions API.
//!
//! These bind a local port; run with WH0DINI_RUN_NETWORK_TESTS=1.

use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::json;
use wh0dini_protocol::ErrorKind;
use wh0dini_runtime::{AIProvider, GenerateRequest, OpenAIProvider, PromptMessage, StreamChunk};

fn network_tests_enabled() -> bool {
    matches!(std::env::var("WH0DINI_RUN_NETWORK_TESTS"), Ok(value) if value == "1")
}

fn request() -> GenerateRequest {
    GenerateRequest {
        messages: vec![
            PromptMessage::new("system", "You are terse."),
            PromptMessage::new("user", "Say hello"),
        ],
        model: Some("gpt-4o-mini".to_string()),
        max_tokens: Some(32),
        temperature: Some(0.2),
        user: Some("req-1".to_string()),
    }
}

fn provider(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::new("test-key", format!("{}/v1", server.base_url()), "gpt-4o-mini")
        .expect("provider should build")
}

#[tokio::test]
async fn generate_forwards_turns_and_reads_usage() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_includes("\"stream\":false")
                .body_includes("\"user\":\"req-1\"")
                .body_includes("You are terse.");
            then.status(200).json_body(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
            }));
        })
        .await;

    let response = provider(&server).generate(request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.candidates.len(), 1);
    assert_eq!(response.candidates[0].content.as_deref(), Some("Hello there"));
    assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(14));
}

#[tokio::test]
async fn generate_keeps_null_content_and_empty_choices() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": null},
                    "finish_reason": "content_filter"
                }]
            }));
        })
        .await;

    let response = provider(&server).generate(request()).await.unwrap();

    assert_eq!(response.candidates.len(), 1);
    assert!(response.candidates[0].content.is_none());
    assert!(response.usage.is_none());
}

#[tokio::test]
async fn generate_stream_reads_sse_and_emits_delta_chunks() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    let sse = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_includes("\"stream\":true");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse);
        })
        .await;

    let chunks: Vec<_> = provider(&server)
        .generate_stream(request())
        .await
        .unwrap()
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(
        chunks,
        vec![
            Ok(StreamChunk::Delta { text: "Hel".to_string() }),
            Ok(StreamChunk::Delta { text: "lo".to_string() }),
            Ok(StreamChunk::Done),
        ]
    );
}

#[tokio::test]
async fn generate_maps_non_success_status_to_provider_error() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429).json_body(json!({
                "error": {
                    "message": "Rate limit exceeded",
                    "type": "rate_limit_error"
                }
            }));
        })
        .await;

    let err = provider(&server).generate(request()).await.unwrap_err();

    let display = err.to_string();
    assert!(display.contains("429"));
    assert!(display.contains("Rate limit exceeded"));
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn stream_status_error_is_reported_in_band() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503).json_body(json!({
                "error": {"message": "overloaded"}
            }));
        })
        .await;

    let chunks: Vec<_> = provider(&server)
        .generate_stream(request())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    let err = chunks[0].clone().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn health_probes_models_endpoint() {
    if !network_tests_enabled() {
        eprintln!("skipping network test: set WH0DINI_RUN_NETWORK_TESTS=1 to enable");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200).json_body(json!({"object": "list", "data": []}));
        })
        .await;

    provider(&server).health().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_upstream_is_unavailable() {
    // nothing listens on port 9 on loopback
    let provider = OpenAIProvider::new("key", "http://127.0.0.1:9/v1", "gpt-4o-mini").unwrap();

    let err = provider.generate(request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
#[ignore = "calls the real OpenAI API; needs OPENAI_API_KEY"]
async fn openai_generate_real_api() {
    let provider = OpenAIProvider::from_env().expect("OPENAI_API_KEY must be set");

    let response = provider.generate(request()).await.unwrap();

    let text = response.candidates[0].content.clone().unwrap_or_default();
    assert!(!text.is_empty());
}
