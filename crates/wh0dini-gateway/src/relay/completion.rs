use std::time::Instant;

use tracing::{info, warn};
use wh0dini_context::Turn;
use wh0dini_protocol::ChatMessage;
use wh0dini_runtime::Usage;

use super::{Relay, RelayError, FALLBACK_REPLY};
use crate::metrics;

/// Finished, non-streaming reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Upstream usage, zeroed when the provider did not report any.
    pub usage: Usage,
}

impl Relay {
    /// Validate, trim and complete in one step.
    pub async fn chat(&self, messages: &[ChatMessage], request_id: &str) -> Result<Completion, RelayError> {
        let turns = self.prepare(messages)?;
        let trimmed = self.trim(&turns);
        self.complete(trimmed, request_id).await
    }

    /// One upstream call for an already trimmed conversation.
    pub async fn complete(&self, trimmed: &[Turn], request_id: &str) -> Result<Completion, RelayError> {
        let request = self.build_request(trimmed, request_id);

        metrics::RELAY_REQUESTS_TOTAL
            .with_label_values(&["complete"])
            .inc();
        let started = Instant::now();
        let result = self.provider.generate(request).await;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&["complete"])
            .observe(started.elapsed().as_secs_f64());

        let response = result.map_err(|err| {
            warn!(request_id, error_kind = %err.kind(), error = %err, "upstream completion failed");
            metrics::record_error("complete", err.kind());
            RelayError::from(err)
        })?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            warn!(request_id, "upstream completion had no choices");
            metrics::record_error("complete", RelayError::NoCandidates.kind());
            return Err(RelayError::NoCandidates);
        };

        let text = match candidate.content {
            Some(content) => content.trim().to_string(),
            None => {
                warn!(
                    request_id,
                    finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
                    "model returned no content, using fallback reply"
                );
                FALLBACK_REPLY.to_string()
            }
        };
        let usage = response.usage.unwrap_or_default();
        metrics::record_usage(&usage);

        info!(
            request_id,
            response_length = text.chars().count(),
            tokens_used = usage.total_tokens,
            "chat_response_generated"
        );

        Ok(Completion { text, usage })
    }
}
