use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use wh0dini_context::Turn;
use wh0dini_protocol::{ChatMessage, WireEvent};
use wh0dini_runtime::{AIProvider, GenerateRequest, StreamChunk};

use super::{Relay, RelayError};
use crate::metrics;

/// Events bound for one streaming client. Finite and not restartable.
pub type WireStream = Pin<Box<dyn Stream<Item = WireEvent> + Send>>;

/// At most one event waits for the client.
const WIRE_BUFFER: usize = 1;

impl Relay {
    /// Validate and trim, then stream.
    ///
    /// A rejected conversation yields exactly one error event and no sentinel.
    pub fn stream_chat(&self, messages: &[ChatMessage], request_id: &str) -> WireStream {
        match self.prepare(messages) {
            Ok(turns) => self.stream(self.trim(&turns), request_id),
            Err(err) => {
                let err = RelayError::from(err);
                report_failure(request_id, &err);
                Box::pin(stream::iter([error_event(&err)]))
            }
        }
    }

    /// Streams a completion for an already trimmed conversation.
    ///
    /// Emits one delta event per upstream text delta, then either the
    /// terminal sentinel or a single error event. Nothing follows either.
    /// Dropping the returned stream stops the upstream read. Must be called
    /// from within a tokio runtime.
    pub fn stream(&self, trimmed: &[Turn], request_id: &str) -> WireStream {
        let request = self.build_request(trimmed, request_id);
        let provider = self.provider.clone();
        let request_id = request_id.to_string();
        let (tx, rx) = mpsc::channel::<WireEvent>(WIRE_BUFFER);

        metrics::RELAY_REQUESTS_TOTAL
            .with_label_values(&["stream"])
            .inc();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut terminated = false;

            let relayed = AssertUnwindSafe(forward(
                provider,
                request,
                &request_id,
                &tx,
                &mut terminated,
            ))
            .catch_unwind()
            .await;

            metrics::UPSTREAM_LATENCY
                .with_label_values(&["stream"])
                .observe(started.elapsed().as_secs_f64());

            if relayed.is_err() && !terminated {
                let err = RelayError::Panicked;
                report_failure(&request_id, &err);
                let _ = tx.send(error_event(&err)).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Pumps upstream chunks into `tx` until a terminal event is sent or the
/// client goes away. `terminated` is set once a terminal event was sent.
async fn forward(
    provider: Arc<dyn AIProvider>,
    request: GenerateRequest,
    request_id: &str,
    tx: &mpsc::Sender<WireEvent>,
    terminated: &mut bool,
) {
    let opened = tokio::select! {
        () = tx.closed() => {
            debug!(request_id, "stream client left before upstream opened");
            return;
        }
        opened = provider.generate_stream(request) => opened,
    };

    let mut upstream = match opened {
        Ok(upstream) => upstream,
        Err(err) => {
            let err = RelayError::from(err);
            report_failure(request_id, &err);
            *terminated = true;
            let _ = tx.send(error_event(&err)).await;
            return;
        }
    };

    let mut deltas = 0usize;
    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                debug!(request_id, deltas, "stream client went away");
                return;
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(StreamChunk::Delta { text })) => {
                deltas += 1;
                metrics::STREAM_DELTAS.inc();
                if tx.send(WireEvent::delta(text, request_id)).await.is_err() {
                    return;
                }
            }
            Some(Ok(StreamChunk::Done)) | None => {
                *terminated = true;
                let _ = tx.send(WireEvent::Done).await;
                info!(request_id, deltas, "stream_completed");
                return;
            }
            Some(Err(err)) => {
                let err = RelayError::from(err);
                report_failure(request_id, &err);
                *terminated = true;
                let _ = tx.send(error_event(&err)).await;
                return;
            }
        }
    }
}

fn error_event(err: &RelayError) -> WireEvent {
    WireEvent::error(err.kind(), err.public_message())
}

fn report_failure(request_id: &str, err: &RelayError) {
    warn!(request_id, error_kind = %err.kind(), error = %err, "stream_error");
    metrics::record_error("stream", err.kind());
}
