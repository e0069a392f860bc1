use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Error as EventSourceError, Event, RequestBuilderExt};
use serde_json::Value;
use thiserror::Error;
use wh0dini_protocol::{
    ChatMessage, ChatRequest, ChatResponse, ErrorBody, ErrorKind, WireEvent, DONE_SENTINEL,
};

pub fn crate_name() -> &'static str {
    "wh0dini-cli"
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "wh0dini-cli",
    version,
    about = "Wh0Dini command line client",
    long_about = "Wh0Dini command line client for chatting with the gateway, one-shot or interactively"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "WH0DINI_SERVER",
        default_value = "http://127.0.0.1:8000",
        help = "Gateway base HTTP URL"
    )]
    pub server: String,
    #[arg(
        long,
        global = true,
        env = "WH0DINI_API_KEY",
        hide_env_values = true,
        help = "Gateway API key, sent as a bearer token"
    )]
    pub api_key: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Send a single message")]
    Chat {
        #[arg(help = "Message text")]
        message: String,
        #[arg(short, long, help = "Stream the reply as it is generated")]
        stream: bool,
    },
    #[command(about = "Interactive chat that keeps the conversation locally")]
    Repl {
        #[arg(short, long, help = "Stream replies as they are generated")]
        stream: bool,
    },
    #[command(about = "Show gateway and upstream health")]
    Health,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("http transport error: {0}")]
    HttpTransport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("{message} ({kind}, status {status})")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("json decode error: {0}")]
    Decode(String),
    #[error("stream failed: {message} ({kind})")]
    Stream { kind: ErrorKind, message: String },
    #[error("stream ended before the completion marker")]
    StreamTruncated,
}

/// Reply assembled from a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedReply {
    pub text: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CliClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl CliClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: None,
            http,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse, CliError> {
        ensure_messages(messages)?;

        let payload = ChatRequest {
            messages: messages.to_vec(),
            stream: false,
        };
        let response = self
            .authorized(self.http.post(self.endpoint("/chat")))
            .timeout(Duration::from_secs(60))
            .json(&payload)
            .send()
            .await
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(status_error(status, body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|err| CliError::Decode(err.to_string()))
    }

    /// Streams a reply, handing each delta to `on_delta` as it arrives.
    pub async fn chat_stream<F>(
        &self,
        messages: &[ChatMessage],
        mut on_delta: F,
    ) -> Result<StreamedReply, CliError>
    where
        F: FnMut(&str),
    {
        ensure_messages(messages)?;

        let payload = ChatRequest {
            messages: messages.to_vec(),
            stream: true,
        };
        let mut source = self
            .authorized(self.http.post(self.endpoint("/chat/stream")))
            .json(&payload)
            .eventsource()
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;

        let mut reply = StreamedReply {
            text: String::new(),
            request_id: None,
        };

        let outcome = loop {
            let Some(event) = source.next().await else {
                break Err(CliError::StreamTruncated);
            };

            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data.trim() == DONE_SENTINEL {
                        break Ok(());
                    }
                    match WireEvent::from_sse_data(&message.data) {
                        Ok(WireEvent::Delta {
                            content,
                            request_id,
                        }) => {
                            on_delta(&content);
                            reply.text.push_str(&content);
                            reply.request_id.get_or_insert(request_id);
                        }
                        Ok(WireEvent::Error { error, kind }) => {
                            break Err(CliError::Stream {
                                kind,
                                message: error,
                            });
                        }
                        Ok(WireEvent::Done) => break Ok(()),
                        Err(err) => break Err(CliError::Decode(err.to_string())),
                    }
                }
                Err(EventSourceError::StreamEnded) => break Err(CliError::StreamTruncated),
                Err(EventSourceError::InvalidStatusCode(status, response)) => {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unable to read body>".to_string());
                    break Err(status_error(status.as_u16(), body));
                }
                Err(err) => break Err(CliError::HttpTransport(err.to_string())),
            }
        };

        source.close();
        outcome.map(|()| reply)
    }

    pub async fn health(&self) -> Result<Value, CliError> {
        let response = self
            .http
            .get(self.endpoint("/health"))
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(status_error(status, body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| CliError::Decode(err.to_string()))
    }
}

fn ensure_messages(messages: &[ChatMessage]) -> Result<(), CliError> {
    if messages.is_empty() {
        return Err(CliError::InvalidArgument(
            "conversation cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Prefers the gateway's structured error body when there is one.
fn status_error(status: u16, body: String) -> CliError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => CliError::Api {
            status,
            kind: parsed.kind,
            message: parsed.error,
        },
        Err(_) => CliError::HttpStatus { status, body },
    }
}

/// Conversation kept on the client and resent in full every turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Drops the trailing user turn after a failed exchange.
    pub fn rollback_user(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == "user") {
            self.messages.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Exit,
    Empty,
    Message(String),
}

pub fn parse_repl_line(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    match line.to_lowercase().as_str() {
        "quit" | "exit" | "bye" => ReplInput::Exit,
        _ => ReplInput::Message(line.to_string()),
    }
}

pub fn client_for(cli: &Cli) -> Result<CliClient, CliError> {
    Ok(CliClient::new(cli.server.clone())?.with_api_key(cli.api_key.clone()))
}

/// Runs a one-shot command and returns what should be printed.
///
/// Streaming chat prints deltas as they arrive and returns an empty string.
pub async fn run(cli: Cli) -> Result<String, CliError> {
    let client = client_for(&cli)?;

    match cli.command {
        Commands::Chat { message, stream } => {
            if message.trim().is_empty() {
                return Err(CliError::InvalidArgument(
                    "message cannot be empty".to_string(),
                ));
            }
            let messages = [ChatMessage::user(message)];
            if stream {
                client
                    .chat_stream(&messages, |delta| {
                        use std::io::Write;
                        print!("{delta}");
                        let _ = std::io::stdout().flush();
                    })
                    .await?;
                Ok(String::new())
            } else {
                Ok(client.chat(&messages).await?.response)
            }
        }
        Commands::Health => {
            let health = client.health().await?;
            serde_json::to_string_pretty(&health).map_err(|err| CliError::Decode(err.to_string()))
        }
        Commands::Repl { .. } => Err(CliError::InvalidArgument(
            "repl runs interactively".to_string(),
        )),
    }
}
