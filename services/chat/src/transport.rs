//! Connection to the relay's submit-turn endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mentor_core::turn::{ChatTurn, ContextKey};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// Raw `text/event-stream` body chunks from the relay.
pub type EventBytes = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The relay answered with an error instead of opening the event stream.
    #[error("relay rejected the turn with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("relay request failed: {0}")]
    Request(String),
    #[error("relay connection failed mid-stream: {0}")]
    Transport(String),
}

/// Opens one event stream per turn.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// `turns` holds the prior conversation followed by the new user message.
    async fn open_turn(
        &self,
        context: &ContextKey,
        turns: &[ChatTurn],
    ) -> Result<EventBytes, TransportError>;
}

#[derive(Serialize)]
struct SubmitTurnRequest<'a> {
    lesson: u32,
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `POST {base_url}/chat` over HTTP.
#[derive(Clone)]
pub struct HttpRelay {
    http: Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn open_turn(
        &self,
        context: &ContextKey,
        turns: &[ChatTurn],
    ) -> Result<EventBytes, TransportError> {
        let response = self
            .http
            .post(format!("{}/chat", self.base_url))
            .header("x-user-id", &context.subject)
            .header("accept", "text/event-stream")
            .json(&SubmitTurnRequest {
                lesson: context.lesson,
                messages: turns,
            })
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&raw)
                .map(|body| body.message)
                .unwrap_or(raw);
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        debug!(%context, "Relay opened the event stream");

        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| TransportError::Transport(e.to_string()))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let turns = vec![ChatTurn::assistant("Seja bem-vindo"), ChatTurn::user("oi")];
        let body = serde_json::to_value(SubmitTurnRequest {
            lesson: 4,
            messages: &turns,
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "lesson": 4,
                "messages": [
                    {"role": "assistant", "content": "Seja bem-vindo"},
                    {"role": "user", "content": "oi"}
                ]
            })
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let relay = HttpRelay::new(Client::new(), "http://localhost:3000/");
        assert_eq!(relay.base_url, "http://localhost:3000");
    }
}
