//! Upstream Provider Clients
//!
//! One streaming request per turn to the text-generation provider. The clients
//! only open the stream and hand back raw byte chunks; frame decoding happens in
//! `mentor_core::frame`.

use crate::config::{Config, GenerationSettings, Provider};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mentor_core::{
    frame::FrameShape,
    turn::{ChatTurn, Role},
};
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::pin::Pin;
use std::sync::Arc;

/// Raw response body chunks from the provider.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider answered the initial request with a non-success status.
    #[error("upstream rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The request could not be sent or its headers never arrived.
    #[error("upstream request failed: {0}")]
    Request(String),
    /// The connection broke after streaming had started.
    #[error("upstream transport failed mid-stream: {0}")]
    Transport(String),
}

/// A provider that can stream a reply to a role-tagged conversation.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// How text pieces are nested inside this provider's frames.
    fn frame_shape(&self) -> FrameShape;

    /// Opens the streaming request. Resolves only once the provider has
    /// accepted it; a rejection is returned here, never mid-stream.
    async fn open_stream(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<ByteStream, UpstreamError>;
}

/// Builds the configured provider's client.
pub fn from_config(config: &Config) -> Arc<dyn UpstreamClient> {
    let http = Client::new();
    match config.provider {
        Provider::Gemini => Arc::new(GeminiClient {
            http,
            base_url: config.upstream_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            generation: config.generation,
        }),
        Provider::OpenAI => Arc::new(OpenAICompatibleClient {
            http,
            base_url: config.upstream_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            generation: config.generation,
        }),
    }
}

/// Sends the request and checks the handshake before exposing the body.
async fn open(request: RequestBuilder) -> Result<ByteStream, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::Request(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Rejected { status, body });
    }

    Ok(Box::pin(response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| UpstreamError::Transport(e.to_string()))
    })))
}

/// Google Gemini `streamGenerateContent`, requested in SSE mode.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationSettings,
}

impl GeminiClient {
    fn request_body(&self, system_prompt: &str, turns: &[ChatTurn]) -> Value {
        let contents: Vec<Value> = turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": turn.content }] })
            })
            .collect();

        json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "temperature": self.generation.temperature,
                "maxOutputTokens": self.generation.max_output_tokens,
            }
        })
    }
}

#[async_trait]
impl UpstreamClient for GeminiClient {
    fn frame_shape(&self) -> FrameShape {
        FrameShape::Gemini
    }

    async fn open_stream(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<ByteStream, UpstreamError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let request = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(system_prompt, turns));
        open(request).await
    }
}

/// Any OpenAI-compatible `chat/completions` endpoint with `stream: true`.
pub struct OpenAICompatibleClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    generation: GenerationSettings,
}

impl OpenAICompatibleClient {
    fn request_body(&self, system_prompt: &str, turns: &[ChatTurn]) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": system_prompt })];
        messages.extend(
            turns
                .iter()
                .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content })),
        );

        json!({
            "model": self.model,
            "stream": true,
            "messages": messages,
            "temperature": self.generation.temperature,
            "max_tokens": self.generation.max_output_tokens,
        })
    }
}

#[async_trait]
impl UpstreamClient for OpenAICompatibleClient {
    fn frame_shape(&self) -> FrameShape {
        FrameShape::OpenAICompatible
    }

    async fn open_stream(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<ByteStream, UpstreamError> {
        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system_prompt, turns));
        open(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            temperature: 0.5,
            max_output_tokens: 512,
        }
    }

    fn turns() -> Vec<ChatTurn> {
        vec![
            ChatTurn::assistant("Seja bem-vindo!"),
            ChatTurn::user("oi"),
        ]
    }

    #[test]
    fn test_gemini_body_maps_roles_and_settings() {
        let client = GeminiClient {
            http: Client::new(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            model: "gemini-test".to_string(),
            generation: settings(),
        };
        let body = client.request_body("be brief", &turns());

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "model");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Seja bem-vindo!");
        assert_eq!(body["contents"][1]["role"], "user");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_openai_body_puts_system_prompt_first() {
        let client = OpenAICompatibleClient {
            http: Client::new(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            model: "gpt-test".to_string(),
            generation: settings(),
        };
        let body = client.request_body("be brief", &turns());

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][2]["content"], "oi");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_rejection_message_includes_status() {
        let err = UpstreamError::Rejected {
            status: 429,
            body: "quota".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream rejected the request with status 429: quota"
        );
    }
}
