//! Streaming chat relay.
//!
//! `POST /chat` opens one upstream request for the submitted conversation and
//! re-encodes the provider's frames as `text/event-stream` events:
//! `data: {"content": ...}` per fragment and a final `data: [DONE]`. Setup
//! failures are answered with a 502 before any event is sent; once streaming
//! has started the body always ends with exactly one `[DONE]`.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{
        Json,
        sse::{Event, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use mentor_core::{
    frame::decode_stream,
    relay::relay_events,
    turn::{ChatTurn, Role},
};
use std::{convert::Infallible, sync::Arc};
use tracing::{error, info, instrument};

use crate::{
    handlers::{ApiError, check_lesson, user_id},
    models::{ErrorResponse, SubmitTurnPayload},
    state::AppState,
};

pub const UPSTREAM_UNAVAILABLE: &str = "Could not get a response right now. Please try again.";

/// Stream the assistant's reply to a conversation turn.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "Server-sent relay events", content_type = "text/event-stream", body = String),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 502, description = "Upstream unavailable", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
#[instrument(name = "chat_turn", skip_all, fields(request_id, user_id, lesson))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubmitTurnPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request_id: u32 = rand::random();
    let span = tracing::Span::current();
    span.record("request_id", request_id);

    let user_id = user_id(&headers)?;
    let lesson = check_lesson(payload.lesson)?;
    span.record("user_id", user_id);
    span.record("lesson", lesson);

    let turns: Vec<ChatTurn> = payload.messages.into_iter().map(Into::into).collect();
    match turns.last() {
        Some(last) if last.role == Role::User && !last.content.trim().is_empty() => {}
        _ => {
            return Err(ApiError::BadRequest(
                "messages must end with a non-empty user message".to_string(),
            ));
        }
    }

    let chunks = state
        .upstream
        .open_stream(&state.system_prompt, &turns)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to open upstream stream");
            ApiError::BadGateway(UPSTREAM_UNAVAILABLE.to_string())
        })?;
    info!(turns = turns.len(), "Upstream accepted the turn; relaying");

    let fragments = Box::pin(decode_stream(chunks, state.upstream.frame_shape()));
    let events = relay_events(fragments)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.data())));

    Ok(Sse::new(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::headers_for;
    use crate::models::{MessageRole, TurnMessage};
    use crate::upstream::{ByteStream, UpstreamClient, UpstreamError};
    use async_trait::async_trait;
    use axum::{
        body::to_bytes,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use bytes::Bytes;
    use futures_util::stream;
    use mentor_core::{frame::FrameShape, store::MemoryStore};
    use std::sync::Mutex;

    /// Replays a fixed sequence of body chunks, or refuses the request.
    struct ScriptedUpstream {
        chunks: Vec<Result<&'static str, &'static str>>,
        reject: bool,
        seen: Mutex<Vec<ChatTurn>>,
    }

    impl ScriptedUpstream {
        fn replying(chunks: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                chunks,
                reject: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn rejecting() -> Self {
            Self {
                chunks: Vec::new(),
                reject: true,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        fn frame_shape(&self) -> FrameShape {
            FrameShape::Gemini
        }

        async fn open_stream(
            &self,
            _system_prompt: &str,
            turns: &[ChatTurn],
        ) -> Result<ByteStream, UpstreamError> {
            self.seen.lock().unwrap().extend_from_slice(turns);
            if self.reject {
                return Err(UpstreamError::Rejected {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            let items: Vec<Result<Bytes, UpstreamError>> = self
                .chunks
                .iter()
                .map(|c| match *c {
                    Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                    Err(reason) => Err(UpstreamError::Transport(reason.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn state_with(upstream: Arc<ScriptedUpstream>) -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(AppState {
            messages: store.clone(),
            progress: store,
            upstream,
            system_prompt: Arc::new("Você é um mentor.".to_string()),
        })
    }

    fn payload(text: &str) -> SubmitTurnPayload {
        SubmitTurnPayload {
            lesson: 1,
            messages: vec![TurnMessage {
                role: MessageRole::User,
                content: text.to_string(),
            }],
        }
    }

    async fn run(state: Arc<AppState>, payload: SubmitTurnPayload) -> Response {
        match chat(State(state), headers_for("ana"), Json(payload)).await {
            Ok(sse) => sse.into_response(),
            Err(e) => e.into_response(),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const OLA: &str = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Olá\"}]}}]}\n\n";
    const TUDO_BEM: &str =
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" tudo bem?\"}]}}]}\n\n";

    #[tokio::test]
    async fn test_relays_fragments_then_done() {
        let upstream = Arc::new(ScriptedUpstream::replying(vec![Ok(OLA), Ok(TUDO_BEM)]));
        let response = run(state_with(upstream.clone()), payload("oi")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(
            body_text(response).await,
            "data: {\"content\":\"Olá\"}\n\ndata: {\"content\":\" tudo bem?\"}\n\ndata: [DONE]\n\n"
        );
        assert_eq!(*upstream.seen.lock().unwrap(), vec![ChatTurn::user("oi")]);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks_and_malformed_line() {
        let upstream = Arc::new(ScriptedUpstream::replying(vec![
            Ok("data: {\"candidates\":[{\"content\":{\"parts\":[{\"te"),
            Ok("xt\":\"Ol\u{e1}\"}]}}]}\n\ndata: {not json}\n\n"),
            Ok(TUDO_BEM),
        ]));
        let body = body_text(run(state_with(upstream), payload("oi")).await).await;

        assert_eq!(
            body,
            "data: {\"content\":\"Olá\"}\n\ndata: {\"content\":\" tudo bem?\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_still_ends_with_done() {
        let upstream = Arc::new(ScriptedUpstream::replying(vec![
            Ok(OLA),
            Err("connection reset"),
            Ok(TUDO_BEM),
        ]));
        let body = body_text(run(state_with(upstream), payload("oi")).await).await;

        assert_eq!(body, "data: {\"content\":\"Olá\"}\n\ndata: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_empty_upstream_sends_only_done() {
        let upstream = Arc::new(ScriptedUpstream::replying(vec![]));
        let body = body_text(run(state_with(upstream), payload("oi")).await).await;

        assert_eq!(body, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_setup_failure_is_bad_gateway_without_events() {
        let response = run(state_with(Arc::new(ScriptedUpstream::rejecting())), payload("oi")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_text(response).await;
        assert!(!body.contains("[DONE]"));
        assert!(body.contains(UPSTREAM_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_turn_must_end_with_user_message() {
        let upstream = Arc::new(ScriptedUpstream::replying(vec![Ok(OLA)]));
        let mut request = payload("oi");
        request.messages.push(TurnMessage {
            role: MessageRole::Assistant,
            content: "Olá".to_string(),
        });

        let response = run(state_with(upstream.clone()), request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(upstream.seen.lock().unwrap().is_empty());
    }
}
