//! Message and progress stores backed by the relay's REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentor_core::{
    store::{MessageStore, ProgressRecord, ProgressStore, StoreError, StoredMessage},
    turn::{ContextKey, Role},
};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct HttpStores {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct UpsertBody {
    completed: bool,
    completed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ProgressEntry {
    lesson: u32,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ProgressSummary {
    lessons: Vec<ProgressEntry>,
}

impl HttpStores {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Sends the request, mapping connection failures and 5xx to `Unavailable`
/// and any other non-success status to `Rejected`.
async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = format!("{}: {}", status, response.text().await.unwrap_or_default());
    if status.is_server_error() {
        Err(StoreError::Unavailable(detail))
    } else {
        Err(StoreError::Rejected(detail))
    }
}

#[async_trait]
impl MessageStore for HttpStores {
    async fn append(&self, context: &ContextKey, role: Role, text: &str) -> Result<(), StoreError> {
        let request = self
            .http
            .post(self.url(&format!("/lessons/{}/messages", context.lesson)))
            .header("x-user-id", &context.subject)
            .json(&AppendBody {
                role,
                content: text,
            });
        send(request).await?;
        Ok(())
    }

    async fn history(&self, context: &ContextKey) -> Result<Vec<StoredMessage>, StoreError> {
        let request = self
            .http
            .get(self.url(&format!("/lessons/{}/messages", context.lesson)))
            .header("x-user-id", &context.subject);
        send(request)
            .await?
            .json::<Vec<StoredMessage>>()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ProgressStore for HttpStores {
    async fn upsert(
        &self,
        subject: &str,
        lesson: u32,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let request = self
            .http
            .put(self.url(&format!("/progress/{lesson}")))
            .header("x-user-id", subject)
            .json(&UpsertBody {
                completed,
                completed_at: at,
            });
        send(request).await?;
        Ok(())
    }

    async fn list(&self, subject: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let request = self
            .http
            .get(self.url("/progress"))
            .header("x-user-id", subject);
        let summary = send(request)
            .await?
            .json::<ProgressSummary>()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(summary
            .lessons
            .into_iter()
            .map(|entry| ProgressRecord {
                subject: subject.to_string(),
                lesson: entry.lesson,
                completed: entry.completed,
                completed_at: entry.completed_at,
            })
            .collect())
    }
}
