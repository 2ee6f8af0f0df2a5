use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    fn verb(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Body posted to `WEBHOOK_URL`. `content` makes it readable by chat webhooks.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: ChangeKind,
    pub id: String,
    pub name: Option<String>,
    pub seq: u64,
    pub timestamp: String,
    pub content: String,
}

impl WebhookPayload {
    pub fn new(event: ChangeKind, id: &str, name: Option<&str>, seq: u64) -> Self {
        let label = name.unwrap_or(id);
        Self {
            event,
            id: id.to_string(),
            name: name.map(str::to_string),
            seq,
            timestamp: Utc::now().to_rfc3339(),
            content: format!("Territory \"{label}\" {}", event.verb()),
        }
    }
}

/// Fire-and-forget: never blocks or fails the request that triggered it.
pub fn notify(state: &AppState, payload: WebhookPayload) {
    let Some(url) = state.webhook_url.clone() else {
        return;
    };
    let client = state.http_client.clone();
    let observability = state.observability.clone();
    tokio::spawn(async move {
        let result = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => {
                observability.record_webhook_delivery();
                debug!(id = %payload.id, seq = payload.seq, "webhook delivered");
            }
            Err(e) => {
                observability.record_webhook_failure();
                warn!(error = %e, id = %payload.id, "webhook delivery failed");
            }
        }
    });
}
