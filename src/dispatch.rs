use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::DispatchConfig;

/// Status used when the sink could not be called at all.
pub const SYNTHETIC_FAILURE_STATUS: u16 = 500;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The two event types the automation pipeline listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    UrlReceived,
    RefreshTokenReceived,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UrlReceived => "new_url_received",
            EventKind::RefreshTokenReceived => "refresh_token_received",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub kind: EventKind,
    pub payload: Map<String, Value>,
}

impl DispatchEvent {
    /// A URL submitted from chat, tagged with the submitting user.
    pub fn url_received(url: &str, sender: i64) -> Self {
        let mut payload = Map::new();
        payload.insert("url".to_string(), Value::String(url.to_string()));
        payload.insert("sender".to_string(), Value::String(sender.to_string()));
        Self {
            kind: EventKind::UrlReceived,
            payload,
        }
    }

    /// A freshly exchanged refresh token. `sender_chat_id` is the OAuth
    /// `state` echoed back by the provider, or null when it was absent.
    pub fn refresh_token_received(refresh_token: &str, sender_chat_id: Option<&str>) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "refresh_token".to_string(),
            Value::String(refresh_token.to_string()),
        );
        payload.insert(
            "sender_chat_id".to_string(),
            sender_chat_id
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
        );
        Self {
            kind: EventKind::RefreshTokenReceived,
            payload,
        }
    }
}

/// Normalized result of a dispatch call. Only 204 counts as accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: u16,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn from_status(status: u16) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SYNTHETIC_FAILURE_STATUS,
            error: Some(error.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == StatusCode::NO_CONTENT.as_u16()
    }
}

/// Sink for automation events. Implementations never fail: every problem
/// is folded into the returned outcome.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, event: DispatchEvent) -> DeliveryOutcome;
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    event_type: &'a str,
    client_payload: &'a Map<String, Value>,
}

/// Client for the GitHub `repository_dispatch` endpoint.
pub struct GithubDispatcher {
    client: reqwest::Client,
    token: Option<String>,
    url: Option<String>,
}

impl GithubDispatcher {
    pub fn new(config: &DispatchConfig) -> Self {
        let url = config.dispatch_url();
        if config.token.is_none() {
            warn!("Dispatch token missing; automation events will fail");
        }
        if url.is_none() {
            warn!("Dispatch repository owner/name missing; automation events will fail");
        }
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
            url,
        }
    }
}

#[async_trait]
impl Dispatcher for GithubDispatcher {
    async fn dispatch(&self, event: DispatchEvent) -> DeliveryOutcome {
        let (Some(token), Some(url)) = (&self.token, &self.url) else {
            error!(
                "Cannot dispatch '{}': sink credential or repository not configured",
                event.kind
            );
            return DeliveryOutcome::failed("dispatch sink not configured");
        };

        let request = DispatchRequest {
            event_type: event.kind.as_str(),
            client_payload: &event.payload,
        };

        debug!("Dispatching '{}' to {}", event.kind, url);

        let response = self
            .client
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", USER_AGENT)
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::NO_CONTENT {
                    return DeliveryOutcome::from_status(status.as_u16());
                }
                let body = response.text().await.unwrap_or_default();
                warn!("Dispatch '{}' rejected ({}): {}", event.kind, status, body);
                DeliveryOutcome {
                    status: status.as_u16(),
                    error: Some(body).filter(|b| !b.is_empty()),
                }
            }
            Err(e) => {
                error!("Dispatch '{}' transport failure: {}", event.kind, e);
                DeliveryOutcome::failed(e.to_string())
            }
        }
    }
}
