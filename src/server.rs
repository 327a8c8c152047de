use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::FutureExt;
use serde_json::json;
use teloxide::types::Update;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::callback::{CallbackQuery, OAuthCallbackHandler};
use crate::platform::telegram;
use crate::router::CommandRouter;

pub const WEBHOOK_ACK: &str = "Update received and being processed.";
pub const WEBHOOK_ERROR_ACK: &str = "Error, but acknowledged.";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
    pub callback: Arc<OAuthCallbackHandler>,
}

/// `/` and `/oauth_callback` accept POST too: any dot-free path is a
/// webhook target. Everything else is 404.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness).post(webhook).fallback(not_found))
        .route("/oauth_callback", get(oauth_callback).post(webhook).fallback(not_found))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "running!" }))
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match state.callback.handle(&query).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Telegram retries any non-200 answer, so the acknowledgement is always 200
/// and independent of what processing the update did. That includes bodies
/// the extractor rejects (over the size limit, aborted mid-stream).
async fn webhook(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, &'static str) {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Unreadable webhook body: {}", e);
            return (StatusCode::OK, WEBHOOK_ERROR_ACK);
        }
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed webhook body: {}", e);
            return (StatusCode::OK, WEBHOOK_ERROR_ACK);
        }
    };

    let Some(message) = telegram::incoming(&update) else {
        debug!("Ignoring update {:?} without text message", update.id);
        return (StatusCode::OK, WEBHOOK_ACK);
    };

    match AssertUnwindSafe(state.router.route(&message))
        .catch_unwind()
        .await
    {
        Ok(outcome) => {
            debug!("Update {:?} handled: {:?}", update.id, outcome);
            (StatusCode::OK, WEBHOOK_ACK)
        }
        Err(_) => {
            error!("Routing update {:?} panicked", update.id);
            (StatusCode::OK, WEBHOOK_ERROR_ACK)
        }
    }
}

async fn fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method == Method::POST && !uri.path().contains('.') {
        return webhook(State(state), body).await.into_response();
    }
    not_found().await.into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Endpoint Not Found")
}
