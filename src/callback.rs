use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::dispatch::{DispatchEvent, Dispatcher};
use crate::oauth::TokenExchanger;
use crate::platform::{ChatTarget, MessageSender, TextFormat};

pub const SUCCESS_BODY: &str = "✅ Authorization token received!";

/// Query string of the provider redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    /// Telegram user ID set by `/auth`.
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when the user declines consent.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("❌ Authorization failed: provider returned '{0}'.")]
    ProviderDenied(String),

    #[error("❌ Authorization failed: server configuration or authorization code missing.")]
    MissingPrerequisites,

    #[error("❌ Exchange failed: {0}.")]
    NoRefreshToken(String),

    #[error("❌ Failed to forward token to the automation pipeline: {0}")]
    DispatchRejected(u16),

    #[error("❌ Internal error while exchanging the token.")]
    Exchange(#[source] anyhow::Error),
}

impl CallbackError {
    pub fn status(&self) -> StatusCode {
        match self {
            CallbackError::ProviderDenied(_) | CallbackError::MissingPrerequisites => {
                StatusCode::BAD_REQUEST
            }
            CallbackError::NoRefreshToken(_)
            | CallbackError::DispatchRejected(_)
            | CallbackError::Exchange(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Terminal endpoint of the authorization-code flow: code -> refresh token ->
/// automation pipeline -> chat notification.
pub struct OAuthCallbackHandler {
    config: Arc<Config>,
    tokens: Arc<dyn TokenExchanger>,
    dispatcher: Arc<dyn Dispatcher>,
    sender: Arc<dyn MessageSender>,
}

impl OAuthCallbackHandler {
    pub fn new(
        config: Arc<Config>,
        tokens: Arc<dyn TokenExchanger>,
        dispatcher: Arc<dyn Dispatcher>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            config,
            tokens,
            dispatcher,
            sender,
        }
    }

    #[instrument(skip_all, fields(state = query.state.as_deref().unwrap_or("")))]
    pub async fn handle(&self, query: &CallbackQuery) -> Result<&'static str, CallbackError> {
        let oauth = &self.config.oauth;
        let configured = oauth.client_id.is_some()
            && oauth.client_secret.is_some()
            && oauth.redirect_uri.is_some();

        let code = match (query.code.as_deref(), &query.error) {
            (Some(code), _) if configured && !code.is_empty() => code,
            (None, Some(provider_error)) => {
                warn!("Provider redirected with error: {}", provider_error);
                return Err(CallbackError::ProviderDenied(provider_error.clone()));
            }
            _ => {
                warn!("OAuth callback rejected: code or client configuration missing");
                return Err(CallbackError::MissingPrerequisites);
            }
        };

        let response = self.tokens.exchange(code).await.map_err(|e| {
            error!("Token exchange failed: {:#}", e);
            CallbackError::Exchange(e)
        })?;

        let Some(refresh_token) = response.refresh_token else {
            let description = response
                .error_description
                .or(response.error)
                .unwrap_or_else(|| "refresh token not found".to_string());
            warn!("Token endpoint returned no refresh token: {}", description);
            return Err(CallbackError::NoRefreshToken(description));
        };

        let state = query.state.as_deref().filter(|s| !s.is_empty());
        let outcome = self
            .dispatcher
            .dispatch(DispatchEvent::refresh_token_received(&refresh_token, state))
            .await;

        if !outcome.is_accepted() {
            return Err(CallbackError::DispatchRejected(outcome.status));
        }

        if let Some(state) = state {
            self.sender
                .send(
                    ChatTarget::from(state),
                    "✅ *Authorization succeeded!* Your refresh token was received and is being stored.",
                    TextFormat::Markdown,
                )
                .await;
        }

        info!("Refresh token forwarded to the automation pipeline");
        Ok(SUCCESS_BODY)
    }
}
