use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::OAuthConfig;

/// Parameters of an authorization-code request.
///
/// `state` carries the Telegram user ID through the provider and back to
/// `/oauth_callback`. Nothing is stored server-side, so the callback trusts
/// whatever the provider echoes back.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
}

impl AuthorizationRequest {
    /// Build a request for `sender`, or `None` if client ID or redirect URI
    /// are not configured.
    pub fn for_sender(config: &OAuthConfig, sender: i64) -> Option<Self> {
        Some(Self {
            client_id: config.client_id.clone()?,
            redirect_uri: config.redirect_uri.clone()?,
            scope: config.scope.clone(),
            state: sender.to_string(),
        })
    }

    /// Render the provider authorization URL. Offline access plus forced
    /// consent makes the provider return a refresh token every time.
    pub fn authorization_url(&self, auth_url: &str) -> Result<String> {
        let mut url = Url::parse(auth_url)
            .with_context(|| format!("Invalid OAuth authorization URL: {}", auth_url))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &self.state);
        Ok(url.to_string())
    }
}

/// Token endpoint response. Providers report failures in the same JSON
/// object, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange an authorization code. `Err` means the exchange could not be
    /// performed at all (transport failure, unreadable body).
    async fn exchange(&self, code: &str) -> Result<TokenResponse>;
}

/// Form-encoded `authorization_code` grant against the provider token endpoint.
pub struct OAuthTokenClient {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthTokenClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TokenExchanger for OAuthTokenClient {
    async fn exchange(&self, code: &str) -> Result<TokenResponse> {
        let client_id = self.config.client_id.as_deref().unwrap_or_default();
        let client_secret = self.config.client_secret.as_deref().unwrap_or_default();
        let redirect_uri = self.config.redirect_uri.as_deref().unwrap_or_default();

        let form = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        debug!("Exchanging authorization code at {}", self.config.token_url);

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .context("Failed to send token exchange request")?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token endpoint responded with {}", status);
        }

        // Error responses still carry a JSON body with `error_description`.
        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token endpoint response")
    }
}
