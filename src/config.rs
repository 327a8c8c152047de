use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Overrides `https://api.telegram.org` (local Bot API server, tests).
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Coordinates of the automation pipeline that receives dispatch events.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default = "default_dispatch_api_url")]
    pub api_url: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            token: None,
            repo_owner: None,
            repo_name: None,
            api_url: default_dispatch_api_url(),
        }
    }
}

impl DispatchConfig {
    /// The `repository_dispatch` endpoint, if both repository coordinates are set.
    pub fn dispatch_url(&self) -> Option<String> {
        let owner = self.repo_owner.as_deref()?;
        let name = self.repo_name.as_deref()?;
        Some(format!(
            "{}/repos/{}/{}/dispatches",
            self.api_url.trim_end_matches('/'),
            owner,
            name
        ))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Public URL of this service's `/oauth_callback` endpoint.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: default_scope(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_dispatch_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive".to_string()
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Treats empty (or whitespace-only) values as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load the config file if it exists, otherwise start from defaults.
    /// Environment overrides are applied on top in both cases.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply the deployment environment variables. `lookup` is injected so
    /// tests don't have to touch the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(v) = get("BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.dispatch.token = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO_OWNER") {
            self.dispatch.repo_owner = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO_NAME") {
            self.dispatch.repo_name = Some(v);
        }
        if let Some(v) = get("CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = get("CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = get("REDIRECT_URI") {
            self.oauth.redirect_uri = Some(v);
        }
        if let Some(port) = get("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
            self.server.bind.set_port(port);
        }

        self.normalize();
        Ok(self)
    }

    fn normalize(&mut self) {
        self.telegram.bot_token = non_empty(self.telegram.bot_token.take());
        self.telegram.api_url = non_empty(self.telegram.api_url.take());
        self.dispatch.token = non_empty(self.dispatch.token.take());
        self.dispatch.repo_owner = non_empty(self.dispatch.repo_owner.take());
        self.dispatch.repo_name = non_empty(self.dispatch.repo_name.take());
        self.oauth.client_id = non_empty(self.oauth.client_id.take());
        self.oauth.client_secret = non_empty(self.oauth.client_secret.take());
        self.oauth.redirect_uri = non_empty(self.oauth.redirect_uri.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind.port(), 8000);
        assert!(config.telegram.bot_token.is_none());
        assert_eq!(config.dispatch.api_url, "https://api.github.com");
        assert_eq!(config.oauth.scope, "https://www.googleapis.com/auth/drive");
        assert_eq!(config.oauth.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
[server]
bind = "127.0.0.1:9000"

[telegram]
bot_token = "123:abc"

[dispatch]
token = "ghp_x"
repo_owner = "octo"
repo_name = "pipeline"

[oauth]
client_id = "cid"
client_secret = "secret"
redirect_uri = "https://relay.example/oauth_callback"
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind.to_string(), "127.0.0.1:9000");
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(
            config.dispatch.dispatch_url().as_deref(),
            Some("https://api.github.com/repos/octo/pipeline/dispatches")
        );
        assert_eq!(config.oauth.client_id.as_deref(), Some("cid"));
    }

    #[test]
    fn test_empty_strings_are_missing() {
        let config = Config::parse(
            r#"
[oauth]
client_id = ""
redirect_uri = "   "
"#,
        )
        .unwrap();
        assert!(config.oauth.client_id.is_none());
        assert!(config.oauth.redirect_uri.is_none());
    }

    #[test]
    fn test_dispatch_url_requires_both_coordinates() {
        let mut dispatch = DispatchConfig {
            repo_owner: Some("octo".into()),
            ..Default::default()
        };
        assert!(dispatch.dispatch_url().is_none());

        dispatch.repo_name = Some("pipeline".into());
        dispatch.api_url = "http://localhost:1234/".into();
        assert_eq!(
            dispatch.dispatch_url().as_deref(),
            Some("http://localhost:1234/repos/octo/pipeline/dispatches")
        );
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = Config::parse("[telegram]\nbot_token = \"from-file\"\n")
            .unwrap()
            .with_overrides(env(&[
                ("BOT_TOKEN", "from-env"),
                ("CLIENT_ID", "cid"),
                ("GITHUB_REPO_OWNER", "octo"),
                ("PORT", "3000"),
            ]))
            .unwrap();

        assert_eq!(config.telegram.bot_token.as_deref(), Some("from-env"));
        assert_eq!(config.oauth.client_id.as_deref(), Some("cid"));
        assert_eq!(config.dispatch.repo_owner.as_deref(), Some("octo"));
        assert_eq!(config.server.bind.port(), 3000);
    }

    #[test]
    fn test_empty_env_does_not_override() {
        let config = Config::parse("[dispatch]\ntoken = \"keep\"\n")
            .unwrap()
            .with_overrides(env(&[("GITHUB_TOKEN", "")]))
            .unwrap();
        assert_eq!(config.dispatch.token.as_deref(), Some("keep"));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = Config::default().with_overrides(env(&[("PORT", "eighty")]));
        assert!(result.is_err());
    }
}
