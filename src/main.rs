mod callback;
mod config;
mod dispatch;
mod oauth;
mod platform;
mod router;
mod server;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::callback::OAuthCallbackHandler;
use crate::config::Config;
use crate::dispatch::GithubDispatcher;
use crate::oauth::OAuthTokenClient;
use crate::platform::telegram::TelegramSender;
use crate::router::CommandRouter;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telerelay=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bind: {}", config.server.bind);
    info!(
        "  Dispatch target: {}",
        config
            .dispatch
            .dispatch_url()
            .unwrap_or_else(|| "<not configured>".to_string())
    );
    info!("  OAuth scope: {}", config.oauth.scope);

    let config = Arc::new(config);

    // Outbound collaborators
    let sender = Arc::new(TelegramSender::new(&config.telegram)?);
    let dispatcher = Arc::new(GithubDispatcher::new(&config.dispatch));
    let tokens = Arc::new(OAuthTokenClient::new(config.oauth.clone()));

    let state = AppState {
        router: Arc::new(CommandRouter::new(
            config.clone(),
            sender.clone(),
            dispatcher.clone(),
        )),
        callback: Arc::new(OAuthCallbackHandler::new(
            config.clone(),
            tokens,
            dispatcher,
            sender,
        )),
    };

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!("Webhook server listening on {}", config.server.bind);
    axum::serve(listener, server::build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
