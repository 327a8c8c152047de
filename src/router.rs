use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{DeliveryOutcome, DispatchEvent, Dispatcher};
use crate::oauth::AuthorizationRequest;
use crate::platform::telegram::escape_html;
use crate::platform::{ChatTarget, IncomingMessage, MessageSender, TextFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Authorize,
    Unknown(String),
}

impl Command {
    /// Leading `/word` token, case-insensitive. `/start@my_bot` yields `start`.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }

        let word = rest[..end].to_ascii_lowercase();
        Some(match word.as_str() {
            "start" => Command::Start,
            "auth" | "authorize" => Command::Authorize,
            _ => Command::Unknown(word),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command(Command),
    SubmitUrl(String),
    Ignore,
}

/// Commands win over URL detection, so `/start http://x` is a command.
pub fn classify(text: &str) -> Intent {
    match Command::parse(text) {
        Some(command) => Intent::Command(command),
        None if text.contains("http") => Intent::SubmitUrl(text.to_string()),
        None => Intent::Ignore,
    }
}

/// What the router did with one update. Only used for logging and tests;
/// the webhook acknowledgement never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Ignored,
    Greeted,
    AuthorizationSent,
    AuthorizationUnavailable,
    UrlDispatched(DeliveryOutcome),
}

pub struct CommandRouter {
    config: Arc<Config>,
    sender: Arc<dyn MessageSender>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl CommandRouter {
    pub fn new(
        config: Arc<Config>,
        sender: Arc<dyn MessageSender>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            config,
            sender,
            dispatcher,
        }
    }

    /// Handle one message. Every branch is terminal; no state survives the call.
    pub async fn route(&self, message: &IncomingMessage) -> RouteOutcome {
        info!(
            "Telegram message from {} ({}) in chat {}: {}",
            message.user_name, message.user_id, message.chat_id, message.text
        );

        match classify(&message.text) {
            Intent::Command(Command::Start) => self.start(message).await,
            Intent::Command(Command::Authorize) => self.authorize(message).await,
            Intent::Command(Command::Unknown(name)) => {
                info!("Ignoring unknown command /{}", name);
                RouteOutcome::Ignored
            }
            Intent::SubmitUrl(url) => self.submit_url(message, &url).await,
            Intent::Ignore => RouteOutcome::Ignored,
        }
    }

    /// HTML: legacy Markdown cannot escape `_` or `*` inside bold.
    async fn start(&self, message: &IncomingMessage) -> RouteOutcome {
        let text = format!(
            "Hello, <b>{}</b>! 👋\n\n\
             I forward download links to the automation pipeline.\n\
             Use /auth to authorize Google Drive access, or send me a download URL.",
            escape_html(&message.user_name)
        );
        self.sender
            .send(message.chat_id.into(), &text, TextFormat::Html)
            .await;
        RouteOutcome::Greeted
    }

    async fn authorize(&self, message: &IncomingMessage) -> RouteOutcome {
        let oauth = &self.config.oauth;
        let auth_url = AuthorizationRequest::for_sender(oauth, message.user_id)
            .map(|request| request.authorization_url(&oauth.auth_url));

        let auth_url = match auth_url {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                warn!("Cannot build authorization URL: {:#}", e);
                return self.authorization_unavailable(message).await;
            }
            None => {
                warn!("OAuth client ID or redirect URI not configured");
                return self.authorization_unavailable(message).await;
            }
        };

        let link = escape_html(&auth_url);
        let text = format!(
            "<b>Attention! Click the link below to authorize:</b>\n\n\
             <a href=\"{link}\">AUTHORIZE GOOGLE DRIVE</a>\n\n\
             URL: <code>{link}</code>\n\n"
        );

        // The link goes to the sender privately so it never shows up in a group.
        self.sender
            .send(ChatTarget::Id(message.user_id), &text, TextFormat::Html)
            .await;
        self.sender
            .send(
                message.chat_id.into(),
                "✅ Authorization link sent. Check your latest messages.",
                TextFormat::Markdown,
            )
            .await;
        RouteOutcome::AuthorizationSent
    }

    async fn authorization_unavailable(&self, message: &IncomingMessage) -> RouteOutcome {
        self.sender
            .send(
                message.chat_id.into(),
                "❌ OAuth configuration is incomplete.",
                TextFormat::Markdown,
            )
            .await;
        RouteOutcome::AuthorizationUnavailable
    }

    async fn submit_url(&self, message: &IncomingMessage, url: &str) -> RouteOutcome {
        let chat: ChatTarget = message.chat_id.into();

        self.sender
            .send(
                chat.clone(),
                &format!("URL detected: `{}`\n", url),
                TextFormat::Markdown,
            )
            .await;

        let outcome = self
            .dispatcher
            .dispatch(DispatchEvent::url_received(url, message.user_id))
            .await;

        if outcome.is_accepted() {
            self.sender
                .send(chat, "📥 Download flow triggered.", TextFormat::Markdown)
                .await;
        } else {
            warn!(
                "URL dispatch failed with status {}: {}",
                outcome.status,
                outcome.error.as_deref().unwrap_or("no detail")
            );
            self.sender
                .send(
                    chat,
                    &format!(
                        "❌ Failed to reach the automation pipeline. Status: {}",
                        outcome.status
                    ),
                    TextFormat::Markdown,
                )
                .await;
        }

        RouteOutcome::UrlDispatched(outcome)
    }
}
