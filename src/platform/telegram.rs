use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{ChatId, ParseMode, Recipient, Update, UpdateKind};
use teloxide::Bot;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;
use crate::platform::{ChatTarget, IncomingMessage, MessageSender, TextFormat};

const DEFAULT_USER_NAME: &str = "friend";

/// Reduce a webhook update to the text message the router works on.
/// Returns `None` for inert updates: edited messages, callback queries,
/// messages without a sender or without text, and payloads teloxide could
/// not classify.
pub fn incoming(update: &Update) -> Option<IncomingMessage> {
    let UpdateKind::Message(msg) = &update.kind else {
        return None;
    };
    let user = msg.from.as_ref()?;
    let text = msg.text()?;

    let user_name = if user.first_name.is_empty() {
        DEFAULT_USER_NAME.to_string()
    } else {
        user.first_name.clone()
    };

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        user_id: i64::try_from(user.id.0).ok()?,
        user_name,
        text: text.to_string(),
    })
}

impl From<ChatTarget> for Recipient {
    fn from(target: ChatTarget) -> Self {
        match target {
            ChatTarget::Id(id) => Recipient::Id(ChatId(id)),
            ChatTarget::Username(name) => Recipient::ChannelUsername(name),
        }
    }
}

#[allow(deprecated)]
fn parse_mode(format: TextFormat) -> ParseMode {
    match format {
        TextFormat::Markdown => ParseMode::Markdown,
        TextFormat::Html => ParseMode::Html,
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sends messages through the Bot API `sendMessage` method.
pub struct TelegramSender {
    bot: Option<Bot>,
}

impl TelegramSender {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let bot = match &config.bot_token {
            Some(token) => {
                let mut bot = Bot::new(token);
                if let Some(api_url) = &config.api_url {
                    let url = url::Url::parse(api_url)
                        .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
                    bot = bot.set_api_url(url);
                }
                Some(bot)
            }
            None => {
                warn!("Telegram bot token missing; outbound messages will be dropped");
                None
            }
        };

        Ok(Self { bot })
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, target: ChatTarget, text: &str, format: TextFormat) {
        let Some(bot) = &self.bot else {
            error!("Cannot send message to chat {}: bot token not configured", target);
            return;
        };

        debug!("Sending {:?} message to chat {}", format, target);

        let chat = target.to_string();
        if let Err(e) = bot
            .send_message(Recipient::from(target), text)
            .parse_mode(parse_mode(format))
            .await
        {
            error!("Telegram sendMessage to chat {} failed: {}", chat, e);
        }
    }
}
