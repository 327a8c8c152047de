//! Recording fakes for the external collaborators.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::dispatch::{DeliveryOutcome, DispatchEvent, Dispatcher};
use crate::oauth::{TokenExchanger, TokenResponse};
use crate::platform::{ChatTarget, MessageSender, TextFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub target: ChatTarget,
    pub text: String,
    pub format: TextFormat,
}

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, target: ChatTarget, text: &str, format: TextFormat) {
        self.sent.lock().unwrap().push(SentMessage {
            target,
            text: text.to_string(),
            format,
        });
    }
}

/// Answers every dispatch with a fixed status.
pub struct StubDispatcher {
    status: u16,
    events: Mutex<Vec<DispatchEvent>>,
}

impl StubDispatcher {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for StubDispatcher {
    async fn dispatch(&self, event: DispatchEvent) -> DeliveryOutcome {
        self.events.lock().unwrap().push(event);
        DeliveryOutcome::from_status(self.status)
    }
}

pub enum TokenReply {
    Response(TokenResponse),
    TransportError,
}

pub struct StubTokenExchanger {
    reply: TokenReply,
    codes: Mutex<Vec<String>>,
}

impl StubTokenExchanger {
    pub fn new(reply: TokenReply) -> Self {
        Self {
            reply,
            codes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_refresh_token(token: &str) -> Self {
        Self::new(TokenReply::Response(TokenResponse {
            refresh_token: Some(token.to_string()),
            ..Default::default()
        }))
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchanger for StubTokenExchanger {
    async fn exchange(&self, code: &str) -> Result<TokenResponse> {
        self.codes.lock().unwrap().push(code.to_string());
        match &self.reply {
            TokenReply::Response(response) => Ok(response.clone()),
            TokenReply::TransportError => anyhow::bail!("connection refused"),
        }
    }
}
