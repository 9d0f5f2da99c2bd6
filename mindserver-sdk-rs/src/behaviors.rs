use crate::protocol::ClientEvent;
use crate::transport::{ClientError, HubSender};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::info;

/// What a behavior sees of the session it is attached to.
pub struct SessionContext {
    name: String,
    sender: HubSender,
}

impl SessionContext {
    pub(crate) fn new(name: String, sender: HubSender) -> Self {
        Self { name, sender }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chat(&self, to: &str, payload: Value) -> Result<(), ClientError> {
        self.sender
            .send(ClientEvent::ChatMessage(to.to_string(), payload))
    }
}

/// A module attached to an [`AgentSession`](crate::session::AgentSession).
/// Every hook defaults to doing nothing.
#[async_trait]
pub trait Behavior: Send + Sync {
    fn name(&self) -> &str;

    async fn on_login(&self, _ctx: &SessionContext) {}

    async fn on_chat(&self, _ctx: &SessionContext, _from: Option<&str>, _payload: &Value) {}

    async fn on_message(&self, _ctx: &SessionContext, _text: &str) {}

    async fn on_restart(&self, _ctx: &SessionContext) {}
}

/// Built-in behaviors selectable from configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BehaviorKind {
    ChatLog,
    Inbox,
}

pub(crate) fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Logs chat from senders that are not one of the known bots.
pub struct ChatLog {
    bots: HashSet<String>,
}

impl ChatLog {
    pub fn new(bot_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            bots: bot_names.into_iter().collect(),
        }
    }

    fn is_bot(&self, from: Option<&str>) -> bool {
        from.is_some_and(|name| self.bots.contains(name))
    }
}

#[async_trait]
impl Behavior for ChatLog {
    fn name(&self) -> &str {
        "chat-log"
    }

    async fn on_chat(&self, ctx: &SessionContext, from: Option<&str>, payload: &Value) {
        if self.is_bot(from) {
            return;
        }
        info!(
            agent = ctx.name(),
            "{}: {}",
            from.unwrap_or("<system>"),
            payload_text(payload)
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: Option<String>,
    pub text: String,
}

/// Forwards inbound chat and direct messages to whoever holds the receiver.
pub struct Inbox {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl Inbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Behavior for Inbox {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn on_chat(&self, _ctx: &SessionContext, from: Option<&str>, payload: &Value) {
        let _ = self.tx.send(InboundMessage {
            from: from.map(str::to_string),
            text: payload_text(payload),
        });
    }

    async fn on_message(&self, _ctx: &SessionContext, text: &str) {
        let _ = self.tx.send(InboundMessage {
            from: None,
            text: text.to_string(),
        });
    }
}
