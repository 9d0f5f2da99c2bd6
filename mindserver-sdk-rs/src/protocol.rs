//! Hub wire protocol.
//!
//! Every frame is a JSON text frame of the form `{"event": "<name>", "data": <args>}`.
//! Single-argument events carry the bare value, multi-argument events carry a
//! positional array and zero-argument events omit `data` entirely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the registry snapshot pushed to every connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    pub name: String,
    pub in_game: bool,
}

/// Events sent by workers and management clients to the hub.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    RegisterAgents(Vec<String>),
    LoginAgent(String),
    LogoutAgent(String),
    /// `(target agent, payload)`
    ChatMessage(String, Value),
    /// `(target agent, text)`
    SendMessage(String, String),
    RestartAgent(String),
    StopAgent(String),
    StartAgent(String),
    StopAllAgents,
    Shutdown,
}

/// Events sent by the hub to its connections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    AgentsUpdate(Vec<AgentStatus>),
    RegisterAgentsSuccess,
    /// `(speaker, payload)`; the speaker is the sending connection's agent, if it has one.
    ChatMessage(Option<String>, Value),
    SendMessage(String, String),
    RestartAgent(String),
    StopAgent(String),
    StartAgent(String),
    Shutdown,
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterAgents(_) => "register-agents",
            ClientEvent::LoginAgent(_) => "login-agent",
            ClientEvent::LogoutAgent(_) => "logout-agent",
            ClientEvent::ChatMessage(..) => "chat-message",
            ClientEvent::SendMessage(..) => "send-message",
            ClientEvent::RestartAgent(_) => "restart-agent",
            ClientEvent::StopAgent(_) => "stop-agent",
            ClientEvent::StartAgent(_) => "start-agent",
            ClientEvent::StopAllAgents => "stop-all-agents",
            ClientEvent::Shutdown => "shutdown",
        }
    }
}
