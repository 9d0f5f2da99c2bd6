use crate::behaviors::{Behavior, BehaviorKind, ChatLog, Inbox, InboundMessage, SessionContext};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{self, ClientError, HubSender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 5000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub name: String,
    pub hub_url: String,
    #[serde(default)]
    pub behaviors: Vec<BehaviorKind>,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Agents whose chat the `chat-log` behavior stays quiet about.
    #[serde(default)]
    pub bot_names: Vec<String>,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, hub_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hub_url: hub_url.into(),
            behaviors: Vec::new(),
            reconnect: ReconnectPolicy::default(),
            bot_names: Vec::new(),
        }
    }
}

async fn quit_requested(quit: &mut watch::Receiver<bool>) {
    let _ = quit.wait_for(|q| *q).await;
}

enum Ended {
    Quit,
    Dropped,
}

/// One agent's live presence on the hub.
///
/// `run` logs the agent in and feeds hub events to the attached behaviors until
/// `quit` is called. Lost connections are retried per the [`ReconnectPolicy`].
pub struct AgentSession {
    name: String,
    hub_url: String,
    reconnect: ReconnectPolicy,
    behaviors: Vec<Box<dyn Behavior>>,
    sender: Mutex<Option<HubSender>>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    quit: watch::Sender<bool>,
}

impl AgentSession {
    pub fn new(config: SessionConfig) -> Self {
        let mut behaviors: Vec<Box<dyn Behavior>> = Vec::new();
        let mut inbox = None;
        for kind in &config.behaviors {
            match kind {
                BehaviorKind::ChatLog => {
                    behaviors.push(Box::new(ChatLog::new(config.bot_names.clone())))
                }
                BehaviorKind::Inbox => {
                    let (behavior, rx) = Inbox::new();
                    behaviors.push(Box::new(behavior));
                    inbox = Some(rx);
                }
            }
        }

        let (quit, _) = watch::channel(false);
        Self {
            name: config.name,
            hub_url: config.hub_url,
            reconnect: config.reconnect,
            behaviors,
            sender: Mutex::new(None),
            inbox: Mutex::new(inbox),
            quit,
        }
    }

    pub fn with_behavior(mut self, behavior: Box<dyn Behavior>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver for the `inbox` behavior, if one is attached. Can be taken once.
    pub async fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbox.lock().await.take()
    }

    pub async fn chat(&self, to: &str, payload: Value) -> Result<(), ClientError> {
        match self.sender.lock().await.as_ref() {
            Some(sender) => sender.send(ClientEvent::ChatMessage(to.to_string(), payload)),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Logs the agent out and ends `run`.
    pub async fn quit(&self) {
        let mut sender = self.sender.lock().await;
        self.quit.send_replace(true);
        if let Some(sender) = sender.take() {
            self.logout(&sender);
        }
    }

    fn logout(&self, sender: &HubSender) {
        let _ = sender.send(ClientEvent::LogoutAgent(self.name.clone()));
        sender.close();
    }

    fn has_quit(&self) -> bool {
        *self.quit.borrow()
    }

    pub async fn run(&self) -> Result<(), ClientError> {
        loop {
            if self.has_quit() {
                return Ok(());
            }
            let failure = match self.run_once().await {
                Ok(Ended::Quit) => return Ok(()),
                Ok(Ended::Dropped) => ClientError::Closed,
                Err(e) => e,
            };
            if self.has_quit() {
                return Ok(());
            }
            if !self.reconnect.enabled {
                return Err(failure);
            }

            warn!(
                "{} lost hub connection ({}), retrying in {} ms",
                self.name, failure, self.reconnect.delay_ms
            );
            let mut quit = self.quit.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.reconnect.delay_ms)) => {}
                _ = quit_requested(&mut quit) => return Ok(()),
            }
        }
    }

    async fn run_once(&self) -> Result<Ended, ClientError> {
        let mut link = transport::open(&self.hub_url).await?;
        {
            // quit flips the flag under this lock, so a quit that lands
            // mid-handshake is seen here before login goes out
            let mut sender = self.sender.lock().await;
            if self.has_quit() {
                link.sender.close();
                return Ok(Ended::Quit);
            }
            link.sender
                .send(ClientEvent::LoginAgent(self.name.clone()))?;
            *sender = Some(link.sender.clone());
        }
        info!("{} logged in to {}", self.name, self.hub_url);

        let ctx = SessionContext::new(self.name.clone(), link.sender.clone());
        for behavior in &self.behaviors {
            debug!("{} attaching behavior {}", self.name, behavior.name());
            behavior.on_login(&ctx).await;
        }

        let mut quit = self.quit.subscribe();
        loop {
            let event = tokio::select! {
                event = link.events.recv() => event,
                _ = quit_requested(&mut quit) => {
                    if let Some(sender) = self.sender.lock().await.take() {
                        self.logout(&sender);
                    }
                    link.sender.close();
                    return Ok(Ended::Quit);
                }
            };
            match event {
                Some(ServerEvent::ChatMessage(from, payload)) => {
                    for behavior in &self.behaviors {
                        behavior.on_chat(&ctx, from.as_deref(), &payload).await;
                    }
                }
                Some(ServerEvent::SendMessage(_, text)) => {
                    for behavior in &self.behaviors {
                        behavior.on_message(&ctx, &text).await;
                    }
                }
                Some(ServerEvent::RestartAgent(_)) => {
                    info!("{} restarting", self.name);
                    for behavior in &self.behaviors {
                        behavior.on_restart(&ctx).await;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }

        let mut sender = self.sender.lock().await;
        if sender.as_ref().is_some_and(|s| s.same_link(&link.sender)) {
            *sender = None;
        }
        Ok(Ended::Dropped)
    }
}
