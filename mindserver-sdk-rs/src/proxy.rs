use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{self, ClientError, HubSender};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{debug, info, warn};

/// Local control surface for one agent owned by this worker process.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Halt the agent's activity.
    async fn stop(&self);

    /// Continue after a stop.
    async fn resume(&self);
}

/// The worker process's link to the hub.
///
/// Construct one per process and clone it wherever agents need it; clones
/// share the connection and the owned-agent map.
#[derive(Clone)]
pub struct HubProxy {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    grace: Duration,
    sender: Mutex<Option<HubSender>>,
    agents: RwLock<HashMap<String, Arc<dyn AgentHandle>>>,
    shutdown: watch::Sender<bool>,
}

impl HubProxy {
    pub fn new(url: impl Into<String>, grace: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                grace,
                sender: Mutex::new(None),
                agents: RwLock::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    /// Opens the hub connection if it is not already open and returns the hub URL.
    pub async fn connect(&self) -> Result<String, ClientError> {
        let mut sender = self.inner.sender.lock().await;
        if let Some(existing) = sender.as_ref() {
            if !existing.is_closed() {
                return Ok(self.inner.url.clone());
            }
        }

        let link = transport::open(&self.inner.url).await?;
        info!("Connected to hub at {}", self.inner.url);
        *sender = Some(link.sender.clone());
        tokio::spawn(self.clone().dispatch(link.sender, link.events));
        Ok(self.inner.url.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner
            .sender
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), ClientError> {
        let sender = self.inner.sender.lock().await;
        match sender.as_ref() {
            Some(s) => s.send(event),
            None => Err(ClientError::NotConnected),
        }
    }

    pub async fn register_agent(
        &self,
        name: &str,
        handle: Arc<dyn AgentHandle>,
    ) -> Result<(), ClientError> {
        self.inner
            .agents
            .write()
            .await
            .insert(name.to_string(), handle);
        self.emit(ClientEvent::RegisterAgents(vec![name.to_string()]))
            .await
    }

    pub async fn logout_agent(&self, name: &str) -> Result<(), ClientError> {
        self.emit(ClientEvent::LogoutAgent(name.to_string())).await
    }

    /// Resolves once the hub has ordered a shutdown and the grace delay has passed.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.inner.shutdown.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    async fn handle(&self, name: &str) -> Option<Arc<dyn AgentHandle>> {
        self.inner.agents.read().await.get(name).cloned()
    }

    async fn dispatch(self, link: HubSender, mut events: mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::StopAgent(name) => match self.handle(&name).await {
                    Some(agent) => {
                        info!("Stopping agent {}", name);
                        agent.stop().await;
                    }
                    None => warn!("Stop requested for unknown agent {}", name),
                },
                ServerEvent::StartAgent(name) => match self.handle(&name).await {
                    Some(agent) => {
                        info!("Resuming agent {}", name);
                        agent.resume().await;
                    }
                    None => warn!("Start requested for unknown agent {}", name),
                },
                ServerEvent::RegisterAgentsSuccess => info!("Agents registered with hub"),
                ServerEvent::Shutdown => {
                    info!("Hub requested shutdown");
                    let agents: Vec<_> = self.inner.agents.read().await.values().cloned().collect();
                    for agent in agents {
                        agent.stop().await;
                    }
                    tokio::time::sleep(self.inner.grace).await;
                    self.inner.shutdown.send_replace(true);
                }
                other => debug!("Ignoring {:?}", other),
            }
        }

        info!("Disconnected from hub at {}", self.inner.url);
        let mut sender = self.inner.sender.lock().await;
        if sender.as_ref().is_some_and(|s| s.same_link(&link)) {
            *sender = None;
        }
    }
}
