//! Real-time relay between the management plane and agent workers.
//!
//! All registry reads and writes, and every outbound enqueue they trigger,
//! happen under one lock. Outbound queues are unbounded, so a handler never
//! suspends while holding it and each connection sees events in processing order.

use crate::registry::{ConnId, SessionRegistry};
use mindserver_sdk_rs::protocol::{AgentStatus, ClientEvent, ServerEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

pub type ConnSender = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    tx: ConnSender,
    /// The agent this connection logged in as.
    agent: Option<String>,
}

#[derive(Default)]
struct HubState {
    registry: SessionRegistry,
    connections: HashMap<ConnId, Connection>,
}

impl HubState {
    fn send(&self, conn: ConnId, event: ServerEvent) -> bool {
        match self.connections.get(&conn) {
            Some(c) => c.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Pushes the full registry snapshot to every connection.
    fn notify_agents(&self) {
        let snapshot = self.registry.snapshot();
        for c in self.connections.values() {
            let _ = c.tx.send(ServerEvent::AgentsUpdate(snapshot.clone()));
        }
    }

    fn agent_of(&self, conn: ConnId) -> Option<String> {
        self.connections.get(&conn).and_then(|c| c.agent.clone())
    }

    fn logout(&mut self, name: &str) -> bool {
        match self.registry.logout(name) {
            Some(conn) => {
                if let Some(c) = self.connections.get_mut(&conn) {
                    if c.agent.as_deref() == Some(name) {
                        c.agent = None;
                    }
                }
                true
            }
            None => false,
        }
    }

    fn route_to_manager(&self, name: &str, event: ServerEvent) {
        match self.registry.manager(name) {
            Some(conn) => {
                if !self.send(conn, event) {
                    warn!("Manager connection for {} is gone", name);
                }
            }
            None => warn!("No manager for agent {}, dropping {:?}", name, event),
        }
    }
}

pub struct SessionHub {
    state: Mutex<HubState>,
    grace: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionHub {
    pub fn new(grace: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Mutex::new(HubState::default()),
            grace,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Adds a connection and pushes the current snapshot to it alone.
    pub async fn connect(&self, tx: ConnSender) -> ConnId {
        let conn = ConnId::new();
        let mut state = self.state.lock().await;
        let _ = tx.send(ServerEvent::AgentsUpdate(state.registry.snapshot()));
        state
            .connections
            .insert(conn, Connection { tx, agent: None });
        info!("Client {} connected", conn);
        conn
    }

    pub async fn disconnect(&self, conn: ConnId) {
        let mut state = self.state.lock().await;
        let Some(connection) = state.connections.remove(&conn) else {
            return;
        };
        info!("Client {} disconnected", conn);

        let released = state.registry.release_connection(conn);
        if !released.is_empty() {
            debug!("Released manager entries {:?}", released);
        }

        if let Some(name) = connection.agent {
            if state.registry.live_connection(&name) == Some(conn) {
                state.registry.logout(&name);
                info!("Agent {} left with its connection", name);
                state.notify_agents();
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<AgentStatus> {
        self.state.lock().await.registry.snapshot()
    }

    /// Resolves once a `shutdown` event has run its grace delay.
    pub async fn shutdown_signal(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn handle_event(&self, conn: ConnId, event: ClientEvent) {
        debug!("{} from {}", event.name(), conn);
        match event {
            ClientEvent::RegisterAgents(names) => self.register_agents(conn, names).await,
            ClientEvent::LoginAgent(name) => self.login_agent(conn, name).await,
            ClientEvent::LogoutAgent(name) => {
                let mut state = self.state.lock().await;
                if state.logout(&name) {
                    info!("Agent {} logged out", name);
                    state.notify_agents();
                }
            }
            ClientEvent::ChatMessage(name, payload) => self.chat_message(conn, name, payload).await,
            ClientEvent::SendMessage(name, text) => {
                let state = self.state.lock().await;
                match state.registry.live_connection(&name) {
                    Some(target) => {
                        info!("Sending message to {}: {}", name, text);
                        state.send(target, ServerEvent::SendMessage(name, text));
                    }
                    None => warn!("Agent {} is not logged in, cannot send message", name),
                }
            }
            ClientEvent::RestartAgent(name) => {
                let state = self.state.lock().await;
                if let Some(target) = state.registry.live_connection(&name) {
                    info!("Restarting agent {}", name);
                    state.send(target, ServerEvent::RestartAgent(name));
                }
            }
            ClientEvent::StopAgent(name) => {
                let state = self.state.lock().await;
                state.route_to_manager(&name, ServerEvent::StopAgent(name.clone()));
            }
            ClientEvent::StartAgent(name) => {
                let state = self.state.lock().await;
                state.route_to_manager(&name, ServerEvent::StartAgent(name.clone()));
            }
            ClientEvent::StopAllAgents => {
                let state = self.state.lock().await;
                info!("Stopping all agents");
                for name in state.registry.live_names() {
                    if let Some(manager) = state.registry.manager(&name) {
                        state.send(manager, ServerEvent::StopAgent(name));
                    }
                }
            }
            ClientEvent::Shutdown => self.begin_shutdown().await,
        }
    }

    async fn register_agents(&self, conn: ConnId, names: Vec<String>) {
        let mut state = self.state.lock().await;
        info!("Registering agents {:?}", names);
        for name in &names {
            state.registry.register(name, conn);
        }
        state.notify_agents();
        state.send(conn, ServerEvent::RegisterAgentsSuccess);
    }

    async fn login_agent(&self, conn: ConnId, name: String) {
        let mut state = self.state.lock().await;
        if let Some(current) = state.agent_of(conn) {
            if current != name {
                warn!("Connection already logged in as {}, refusing {}", current, name);
                return;
            }
        }

        match state.registry.login(&name, conn) {
            Ok(true) => {
                if let Some(c) = state.connections.get_mut(&conn) {
                    c.agent = Some(name.clone());
                }
                info!("Agent {} logged in", name);
                state.notify_agents();
            }
            Ok(false) => debug!("Agent {} already live on this connection", name),
            Err(e) => warn!("Login refused: {}", e),
        }
    }

    async fn chat_message(&self, conn: ConnId, name: String, payload: Value) {
        let state = self.state.lock().await;
        let Some(target) = state.registry.live_connection(&name) else {
            warn!("Agent {} is not logged in, dropping chat message", name);
            return;
        };
        let speaker = state.agent_of(conn);
        debug!("{:?} -> {}: {}", speaker, name, payload);
        state.send(target, ServerEvent::ChatMessage(speaker, payload));
    }

    async fn begin_shutdown(&self) {
        {
            let state = self.state.lock().await;
            info!("Shutting down in {:?}", self.grace);
            for manager in state.registry.manager_connections() {
                state.send(manager, ServerEvent::Shutdown);
            }
        }

        let shutdown = self.shutdown.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            shutdown.send_replace(true);
        });
    }
}
