//! Runs one agent against a hub: registers it through the worker proxy, keeps
//! a live session with the chat-log and inbox behaviors, and exits when the hub
//! orders a shutdown.
//!
//! ```text
//! cargo run --example worker -- bot1
//! ```

use async_trait::async_trait;
use mindserver_sdk_rs::behaviors::BehaviorKind;
use mindserver_sdk_rs::config::HubConfig;
use mindserver_sdk_rs::proxy::{AgentHandle, HubProxy};
use mindserver_sdk_rs::session::{AgentSession, SessionConfig};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

struct Worker {
    name: String,
    paused: AtomicBool,
}

#[async_trait]
impl AgentHandle for Worker {
    async fn stop(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("{} paused", self.name);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("{} resumed", self.name);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    mindserver_sdk_rs::logger::init_logging("worker");

    let name = std::env::args().nth(1).unwrap_or_else(|| "bot1".to_string());
    let hub = HubConfig::from_env()?;

    let proxy = HubProxy::new(hub.ws_url(), hub.shutdown_grace);
    proxy.connect().await?;
    let worker = Arc::new(Worker {
        name: name.clone(),
        paused: AtomicBool::new(false),
    });
    proxy.register_agent(&name, worker.clone()).await?;

    let mut config = SessionConfig::new(&name, hub.ws_url());
    config.behaviors = vec![BehaviorKind::ChatLog, BehaviorKind::Inbox];
    let session = Arc::new(AgentSession::new(config));
    let mut inbox = session.take_inbox().await;

    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    loop {
        tokio::select! {
            _ = proxy.wait_for_shutdown() => break,
            Some(message) = async { match inbox.as_mut() { Some(rx) => rx.recv().await, None => None } } => {
                if worker.paused.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(from) = message.from {
                    session.chat(&from, json!(format!("heard: {}", message.text))).await?;
                }
            }
        }
    }

    session.quit().await;
    runner.await??;
    info!("{} exiting", name);
    Ok(())
}
