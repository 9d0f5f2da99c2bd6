//! Client side of the hub WebSocket.
//!
//! [`open`] dials the hub and splits the socket into a writer task fed by an
//! unbounded queue and a reader task that decodes frames into [`ServerEvent`]s.
//! The inbound receiver yields `None` once the connection is gone.

use crate::protocol::{ClientEvent, ServerEvent};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to hub: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected to hub")]
    NotConnected,

    #[error("hub connection closed")]
    Closed,
}

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// Cloneable handle for emitting events on one hub connection.
#[derive(Clone)]
pub struct HubSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl HubSender {
    pub fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.tx
            .send(Outbound::Event(event))
            .map_err(|_| ClientError::Closed)
    }

    /// Sends a close frame after everything queued before it.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles feed the same connection.
    pub fn same_link(&self, other: &HubSender) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

pub struct HubLink {
    pub sender: HubSender,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

pub async fn open(url: &str) -> Result<HubLink, ClientError> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (reader_done_tx, mut reader_done) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                next = out_rx.recv() => match next {
                    Some(outbound) => outbound,
                    None => break,
                },
                _ = &mut reader_done => break,
            };
            let frame = match outbound {
                Outbound::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!("Failed to encode {} event: {}", event.name(), e);
                        continue;
                    }
                },
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = sink.send(frame).await {
                debug!("Hub write failed: {}", e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Hub read failed: {}", e);
                    break;
                }
            };
            match serde_json::from_str::<ServerEvent>(&text) {
                Ok(event) => {
                    if in_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed hub frame: {}", e),
            }
        }
        let _ = reader_done_tx.send(());
    });

    Ok(HubLink {
        sender: HubSender { tx: out_tx },
        events: in_rx,
    })
}
