use crate::handlers::AppState;
use crate::hub::SessionHub;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use mindserver_sdk_rs::protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// GET /ws
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<SessionHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = hub.connect(tx).await;

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error on {}: {}", conn, e);
                break;
            }
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => hub.handle_event(conn, event).await,
            Err(e) => warn!("Dropping malformed command from {}: {}", conn, e),
        }
    }

    hub.disconnect(conn).await;
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use crate::app;
    use crate::handlers::AppState;
    use crate::hub::SessionHub;
    use futures::{SinkExt, StreamExt};
    use mindserver_sdk_rs::cache::MemoryCache;
    use mindserver_sdk_rs::gateway::Gateway;
    use mindserver_sdk_rs::protocol::{AgentStatus, ClientEvent, ServerEvent};
    use mindserver_sdk_rs::providers::ProviderKind;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve() -> String {
        let gateway = Gateway::new(Arc::new(MemoryCache::new()), ProviderKind::OpenAi);
        let state = Arc::new(AppState::new(SessionHub::new(Duration::ZERO), gateway));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        url
    }

    async fn client(url: &str) -> Client {
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        // every new connection is greeted with the current snapshot
        assert!(matches!(recv(&mut ws).await, ServerEvent::AgentsUpdate(_)));
        ws
    }

    async fn send(ws: &mut Client, event: ClientEvent) {
        ws.send(Message::Text(serde_json::to_string(&event).unwrap().into()))
            .await
            .unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerEvent {
        let next = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended: {:?}", other),
                }
            }
        });
        next.await.unwrap()
    }

    #[tokio::test]
    async fn test_register_login_and_route_start() {
        let url = serve().await;
        let mut a = client(&url).await;
        let mut b = client(&url).await;

        send(&mut a, ClientEvent::RegisterAgents(vec!["bot1".into()])).await;
        let not_live = ServerEvent::AgentsUpdate(vec![AgentStatus {
            name: "bot1".into(),
            in_game: false,
        }]);
        assert_eq!(recv(&mut a).await, not_live);
        assert_eq!(recv(&mut a).await, ServerEvent::RegisterAgentsSuccess);
        assert_eq!(recv(&mut b).await, not_live);

        send(&mut a, ClientEvent::LoginAgent("bot1".into())).await;
        let live = ServerEvent::AgentsUpdate(vec![AgentStatus {
            name: "bot1".into(),
            in_game: true,
        }]);
        assert_eq!(recv(&mut a).await, live);
        assert_eq!(recv(&mut b).await, live);

        send(&mut b, ClientEvent::StartAgent("bot1".into())).await;
        assert_eq!(recv(&mut a).await, ServerEvent::StartAgent("bot1".into()));
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_and_close_logs_out() {
        let url = serve().await;
        let mut a = client(&url).await;
        let mut b = client(&url).await;

        a.send(Message::Text(r#"{"event": "fly-away"}"#.into()))
            .await
            .unwrap();
        send(&mut a, ClientEvent::RegisterAgents(vec!["bot1".into()])).await;
        assert!(matches!(recv(&mut a).await, ServerEvent::AgentsUpdate(_)));
        assert_eq!(recv(&mut a).await, ServerEvent::RegisterAgentsSuccess);
        send(&mut a, ClientEvent::LoginAgent("bot1".into())).await;

        let _ = recv(&mut b).await;
        let live = recv(&mut b).await;
        assert!(matches!(live, ServerEvent::AgentsUpdate(ref s) if s[0].in_game));

        a.close(None).await.unwrap();
        assert_eq!(
            recv(&mut b).await,
            ServerEvent::AgentsUpdate(vec![AgentStatus {
                name: "bot1".into(),
                in_game: false,
            }])
        );
    }
}
