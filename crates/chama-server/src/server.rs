//! Core server: accepts WebSocket connections and runs one chat session per
//! connection.
//!
//! Owns the connection registry, the message router and the notification
//! broadcaster, and coordinates shutdown of every live connection.

use crate::config::ServerConfig;
use crate::presence::{ChannelConnection, Connection, ConnectionRegistry};
use crate::routing::{MessageRouter, NotificationBroadcaster};
use crate::session::ChatSession;
use crate::store::{MembershipDirectory, MessageStore, UserDirectory};
use crate::transport::websocket::{self, ListenerSettings, WebSocketConnection};
use chama_core::ChamaResult;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// The chama messaging server.
pub struct ChamaServer {
    config: ServerConfig,
    registry: Arc<dyn ConnectionRegistry>,
    router: Arc<MessageRouter>,
    notifier: NotificationBroadcaster,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl ChamaServer {
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn ConnectionRegistry>,
        users: Arc<dyn UserDirectory>,
        members: Arc<dyn MembershipDirectory>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let router = Arc::new(MessageRouter::new(registry.clone(), users, members, store));
        let notifier = NotificationBroadcaster::new(registry.clone());
        Self {
            config,
            registry,
            router,
            notifier,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Handle for pushing notifications to connected users.
    pub fn notifier(&self) -> NotificationBroadcaster {
        self.notifier.clone()
    }

    /// The live user → connection registry.
    pub fn registry(&self) -> Arc<dyn ConnectionRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> ChamaResult<()> {
        let addr = self.config.listen_addr()?;
        let listener = websocket::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> ChamaResult<()> {
        let server = Arc::new(self);
        let local_addr = listener.local_addr()?;

        let ws_rx = websocket::start_listener(
            listener,
            ListenerSettings {
                ws_path: server.config.ws_path.clone(),
                max_frame_size: server.config.max_frame_size,
            },
        );

        info!(
            addr = %local_addr,
            path = %server.config.ws_path,
            "chama-server ready"
        );

        server.accept_loop(ws_rx, shutdown).await;
        info!("chama-server stopped");
        Ok(())
    }

    /// Run connection tasks until `shutdown` resolves or the listener stops,
    /// then close every live connection and wait for it to finish.
    async fn accept_loop(
        self: &Arc<Self>,
        mut ws_rx: mpsc::Receiver<WebSocketConnection>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                accepted = ws_rx.recv() => {
                    let Some(ws_conn) = accepted else {
                        warn!("listener stopped, shutting down");
                        break;
                    };
                    let srv = self.clone();
                    // Subscribed here so a shutdown sent before the task first
                    // runs still reaches it.
                    let reader_shutdown = self.shutdown_tx.subscribe();
                    let writer_shutdown = self.shutdown_tx.subscribe();
                    connections.spawn(async move {
                        srv.handle_websocket(ws_conn, reader_shutdown, writer_shutdown).await
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // Stop accepting, then close every live connection.
        drop(ws_rx);
        info!(connections = connections.len(), "closing connected clients");
        let _ = self.shutdown_tx.send(());
        while connections.join_next().await.is_some() {}
    }

    async fn handle_websocket(
        &self,
        conn: WebSocketConnection,
        mut shutdown_rx: broadcast::Receiver<()>,
        writer_shutdown: broadcast::Receiver<()>,
    ) {
        let remote = conn.remote_addr;
        let (handle, outbound_rx) = ChannelConnection::new(self.config.outbound_queue);
        let conn_id = handle.id();
        debug!(remote = %remote, conn_id = %conn_id, "connection opened");

        let (sink, mut stream) = conn.ws_stream.split();
        let (control_tx, control_rx) = mpsc::channel::<Message>(8);
        let writer = tokio::spawn(websocket::writer_task(
            sink,
            outbound_rx,
            control_rx,
            writer_shutdown,
        ));

        let mut session = ChatSession::new(handle, self.registry.clone(), self.router.clone());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = websocket::ws_recv_text(&mut stream, &control_tx) => {
                    match received {
                        Ok(Some(text)) => session.handle_text(&text).await,
                        Ok(None) => {
                            debug!(conn_id = %conn_id, "peer closed");
                            break;
                        }
                        Err(e) => {
                            debug!(conn_id = %conn_id, error = %e, "connection ended");
                            break;
                        }
                    }
                }
            }
        }

        let user = session.user_id();
        session.close();
        drop(session);

        // The writer may already be gone after a shutdown or a failed send.
        let _ = control_tx.send(Message::Close(None)).await;
        drop(control_tx);
        if let Err(e) = writer.await {
            warn!(conn_id = %conn_id, error = %e, "writer task failed");
        }
        debug!(remote = %remote, conn_id = %conn_id, user_id = ?user, "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::InMemoryRegistry;
    use crate::store::MemoryStore;
    use chama_core::{decode_outbound, GroupId, Outbound, UserId};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Running {
        addr: SocketAddr,
        registry: Arc<dyn ConnectionRegistry>,
        notifier: NotificationBroadcaster,
        store: Arc<MemoryStore>,
        stop: Option<oneshot::Sender<()>>,
        task: tokio::task::JoinHandle<ChamaResult<()>>,
    }

    async fn start() -> Running {
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserId(7), "Wanjiru").await;
        store.add_user(UserId(9), "Otieno").await;
        store.add_user(UserId(11), "Njeri").await;
        for member in [7, 9, 11] {
            store.add_member(GroupId(3), UserId(member)).await;
        }

        let server = ChamaServer::new(
            ServerConfig::default(),
            Arc::new(InMemoryRegistry::new()),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        let registry = server.registry();
        let notifier = server.notifier();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async {
            let _ = stop_rx.await;
        }));

        Running {
            addr,
            registry,
            notifier,
            store,
            stop: Some(stop_tx),
            task,
        }
    }

    impl Running {
        async fn connect(&self) -> Client {
            let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", self.addr))
                .await
                .unwrap();
            ws
        }

        async fn connect_as(&self, user: i64) -> Client {
            let mut ws = self.connect().await;
            send(&mut ws, &format!(r#"{{"kind":"auth","userId":{user}}}"#)).await;
            self.wait_until(|r| r.lookup(UserId(user)).is_some()).await;
            ws
        }

        async fn wait_until(&self, cond: impl Fn(&dyn ConnectionRegistry) -> bool) {
            for _ in 0..200 {
                if cond(self.registry.as_ref()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("condition not reached");
        }

        async fn stop(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            self.task.await.unwrap().unwrap();
        }
    }

    async fn send(ws: &mut Client, text: &str) {
        use futures_util::SinkExt;
        ws.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> Outbound {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = msg {
                return decode_outbound(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn direct_chat_between_connected_users() {
        let running = start().await;
        let mut alice = running.connect_as(7).await;
        let mut bob = running.connect_as(9).await;

        send(&mut alice, r#"{"kind":"chat","content":"habari","recipientUserId":9}"#).await;

        for ws in [&mut alice, &mut bob] {
            match recv(ws).await {
                Outbound::Chat(chat) => {
                    assert_eq!(chat.sender_id, UserId(7));
                    assert_eq!(chat.sender_display_name, "Wanjiru");
                    assert_eq!(chat.recipient_user_id, Some(UserId(9)));
                    assert_eq!(chat.content, "habari");
                }
                other => panic!("expected chat, got {other:?}"),
            }
        }
        assert_eq!(running.store.message_count().await, 1);
        running.stop().await;
    }

    #[tokio::test]
    async fn group_chat_fans_out_to_connected_members() {
        let running = start().await;
        let mut a = running.connect_as(7).await;
        let mut b = running.connect_as(11).await;

        send(&mut a, r#"{"kind":"chat","content":"kikao ni Jumamosi","groupId":3}"#).await;

        for ws in [&mut a, &mut b] {
            match recv(ws).await {
                Outbound::Chat(chat) => assert_eq!(chat.group_id, Some(GroupId(3))),
                other => panic!("expected chat, got {other:?}"),
            }
        }
        running.stop().await;
    }

    #[tokio::test]
    async fn chat_before_auth_gets_error() {
        let running = start().await;
        let mut ws = running.connect().await;

        send(&mut ws, r#"{"kind":"chat","content":"x","recipientUserId":1}"#).await;
        assert_eq!(recv(&mut ws).await, Outbound::error("Authentication required"));

        send(&mut ws, "not json").await;
        assert_eq!(recv(&mut ws).await, Outbound::error("Invalid message format"));
        assert_eq!(running.store.message_count().await, 0);
        running.stop().await;
    }

    #[tokio::test]
    async fn notification_reaches_connected_user() {
        let running = start().await;
        let mut ws = running.connect_as(9).await;

        assert!(running
            .notifier
            .notify(UserId(9), "Loan approved", "KES 15,000", "loan"));
        match recv(&mut ws).await {
            Outbound::Notification(n) => {
                assert_eq!(n.title, "Loan approved");
                assert_eq!(n.notification_type, "loan");
            }
            other => panic!("expected notification, got {other:?}"),
        }
        assert!(!running.notifier.notify(UserId(7), "t", "c", "general"));
        running.stop().await;
    }

    #[tokio::test]
    async fn disconnect_unregisters_user() {
        let running = start().await;
        let ws = running.connect_as(7).await;
        assert_eq!(running.registry.len(), 1);

        drop(ws);
        running.wait_until(|r| r.is_empty()).await;
        running.stop().await;
    }

    #[tokio::test]
    async fn other_paths_are_rejected() {
        let running = start().await;
        let result =
            tokio_tungstenite::connect_async(format!("ws://{}/not-chat", running.addr)).await;
        assert!(result.is_err());
        running.stop().await;
    }

    #[tokio::test]
    async fn shutdown_closes_live_connections() {
        let running = start().await;
        let mut ws = running.connect_as(7).await;
        let registry = running.registry.clone();

        running.stop().await;

        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no close after shutdown");
        assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn serving_stops_when_listener_stops() {
        let store = Arc::new(MemoryStore::new());
        let server = Arc::new(ChamaServer::new(
            ServerConfig::default(),
            Arc::new(InMemoryRegistry::new()),
            store.clone(),
            store.clone(),
            store,
        ));

        let (accepted_tx, accepted_rx) = mpsc::channel::<WebSocketConnection>(1);
        drop(accepted_tx);

        tokio::time::timeout(
            Duration::from_secs(5),
            server.accept_loop(accepted_rx, std::future::pending::<()>()),
        )
        .await
        .expect("accept loop kept waiting for a shutdown signal");
    }
}
