//! WebSocket chat client.
//!
//! A background dispatch task decodes server envelopes into a channel and
//! answers pings; sends go straight to the shared sink.

use chama_core::{
    decode_outbound, encode_inbound, AuthRequest, ChamaError, ChamaResult, ChatRequest, GroupId,
    Inbound, Outbound, UserId,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// A connected chat client.
pub struct ChatClient {
    sink: WsSink,
    inbound_rx: mpsc::Receiver<Outbound>,
    dispatch_handle: JoinHandle<()>,
}

impl ChatClient {
    /// Connect to a chama server, e.g. `ws://localhost:5000/ws`.
    pub async fn connect(url: &str) -> ChamaResult<Self> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChamaError::Transport(format!("WebSocket connect error: {e}")))?;
        info!(url = %url, "connected");

        let (sink, stream) = ws_stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let dispatch_handle = tokio::spawn(dispatch_loop(stream, inbound_tx, sink.clone()));

        Ok(Self {
            sink,
            inbound_rx,
            dispatch_handle,
        })
    }

    /// Send the auth envelope. The server does not acknowledge success.
    pub async fn authenticate(&self, user: UserId) -> ChamaResult<()> {
        self.send(&Inbound::Auth(AuthRequest::new(user))).await
    }

    pub async fn send_direct(&self, to: UserId, content: &str) -> ChamaResult<()> {
        self.send(&Inbound::Chat(ChatRequest::direct(to, content))).await
    }

    pub async fn send_group(&self, group: GroupId, content: &str) -> ChamaResult<()> {
        self.send(&Inbound::Chat(ChatRequest::group(group, content))).await
    }

    /// Encode and send one envelope.
    pub async fn send(&self, msg: &Inbound) -> ChamaResult<()> {
        let text = encode_inbound(msg)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChamaError::Transport(format!("WS send failed: {e}")))
    }

    /// Next envelope from the server, or `None` once the connection ends.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.inbound_rx.recv().await
    }

    /// Send a close frame and stop the dispatch task.
    pub async fn close(self) -> ChamaResult<()> {
        let result = self
            .sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| ChamaError::Transport(format!("WS close failed: {e}")));
        self.dispatch_handle.abort();
        result
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
    }
}

async fn dispatch_loop(
    mut stream: SplitStream<WsStream>,
    inbound_tx: mpsc::Sender<Outbound>,
    sink: WsSink,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match decode_outbound(text.as_str()) {
                Ok(envelope) => {
                    if inbound_tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "undecodable server frame"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = sink.lock().await.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => {
                debug!("server closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        }
    }
}
