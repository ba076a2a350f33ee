//! WebSocket listener using tokio-tungstenite.
//!
//! The upgrade is only accepted on the configured path. Each accepted socket
//! is split: a writer task owns the sink, the connection handler owns the
//! stream.

use chama_core::{ChamaError, ChamaResult};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Upgrade-time settings for accepted sockets.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Only upgrade requests for this path are accepted.
    pub ws_path: String,
    /// Largest accepted frame and message, in bytes.
    pub max_frame_size: usize,
}

/// Bind the TCP listener.
pub async fn bind(addr: SocketAddr) -> ChamaResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ChamaError::Transport(format!("WS bind failed on {addr}: {e}")))
}

/// Start accepting WebSocket upgrades on `tcp_listener`.
///
/// Returns a receiver that yields accepted connections. The accept loop
/// stops once the receiver is dropped.
pub fn start_listener(
    tcp_listener: TcpListener,
    settings: ListenerSettings,
) -> mpsc::Receiver<WebSocketConnection> {
    if let Ok(addr) = tcp_listener.local_addr() {
        info!(addr = %addr, path = %settings.ws_path, "WebSocket listener started");
    }

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = tx.closed() => break,
                accepted = tcp_listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    let settings = settings.clone();
                    tokio::spawn(async move {
                        match upgrade(stream, &settings).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    debug!(remote = %addr, "listener closed, dropping connection");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
        debug!("WebSocket accept loop stopped");
    });

    rx
}

async fn upgrade(
    stream: TcpStream,
    settings: &ListenerSettings,
) -> Result<WebSocketStream<TcpStream>, WsError> {
    let expected_path = settings.ws_path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut not_found = ErrorResponse::new(Some("Not Found".to_string()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };

    let mut config = WebSocketConfig::default();
    config.max_frame_size = Some(settings.max_frame_size);
    config.max_message_size = Some(settings.max_frame_size);

    tokio_tungstenite::accept_hdr_async_with_config(stream, check_path, Some(config)).await
}

/// Receive the next text frame.
///
/// Returns `None` once the peer closes. Pings are answered through
/// `control_tx`; binary frames are ignored.
pub async fn ws_recv_text<S>(
    stream: &mut S,
    control_tx: &mpsc::Sender<Message>,
) -> ChamaResult<Option<String>>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = control_tx.try_send(Message::Pong(payload));
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(len = data.len(), "ignoring binary frame");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ChamaError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}

/// Drain outbound text frames and control messages into the socket sink.
///
/// Ends after sending a close frame, on shutdown, or when the socket fails.
pub async fn writer_task<S>(
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<String>,
    mut control_rx: mpsc::Receiver<Message>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let result = tokio::select! {
            Some(frame) = outbound_rx.recv() => sink.send(Message::Text(frame.into())).await,
            Some(msg) = control_rx.recv() => {
                let closing = matches!(msg, Message::Close(_));
                let result = sink.send(msg).await;
                if closing {
                    break;
                }
                result
            }
            _ = shutdown_rx.recv() => {
                debug!("shutdown signal received, closing WebSocket");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            else => break,
        };

        if let Err(e) = result {
            debug!(error = %e, "WS send failed, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
}
