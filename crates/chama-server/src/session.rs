//! One connection's inbound frame handling: decode, handshake gate, route.
//!
//! Every failure becomes an error envelope on the same connection; nothing
//! here closes the socket.

use crate::handshake::Presence;
use crate::presence::{ConnectionHandle, ConnectionRegistry};
use crate::routing::MessageRouter;
use chama_core::error::client_messages;
use chama_core::{decode_inbound, encode_outbound, ChamaError, Inbound, Outbound, UserId};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ChatSession {
    presence: Presence,
    router: Arc<MessageRouter>,
}

impl ChatSession {
    pub fn new(
        conn: ConnectionHandle,
        registry: Arc<dyn ConnectionRegistry>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            presence: Presence::new(conn, registry),
            router,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.presence.user_id()
    }

    /// Handle one inbound text frame to completion.
    pub async fn handle_text(&mut self, text: &str) {
        let conn_id = self.presence.connection().id();
        let msg = match decode_inbound(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "undecodable frame");
                // Any JSON object from an unauthenticated peer is an envelope
                // sent too early, whatever its shape.
                if self.presence.user_id().is_none() && is_json_object(text) {
                    self.reply_error(ChamaError::AuthRequired.client_message());
                } else {
                    self.reply_error(e.client_message());
                }
                return;
            }
        };

        match msg {
            Inbound::Auth(auth) => match auth.valid_user_id() {
                Some(user) => self.presence.authenticate(user),
                None => {
                    debug!(conn_id = %conn_id, user_id = %auth.user_id, "auth with invalid user id");
                    self.reply_error(client_messages::INVALID_USER_ID);
                }
            },
            Inbound::Chat(chat) => {
                let Some(sender) = self.presence.user_id() else {
                    self.reply_error(ChamaError::AuthRequired.client_message());
                    return;
                };
                if let Err(e) = self
                    .router
                    .route_chat(sender, self.presence.connection(), &chat)
                    .await
                {
                    debug!(conn_id = %conn_id, user_id = %sender, error = %e, "chat rejected");
                    self.reply_error(e.client_message());
                }
            }
            Inbound::Unknown(kind) => {
                if self.presence.user_id().is_none() {
                    self.reply_error(ChamaError::AuthRequired.client_message());
                } else {
                    debug!(conn_id = %conn_id, kind = %kind, "ignoring unknown envelope kind");
                }
            }
        }
    }

    /// Release this connection's registry binding.
    pub fn close(&mut self) {
        self.presence.close();
    }

    fn reply_error(&self, message: &str) {
        let conn = self.presence.connection();
        let result = encode_outbound(&Outbound::error(message)).and_then(|frame| conn.send(&frame));
        if let Err(e) = result {
            warn!(conn_id = %conn.id(), error = %e, "failed to send error envelope");
        }
    }
}

fn is_json_object(text: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(text),
        Ok(serde_json::Value::Object(_))
    )
}
