//! Best-effort notification push for the rest of the platform.

use crate::presence::ConnectionRegistry;
use chama_core::{encode_outbound, NotificationDelivery, Outbound, UserId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pushes notifications to users who are connected right now.
///
/// Nothing is queued or retried: an offline user simply misses the push.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    registry: Arc<dyn ConnectionRegistry>,
}

impl NotificationBroadcaster {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `notification` to its user's live connection.
    ///
    /// Returns whether the frame was handed to a connection.
    pub fn broadcast(&self, notification: &NotificationDelivery) -> bool {
        let user = notification.user_id;
        let Some(conn) = self.registry.lookup(user) else {
            debug!(user_id = %user, "notification skipped, user offline");
            return false;
        };

        let frame = match encode_outbound(&Outbound::Notification(notification.clone())) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user_id = %user, error = %e, "failed to encode notification");
                return false;
            }
        };

        match conn.send(&frame) {
            Ok(()) => {
                debug!(user_id = %user, conn_id = %conn.id(), kind = %notification.notification_type, "notification pushed");
                true
            }
            Err(e) => {
                warn!(user_id = %user, conn_id = %conn.id(), error = %e, "notification push failed");
                false
            }
        }
    }

    /// Build a notification stamped now and broadcast it.
    pub fn notify(
        &self,
        user: UserId,
        title: impl Into<String>,
        content: impl Into<String>,
        notification_type: impl Into<String>,
    ) -> bool {
        self.broadcast(&NotificationDelivery {
            user_id: user,
            title: title.into(),
            content: content.into(),
            notification_type: notification_type.into(),
            sent_at: Utc::now(),
        })
    }
}
