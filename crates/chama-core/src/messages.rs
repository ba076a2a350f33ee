//! Envelopes exchanged over the chat WebSocket.
//!
//! Every frame is a JSON text message discriminated by a string `kind`.
//! Client → server: `auth`, `chat`. Server → client: `chat`, `notification`,
//! `error`. Field names are camelCase on the wire.

use crate::error::{client_messages, ChamaError, ChamaResult};
use crate::ids::{GroupId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded client → server envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Auth(AuthRequest),
    Chat(ChatRequest),
    /// A `kind` this server does not understand. Kept so newer clients can
    /// talk to older servers.
    Unknown(String),
}

/// `{ kind: "auth", userId }`.
///
/// `user_id` is kept as raw JSON so that a missing, zero, negative or
/// non-integer id is reported as a bad id rather than a bad envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    #[serde(rename = "userId", default)]
    pub user_id: serde_json::Value,
}

impl AuthRequest {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id: serde_json::Value::from(user_id.get()),
        }
    }

    /// The requested identity, if it is a strictly positive integer.
    pub fn valid_user_id(&self) -> Option<UserId> {
        self.user_id
            .as_i64()
            .map(UserId)
            .filter(|id| id.is_valid())
    }
}

/// `{ kind: "chat", content, recipientUserId?, groupId? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, alias = "recipientId", skip_serializing_if = "Option::is_none")]
    pub recipient_user_id: Option<UserId>,
    #[serde(default, alias = "chamaId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// Where a validated chat message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTarget {
    Direct(UserId),
    Group(GroupId),
}

impl ChatTarget {
    pub fn recipient_user_id(self) -> Option<UserId> {
        match self {
            ChatTarget::Direct(u) => Some(u),
            ChatTarget::Group(_) => None,
        }
    }

    pub fn group_id(self) -> Option<GroupId> {
        match self {
            ChatTarget::Direct(_) => None,
            ChatTarget::Group(g) => Some(g),
        }
    }
}

impl ChatRequest {
    pub fn direct(recipient: UserId, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            recipient_user_id: Some(recipient),
            group_id: None,
        }
    }

    pub fn group(group: GroupId, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            recipient_user_id: None,
            group_id: Some(group),
        }
    }

    /// Check the request shape and return its content and target.
    ///
    /// Content is checked before the target. Non-positive ids count as
    /// absent.
    pub fn validate(&self) -> ChamaResult<(&str, ChatTarget)> {
        let content = match self.content.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => return Err(ChamaError::InvalidMessage(client_messages::CONTENT_REQUIRED)),
        };

        let recipient = self.recipient_user_id.filter(|u| u.is_valid());
        let group = self.group_id.filter(|g| g.is_valid());

        let target = match (recipient, group) {
            (Some(u), None) => ChatTarget::Direct(u),
            (None, Some(g)) => ChatTarget::Group(g),
            (Some(_), Some(_)) => {
                return Err(ChamaError::InvalidMessage(client_messages::TARGET_CONFLICT))
            }
            (None, None) => {
                return Err(ChamaError::InvalidMessage(client_messages::TARGET_REQUIRED))
            }
        };

        Ok((content, target))
    }
}

/// A decoded server → client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outbound {
    Chat(ChatDelivery),
    Notification(NotificationDelivery),
    Error { message: String },
}

impl Outbound {
    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Error {
            message: message.into(),
        }
    }
}

/// A chat message as pushed to every live recipient (and echoed to the
/// sender for direct messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDelivery {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub sender_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub content: String,
    #[serde(rename = "sentAtIso8601")]
    pub sent_at: DateTime<Utc>,
}

/// A one-off event pushed to a single connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDelivery {
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub notification_type: String,
    #[serde(rename = "sentAtIso8601")]
    pub sent_at: DateTime<Utc>,
}
