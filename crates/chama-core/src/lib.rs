//! chama-core: Shared protocol library for chama real-time messaging.
//!
//! Provides id newtypes, the JSON envelopes exchanged over the chat
//! WebSocket, the text codec, and the error type used by server and client.

pub mod codec;
pub mod error;
pub mod ids;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_inbound, decode_outbound, encode_inbound, encode_outbound};
pub use error::{ChamaError, ChamaResult};
pub use ids::{GroupId, MessageId, UserId};
pub use messages::{
    AuthRequest, ChatDelivery, ChatRequest, ChatTarget, Inbound, NotificationDelivery, Outbound,
};
