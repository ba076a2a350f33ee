//! Message routing and live notification push.

pub mod notify;
pub mod router;

pub use notify::NotificationBroadcaster;
pub use router::{DeliveryReport, MessageRouter};
