pub mod connection;
pub mod presence;
pub mod router;

pub use presence::{PresenceRegistry, PushHandle};
pub use router::{MessageRouter, OutgoingMessage};
