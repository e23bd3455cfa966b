//! Consumer side of the relay: connect with a display name, submit outgoing
//! lines and typing signals, and read a stream of incoming events.

pub mod error;
pub mod relay_client;

pub use error::ClientError;
pub use relay_client::{connect, Incoming, Outgoing};
pub use relay_protocol::ServerEvent;
