//! Server side of a real-time text relay.
//!
//! - `server_listener`: accepts TCP clients, one `ClientHandler` task each
//! - `client_handler`: handshake, then the per-connection reader loop
//! - `delivery`: routes each classified message to registry members
//! - `registry`: the shared set of active connections
//! - `connection`: one client session and its serialized writer

pub mod config;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod names;
pub mod registry;
pub mod server_types;

mod client_handler;
pub mod server_listener;

pub use config::Config;
pub use error::RelayError;
pub use registry::Registry;
pub use server_listener::ServerListener;
