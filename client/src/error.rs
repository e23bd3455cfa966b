use std::io;

use relay_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("unable to connect to relay: {0}")]
    Connect(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
