use std::io;

use relay_protocol::ProtocolError;
use thiserror::Error;

use crate::server_types::ConnId;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] ProtocolError),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("connection closed before handshake")]
    ClosedBeforeHandshake,
    #[error("connection {0} could not be registered")]
    Rejected(ConnId),
    #[error("connection {0} is closed")]
    Closed(ConnId),
    #[error("delivery to connection {0} timed out")]
    DeliveryTimeout(ConnId),
    #[error(transparent)]
    Io(#[from] io::Error),
}
