//! One live client session on the server side.
//!
//! A `Connection` owns the write half of its transport through a dedicated
//! writer task fed by a bounded queue, so concurrent broadcasts targeting the
//! same client never interleave bytes and a slow client only backs up its own
//! queue. The read half stays with the client's reader loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::select;
use tokio::sync::mpsc::{self, error::SendTimeoutError, Receiver, Sender};
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use relay_protocol::{ProtocolError, RelayCodec, Response};

use crate::error::RelayError;
use crate::server_types::{ConnId, ConnState};

#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    addr: SocketAddr,
    name: OnceLock<String>,
    state: AtomicU8,
    outbound: Sender<Response>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Connecting` state and start its writer task.
    pub fn spawn<W>(id: ConnId, addr: SocketAddr, tcp_write: W, queue_len: usize,
                    write_timeout: Duration) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(queue_len.max(1));

        let conn = Arc::new(Self {
            id,
            addr,
            name: OnceLock::new(),
            state: AtomicU8::new(ConnState::Connecting.as_u8()),
            outbound,
            shutdown: CancellationToken::new(),
        });

        let fw = FramedWrite::new(tcp_write, RelayCodec::new());
        tokio::spawn(write_loop(Arc::clone(&conn), fw, outbound_rx, write_timeout));

        conn
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Display name, available once the connection has been registered.
    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnState::Active
    }

    // Connecting -> Active, fixing the display name for good
    pub(crate) fn activate(&self, name: String) -> bool {
        if self.name.set(name).is_err() {
            return false;
        }

        self.state
            .compare_exchange(ConnState::Connecting.as_u8(), ConnState::Active.as_u8(),
                              Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Closed` and stop both the reader loop and the writer task.
    /// Returns true only for the call that actually closed the connection.
    pub fn close(&self) -> bool {
        let prev = self.state.swap(ConnState::Closed.as_u8(), Ordering::AcqRel);
        if prev == ConnState::Closed.as_u8() {
            return false;
        }

        debug!("Connection {} closed", self.id);
        self.shutdown.cancel();
        true
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Queue a message for this client, waiting at most `wait` for room.
    pub async fn deliver(&self, msg: Response, wait: Duration) -> Result<(), RelayError> {
        if self.state() == ConnState::Closed {
            return Err(RelayError::Closed(self.id));
        }

        self.outbound.send_timeout(msg, wait).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => RelayError::DeliveryTimeout(self.id),
            SendTimeoutError::Closed(_) => RelayError::Closed(self.id),
        })
    }
}

// Drains the outbound queue into the transport until the connection closes
// or a write fails. The write half is dropped on exit.
async fn write_loop<W>(conn: Arc<Connection>, mut fw: FramedWrite<W, RelayCodec>,
                       mut outbound_rx: Receiver<Response>, write_timeout: Duration)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        select! {
            _ = conn.closed() => break,
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };

                match timeout(write_timeout, fw.send(msg)).await {
                    Ok(Ok(())) => (),
                    // nothing was written, the stream is still in sync
                    Ok(Err(e @ ProtocolError::LineTooLong { .. })) => {
                        warn!("Skipping message to connection {}: {}", conn.id(), e);
                    },
                    Ok(Err(e)) => {
                        debug!("Unable to write to connection {}: {}", conn.id(), e);
                        break;
                    },
                    Err(_) => {
                        warn!("Write to connection {} timed out", conn.id());
                        break;
                    },
                }
            }
        }
    }

    conn.close();
}
