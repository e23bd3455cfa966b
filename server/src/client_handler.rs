use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use relay_protocol::{Handshake, ProtocolError, RelayCodec, Request, Response};

use crate::config::Config;
use crate::connection::Connection;
use crate::delivery::Delivery;
use crate::error::RelayError;
use crate::registry::Registry;

const USER_JOINED: &str = "{} joined";
const USER_JOINED_ACK: &str = "You have joined as {}";
const USER_LEFT: &str = "{} has left";

type FrRead = FramedRead<OwnedReadHalf, RelayCodec>;

// Handles server communication from client
// Essentially this models a client actor on the server side: the handshake
// followed by the reader loop, for exactly one connection
pub struct ClientHandler {
    conn: Arc<Connection>,
    fr: FrRead,
    registry: Registry,
    delivery: Delivery,
    config: Arc<Config>,
}

impl ClientHandler {
    pub fn new(conn: Arc<Connection>, tcp_read: OwnedReadHalf, registry: Registry,
               delivery: Delivery, config: Arc<Config>) -> Self {
        Self {
            conn,
            fr: FramedRead::new(tcp_read, RelayCodec::new()),
            registry,
            delivery,
            config,
        }
    }

    // Spawn tokio task to handle server socket reads from clients
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            // if registration is successful then only handle client reads
            match self.register().await {
                Ok(name) => {
                    self.handle_read().await;
                    self.process_disconnect(&name).await;
                },
                Err(e) => {
                    warn!("Rejected connection {} from {:?}: {}", self.conn.id(), self.conn.addr(), e);
                    self.conn.close();
                },
            }
        })
    }

    // Register client properly: read its chat name and add it to the registry
    async fn register(&mut self) -> Result<String, RelayError> {
        let handshake = self.read_name().await?;
        let name = self.registry.add(&self.conn, &handshake.name).await
            .ok_or(RelayError::Rejected(self.conn.id()))?;

        info!("User {} joined from {:?}", &name, self.conn.addr());

        if name != handshake.name {
            let ack = USER_JOINED_ACK.replace("{}", &name);
            self.delivery.send(&self.conn, Response::Notice(ack)).await;
        }

        if self.config.announce() {
            let join_msg = USER_JOINED.replace("{}", &name);
            self.delivery.broadcast_except(self.conn.id(), Response::Notice(join_msg)).await;
        }

        Ok(name)
    }

    async fn read_name(&mut self) -> Result<Handshake, RelayError> {
        let line = match timeout(self.config.handshake_timeout(), self.fr.next()).await {
            Err(_) => return Err(RelayError::HandshakeTimeout),
            Ok(None) => return Err(RelayError::ClosedBeforeHandshake),
            Ok(Some(frame)) => frame?,
        };

        Ok(Handshake::parse(&line)?)
    }

    // Loop to handle ongoing client msgs to server
    async fn handle_read(&mut self) {
        let conn = Arc::clone(&self.conn);
        let idle = self.config.idle_timeout();

        loop {
            let value = select! {
                _ = conn.closed() => {
                    debug!("Connection {} closed locally", conn.id());
                    break;
                },
                value = next_frame(&mut self.fr, idle) => value,
            };

            match value {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => {
                    debug!("server received: {:?}", &line);

                    match Request::parse(&line) {
                        Ok(request) => self.delivery.route(&self.conn, request).await,
                        Err(e) => {
                            self.delivery.send(&self.conn, Response::Notice(e.to_string())).await;
                        },
                    }
                },
                Some(Err(e)) => {
                    debug!("Server Connection closing error: {:?}", e);
                    break;
                },
                None => {
                    info!("Remote {:?} has closed connection", conn.addr());
                    break;
                },
            }
        }
    }

    // process client disconnection event
    async fn process_disconnect(&mut self, name: &str) {
        self.registry.remove(self.conn.id()).await;
        self.conn.close();

        info!("User {} has left", name);

        if self.config.announce() {
            let leave_msg = USER_LEFT.replace("{}", name);
            self.delivery.broadcast(Response::Notice(leave_msg)).await;
        }
    }
}

// `None` on end of stream or when the idle deadline passes
async fn next_frame(fr: &mut FrRead, idle: Option<Duration>) -> Option<Result<String, ProtocolError>> {
    match idle {
        Some(limit) => match timeout(limit, fr.next()).await {
            Ok(value) => value,
            Err(_) => {
                info!("Client idle for {:?}, disconnecting", limit);
                None
            },
        },
        None => fr.next().await,
    }
}
