use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client_handler::ClientHandler;
use crate::config::Config;
use crate::connection::Connection;
use crate::delivery::Delivery;
use crate::error::RelayError;
use crate::registry::Registry;
use crate::server_types::ConnId;

const COUNTER_SEED: ConnId = 1;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Accepts client connections and hands each one to its own ClientHandler task
pub struct ServerListener {
    listener: TcpListener,
    registry: Registry,
    delivery: Delivery,
    config: Arc<Config>,
}

impl ServerListener {
    pub async fn bind(config: Config) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.addr()).await?;
        let registry = Registry::new();
        let delivery = Delivery::new(&registry, config.write_timeout());

        Ok(Self {
            listener,
            registry,
            delivery,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept connections until the task is dropped. Accept errors are
    /// logged and never stop the loop.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!("Server listening on {:?}", addr);
        }

        // Set up unique counter
        let mut next_id = COUNTER_SEED;

        loop {
            match self.listener.accept().await {
                Ok((tcp_socket, addr)) => {
                    info!("Server received new client connection {:?}", &addr);
                    self.accept_client(next_id, tcp_socket, addr);
                    next_id += 1;
                },
                Err(e) => {
                    error!("Unable to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                },
            }
        }
    }

    fn accept_client(&self, id: ConnId, tcp_socket: TcpStream, addr: SocketAddr) {
        let _ = tcp_socket.set_nodelay(true);
        let (tcp_read, tcp_write) = tcp_socket.into_split();

        let conn = Connection::spawn(id, addr, tcp_write, self.config.queue_len,
                                     self.config.write_timeout());

        let handler = ClientHandler::new(conn, tcp_read, self.registry.clone(),
                                         self.delivery.clone(), Arc::clone(&self.config));
        handler.spawn();
    }
}
