use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use tracing::{debug, info, warn};

use relay_protocol::{Request, Response, MAX_LINE_LEN};

use crate::connection::Connection;
use crate::error::RelayError;
use crate::names::base_name;
use crate::registry::Registry;
use crate::server_types::ConnId;

const USERS_MSG: &str = "Users currently online: ";
const USER_UNAVAILABLE: &str = "User {} is not online";

// Routes classified messages to registry members and handles msg delivery
// back to clients. A failed delivery only ever costs the failing recipient.
#[derive(Clone)]
pub struct Delivery {
    registry: Registry,
    write_timeout: Duration,
}

impl Delivery {
    pub fn new(registry: &Registry, write_timeout: Duration) -> Self {
        Delivery {
            registry: registry.clone(),
            write_timeout,
        }
    }

    /// Dispatch a message received from `sender`.
    pub async fn route(&self, sender: &Arc<Connection>, request: Request) {
        let from = sender.name().unwrap_or_default().to_owned();

        match request {
            Request::Typing => {
                self.broadcast_except(sender.id(), Response::Typing { from }).await;
            },
            Request::Chat(text) => {
                info!("Received: {} from {}", &text, &from);
                let msg = Response::Chat { time: timestamp(), from, text };
                self.broadcast_except(sender.id(), msg).await;
            },
            Request::Private { target, text } => {
                let wanted = base_name(&target);
                let recipient = self.registry.snapshot().await
                    .into_iter()
                    .find(|c| c.is_active() && c.name() == Some(wanted));

                match recipient {
                    Some(conn) => {
                        debug!("Private message {} -> {}", &from, &target);
                        let msg = Response::Private { time: timestamp(), from, text };
                        self.send(&conn, msg).await;
                    },
                    None => {
                        debug!("Private message target {} not found", &target);
                        let notice = USER_UNAVAILABLE.replace("{}", &target);
                        self.send(sender, Response::Notice(notice)).await;
                    },
                }
            },
            Request::Users => {
                let users = self.registry.names().await;
                self.send(sender, Response::Notice(users_notice(&users))).await;
            },
        }
    }

    /// Deliver to a single connection. Returns false if the connection was
    /// dropped because delivery failed.
    pub async fn send(&self, conn: &Arc<Connection>, msg: Response) -> bool {
        match conn.deliver(msg, self.write_timeout).await {
            Ok(()) => true,
            Err(e) => {
                self.drop_recipient(conn, e).await;
                false
            },
        }
    }

    pub async fn broadcast(&self, msg: Response) -> usize {
        self.fan_out(None, msg).await
    }

    pub async fn broadcast_except(&self, except: ConnId, msg: Response) -> usize {
        self.fan_out(Some(except), msg).await
    }

    // Deliver to every active member but `except`, all attempts in flight at
    // once. Members already closed are removed instead of written to.
    // Returns the number of recipients that accepted the message.
    async fn fan_out(&self, except: Option<ConnId>, msg: Response) -> usize {
        let (recipients, stale): (Vec<Arc<Connection>>, Vec<Arc<Connection>>) = self.registry.snapshot().await
            .into_iter()
            .filter(|c| Some(c.id()) != except)
            .partition(|c| c.is_active());

        for conn in stale.iter() {
            debug!("Skipping closed connection {}", conn.id());
            self.registry.remove(conn.id()).await;
        }

        let attempts = recipients.iter().map(|conn| {
            let msg = msg.clone();
            async move { conn.deliver(msg, self.write_timeout).await }
        });
        let results = join_all(attempts).await;

        let mut delivered = 0;
        for (conn, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => self.drop_recipient(conn, e).await,
            }
        }
        delivered
    }

    async fn drop_recipient(&self, conn: &Arc<Connection>, err: RelayError) {
        warn!("Dropping connection {} ({}): {}", conn.id(), conn.name().unwrap_or("?"), err);
        self.registry.remove(conn.id()).await;
        conn.close();
    }
}

// names that would push the notice past a client line are elided
fn users_notice(names: &[String]) -> String {
    let mut msg = String::from(USERS_MSG);

    for (i, name) in names.iter().enumerate() {
        if msg.len() + name.len() + 1 > MAX_LINE_LEN {
            msg.push_str(" ...");
            break;
        }
        if i > 0 {
            msg.push(' ');
        }
        msg.push_str(name);
    }
    msg
}

pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
