//! Shared set of active connections.
//!
//! Membership changes and snapshots are serialized by a single mutex, which
//! is only ever held for the in-memory update itself. Callers iterate over a
//! snapshot and do their I/O after the guard is gone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::names::Names;
use crate::server_types::ConnId;

#[derive(Default)]
struct Members {
    conns: HashMap<ConnId, Arc<Connection>>,
    names: Names,
}

#[derive(Clone, Default)]
pub struct Registry {
    members: Arc<Mutex<Members>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under a unique display name derived from `requested`
    /// and mark it `Active`. Returns the assigned name, or `None` when the
    /// connection is already present or has been closed meanwhile.
    pub async fn add(&self, conn: &Arc<Connection>, requested: &str) -> Option<String> {
        let mut mg = self.members.lock().await;

        if mg.conns.contains_key(&conn.id()) {
            return None;
        }

        let name = mg.names.insert(requested, conn.id());
        if !conn.activate(name.clone()) {
            mg.names.remove(&name, conn.id());
            return None;
        }

        mg.conns.insert(conn.id(), Arc::clone(conn));
        debug!("Registered connection {} as {}", conn.id(), &name);
        Some(name)
    }

    /// Remove a connection, returning it if it was present. Removing an
    /// absent connection is a no-op.
    pub async fn remove(&self, id: ConnId) -> Option<Arc<Connection>> {
        let mut mg = self.members.lock().await;

        let conn = mg.conns.remove(&id)?;
        if let Some(name) = conn.name() {
            mg.names.remove(name, id);
        }

        debug!("Removed connection {}", id);
        Some(conn)
    }

    /// Point-in-time copy of the active set.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members.lock().await.conns.values().cloned().collect()
    }

    /// Sorted display names of everyone registered.
    pub async fn names(&self) -> Vec<String> {
        self.members.lock().await.names.to_list()
    }

    pub async fn contains(&self, id: ConnId) -> bool {
        self.members.lock().await.conns.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.conns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove and close every connection. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut mg = self.members.lock().await;
            mg.names.clear();
            mg.conns.drain().map(|(_, conn)| conn).collect()
        };

        for conn in drained.iter() {
            conn.close();
        }
        drained.len()
    }
}
