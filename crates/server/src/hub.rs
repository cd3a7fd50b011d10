//! Connection registry and game groups for the play socket.
//!
//! Each socket registers an unbounded sender; a writer task drains it into
//! the WebSocket. Sends never block, so the hub may be used while the
//! matchmaking lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chess_core::session::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::ServerMessage;

pub type Outbox = UnboundedSender<ServerMessage>;

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Outbox>,
    groups: HashMap<Uuid, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn register(&self, connection: ConnectionId, outbox: Outbox) {
        self.inner.lock().connections.insert(connection, outbox);
    }

    /// Drop the connection and remove it from every group.
    pub fn unregister(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        inner.connections.remove(&connection);
        inner.groups.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    /// Returns false when the connection is gone.
    pub fn send(&self, connection: ConnectionId, msg: ServerMessage) -> bool {
        let inner = self.inner.lock();
        match inner.connections.get(&connection) {
            Some(outbox) => outbox.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn broadcast(&self, group: Uuid, msg: &ServerMessage) {
        let inner = self.inner.lock();
        let Some(members) = inner.groups.get(&group) else {
            return;
        };
        for connection in members {
            if let Some(outbox) = inner.connections.get(connection) {
                let _ = outbox.send(msg.clone());
            }
        }
    }

    pub fn join_group(&self, group: Uuid, connection: ConnectionId) {
        self.inner
            .lock()
            .groups
            .entry(group)
            .or_default()
            .insert(connection);
    }

    pub fn leave_group(&self, group: Uuid, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        if let Some(members) = inner.groups.get_mut(&group) {
            members.remove(&connection);
            if members.is_empty() {
                inner.groups.remove(&group);
            }
        }
    }

    pub fn group_size(&self, group: Uuid) -> usize {
        self.inner
            .lock()
            .groups
            .get(&group)
            .map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }
}
