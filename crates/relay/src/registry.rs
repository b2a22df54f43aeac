// Connection registry: participant identity -> live connection handle.

use pairlab_common::protocol::event::RelayEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Messages delivered to a connection's write loop.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// Fan a relay event out to this connection.
    Deliver(RelayEvent),
    /// A newer connection registered for the same participant; the write
    /// loop closes the socket and skips disconnect reconciliation.
    Evicted,
}

/// Sending half of a connection's outbound channel.
pub(crate) type ConnectionHandle = mpsc::UnboundedSender<Outbound>;

/// A registered connection together with the session it joined through,
/// kept so an eviction can migrate the stale connection's membership.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredConnection {
    pub(crate) handle: ConnectionHandle,
    pub(crate) session_id: Option<i64>,
}

/// Live-socket registry keyed by participant identifier.
///
/// A participant has at most one registered connection. Registering a new
/// one returns the entry it replaced so the dispatcher can evict the stale
/// socket explicitly instead of leaving it orphaned.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<i64, RegisteredConnection>>>,
}

impl ConnectionRegistry {
    pub(crate) async fn register(
        &self,
        participant_id: i64,
        connection: RegisteredConnection,
    ) -> Option<RegisteredConnection> {
        self.connections.write().await.insert(participant_id, connection)
    }

    pub(crate) async fn unregister(&self, participant_id: i64) -> Option<RegisteredConnection> {
        self.connections.write().await.remove(&participant_id)
    }

    /// Remove the entry only if it still belongs to `handle`. A concurrent
    /// replacement by a newer connection is left untouched.
    pub(crate) async fn unregister_exact(
        &self,
        participant_id: i64,
        handle: &ConnectionHandle,
    ) -> bool {
        let mut guard = self.connections.write().await;
        match guard.get(&participant_id) {
            Some(entry) if entry.handle.same_channel(handle) => {
                guard.remove(&participant_id);
                true
            }
            _ => false,
        }
    }

    /// Absent is a defined result: the dispatcher skips the stale target
    /// rather than failing the broadcast.
    pub(crate) async fn lookup(&self, participant_id: i64) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&participant_id).map(|entry| entry.handle.clone())
    }

    pub(crate) async fn registered_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
