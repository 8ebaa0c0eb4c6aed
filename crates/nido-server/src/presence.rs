//! In-memory presence registry.
//!
//! Maps a user id to the outbound event channel of its live connection.
//! The registry is an explicitly constructed object owned by the server and
//! passed by reference to whatever needs presence lookups; it is never a
//! process-global.  Entries live for the duration of a connection and are
//! removed synchronously on disconnect.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use nido_shared::events::ServerEvent;
use nido_shared::types::UserId;

/// Outbound handle for one connection.  Unbounded so a slow client buffers
/// in its own channel and can never block a handler.
pub type ConnectionHandle = mpsc::UnboundedSender<ServerEvent>;

pub struct PresenceRegistry {
    online: Mutex<HashMap<UserId, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            online: Mutex::new(HashMap::new()),
        }
    }

    // The map holds no invariants beyond its own consistency, so a poisoned
    // lock can safely be recovered.
    fn map(&self) -> MutexGuard<'_, HashMap<UserId, ConnectionHandle>> {
        self.online.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a connection for `user`, replacing any previous handle
    /// (reconnect replaces the old session; there is no multi-device
    /// fan-out).  Broadcasts the updated online set to everyone.
    pub fn register(&self, user: UserId, handle: ConnectionHandle) {
        let replaced = self.map().insert(user, handle).is_some();
        debug!(%user, replaced, "user connected");
        self.broadcast_online_set();
    }

    /// Drop the mapping for `user` and broadcast the updated online set to
    /// the remaining connections.
    pub fn unregister(&self, user: UserId) {
        let removed = self.map().remove(&user).is_some();
        debug!(%user, removed, "user disconnected");
        if removed {
            self.broadcast_online_set();
        }
    }

    pub fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.map().get(&user).cloned()
    }

    pub fn list_online(&self) -> Vec<UserId> {
        self.map().keys().copied().collect()
    }

    /// Deliver an event to one user's live connection, if any.
    /// Fire-and-forget: returns whether the user was online; a closed
    /// channel counts as offline.
    pub fn send_to(&self, user: UserId, event: ServerEvent) -> bool {
        match self.lookup(user) {
            Some(handle) => handle.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to every live connection.
    pub fn broadcast(&self, event: ServerEvent) {
        for handle in self.map().values() {
            // Dead channels are cleaned up by their connection task.
            let _ = handle.send(event.clone());
        }
    }

    fn broadcast_online_set(&self) {
        let online = self.list_online();
        self.broadcast(ServerEvent::OnlineUsersChanged { online });
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &PresenceRegistry, user: UserId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(user, tx);
        rx
    }

    #[test]
    fn register_and_lookup() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let _rx = connect(&registry, user);

        assert!(registry.lookup(user).is_some());
        assert_eq!(registry.list_online(), vec![user]);
    }

    #[test]
    fn reconnect_replaces_old_session() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();

        let mut old_rx = connect(&registry, user);
        let mut new_rx = connect(&registry, user);

        // Drain the registration broadcasts both handles saw.
        while old_rx.try_recv().is_ok() {}
        while new_rx.try_recv().is_ok() {}

        registry.send_to(user, ServerEvent::MessageDeleted { message_id: 1 });
        assert!(old_rx.try_recv().is_err());
        assert!(matches!(
            new_rx.try_recv(),
            Ok(ServerEvent::MessageDeleted { message_id: 1 })
        ));
    }

    #[test]
    fn unregister_broadcasts_updated_set() {
        let registry = PresenceRegistry::new();
        let a = UserId::new();
        let b = UserId::new();

        let mut rx_a = connect(&registry, a);
        let _rx_b = connect(&registry, b);
        while rx_a.try_recv().is_ok() {}

        registry.unregister(b);

        match rx_a.try_recv() {
            Ok(ServerEvent::OnlineUsersChanged { online }) => {
                assert_eq!(online, vec![a]);
            }
            other => panic!("expected online set broadcast, got {other:?}"),
        }
        assert!(!registry.send_to(b, ServerEvent::MessageDeleted { message_id: 1 }));
    }

    #[test]
    fn send_to_offline_user_is_noop() {
        let registry = PresenceRegistry::new();
        assert!(!registry.send_to(UserId::new(), ServerEvent::MessageDeleted { message_id: 9 }));
    }
}
