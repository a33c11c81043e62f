//! Presence registry - which identities are connected, from how many sessions

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::{MatchId, UserId};
use crate::ws::protocol::{ServerMsg, UserStatus};

/// Transport session identifier
pub type ConnectionId = Uuid;

/// Capacity of a connection's outbound queue
pub const OUTBOUND_CAPACITY: usize = 64;

/// Derived presence of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceStatus {
    Online,
    Offline,
    InGame,
}

/// Command for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    Msg(ServerMsg),
    /// Close the socket
    Close,
}

/// Send side of one live session
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// Fresh handle plus the receiver its writer task drains
    pub fn channel() -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        (Self::new(Uuid::new_v4(), tx), rx)
    }

    /// Queue a message without waiting. A slow client loses the message
    /// rather than stalling the handler.
    pub fn send(&self, msg: ServerMsg) -> bool {
        match self.tx.try_send(Outbound::Msg(msg)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %self.id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %self.id, "Connection already closed");
                false
            }
        }
    }

    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }
}

/// Result of removing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub user_id: UserId,
    /// That was the identity's last live connection
    pub went_offline: bool,
}

/// Identity -> live connections, plus the identity -> match binding that
/// turns `online` into `in-game`
pub struct PresenceRegistry {
    connections: DashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    /// Reverse index so removal does not scan every identity
    owners: DashMap<ConnectionId, UserId>,
    bindings: DashMap<UserId, MatchId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            owners: DashMap::new(),
            bindings: DashMap::new(),
        }
    }

    /// Register a connection. Returns true when this is the identity's first
    /// live connection. Admitting a known connection id again is a no-op.
    pub fn admit(&self, user_id: UserId, handle: ConnectionHandle) -> bool {
        if self.owners.contains_key(&handle.id) {
            return false;
        }
        self.owners.insert(handle.id, user_id);

        let mut sessions = self.connections.entry(user_id).or_default();
        let first = sessions.is_empty();
        sessions.insert(handle.id, handle);
        first
    }

    /// Drop a connection; the identity's entry goes with its last connection.
    /// `None` if the connection is unknown.
    pub fn remove(&self, connection_id: ConnectionId) -> Option<Removed> {
        let (_, user_id) = self.owners.remove(&connection_id)?;

        if let Some(mut sessions) = self.connections.get_mut(&user_id) {
            sessions.remove(&connection_id);
        }
        let went_offline = self
            .connections
            .remove_if(&user_id, |_, sessions| sessions.is_empty())
            .is_some();

        Some(Removed {
            user_id,
            went_offline,
        })
    }

    /// Close and forget every connection of an identity. Returns how many
    /// were closed.
    pub fn force_disconnect(&self, user_id: UserId) -> usize {
        let Some((_, sessions)) = self.connections.remove(&user_id) else {
            return 0;
        };

        for handle in sessions.values() {
            self.owners.remove(&handle.id);
            handle.close();
        }
        sessions.len()
    }

    /// Fan a message out to every live connection of an identity. Returns the
    /// number of connections it was queued on; zero when offline.
    pub fn send_to(&self, user_id: UserId, msg: &ServerMsg) -> usize {
        let handles = self.handles_of(user_id);
        handles.iter().filter(|h| h.send(msg.clone())).count()
    }

    /// Send to every live connection
    pub fn broadcast(&self, msg: &ServerMsg) {
        let handles: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();

        for handle in handles {
            handle.send(msg.clone());
        }
    }

    /// Push the full presence list to everyone
    pub fn broadcast_presence(&self) {
        self.broadcast(&ServerMsg::UsersStatus(self.snapshot()));
    }

    /// Presence list of every connected identity, ordered by id
    pub fn snapshot(&self) -> Vec<UserStatus> {
        let mut ids: Vec<UserId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| UserStatus {
                id,
                status: self.status(id),
            })
            .collect()
    }

    pub fn status(&self, user_id: UserId) -> PresenceStatus {
        if !self.connections.contains_key(&user_id) {
            PresenceStatus::Offline
        } else if self.bindings.contains_key(&user_id) {
            PresenceStatus::InGame
        } else {
            PresenceStatus::Online
        }
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    #[cfg(test)]
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.connections.get(&user_id).map_or(0, |s| s.len())
    }

    /// Number of identities with at least one live connection
    pub fn online_users(&self) -> usize {
        self.connections.len()
    }

    /// Mark an identity as playing a match
    pub fn bind(&self, user_id: UserId, match_id: MatchId) {
        self.bindings.insert(user_id, match_id);
    }

    /// Release an identity only if it is still bound to `match_id`
    pub fn unbind_from(&self, user_id: UserId, match_id: &MatchId) -> bool {
        self.bindings
            .remove_if(&user_id, |_, bound| bound == match_id)
            .is_some()
    }

    /// Tell everyone the identity's current status
    pub fn announce_status(&self, user_id: UserId) {
        self.broadcast(&ServerMsg::UserStatusUpdate(UserStatus {
            id: user_id,
            status: self.status(user_id),
        }));
    }

    pub fn match_of(&self, user_id: UserId) -> Option<MatchId> {
        self.bindings.get(&user_id).map(|m| m.value().clone())
    }

    fn handles_of(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.connections
            .get(&user_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
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

    fn recv_msg(rx: &mut mpsc::Receiver<Outbound>) -> Option<ServerMsg> {
        match rx.try_recv().ok()? {
            Outbound::Msg(msg) => Some(msg),
            Outbound::Close => None,
        }
    }

    #[test]
    fn second_tab_keeps_identity_online() {
        let registry = PresenceRegistry::new();
        let (c1, _rx1) = ConnectionHandle::channel();
        let (c2, _rx2) = ConnectionHandle::channel();
        let (id1, id2) = (c1.id, c2.id);

        assert!(registry.admit(5, c1));
        assert!(!registry.admit(5, c2));
        assert_eq!(registry.connection_count(5), 2);
        assert_eq!(registry.status(5), PresenceStatus::Online);

        assert_eq!(
            registry.remove(id1),
            Some(Removed { user_id: 5, went_offline: false })
        );
        assert_eq!(registry.status(5), PresenceStatus::Online);

        assert_eq!(
            registry.remove(id2),
            Some(Removed { user_id: 5, went_offline: true })
        );
        assert_eq!(registry.status(5), PresenceStatus::Offline);
        assert!(!registry.is_connected(5));
        assert_eq!(registry.online_users(), 0);
    }

    #[test]
    fn admit_is_idempotent_per_connection() {
        let registry = PresenceRegistry::new();
        let (c1, _rx) = ConnectionHandle::channel();
        assert!(registry.admit(1, c1.clone()));
        assert!(!registry.admit(1, c1));
        assert_eq!(registry.connection_count(1), 1);
    }

    #[test]
    fn removing_unknown_connection_is_noop() {
        let registry = PresenceRegistry::new();
        assert_eq!(registry.remove(Uuid::new_v4()), None);
    }

    #[test]
    fn binding_turns_online_into_in_game() {
        let registry = PresenceRegistry::new();
        let (c1, _rx) = ConnectionHandle::channel();
        registry.admit(1, c1);

        registry.bind(1, MatchId::from("room-1"));
        assert_eq!(registry.status(1), PresenceStatus::InGame);
        assert_eq!(registry.match_of(1), Some(MatchId::from("room-1")));

        assert!(!registry.unbind_from(1, &MatchId::from("room-9")));
        assert_eq!(registry.status(1), PresenceStatus::InGame);

        assert!(registry.unbind_from(1, &MatchId::from("room-1")));
        assert_eq!(registry.status(1), PresenceStatus::Online);
    }

    #[test]
    fn bound_but_disconnected_is_offline() {
        let registry = PresenceRegistry::new();
        registry.bind(4, MatchId::from("room-2"));
        assert_eq!(registry.status(4), PresenceStatus::Offline);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn send_to_fans_out_to_every_session() {
        let registry = PresenceRegistry::new();
        let (c1, mut rx1) = ConnectionHandle::channel();
        let (c2, mut rx2) = ConnectionHandle::channel();
        registry.admit(7, c1);
        registry.admit(7, c2);

        let delivered = registry.send_to(7, &ServerMsg::GameInvite { from: 1 });
        assert_eq!(delivered, 2);
        assert!(matches!(recv_msg(&mut rx1), Some(ServerMsg::GameInvite { from: 1 })));
        assert!(matches!(recv_msg(&mut rx2), Some(ServerMsg::GameInvite { from: 1 })));

        assert_eq!(registry.send_to(8, &ServerMsg::GameInvite { from: 1 }), 0);
    }

    #[test]
    fn force_disconnect_closes_all_sessions() {
        let registry = PresenceRegistry::new();
        let (c1, mut rx1) = ConnectionHandle::channel();
        let (c2, mut rx2) = ConnectionHandle::channel();
        let id1 = c1.id;
        registry.admit(3, c1);
        registry.admit(3, c2);

        assert_eq!(registry.force_disconnect(3), 2);
        assert_eq!(registry.status(3), PresenceStatus::Offline);
        assert!(matches!(rx1.try_recv(), Ok(Outbound::Close)));
        assert!(matches!(rx2.try_recv(), Ok(Outbound::Close)));

        // The socket's own cleanup later finds nothing to remove
        assert_eq!(registry.remove(id1), None);
    }

    #[test]
    fn snapshot_lists_connected_identities_in_order() {
        let registry = PresenceRegistry::new();
        for user in [9, 2, 5] {
            let (c, _rx) = ConnectionHandle::channel();
            registry.admit(user, c);
        }
        registry.bind(5, MatchId::from("room-1"));

        let ids: Vec<_> = registry.snapshot().iter().map(|s| (s.id, s.status)).collect();
        assert_eq!(
            ids,
            vec![
                (2, PresenceStatus::Online),
                (5, PresenceStatus::InGame),
                (9, PresenceStatus::Online),
            ]
        );
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        assert!(handle.send(ServerMsg::GameInvite { from: 1 }));
        assert!(!handle.send(ServerMsg::GameInvite { from: 1 }));
    }
}
