// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! In-memory connection registry and room broadcast groups.
//!
//! Every live connection owns exactly one entry mapping it to a room and
//! a role. The registry is the single owner of room membership: joins,
//! disconnects, broadcasts, and rotation all go through it. Entries are
//! process-local; a restart drops all pairings and clients must re-join.

use dashmap::DashMap;
use metrics::{counter, gauge};
use smartdoor_common::ServerMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// What a connection is allowed to do within its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Paired via room code only; no management commands.
    Display,
    /// Paired via credentials or session token; full authority.
    Management,
}

/// Payload of a connection's outbound channel. `Shutdown` lets the
/// registry force-close evicted displays.
#[derive(Debug)]
pub enum Outbound {
    Message(ServerMessage),
    Shutdown,
}

pub type OutboundSender = mpsc::Sender<Outbound>;

/// A live connection's registry entry.
#[derive(Clone)]
pub struct Member {
    pub room_code: String,
    pub role: Role,
    pub tx: OutboundSender,
}

/// Registry of all live connections, keyed by connection id.
#[derive(Default)]
pub struct RoomRegistry {
    members: DashMap<ConnectionId, Member>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
        }
    }

    /// Register a connection under a room. Re-registering (e.g. a display
    /// that logs in as management) replaces the previous entry.
    pub fn register(&self, id: ConnectionId, room_code: String, role: Role, tx: OutboundSender) {
        self.members.insert(id, Member { room_code, role, tx });
        counter!(crate::metrics::REGISTRY_JOINED).increment(1);
        gauge!(crate::metrics::REGISTRY_MEMBERS).set(self.members.len() as f64);
    }

    /// Drop a connection's entry, if any.
    pub fn remove(&self, id: &ConnectionId) {
        if self.members.remove(id).is_some() {
            gauge!(crate::metrics::REGISTRY_MEMBERS).set(self.members.len() as f64);
        }
    }

    /// The member entry for a connection, if it is paired.
    pub fn get(&self, id: &ConnectionId) -> Option<Member> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    /// Number of connections currently paired to a room.
    pub fn room_size(&self, room_code: &str) -> usize {
        self.members
            .iter()
            .filter(|entry| entry.value().room_code == room_code)
            .count()
    }

    /// Push a message to every connection in the room.
    pub async fn broadcast(&self, room_code: &str, msg: ServerMessage) {
        let targets = self.room_senders(room_code, None);
        self.send_all(targets, msg);
    }

    /// Push a message to every connection in the room except `sender`.
    pub async fn send_to_others(
        &self,
        room_code: &str,
        sender: &ConnectionId,
        msg: ServerMessage,
    ) {
        let targets = self.room_senders(room_code, Some(sender));
        self.send_all(targets, msg);
    }

    /// Rotate a room code: management connections are migrated to the new
    /// code and told it via `room_id`; display connections receive
    /// `room_invalidate` and are force-disconnected. This is the only
    /// revocation mechanism for anonymous displays.
    pub async fn rotate(&self, old_code: &str, new_code: &str) {
        let mut migrated: Vec<OutboundSender> = Vec::new();
        let mut evicted: Vec<(ConnectionId, OutboundSender)> = Vec::new();

        for mut entry in self.members.iter_mut() {
            if entry.value().room_code != old_code {
                continue;
            }
            match entry.value().role {
                Role::Management => {
                    entry.value_mut().room_code = new_code.to_string();
                    migrated.push(entry.value().tx.clone());
                },
                Role::Display => {
                    evicted.push((*entry.key(), entry.value().tx.clone()));
                },
            }
        }

        for tx in migrated {
            let _ = tx.try_send(Outbound::Message(ServerMessage::RoomId(new_code.to_string())));
        }

        for (id, tx) in evicted {
            let _ = tx.try_send(Outbound::Message(ServerMessage::RoomInvalidate));
            let _ = tx.try_send(Outbound::Shutdown);
            self.remove(&id);
            counter!(crate::metrics::REGISTRY_EVICTED).increment(1);
        }
    }

    fn room_senders(
        &self,
        room_code: &str,
        exclude: Option<&ConnectionId>,
    ) -> Vec<OutboundSender> {
        self.members
            .iter()
            .filter(|entry| {
                entry.value().room_code == room_code
                    && exclude.is_none_or(|id| entry.key() != id)
            })
            .map(|entry| entry.value().tx.clone())
            .collect()
    }

    fn send_all(&self, targets: Vec<OutboundSender>, msg: ServerMessage) {
        for tx in targets {
            // Delivery is best-effort: a full or closed channel forfeits
            // the message rather than stalling every other room member.
            let _ = tx.try_send(Outbound::Message(msg.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartdoor_common::ServerMessage;

    fn channel() -> (OutboundSender, mpsc::Receiver<Outbound>) {
        mpsc::channel(16)
    }

    fn expect_message(out: Outbound) -> ServerMessage {
        match out {
            Outbound::Message(msg) => msg,
            Outbound::Shutdown => panic!("expected a message, got shutdown"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_whole_room() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let (tx_other, mut rx_other) = channel();

        registry.register(Uuid::new_v4(), "111111".to_string(), Role::Display, tx_a);
        registry.register(Uuid::new_v4(), "111111".to_string(), Role::Management, tx_b);
        registry.register(Uuid::new_v4(), "222222".to_string(), Role::Display, tx_other);

        registry.broadcast("111111", ServerMessage::ClearMessages).await;

        assert_eq!(expect_message(rx_a.try_recv().unwrap()), ServerMessage::ClearMessages);
        assert_eq!(expect_message(rx_b.try_recv().unwrap()), ServerMessage::ClearMessages);
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_others_skips_the_sender() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let sender = Uuid::new_v4();

        registry.register(sender, "111111".to_string(), Role::Display, tx_a);
        registry.register(Uuid::new_v4(), "111111".to_string(), Role::Display, tx_b);

        registry
            .send_to_others("111111", &sender, ServerMessage::ClearMessages)
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn rotation_migrates_management_and_evicts_displays() {
        let registry = RoomRegistry::new();
        let (tx_mgmt, mut rx_mgmt) = channel();
        let (tx_disp, mut rx_disp) = channel();
        let mgmt = Uuid::new_v4();
        let disp = Uuid::new_v4();

        registry.register(mgmt, "111111".to_string(), Role::Management, tx_mgmt);
        registry.register(disp, "111111".to_string(), Role::Display, tx_disp);

        registry.rotate("111111", "999999").await;

        // Management keeps working under the new code.
        let member = registry.get(&mgmt).unwrap();
        assert_eq!(member.room_code, "999999");
        assert_eq!(
            expect_message(rx_mgmt.try_recv().unwrap()),
            ServerMessage::RoomId("999999".to_string())
        );

        // Display is told the code died, then force-disconnected.
        assert_eq!(
            expect_message(rx_disp.try_recv().unwrap()),
            ServerMessage::RoomInvalidate
        );
        assert!(matches!(rx_disp.try_recv().unwrap(), Outbound::Shutdown));
        assert!(registry.get(&disp).is_none());
    }

    #[tokio::test]
    async fn stalled_member_does_not_block_the_room() {
        let registry = RoomRegistry::new();
        let (tx_stalled, mut rx_stalled) = mpsc::channel(1);
        let (tx_live, mut rx_live) = channel();

        registry.register(Uuid::new_v4(), "111111".to_string(), Role::Display, tx_stalled);
        registry.register(Uuid::new_v4(), "111111".to_string(), Role::Display, tx_live);

        // Fill the stalled member's buffer; further sends must not park
        // the broadcast (this test runs on a single-threaded runtime, so
        // a blocking send would deadlock here).
        registry.broadcast("111111", ServerMessage::ClearMessages).await;
        registry
            .broadcast("111111", ServerMessage::NewDeviceJoined)
            .await;

        assert_eq!(
            expect_message(rx_stalled.try_recv().unwrap()),
            ServerMessage::ClearMessages
        );
        assert!(rx_stalled.try_recv().is_err());

        // The healthy member got both.
        assert_eq!(
            expect_message(rx_live.try_recv().unwrap()),
            ServerMessage::ClearMessages
        );
        assert_eq!(
            expect_message(rx_live.try_recv().unwrap()),
            ServerMessage::NewDeviceJoined
        );
    }

    #[tokio::test]
    async fn remove_clears_membership() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = channel();
        let id = Uuid::new_v4();

        registry.register(id, "111111".to_string(), Role::Display, tx);
        assert_eq!(registry.room_size("111111"), 1);

        registry.remove(&id);
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.room_size("111111"), 0);
    }
}
