// ============================
// crates/backend-lib/src/intercom.rs
// ============================
//! Ephemeral call-signalling relay.
//!
//! Nothing here is persisted and there is no server-side correlation of
//! request ids; duplicate or out-of-order delivery is the receiving
//! client's problem (idempotent by request id). The only server-side
//! decision is presence gating: a DO_NOT_DISTURB room swallows call
//! requests without a trace.

use metrics::counter;
use smartdoor_common::{ServerMessage, UserStatus};
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::registry::{ConnectionId, RoomRegistry};
use crate::store::DisplayStore;

#[derive(Clone)]
pub struct IntercomRelay {
    store: Arc<dyn DisplayStore>,
    registry: Arc<RoomRegistry>,
}

impl IntercomRelay {
    pub fn new(store: Arc<dyn DisplayStore>, registry: Arc<RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// Broadcast an `intercom_call_request` to the room, unless the
    /// room's persisted status is DO_NOT_DISTURB — then silently drop.
    pub async fn start_call(&self, room_code: &str, request_id: String) -> Result<(), AppError> {
        let Some(doc) = self.store.find_by_room_code(room_code).await? else {
            return Ok(());
        };

        if doc.user.status == UserStatus::DoNotDisturb {
            debug!(room_code, request_id, "call request suppressed by DND");
            counter!(crate::metrics::CALL_SUPPRESSED).increment(1);
            return Ok(());
        }

        counter!(crate::metrics::CALL_REQUESTED).increment(1);
        self.registry
            .broadcast(room_code, ServerMessage::IntercomCallRequest(request_id))
            .await;
        Ok(())
    }

    /// Re-broadcast a decline/cancel/end event to the whole room.
    pub async fn relay_lifecycle(&self, room_code: &str, event: ServerMessage) {
        self.registry.broadcast(room_code, event).await;
    }

    /// Relay a raw signalling payload (offer/answer/ICE) verbatim to
    /// every other room member, never echoing it to the sender.
    pub async fn relay_signalling(
        &self,
        room_code: &str,
        sender: &ConnectionId,
        payload: serde_json::Value,
    ) {
        self.registry
            .send_to_others(
                room_code,
                sender,
                ServerMessage::IntercomCallSignalling(payload),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Outbound, Role};
    use crate::store::FlatFileStore;
    use smartdoor_common::DisplayDocument;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    async fn setup(status: UserStatus) -> (IntercomRelay, Arc<RoomRegistry>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlatFileStore::open(dir.path()).unwrap());
        let mut doc = DisplayDocument::new("123456".to_string(), None, None);
        doc.user.status = status;
        store.insert(doc).await.unwrap();

        let registry = Arc::new(RoomRegistry::new());
        let relay = IntercomRelay::new(store, registry.clone());
        (relay, registry, dir)
    }

    #[tokio::test]
    async fn call_request_reaches_the_room() {
        let (relay, registry, _dir) = setup(UserStatus::Available).await;
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), "123456".to_string(), Role::Display, tx);

        relay.start_call("123456", "req-1".to_string()).await.unwrap();

        let Some(Outbound::Message(ServerMessage::IntercomCallRequest(id))) = rx.recv().await
        else {
            panic!("expected an intercom_call_request");
        };
        assert_eq!(id, "req-1");
    }

    #[tokio::test]
    async fn dnd_swallows_call_requests() {
        let (relay, registry, _dir) = setup(UserStatus::DoNotDisturb).await;
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), "123456".to_string(), Role::Display, tx);

        relay.start_call("123456", "req-1".to_string()).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn signalling_never_echoes_to_the_sender() {
        let (relay, registry, _dir) = setup(UserStatus::Available).await;
        let (tx_caller, mut rx_caller) = mpsc::channel(8);
        let (tx_callee, mut rx_callee) = mpsc::channel(8);
        let caller = Uuid::new_v4();

        registry.register(caller, "123456".to_string(), Role::Management, tx_caller);
        registry.register(Uuid::new_v4(), "123456".to_string(), Role::Display, tx_callee);

        let sdp = serde_json::json!({"type": "offer", "sdp": "v=0"});
        relay.relay_signalling("123456", &caller, sdp.clone()).await;

        assert!(rx_caller.try_recv().is_err());
        let Some(Outbound::Message(ServerMessage::IntercomCallSignalling(payload))) =
            rx_callee.recv().await
        else {
            panic!("expected relayed signalling");
        };
        assert_eq!(payload, sdp);
    }

    #[tokio::test]
    async fn lifecycle_events_are_room_wide() {
        let (relay, registry, _dir) = setup(UserStatus::Available).await;
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), "123456".to_string(), Role::Display, tx);

        relay
            .relay_lifecycle(
                "123456",
                ServerMessage::DeclineCallRequest("req-1".to_string()),
            )
            .await;

        let Some(Outbound::Message(ServerMessage::DeclineCallRequest(id))) = rx.recv().await
        else {
            panic!("expected a decline relay");
        };
        assert_eq!(id, "req-1");
    }
}
