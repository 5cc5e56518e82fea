// ============================
// crates/backend-lib/src/sync.rs
// ============================
//! The generic mutation pipeline: sanitize, atomically update the
//! caller's document, broadcast only the touched sub-state to the room.
//!
//! Every mutating command funnels through [`SyncCoordinator::apply`];
//! role and pairing checks happen in the connection handler before a
//! command reaches this module. Read queries bypass persistence and
//! answer only the requester.

use metrics::counter;
use smartdoor_common::{DisplayDocument, ServerMessage};
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::registry::RoomRegistry;
use crate::store::{DisplayStore, Mutator};

/// Projects the broadcast-worthy sub-state out of the updated document.
pub type Projection = fn(&DisplayDocument) -> ServerMessage;

#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn DisplayStore>,
    registry: Arc<RoomRegistry>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn DisplayStore>, registry: Arc<RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// Atomically apply `mutate` to the room's document and broadcast the
    /// projected sub-state to every member of the room.
    ///
    /// A room code no longer backed by a document (rotated away mid
    /// flight) drops the mutation silently, matching the silent-no-op
    /// policy for mutation paths.
    pub async fn apply(
        &self,
        room_code: &str,
        mutate: Mutator,
        project: Projection,
    ) -> Result<(), AppError> {
        let Some(updated) = self.stage(room_code, mutate).await? else {
            return Ok(());
        };
        self.registry.broadcast(room_code, project(&updated)).await;
        Ok(())
    }

    /// The persist half of the pipeline, for callers whose broadcast
    /// payload cannot be projected straight off the document (calendar
    /// updates aggregate feeds first). `Ok(None)` means the mutation was
    /// dropped.
    pub async fn stage(
        &self,
        room_code: &str,
        mutate: Mutator,
    ) -> Result<Option<DisplayDocument>, AppError> {
        let Some(updated) = self.store.update_by_room_code(room_code, mutate).await? else {
            debug!(room_code, "mutation against unknown room dropped");
            counter!(crate::metrics::SYNC_DROPPED).increment(1);
            return Ok(None);
        };

        counter!(crate::metrics::SYNC_APPLIED).increment(1);
        Ok(Some(updated))
    }

    /// Current document for a read query. `NotFound` when the room code
    /// no longer resolves.
    pub async fn fetch(&self, room_code: &str) -> Result<DisplayDocument, AppError> {
        self.store
            .find_by_room_code(room_code)
            .await?
            .ok_or_else(|| AppError::NotFound("invalid room code".to_string()))
    }
}
