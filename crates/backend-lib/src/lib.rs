// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core library for the smart-door display synchronization server.
//!
//! One persistent display document per registered account, any number of
//! transient WebSocket connections per room: mutations are validated,
//! persisted through the document store, and re-broadcast to every other
//! connection sharing the room.

pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod handler;
pub mod intercom;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod sync;
pub mod validation;
pub mod ws_router;

use std::sync::Arc;

use crate::auth::AccountService;
use crate::calendar::{CalendarAggregator, CalendarFetcher};
use crate::config::Settings;
use crate::intercom::IntercomRelay;
use crate::registry::RoomRegistry;
use crate::store::DisplayStore;
use crate::sync::SyncCoordinator;

/// Application state shared across all connections
pub struct AppState {
    /// Document store boundary
    pub store: Arc<dyn DisplayStore>,
    /// Credential & session service
    pub accounts: AccountService,
    /// Live connection registry and broadcast groups
    pub registry: Arc<RoomRegistry>,
    /// Generic mutation pipeline
    pub sync: SyncCoordinator,
    /// Call-signalling relay
    pub intercom: IntercomRelay,
    /// Calendar feed aggregator
    pub calendars: CalendarAggregator,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DisplayStore>,
        fetcher: Arc<dyn CalendarFetcher>,
        settings: Settings,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let accounts = AccountService::new(store.clone(), settings.room_code_len);
        let sync = SyncCoordinator::new(store.clone(), registry.clone());
        let intercom = IntercomRelay::new(store.clone(), registry.clone());
        let calendars = CalendarAggregator::new(fetcher);

        Self {
            store,
            accounts,
            registry,
            sync,
            intercom,
            calendars,
            settings: Arc::new(settings),
        }
    }
}
