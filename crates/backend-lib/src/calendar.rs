// ============================
// crates/backend-lib/src/calendar.rs
// ============================
//! Calendar feed aggregation.
//!
//! Fetching and parsing a feed is an external capability behind
//! [`CalendarFetcher`]; this module only fans out, tags each feed's
//! events with its colour, and merges the results. A failing feed
//! degrades to an empty list instead of aborting the whole broadcast.

use async_trait::async_trait;
use futures_util::future::join_all;
use smartdoor_common::{CalendarEvent, CalendarFeed, CalendarSource};
use std::sync::Arc;
use tracing::warn;

use crate::error::AppError;

/// Opaque `fetch(url) -> events` capability.
#[async_trait]
pub trait CalendarFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<CalendarEvent>, AppError>;
}

/// Fetcher used when no calendar backend is wired up. Every feed
/// resolves to no events.
pub struct NoopFetcher;

#[async_trait]
impl CalendarFetcher for NoopFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<CalendarEvent>, AppError> {
        Ok(Vec::new())
    }
}

/// Fan-out aggregator over the configured fetcher.
#[derive(Clone)]
pub struct CalendarAggregator {
    fetcher: Arc<dyn CalendarFetcher>,
}

impl CalendarAggregator {
    pub fn new(fetcher: Arc<dyn CalendarFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch every subscribed feed concurrently and tag each result with
    /// its colour. Order follows the subscription list.
    pub async fn aggregate(&self, sources: &[CalendarSource]) -> Vec<CalendarFeed> {
        let fetches = sources.iter().map(|source| async {
            let events = match self.fetcher.fetch(&source.url).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(url = %source.url, error = %e, "calendar feed failed, degrading to empty");
                    Vec::new()
                },
            };
            CalendarFeed {
                colour: source.colour.clone(),
                events,
            }
        });

        join_all(fetches).await
    }
}
