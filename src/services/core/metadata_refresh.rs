//! Metadata refresh throttling
//!
//! Items without artwork or a completed metadata sync are still being
//! enriched server-side. Every time such an item shows up (list fetch, push
//! update, detail view) the client asks the backend to refresh it, but at
//! most once per item per cooldown window.
//!
//! ## Usage Pattern
//!
//! 1. Pass the items that just arrived to [`RefreshThrottle::take_eligible`]
//! 2. Send a refresh request for every returned id
//! 3. On failure call [`RefreshThrottle::clear`] so the next sighting retries

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::models::{MediaItem, MediaItemId};

/// Default minimum interval between two refresh requests for one item
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

/// Per-item last-requested timestamps
#[derive(Debug)]
pub struct RefreshThrottle {
    cooldown: Duration,
    last_requested: HashMap<MediaItemId, Instant>,
}

impl Default for RefreshThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_COOLDOWN)
    }
}

impl RefreshThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_requested: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether a request for `id` was made less than one cooldown ago
    pub fn is_cooling(&self, id: &MediaItemId, now: Instant) -> bool {
        self.last_requested
            .get(id)
            .is_some_and(|requested| now.saturating_duration_since(*requested) < self.cooldown)
    }

    /// Pick the items that need metadata and are out of cooldown, and stamp
    /// them as requested. `force` skips the cooldown check. Expired entries
    /// are dropped first, so the map only holds items still cooling down.
    pub fn take_eligible<'a>(
        &mut self,
        items: impl IntoIterator<Item = &'a MediaItem>,
        now: Instant,
        force: bool,
    ) -> Vec<MediaItemId> {
        self.prune(now);

        let mut eligible = Vec::new();
        for item in items {
            if !item.needs_metadata() {
                continue;
            }
            if !force && self.is_cooling(&item.id, now) {
                trace!("Metadata refresh for {} still cooling down", item.id);
                continue;
            }
            self.last_requested.insert(item.id.clone(), now);
            eligible.push(item.id.clone());
        }
        eligible
    }

    /// Forget the request time for `id`, e.g. after the request failed
    pub fn clear(&mut self, id: &MediaItemId) {
        self.last_requested.remove(id);
    }

    /// Drop entries whose cooldown has elapsed
    pub fn prune(&mut self, now: Instant) {
        let cooldown = self.cooldown;
        self.last_requested
            .retain(|_, requested| now.saturating_duration_since(*requested) < cooldown);
    }

    pub fn len(&self) -> usize {
        self.last_requested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_requested.is_empty()
    }
}
