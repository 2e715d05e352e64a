use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::models::{
    ItemFilters, ItemPage, LibraryId, MediaItem, MediaItemId, PlaybackPlan, ResumeInfo,
    WatchProgress,
};

/// The "active item" slot behind the detail view
#[derive(Debug, Default)]
pub struct DetailState {
    pub requested: Option<MediaItemId>,
    pub loading: bool,
    pub error: Option<String>,
    pub item: Option<MediaItem>,
    pub progress: Option<WatchProgress>,
    pub resume_prompt: Option<ResumeInfo>,
    pub plan: Option<PlaybackPlan>,
    generation: u64,
}

impl DetailState {
    pub fn active_id(&self) -> Option<&MediaItemId> {
        self.item.as_ref().map(|item| &item.id)
    }
}

/// Items of the selected library, keyed by id, with a sorted view that is
/// recomputed on every write.
#[derive(Debug, Default)]
pub struct MediaItemCache {
    selected_library: Option<LibraryId>,
    filters: ItemFilters,
    items: HashMap<MediaItemId, MediaItem>,
    order: Vec<MediaItemId>,
    total_count: usize,
    loading: bool,
    error: Option<String>,
    fetch_generation: u64,
    detail: DetailState,
}

impl MediaItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_library(&self) -> Option<&LibraryId> {
        self.selected_library.as_ref()
    }

    pub fn filters(&self) -> &ItemFilters {
        &self.filters
    }

    /// Items in display order
    pub fn items(&self) -> Vec<&MediaItem> {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect()
    }

    pub fn item(&self, id: &MediaItemId) -> Option<&MediaItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn detail(&self) -> &DetailState {
        &self.detail
    }

    /// Edit the filter predicate for the next fetch. Cached items are not
    /// re-filtered.
    pub fn set_filters(&mut self, update: impl FnOnce(&mut ItemFilters)) {
        update(&mut self.filters);
    }

    /// Drop every cached item and deselect the library
    pub fn clear(&mut self) {
        self.selected_library = None;
        self.items.clear();
        self.order.clear();
        self.total_count = 0;
        self.loading = false;
        self.error = None;
        self.fetch_generation += 1;
    }

    /// Start a list fetch. `None` clears the cache and returns no generation.
    /// Switching libraries drops the previous library's items up front.
    pub fn begin_fetch(&mut self, library_id: Option<&LibraryId>) -> Option<u64> {
        let Some(library_id) = library_id else {
            self.clear();
            return None;
        };

        if self.selected_library.as_ref() != Some(library_id) {
            self.items.clear();
            self.order.clear();
            self.total_count = 0;
            self.selected_library = Some(library_id.clone());
        }

        self.fetch_generation += 1;
        self.loading = true;
        self.error = None;
        Some(self.fetch_generation)
    }

    /// Apply a list response. A response from a superseded fetch is dropped;
    /// a failure keeps the prior items. Returns whether it was applied.
    pub fn finish_fetch(&mut self, generation: u64, result: Result<ItemPage, String>) -> bool {
        if generation != self.fetch_generation {
            debug!(
                "Discarding stale item page (generation {} < {})",
                generation, self.fetch_generation
            );
            return false;
        }

        self.loading = false;
        match result {
            Ok(page) => {
                self.total_count = page.total();
                self.items = page
                    .into_items()
                    .into_iter()
                    .map(|item| (item.id.clone(), item))
                    .collect();
                self.error = None;
                self.resort();
            }
            Err(error) => self.error = Some(error),
        }
        true
    }

    /// Merge partial records into the cache, incoming fields winning.
    ///
    /// Items tagged with a library other than the selected one (or other than
    /// the library they were first cached under) are skipped. Returns the ids
    /// that were merged. Repeating the same input leaves the cache unchanged.
    pub fn upsert(&mut self, incoming: Vec<MediaItem>) -> Vec<MediaItemId> {
        let Some(selected) = self.selected_library.clone() else {
            trace!("Ignoring upsert with no library selected");
            return Vec::new();
        };
        if incoming.is_empty() {
            return Vec::new();
        }

        let mut merged = Vec::with_capacity(incoming.len());
        for mut item in incoming {
            if let Some(library_id) = &item.library_id {
                if library_id != &selected {
                    debug!(
                        "Skipping item {} from library {} (selected {})",
                        item.id, library_id, selected
                    );
                    continue;
                }
            }

            match self.items.get_mut(&item.id) {
                Some(existing) => {
                    if let (Some(cached), Some(library_id)) = (&existing.library_id, &item.library_id) {
                        if cached != library_id {
                            debug!("Skipping item {} whose library changed", item.id);
                            continue;
                        }
                    }
                    existing.merge(item.clone());
                }
                None => {
                    if item.library_id.is_none() {
                        item.library_id = Some(selected.clone());
                    }
                    self.items.insert(item.id.clone(), item.clone());
                }
            }

            if let Some(active) = self.detail.item.as_mut().filter(|a| a.id == item.id) {
                active.merge(item.clone());
                if active.watch_progress.is_some() {
                    self.detail.progress = active.watch_progress.clone();
                }
            }
            merged.push(item.id);
        }

        if !merged.is_empty() {
            self.resort();
            self.total_count = self.items.len();
        }
        merged
    }

    /// Delete items by id. Returns how many were present.
    pub fn remove(&mut self, ids: &[MediaItemId]) -> usize {
        let ids: HashSet<&MediaItemId> = ids.iter().collect();
        let before = self.items.len();

        self.items.retain(|id, _| !ids.contains(id));
        self.order.retain(|id| !ids.contains(id));
        self.total_count = self.items.len();

        if self.detail.active_id().is_some_and(|id| ids.contains(id)) {
            self.close_detail();
        }
        before - self.items.len()
    }

    /// Apply a locally reported playback position to the cached item and
    /// to the active progress when that item is open.
    pub fn record_position(
        &mut self,
        id: &MediaItemId,
        position_ms: u64,
        duration_ms: Option<u64>,
        completion_threshold: f64,
    ) -> Option<&WatchProgress> {
        let item = self.items.get_mut(id)?;
        let progress = item.watch_progress.get_or_insert_with(|| WatchProgress {
            id: None,
            position_ms: 0,
            duration_ms: None,
            completed: false,
            percentage: None,
            last_watched_at: None,
        });
        progress.record_position(position_ms, duration_ms, completion_threshold);
        progress.last_watched_at = Some(chrono::Utc::now());

        if let Some(active) = self.detail.item.as_mut().filter(|a| &a.id == id) {
            active.watch_progress = item.watch_progress.clone();
            self.detail.progress = item.watch_progress.clone();
        }
        item.watch_progress.as_ref()
    }

    /// Start loading the detail slot for `id`
    pub fn begin_detail(&mut self, id: &MediaItemId) -> u64 {
        self.detail.generation += 1;
        self.detail.requested = Some(id.clone());
        self.detail.loading = true;
        self.detail.error = None;
        self.detail.generation
    }

    /// Apply a detail response if it is still the latest request for the
    /// same id. On failure the previously active item stays in place.
    pub fn finish_detail(
        &mut self,
        generation: u64,
        id: &MediaItemId,
        result: Result<MediaItem, String>,
    ) -> bool {
        if generation != self.detail.generation || self.detail.requested.as_ref() != Some(id) {
            debug!("Discarding stale detail response for item {}", id);
            return false;
        }

        self.detail.loading = false;
        match result {
            Ok(item) => {
                if self.detail.active_id() != Some(&item.id) {
                    self.detail.resume_prompt = None;
                    self.detail.plan = None;
                }
                self.detail.progress = item.watch_progress.clone();
                self.detail.item = Some(item);
                self.detail.error = None;
            }
            Err(error) => self.detail.error = Some(error),
        }
        true
    }

    pub fn close_detail(&mut self) {
        let generation = self.detail.generation;
        self.detail = DetailState {
            generation,
            ..DetailState::default()
        };
    }

    pub fn set_resume_prompt(&mut self, prompt: Option<ResumeInfo>) {
        self.detail.resume_prompt = prompt;
    }

    /// Store a plan for the active show. Ignored when the show is no longer open.
    pub fn set_plan(&mut self, plan: PlaybackPlan) -> bool {
        if self.detail.active_id() != Some(&plan.show_id) {
            debug!("Dropping playback plan for inactive show {}", plan.show_id);
            return false;
        }
        self.detail.plan = Some(plan);
        true
    }

    fn resort(&mut self) {
        let mut keyed: Vec<(String, MediaItemId)> = self
            .items
            .values()
            .map(|item| (item.sort_key(), item.id.clone()))
            .collect();
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.as_str().cmp(b.1.as_str()))
        });
        self.order = keyed.into_iter().map(|(_, id)| id).collect();
    }
}
