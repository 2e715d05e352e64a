use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backends::LibraryBackend;
use crate::config::Config;
use crate::models::{
    FileId, ItemFilters, ItemType, LibraryId, MediaItem, MediaItemId, PlaybackPlan,
    PlaylistContext, ResumeInfo, StreamInfo, WatchProgress,
};
use crate::services::core::metadata_refresh::RefreshThrottle;
use crate::services::core::playback::PlaybackPlanner;
use crate::services::core::scans::MediaItemSink;
use crate::state::MediaItemCache;

/// Drives the [`MediaItemCache`] through the backend.
///
/// Locks on the cache are only held between awaits, never across a backend
/// call, so readers always see a consistent cache while requests are in
/// flight. Stale responses are filtered by the cache's request generations.
pub struct MediaService {
    backend: Arc<dyn LibraryBackend>,
    cache: Arc<RwLock<MediaItemCache>>,
    throttle: Arc<Mutex<RefreshThrottle>>,
    refreshes: Mutex<JoinSet<()>>,
    refresh_permits: Arc<Semaphore>,
    planner: PlaybackPlanner,
    completion_threshold: f64,
}

impl std::fmt::Debug for MediaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaService")
            .field("backend", &self.backend)
            .field("planner", &self.planner)
            .finish_non_exhaustive()
    }
}

impl MediaService {
    pub fn new(backend: Arc<dyn LibraryBackend>, config: &Config) -> Self {
        Self {
            backend,
            cache: Arc::new(RwLock::new(MediaItemCache::new())),
            throttle: Arc::new(Mutex::new(RefreshThrottle::new(config.refresh_cooldown()))),
            refreshes: Mutex::new(JoinSet::new()),
            refresh_permits: Arc::new(Semaphore::new(config.cache.max_concurrent_refreshes.max(1))),
            planner: PlaybackPlanner::new(config.playback.resume_guard_band),
            completion_threshold: config.playback.completion_threshold,
        }
    }

    /// Read access for presentation code
    pub async fn state(&self) -> RwLockReadGuard<'_, MediaItemCache> {
        self.cache.read().await
    }

    pub async fn items(&self) -> Vec<MediaItem> {
        self.cache.read().await.items().into_iter().cloned().collect()
    }

    pub fn planner(&self) -> &PlaybackPlanner {
        &self.planner
    }

    /// Number of items whose metadata refresh is still cooling down
    pub async fn cooling_refreshes(&self) -> usize {
        self.throttle.lock().await.len()
    }

    pub async fn set_filters(&self, update: impl FnOnce(&mut ItemFilters)) {
        self.cache.write().await.set_filters(update);
    }

    /// Replace the cache with the selected library's filtered items.
    ///
    /// `None` clears the cache. Failures are recorded on the cache rather
    /// than returned; the previous items stay visible.
    pub async fn fetch(&self, library_id: Option<&LibraryId>) {
        let (generation, filters) = {
            let mut cache = self.cache.write().await;
            match cache.begin_fetch(library_id) {
                Some(generation) => (generation, cache.filters().clone()),
                None => {
                    debug!("Cleared item cache, no library selected");
                    return;
                }
            }
        };
        let Some(library_id) = library_id else {
            return;
        };

        let result = self
            .backend
            .list_items(library_id, &filters)
            .await
            .map_err(|e| {
                warn!("Failed to fetch items for library {}: {:#}", library_id, e);
                format!("{e:#}")
            });
        let succeeded = result.is_ok();

        let eligible = {
            let mut cache = self.cache.write().await;
            if !cache.finish_fetch(generation, result) || !succeeded {
                return;
            }
            info!(
                "Loaded {} items for library {} ({} total)",
                cache.len(),
                library_id,
                cache.total_count()
            );
            self.throttle
                .lock()
                .await
                .take_eligible(cache.items(), Instant::now(), false)
        };
        self.queue_refreshes(eligible).await;
    }

    /// Merge partial records into the cache and queue throttled metadata
    /// refreshes for the ones still being enriched.
    pub async fn upsert(&self, items: Vec<MediaItem>) -> Vec<MediaItemId> {
        let (merged, eligible) = {
            let mut cache = self.cache.write().await;
            let merged = cache.upsert(items);
            let touched = merged.iter().filter_map(|id| cache.item(id));
            let eligible = self
                .throttle
                .lock()
                .await
                .take_eligible(touched, Instant::now(), false);
            (merged, eligible)
        };
        self.queue_refreshes(eligible).await;
        merged
    }

    /// Drop items from the cache along with their refresh cooldowns
    pub async fn remove(&self, ids: &[MediaItemId]) -> usize {
        let removed = self.cache.write().await.remove(ids);
        let mut throttle = self.throttle.lock().await;
        for id in ids {
            throttle.clear(id);
        }
        removed
    }

    /// Load the full record for the detail view.
    ///
    /// Errors are returned to the caller; the previously active item is kept.
    /// A response for a request that was superseded or closed is returned but
    /// not applied.
    pub async fn open_detail(&self, id: &MediaItemId) -> Result<MediaItem> {
        let generation = self.cache.write().await.begin_detail(id);

        let item = match self.backend.get_item(id).await {
            Ok(item) => item,
            Err(e) => {
                self.cache
                    .write()
                    .await
                    .finish_detail(generation, id, Err(format!("{e:#}")));
                return Err(e).with_context(|| format!("Failed to load item {id}"));
            }
        };

        let eligible = {
            let mut cache = self.cache.write().await;
            if !cache.finish_detail(generation, id, Ok(item.clone())) {
                return Ok(item);
            }
            cache.upsert(vec![item.clone()]);
            self.throttle
                .lock()
                .await
                .take_eligible([&item], Instant::now(), true)
        };
        self.queue_refreshes(eligible).await;

        if item.is_show() {
            if let Err(e) = self.load_playback_plan(id).await {
                warn!("Failed to load episodes for show {}: {:#}", id, e);
            }
        }
        Ok(item)
    }

    pub async fn close_detail(&self) {
        self.cache.write().await.close_detail();
    }

    /// List the show's episodes and store the continuation plan in the
    /// detail slot when the show is still open.
    pub async fn load_playback_plan(&self, show_id: &MediaItemId) -> Result<PlaybackPlan> {
        let cached = {
            let cache = self.cache.read().await;
            cache
                .detail()
                .item
                .clone()
                .filter(|item| &item.id == show_id)
                .or_else(|| cache.item(show_id).cloned())
        };
        let show = match cached {
            Some(show) => show,
            None => self.backend.get_item(show_id).await?,
        };

        let episodes = self
            .backend
            .list_children(show_id, ItemType::Episode)
            .await
            .with_context(|| format!("Failed to list episodes of {show_id}"))?;

        let plan = self.planner.plan(&show, episodes);
        self.cache.write().await.set_plan(plan.clone());
        Ok(plan)
    }

    /// Handoff for the playback surface from the active plan
    pub async fn playlist_for(&self, start: Option<&MediaItemId>) -> Option<PlaylistContext> {
        let cache = self.cache.read().await;
        match &cache.detail().plan {
            Some(plan) => plan.handoff(start),
            None => start.map(|id| PlaylistContext::SingleItem { id: id.clone() }),
        }
    }

    /// Ask the backend for the authoritative resume position of `item_id`
    /// and fill the resume prompt when it passes the guard band.
    pub async fn prepare_resume(&self, item_id: &MediaItemId) -> Result<Option<ResumeInfo>> {
        let progress_id = {
            let cache = self.cache.read().await;
            let detail = cache.detail();
            let progress = match detail.active_id() {
                Some(active) if active == item_id => detail.progress.as_ref(),
                _ => cache.item(item_id).and_then(|i| i.watch_progress.as_ref()),
            };
            progress.and_then(|p| p.id.clone())
        };
        let Some(progress_id) = progress_id else {
            debug!("Item {} has no progress record, nothing to resume", item_id);
            return Ok(None);
        };

        let info = self
            .backend
            .resume_info(&progress_id)
            .await
            .with_context(|| format!("Failed to load resume info for {item_id}"))?;
        let prompt = self.planner.resume_prompt(info);

        let mut cache = self.cache.write().await;
        if cache.detail().active_id() == Some(item_id) {
            cache.set_resume_prompt(prompt.clone());
        }
        Ok(prompt)
    }

    pub async fn dismiss_resume_prompt(&self) {
        self.cache.write().await.set_resume_prompt(None);
    }

    /// Apply a position reported by the playback surface
    pub async fn record_position(
        &self,
        item_id: &MediaItemId,
        position_ms: u64,
        duration_ms: Option<u64>,
    ) -> Option<WatchProgress> {
        self.cache
            .write()
            .await
            .record_position(item_id, position_ms, duration_ms, self.completion_threshold)
            .cloned()
    }

    pub async fn mark_watched(&self, item_id: &MediaItemId) -> Result<()> {
        self.backend
            .mark_watched(item_id)
            .await
            .with_context(|| format!("Failed to mark {item_id} watched"))?;
        self.reload_after_watch_change(item_id).await
    }

    pub async fn mark_unwatched(&self, item_id: &MediaItemId) -> Result<()> {
        self.backend
            .clear_progress(item_id)
            .await
            .with_context(|| format!("Failed to mark {item_id} unwatched"))?;
        self.reload_after_watch_change(item_id).await
    }

    pub async fn mark_series_watched(&self, show_id: &MediaItemId) -> Result<()> {
        self.backend
            .mark_series_watched(show_id)
            .await
            .with_context(|| format!("Failed to mark series {show_id} watched"))?;
        self.reload_after_watch_change(show_id).await
    }

    pub async fn mark_series_unwatched(&self, show_id: &MediaItemId) -> Result<()> {
        self.backend
            .mark_series_unwatched(show_id)
            .await
            .with_context(|| format!("Failed to mark series {show_id} unwatched"))?;
        self.reload_after_watch_change(show_id).await
    }

    pub async fn clear_progress(&self, item_id: &MediaItemId) -> Result<()> {
        self.backend
            .clear_progress(item_id)
            .await
            .with_context(|| format!("Failed to clear progress of {item_id}"))?;
        self.reload_after_watch_change(item_id).await
    }

    pub async fn delete_item(&self, item_id: &MediaItemId) -> Result<()> {
        self.backend
            .delete_item(item_id)
            .await
            .with_context(|| format!("Failed to delete {item_id}"))?;
        self.remove(std::slice::from_ref(item_id)).await;
        info!("Deleted item {}", item_id);
        Ok(())
    }

    /// Explicit refresh requested by the user; not subject to the cooldown
    pub async fn refresh_metadata(&self, item_id: &MediaItemId) -> Result<()> {
        self.backend
            .refresh_metadata(item_id)
            .await
            .with_context(|| format!("Failed to refresh metadata of {item_id}"))
    }

    pub async fn stream_url(
        &self,
        item_id: &MediaItemId,
        file_id: Option<&FileId>,
    ) -> Result<StreamInfo> {
        self.backend
            .stream_url(item_id, file_id)
            .await
            .with_context(|| format!("Failed to get stream for {item_id}"))
    }

    /// Wait for every queued background refresh to finish
    pub async fn drain_refreshes(&self) {
        let mut tasks = std::mem::take(&mut *self.refreshes.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Metadata refresh task failed: {}", e);
            }
        }
    }

    /// Re-read a mutated item so server-side summaries show up, and rebuild
    /// the plan when the active show is affected.
    async fn reload_after_watch_change(&self, item_id: &MediaItemId) -> Result<()> {
        let item = self
            .backend
            .get_item(item_id)
            .await
            .with_context(|| format!("Failed to reload {item_id}"))?;

        let active_show = {
            let cache = self.cache.read().await;
            cache
                .detail()
                .item
                .as_ref()
                .filter(|active| active.is_show())
                .map(|active| active.id.clone())
        };
        let affects_plan = active_show.as_ref().is_some_and(|show| {
            &item.id == show || item.parent_id.as_ref() == Some(show)
        });

        self.upsert(vec![item]).await;

        if let Some(show_id) = active_show.filter(|_| affects_plan) {
            self.load_playback_plan(&show_id).await?;
        }
        Ok(())
    }

    /// Spawn one refresh task per id. At most `max_concurrent_refreshes`
    /// requests are in flight; the rest wait for a permit.
    async fn queue_refreshes(&self, ids: Vec<MediaItemId>) {
        if ids.is_empty() {
            return;
        }
        debug!("Queueing metadata refresh for {} items", ids.len());

        let mut tasks = self.refreshes.lock().await;
        while tasks.try_join_next().is_some() {}

        for id in ids {
            let backend = self.backend.clone();
            let throttle = self.throttle.clone();
            let permits = self.refresh_permits.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = backend.refresh_metadata(&id).await {
                    warn!("Metadata refresh for {} failed: {:#}", id, e);
                    throttle.lock().await.clear(&id);
                }
            });
        }
    }
}

#[async_trait]
impl MediaItemSink for MediaService {
    async fn upsert_items(&self, items: Vec<MediaItem>) {
        self.upsert(items).await;
    }

    async fn library_removed(&self, library_id: &LibraryId) {
        let mut cache = self.cache.write().await;
        if cache.selected_library() == Some(library_id) {
            info!("Selected library {} was deleted, clearing items", library_id);
            cache.clear();
        }
    }
}
