use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::backends::LibraryBackend;
use crate::events::ScanEvent;
use crate::models::{LibraryId, MediaItem, ScanJob, ScanJobId};
use crate::state::{ScanBucket, ScanRegistry};

/// Port from the scan side to the item cache. Scan events embed items the
/// grid should show without a separate fetch.
#[async_trait]
pub trait MediaItemSink: Send + Sync {
    async fn upsert_items(&self, items: Vec<MediaItem>);

    /// A library was deleted on the backend
    async fn library_removed(&self, library_id: &LibraryId);
}

/// Drives the [`ScanRegistry`] from snapshots, live events and scan control
pub struct ScanService {
    backend: Arc<dyn LibraryBackend>,
    registry: Arc<RwLock<ScanRegistry>>,
    items: Arc<dyn MediaItemSink>,
}

impl ScanService {
    pub fn new(backend: Arc<dyn LibraryBackend>, items: Arc<dyn MediaItemSink>) -> Self {
        Self {
            backend,
            registry: Arc::new(RwLock::new(ScanRegistry::new())),
            items,
        }
    }

    pub async fn state(&self) -> RwLockReadGuard<'_, ScanRegistry> {
        self.registry.read().await
    }

    pub async fn jobs(&self, library_id: Option<&LibraryId>) -> Vec<ScanJob> {
        self.registry
            .read()
            .await
            .jobs(&ScanBucket::for_library(library_id))
            .to_vec()
    }

    /// Refresh the job list for one library, or the aggregate list for
    /// `None`. Failures are recorded on the registry.
    pub async fn load_snapshot(&self, library_id: Option<&LibraryId>) {
        let bucket = ScanBucket::for_library(library_id);
        let generation = self.registry.write().await.begin_snapshot(bucket.clone());

        let result = self.backend.list_scans(library_id).await.map_err(|e| {
            warn!("Failed to load scans for {:?}: {:#}", bucket, e);
            format!("{e:#}")
        });
        if let Ok(jobs) = &result {
            debug!("Loaded {} scan jobs for {:?}", jobs.len(), bucket);
        }

        self.registry
            .write()
            .await
            .finish_snapshot(&bucket, generation, result);
    }

    /// Merge a live scan event and forward any embedded item to the cache
    pub async fn apply_event(&self, event: &ScanEvent) {
        let item = self.registry.write().await.apply_event(event, Utc::now());
        if let Some(item) = item {
            self.items.upsert_items(vec![item]).await;
        }
    }

    /// Trigger a scan and show the accepted job right away
    pub async fn start_scan(&self, library_id: &LibraryId, full: bool) -> Result<ScanJob> {
        let mut job = self
            .backend
            .trigger_scan(library_id, full)
            .await
            .with_context(|| format!("Failed to start scan of library {library_id}"))?;
        if job.library_id.is_none() {
            job.library_id = Some(library_id.clone());
        }

        info!(
            "Started {} scan {} for library {}",
            if full { "full" } else { "incremental" },
            job.id,
            library_id
        );
        self.registry.write().await.insert_started(job.clone());
        Ok(job)
    }

    /// Ask the backend to stop a running job. Local state follows from the
    /// next event or snapshot.
    pub async fn cancel_job(&self, scan_id: &ScanJobId) -> Result<ScanJob> {
        self.backend
            .cancel_scan(scan_id)
            .await
            .with_context(|| format!("Failed to cancel scan {scan_id}"))
    }

    /// Ask the backend to drop a job that is still queued
    pub async fn dequeue_job(&self, scan_id: &ScanJobId) -> Result<()> {
        self.backend
            .dequeue_scan(scan_id)
            .await
            .with_context(|| format!("Failed to dequeue scan {scan_id}"))
    }

    pub(crate) async fn forget_library(&self, library_id: &LibraryId) {
        self.registry.write().await.remove_library(library_id);
        self.items.library_removed(library_id).await;
    }
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
