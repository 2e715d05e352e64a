use anyhow::Result;
use async_trait::async_trait;
use media_library_client::AppError;
use media_library_client::backends::LibraryBackend;
use media_library_client::models::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory backend that records every call
#[derive(Debug, Default)]
pub struct MockBackend {
    items: Mutex<HashMap<LibraryId, Vec<MediaItem>>>,
    details: Mutex<HashMap<MediaItemId, MediaItem>>,
    children: Mutex<HashMap<MediaItemId, Vec<MediaItem>>>,
    libraries: Mutex<Vec<Library>>,
    scans: Mutex<Vec<ScanJob>>,
    resume: Mutex<HashMap<ProgressId, ResumeInfo>>,
    list_delays: Mutex<VecDeque<Duration>>,
    refresh_delay: Mutex<Option<Duration>>,
    refreshes_in_flight: AtomicUsize,
    peak_refreshes: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, library_id: impl Into<LibraryId>, items: Vec<MediaItem>) {
        self.items.lock().unwrap().insert(library_id.into(), items);
    }

    pub fn set_detail(&self, item: MediaItem) {
        self.details.lock().unwrap().insert(item.id.clone(), item);
    }

    pub fn set_children(&self, parent_id: impl Into<MediaItemId>, children: Vec<MediaItem>) {
        self.children
            .lock()
            .unwrap()
            .insert(parent_id.into(), children);
    }

    pub fn set_libraries(&self, libraries: Vec<Library>) {
        *self.libraries.lock().unwrap() = libraries;
    }

    pub fn set_scans(&self, scans: Vec<ScanJob>) {
        *self.scans.lock().unwrap() = scans;
    }

    pub fn set_resume(&self, progress_id: impl Into<ProgressId>, info: ResumeInfo) {
        self.resume.lock().unwrap().insert(progress_id.into(), info);
    }

    /// Delay the next `list_items` responses, one entry per call
    pub fn delay_next_lists(&self, delays: impl IntoIterator<Item = Duration>) {
        self.list_delays.lock().unwrap().extend(delays);
    }

    /// Hold every `refresh_metadata` call open for `delay`
    pub fn delay_refreshes(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    /// Most `refresh_metadata` calls that were running at the same time
    pub fn peak_refreshes(&self) -> usize {
        self.peak_refreshes.load(Ordering::SeqCst)
    }

    /// Make every call of `operation` fail with a server error
    pub fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: &str) -> usize {
        let prefix = format!("{operation}:");
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(&prefix) || call.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &str, argument: impl std::fmt::Display) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation}:{argument}"));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(AppError::Backend {
                status: 503,
                message: format!("{operation} unavailable"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryBackend for MockBackend {
    async fn list_items(&self, library_id: &LibraryId, _filters: &ItemFilters) -> Result<ItemPage> {
        self.record("list_items", library_id)?;
        let items = self
            .items
            .lock()
            .unwrap()
            .get(library_id)
            .cloned()
            .unwrap_or_default();
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let count = items.len();
        Ok(ItemPage::Envelope {
            results: items,
            count: Some(count),
        })
    }

    async fn get_item(&self, item_id: &MediaItemId) -> Result<MediaItem> {
        self.record("get_item", item_id)?;
        self.details
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("item {item_id}")).into())
    }

    async fn list_children(&self, parent_id: &MediaItemId, _item_type: ItemType) -> Result<Vec<MediaItem>> {
        self.record("list_children", parent_id)?;
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_libraries(&self) -> Result<Vec<Library>> {
        self.record("list_libraries", "")?;
        Ok(self.libraries.lock().unwrap().clone())
    }

    async fn create_library(&self, draft: &LibraryDraft) -> Result<Library> {
        self.record("create_library", draft.name.as_deref().unwrap_or_default())?;
        let mut libraries = self.libraries.lock().unwrap();
        let library = Library {
            id: LibraryId::from(libraries.len() as u64 + 1),
            name: draft.name.clone().unwrap_or_default(),
            library_type: draft.library_type.clone().unwrap_or_default(),
            description: draft.description.clone(),
            auto_scan_enabled: draft.auto_scan_enabled.unwrap_or(false),
            last_scan_at: None,
            last_successful_scan_at: None,
            locations: draft.locations.clone().unwrap_or_default(),
        };
        libraries.push(library.clone());
        Ok(library)
    }

    async fn update_library(&self, library_id: &LibraryId, draft: &LibraryDraft) -> Result<Library> {
        self.record("update_library", library_id)?;
        let mut libraries = self.libraries.lock().unwrap();
        let library = libraries
            .iter_mut()
            .find(|l| &l.id == library_id)
            .ok_or_else(|| AppError::NotFound(format!("library {library_id}")))?;
        if let Some(name) = &draft.name {
            library.name = name.clone();
        }
        Ok(library.clone())
    }

    async fn delete_library(&self, library_id: &LibraryId) -> Result<()> {
        self.record("delete_library", library_id)?;
        self.libraries
            .lock()
            .unwrap()
            .retain(|l| &l.id != library_id);
        Ok(())
    }

    async fn mark_watched(&self, item_id: &MediaItemId) -> Result<()> {
        self.record("mark_watched", item_id)
    }

    async fn mark_series_watched(&self, show_id: &MediaItemId) -> Result<()> {
        self.record("mark_series_watched", show_id)
    }

    async fn mark_series_unwatched(&self, show_id: &MediaItemId) -> Result<()> {
        self.record("mark_series_unwatched", show_id)
    }

    async fn clear_progress(&self, item_id: &MediaItemId) -> Result<()> {
        self.record("clear_progress", item_id)
    }

    async fn delete_item(&self, item_id: &MediaItemId) -> Result<()> {
        self.record("delete_item", item_id)
    }

    async fn refresh_metadata(&self, item_id: &MediaItemId) -> Result<()> {
        let running = self.refreshes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_refreshes.fetch_max(running, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.refreshes_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record("refresh_metadata", item_id)
    }

    async fn stream_url(&self, item_id: &MediaItemId, file_id: Option<&FileId>) -> Result<StreamInfo> {
        self.record("stream_url", item_id)?;
        Ok(StreamInfo {
            url: format!("http://stream.local/{item_id}/"),
            file_id: file_id.cloned().unwrap_or_else(|| FileId::from(1)),
            expires_in: Some(3600),
            stream_type: Some("direct".into()),
            duration_ms: None,
            bit_rate: None,
            container: None,
        })
    }

    async fn resume_info(&self, progress_id: &ProgressId) -> Result<ResumeInfo> {
        self.record("resume_info", progress_id)?;
        self.resume
            .lock()
            .unwrap()
            .get(progress_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("progress {progress_id}")).into())
    }

    async fn trigger_scan(&self, library_id: &LibraryId, full: bool) -> Result<ScanJob> {
        self.record("trigger_scan", format!("{library_id}:{full}"))?;
        let mut scans = self.scans.lock().unwrap();
        let mut job = ScanJob::new(format!("scan-{}", scans.len() + 1), ScanStatus::Pending);
        job.library_id = Some(library_id.clone());
        scans.insert(0, job.clone());
        Ok(job)
    }

    async fn cancel_scan(&self, scan_id: &ScanJobId) -> Result<ScanJob> {
        self.record("cancel_scan", scan_id)?;
        let mut scans = self.scans.lock().unwrap();
        let job = scans
            .iter_mut()
            .find(|job| &job.id == scan_id)
            .ok_or_else(|| AppError::NotFound(format!("scan {scan_id}")))?;
        job.status = ScanStatus::Cancelled;
        Ok(job.clone())
    }

    async fn dequeue_scan(&self, scan_id: &ScanJobId) -> Result<()> {
        self.record("dequeue_scan", scan_id)?;
        let mut scans = self.scans.lock().unwrap();
        match scans.iter().position(|job| &job.id == scan_id) {
            Some(index) if scans[index].status.is_queued() => {
                scans.remove(index);
                Ok(())
            }
            Some(_) => Err(AppError::Rejected(
                "Only pending scans can be removed from the queue.".into(),
            )
            .into()),
            None => Err(AppError::NotFound(format!("scan {scan_id}")).into()),
        }
    }

    async fn list_scans(&self, library_id: Option<&LibraryId>) -> Result<Vec<ScanJob>> {
        self.record(
            "list_scans",
            library_id.map(ToString::to_string).unwrap_or_default(),
        )?;
        Ok(self
            .scans
            .lock()
            .unwrap()
            .iter()
            .filter(|job| library_id.is_none() || job.library_id.as_ref() == library_id)
            .cloned()
            .collect())
    }
}
