use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    FileId, ItemFilters, ItemPage, ItemType, Library, LibraryDraft, LibraryId, MediaItem,
    MediaItemId, ProgressId, ResumeInfo, ScanJob, ScanJobId, StreamInfo,
};

/// The media library server as seen by the client. Every method is a
/// network round trip; none of them touch client state.
#[async_trait]
pub trait LibraryBackend: Send + Sync + std::fmt::Debug {
    // Catalog
    async fn list_items(&self, library_id: &LibraryId, filters: &ItemFilters) -> Result<ItemPage>;

    /// Full record, including files and cast/crew
    async fn get_item(&self, item_id: &MediaItemId) -> Result<MediaItem>;

    /// Episodes belonging to a show
    async fn list_children(&self, parent_id: &MediaItemId, item_type: ItemType) -> Result<Vec<MediaItem>>;

    async fn list_libraries(&self) -> Result<Vec<Library>>;

    // Library mutations
    async fn create_library(&self, draft: &LibraryDraft) -> Result<Library>;

    async fn update_library(&self, library_id: &LibraryId, draft: &LibraryDraft) -> Result<Library>;

    async fn delete_library(&self, library_id: &LibraryId) -> Result<()>;

    // Item mutations
    async fn mark_watched(&self, item_id: &MediaItemId) -> Result<()>;

    async fn mark_series_watched(&self, show_id: &MediaItemId) -> Result<()>;

    async fn mark_series_unwatched(&self, show_id: &MediaItemId) -> Result<()>;

    /// Forget the stored position; this is also how a single item is marked unwatched
    async fn clear_progress(&self, item_id: &MediaItemId) -> Result<()>;

    async fn delete_item(&self, item_id: &MediaItemId) -> Result<()>;

    async fn refresh_metadata(&self, item_id: &MediaItemId) -> Result<()>;

    async fn stream_url(&self, item_id: &MediaItemId, file_id: Option<&FileId>) -> Result<StreamInfo>;

    async fn resume_info(&self, progress_id: &ProgressId) -> Result<ResumeInfo>;

    // Scan control
    async fn trigger_scan(&self, library_id: &LibraryId, full: bool) -> Result<ScanJob>;

    async fn cancel_scan(&self, scan_id: &ScanJobId) -> Result<ScanJob>;

    /// Remove a scan that has not started yet
    async fn dequeue_scan(&self, scan_id: &ScanJobId) -> Result<()>;

    async fn list_scans(&self, library_id: Option<&LibraryId>) -> Result<Vec<ScanJob>>;
}
