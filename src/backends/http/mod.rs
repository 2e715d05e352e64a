mod api;

pub use api::MediaLibraryApi;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::traits::LibraryBackend;
use crate::config::ApiConfig;
use crate::models::{
    FileId, ItemFilters, ItemPage, ItemType, Library, LibraryDraft, LibraryId, MediaItem,
    MediaItemId, ProgressId, ResumeInfo, ScanJob, ScanJobId, StreamInfo,
};

/// [`LibraryBackend`] over the server's REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    api: MediaLibraryApi,
}

impl HttpBackend {
    pub fn new(api: MediaLibraryApi) -> Self {
        Self { api }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let api = MediaLibraryApi::new(
            &config.base_url,
            config.auth_token.clone(),
            std::time::Duration::from_secs(config.timeout_secs),
        )?;
        info!("Using media library API at {}", config.base_url);
        Ok(Self::new(api))
    }
}

#[async_trait]
impl LibraryBackend for HttpBackend {
    async fn list_items(&self, library_id: &LibraryId, filters: &ItemFilters) -> Result<ItemPage> {
        let mut query = vec![("library", library_id.to_string())];
        query.extend(filters.query_pairs());
        self.api.get_json("items/", &query).await
    }

    async fn get_item(&self, item_id: &MediaItemId) -> Result<MediaItem> {
        self.api.get_json(&format!("items/{item_id}/"), &[]).await
    }

    async fn list_children(&self, parent_id: &MediaItemId, item_type: ItemType) -> Result<Vec<MediaItem>> {
        let query = [
            ("parent", parent_id.to_string()),
            ("item_type", item_type.as_str().to_string()),
        ];
        let page: ItemPage = self.api.get_json("items/", &query).await?;
        Ok(page.into_items())
    }

    async fn list_libraries(&self) -> Result<Vec<Library>> {
        self.api.get_json("libraries/", &[]).await
    }

    async fn create_library(&self, draft: &LibraryDraft) -> Result<Library> {
        self.api.post_json("libraries/", draft).await
    }

    async fn update_library(&self, library_id: &LibraryId, draft: &LibraryDraft) -> Result<Library> {
        self.api
            .patch_json(&format!("libraries/{library_id}/"), draft)
            .await
    }

    async fn delete_library(&self, library_id: &LibraryId) -> Result<()> {
        self.api.delete(&format!("libraries/{library_id}/")).await
    }

    async fn mark_watched(&self, item_id: &MediaItemId) -> Result<()> {
        self.api
            .post_empty(&format!("items/{item_id}/mark-watched/"))
            .await
    }

    async fn mark_series_watched(&self, show_id: &MediaItemId) -> Result<()> {
        self.api
            .post_empty(&format!("items/{show_id}/mark-series-watched/"))
            .await
    }

    async fn mark_series_unwatched(&self, show_id: &MediaItemId) -> Result<()> {
        self.api
            .post_empty(&format!("items/{show_id}/mark-series-unwatched/"))
            .await
    }

    async fn clear_progress(&self, item_id: &MediaItemId) -> Result<()> {
        self.api
            .post_empty(&format!("items/{item_id}/clear-progress/"))
            .await
    }

    async fn delete_item(&self, item_id: &MediaItemId) -> Result<()> {
        self.api.delete(&format!("items/{item_id}/")).await
    }

    async fn refresh_metadata(&self, item_id: &MediaItemId) -> Result<()> {
        self.api
            .post_empty(&format!("items/{item_id}/refresh-metadata/"))
            .await
    }

    async fn stream_url(&self, item_id: &MediaItemId, file_id: Option<&FileId>) -> Result<StreamInfo> {
        let query: Vec<(&str, String)> = file_id
            .map(|file| vec![("file", file.to_string())])
            .unwrap_or_default();
        self.api
            .get_json(&format!("items/{item_id}/stream/"), &query)
            .await
    }

    async fn resume_info(&self, progress_id: &ProgressId) -> Result<ResumeInfo> {
        self.api
            .post_json(&format!("progress/{progress_id}/resume/"), &json!({}))
            .await
    }

    async fn trigger_scan(&self, library_id: &LibraryId, full: bool) -> Result<ScanJob> {
        self.api
            .post_json(&format!("libraries/{library_id}/scan/"), &json!({ "full": full }))
            .await
    }

    async fn cancel_scan(&self, scan_id: &ScanJobId) -> Result<ScanJob> {
        self.api
            .post_json(&format!("scans/{scan_id}/cancel/"), &json!({}))
            .await
    }

    async fn dequeue_scan(&self, scan_id: &ScanJobId) -> Result<()> {
        self.api.delete(&format!("scans/{scan_id}/")).await
    }

    async fn list_scans(&self, library_id: Option<&LibraryId>) -> Result<Vec<ScanJob>> {
        let query: Vec<(&str, String)> = library_id
            .map(|id| vec![("library", id.to_string())])
            .unwrap_or_default();
        let page: ScanPage = self.api.get_json("scans/", &query).await?;
        Ok(page.into_jobs())
    }
}

/// Scan list responses, bare or paginated
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ScanPage {
    Envelope { results: Vec<ScanJob> },
    Bare(Vec<ScanJob>),
}

impl ScanPage {
    fn into_jobs(self) -> Vec<ScanJob> {
        match self {
            ScanPage::Envelope { results } => results,
            ScanPage::Bare(results) => results,
        }
    }
}
