use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::backends::LibraryBackend;
use crate::models::{Library, LibraryDraft, LibraryId};
use crate::services::core::scans::ScanService;

/// Library CRUD with a cached list of the last known libraries
pub struct LibraryService {
    backend: Arc<dyn LibraryBackend>,
    scans: Arc<ScanService>,
    libraries: RwLock<Vec<Library>>,
}

impl LibraryService {
    pub fn new(backend: Arc<dyn LibraryBackend>, scans: Arc<ScanService>) -> Self {
        Self {
            backend,
            scans,
            libraries: RwLock::new(Vec::new()),
        }
    }

    /// Last list returned by [`LibraryService::list_libraries`], kept in
    /// step with create/update/delete
    pub async fn libraries(&self) -> Vec<Library> {
        self.libraries.read().await.clone()
    }

    pub async fn list_libraries(&self) -> Result<Vec<Library>> {
        let libraries = self
            .backend
            .list_libraries()
            .await
            .context("Failed to list libraries")?;
        *self.libraries.write().await = libraries.clone();
        Ok(libraries)
    }

    pub async fn create_library(&self, draft: &LibraryDraft) -> Result<Library> {
        let library = self
            .backend
            .create_library(draft)
            .await
            .context("Failed to create library")?;
        info!("Created library {} ({})", library.name, library.id);
        self.libraries.write().await.push(library.clone());
        Ok(library)
    }

    pub async fn update_library(&self, library_id: &LibraryId, draft: &LibraryDraft) -> Result<Library> {
        let library = self
            .backend
            .update_library(library_id, draft)
            .await
            .with_context(|| format!("Failed to update library {library_id}"))?;

        let mut libraries = self.libraries.write().await;
        match libraries.iter_mut().find(|l| &l.id == library_id) {
            Some(existing) => *existing = library.clone(),
            None => libraries.push(library.clone()),
        }
        Ok(library)
    }

    /// Delete a library, then drop its scan jobs and, when it is the
    /// selected library, the cached items
    pub async fn delete_library(&self, library_id: &LibraryId) -> Result<()> {
        self.backend
            .delete_library(library_id)
            .await
            .with_context(|| format!("Failed to delete library {library_id}"))?;

        self.libraries
            .write()
            .await
            .retain(|l| &l.id != library_id);
        self.scans.forget_library(library_id).await;
        info!("Deleted library {}", library_id);
        Ok(())
    }
}
