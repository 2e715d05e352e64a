#![allow(dead_code)]

pub mod mocks;

use media_library_client::models::*;
use media_library_client::{Config, LibraryClient};
use std::sync::Arc;

pub use mocks::MockBackend;

pub struct TestContext {
    pub backend: Arc<MockBackend>,
    pub client: LibraryClient,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let backend = Arc::new(MockBackend::new());
        let client = LibraryClient::new(config, backend.clone());
        Self { backend, client }
    }
}

pub fn movie(id: u64, library: u64, title: &str) -> MediaItem {
    let mut item = MediaItem::new(id);
    item.library_id = Some(LibraryId::from(library));
    item.item_type = Some(ItemType::Movie);
    item.title = Some(title.to_string());
    item
}

/// Item whose artwork and metadata sync are complete
pub fn synced(mut item: MediaItem) -> MediaItem {
    item.poster_url = Some(format!("http://img.local/{}.jpg", item.id));
    item.metadata_last_synced_at = Some(chrono::Utc::now());
    item
}

pub fn show(id: u64, library: u64, title: &str) -> MediaItem {
    let mut item = synced(movie(id, library, title));
    item.item_type = Some(ItemType::Show);
    item
}

pub fn episode(id: u64, show_id: u64, season: u32, number: u32) -> MediaItem {
    let mut item = MediaItem::new(id);
    item.parent_id = Some(MediaItemId::from(show_id));
    item.item_type = Some(ItemType::Episode);
    item.season_number = Some(season);
    item.episode_number = Some(number);
    item.title = Some(format!("S{season:02}E{number:02}"));
    item
}

pub fn progress(id: u64, position_ms: u64, duration_ms: u64) -> WatchProgress {
    WatchProgress {
        id: Some(ProgressId::from(id)),
        position_ms,
        duration_ms: Some(duration_ms),
        completed: false,
        percentage: None,
        last_watched_at: None,
    }
}
