mod identifiers;
pub mod playlist_context;
pub mod scan;

pub use identifiers::{FileId, LibraryId, MediaItemId, ProgressId, ScanJobId};
pub use playlist_context::{EpisodeInfo, PlaybackPlan, PlaylistContext};
pub use scan::{ScanCounters, ScanJob, ScanStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default fraction of the duration that must remain for a resume to be
/// offered; the configured value lives on `PlaybackPlanner`.
pub const RESUME_GUARD_BAND: f64 = 0.04;

/// Position ratio at which a locally reported position counts as finished.
pub const COMPLETION_THRESHOLD: f64 = 0.96;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    #[serde(default)]
    pub library_type: LibraryType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub auto_scan_enabled: bool,
    #[serde(default)]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_successful_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locations: Vec<LibraryLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Movies,
    Shows,
    #[default]
    #[serde(other)]
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryLocation {
    pub path: String,
    #[serde(default = "default_true")]
    pub include_subdirectories: bool,
    #[serde(default)]
    pub is_primary: bool,
}

/// Payload for creating or updating a library
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_type: Option<LibraryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_scan_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<LibraryLocation>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Movie,
    Show,
    Season,
    Episode,
    Collection,
    #[serde(other)]
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Movie => "movie",
            ItemType::Show => "show",
            ItemType::Season => "season",
            ItemType::Episode => "episode",
            ItemType::Collection => "collection",
            ItemType::Other => "other",
        }
    }
}

/// Metadata matching state reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Matched,
    Failed,
}

/// A playable unit (movie, series, or episode).
///
/// Every field besides `id` is optional because list responses, detail
/// responses and push events all carry different subsets of the record.
/// [`MediaItem::merge`] folds a partial record into a cached one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaItemId,
    #[serde(default, rename = "library", alias = "library_id")]
    pub library_id: Option<LibraryId>,
    #[serde(default)]
    pub parent_id: Option<MediaItemId>,
    #[serde(default)]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub status: Option<MatchStatus>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sort_title: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub runtime_ms: Option<u64>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub cast: Option<serde_json::Value>,
    #[serde(default)]
    pub crew: Option<serde_json::Value>,
    #[serde(default)]
    pub first_imported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata_last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Option<Vec<MediaFile>>,
    #[serde(default)]
    pub watch_progress: Option<WatchProgress>,
    #[serde(default)]
    pub watch_summary: Option<WatchSummary>,
}

macro_rules! merge_present {
    ($target:expr, $incoming:expr; $($field:ident),+ $(,)?) => {
        $(
            if $incoming.$field.is_some() {
                $target.$field = $incoming.$field;
            }
        )+
    };
}

impl MediaItem {
    pub fn new(id: impl Into<MediaItemId>) -> Self {
        Self {
            id: id.into(),
            library_id: None,
            parent_id: None,
            item_type: None,
            status: None,
            title: None,
            sort_title: None,
            release_year: None,
            season_number: None,
            episode_number: None,
            runtime_ms: None,
            synopsis: None,
            genres: None,
            poster_url: None,
            backdrop_url: None,
            cast: None,
            crew: None,
            first_imported_at: None,
            updated_at: None,
            metadata_last_synced_at: None,
            files: None,
            watch_progress: None,
            watch_summary: None,
        }
    }

    /// Shallow merge: every field present on `incoming` overwrites ours,
    /// absent fields keep their cached value.
    pub fn merge(&mut self, incoming: MediaItem) {
        merge_present!(self, incoming;
            library_id,
            parent_id,
            item_type,
            status,
            title,
            sort_title,
            release_year,
            season_number,
            episode_number,
            runtime_ms,
            synopsis,
            genres,
            poster_url,
            backdrop_url,
            cast,
            crew,
            first_imported_at,
            updated_at,
            metadata_last_synced_at,
            files,
            watch_progress,
            watch_summary,
        );
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    /// Key used for alphabetical ordering: sort title, falling back to title.
    pub fn sort_key(&self) -> String {
        self.sort_title
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.title())
            .to_lowercase()
    }

    pub fn is_show(&self) -> bool {
        self.item_type == Some(ItemType::Show)
    }

    /// First genre, used for genre grouping
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres
            .as_ref()
            .and_then(|genres| genres.first())
            .map(String::as_str)
    }

    /// Items without artwork or without a completed metadata sync are still
    /// being enriched server-side.
    pub fn needs_metadata(&self) -> bool {
        let has_poster = self.poster_url.as_deref().is_some_and(|url| !url.is_empty());
        !has_poster || self.metadata_last_synced_at.is_none()
    }

    /// Watch state of this item on its own: the server summary when present,
    /// otherwise derived from the progress record.
    pub fn watch_status(&self) -> WatchStatus {
        if let Some(summary) = &self.watch_summary {
            return summary.status;
        }
        match &self.watch_progress {
            Some(progress) if progress.completed => WatchStatus::Watched,
            Some(progress) if progress.position_ms > 0 => WatchStatus::InProgress,
            _ => WatchStatus::NotStarted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: FileId,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub has_subtitles: bool,
}

/// Position state for a single playable file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchProgress {
    #[serde(default)]
    pub id: Option<ProgressId>,
    #[serde(default)]
    pub position_ms: u64,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub last_watched_at: Option<DateTime<Utc>>,
}

impl WatchProgress {
    /// Resume is offered only when the duration is known and more than
    /// `guard_band` of it remains.
    pub fn is_resumable(&self, guard_band: f64) -> bool {
        match self.duration_ms {
            Some(duration) if duration > 0 => {
                let remaining = duration.saturating_sub(self.position_ms);
                remaining as f64 > duration as f64 * guard_band
            }
            _ => false,
        }
    }

    /// Apply a locally reported position: the duration only grows, and
    /// crossing `completion_threshold` snaps the position to the end.
    pub fn record_position(
        &mut self,
        position_ms: u64,
        duration_ms: Option<u64>,
        completion_threshold: f64,
    ) {
        if let Some(duration) = duration_ms {
            self.duration_ms = Some(self.duration_ms.unwrap_or(0).max(duration));
        }
        self.position_ms = position_ms;

        if let Some(duration) = self.duration_ms.filter(|d| *d > 0) {
            let ratio = self.position_ms as f64 / duration as f64;
            if ratio >= completion_threshold {
                self.completed = true;
                self.position_ms = duration;
            }
            self.percentage = Some(self.position_ms as f64 / duration as f64);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchStatus {
    #[default]
    #[serde(rename = "unwatched", alias = "not_started")]
    NotStarted,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "watched")]
    Watched,
}

/// Series-level rollup computed by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchSummary {
    #[serde(default)]
    pub status: WatchStatus,
    #[serde(default)]
    pub total_episodes: Option<u32>,
    #[serde(default)]
    pub completed_episodes: Option<u32>,
    #[serde(default)]
    pub resume_episode_id: Option<MediaItemId>,
    #[serde(default)]
    pub next_episode_id: Option<MediaItemId>,
    #[serde(default)]
    pub last_completed_episode_id: Option<MediaItemId>,
    #[serde(default)]
    pub position_ms: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Current predicate for the next list fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilters {
    pub item_type: Option<ItemType>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub year: Option<i32>,
}

impl ItemFilters {
    /// Query pairs for the list endpoint; empty values are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(item_type) = self.item_type {
            pairs.push(("item_type", item_type.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("status", status.to_string()));
        }
        if let Some(year) = self.year {
            pairs.push(("release_year", year.to_string()));
        }
        pairs
    }
}

/// List response: either a bare array or a `{results, count}` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemPage {
    Envelope {
        results: Vec<MediaItem>,
        #[serde(default)]
        count: Option<usize>,
    },
    Bare(Vec<MediaItem>),
}

impl ItemPage {
    /// Explicit count when the envelope carries one, else the result length.
    pub fn total(&self) -> usize {
        match self {
            ItemPage::Envelope {
                count: Some(count), ..
            } => *count,
            ItemPage::Envelope { results, .. } => results.len(),
            ItemPage::Bare(results) => results.len(),
        }
    }

    pub fn into_items(self) -> Vec<MediaItem> {
        match self {
            ItemPage::Envelope { results, .. } => results,
            ItemPage::Bare(results) => results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub url: String,
    pub file_id: FileId,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default, rename = "type")]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub bit_rate: Option<u64>,
    #[serde(default)]
    pub container: Option<String>,
}

/// Authoritative resume position for a progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub position_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub remaining_ms: Option<u64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub resume_allowed: Option<bool>,
}

impl ResumeInfo {
    pub fn as_progress(&self) -> WatchProgress {
        WatchProgress {
            id: None,
            position_ms: self.position_ms,
            duration_ms: Some(self.duration_ms),
            completed: self.completed,
            percentage: self.percentage,
            last_watched_at: None,
        }
    }
}

fn default_true() -> bool {
    true
}
