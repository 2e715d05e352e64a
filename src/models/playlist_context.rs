use crate::models::{MediaItem, MediaItemId, WatchStatus};
use serde::{Deserialize, Serialize};

/// Continuation plan for a series: its episodes in playback order plus the
/// episode to resume and the one after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPlan {
    pub show_id: MediaItemId,
    pub show_title: String,
    pub ordered_episodes: Vec<MediaItem>,
    pub resume_episode: Option<MediaItemId>,
    pub next_episode: Option<MediaItemId>,
}

impl PlaybackPlan {
    pub fn is_empty(&self) -> bool {
        self.ordered_episodes.is_empty()
    }

    pub fn episode_ids(&self) -> Vec<MediaItemId> {
        self.ordered_episodes.iter().map(|e| e.id.clone()).collect()
    }

    pub fn index_of(&self, id: &MediaItemId) -> Option<usize> {
        self.ordered_episodes.iter().position(|e| &e.id == id)
    }

    pub fn resume_episode(&self) -> Option<&MediaItem> {
        self.resume_episode
            .as_ref()
            .and_then(|id| self.index_of(id))
            .map(|index| &self.ordered_episodes[index])
    }

    pub fn next_episode(&self) -> Option<&MediaItem> {
        self.next_episode
            .as_ref()
            .and_then(|id| self.index_of(id))
            .map(|index| &self.ordered_episodes[index])
    }

    /// Hand the whole ordered sequence to the playback surface, starting at
    /// `start`. A missing or unknown `start` falls back to the resume episode,
    /// then to the first episode. `None` when the series has no episodes.
    pub fn handoff(&self, start: Option<&MediaItemId>) -> Option<PlaylistContext> {
        if self.is_empty() {
            return None;
        }

        let current_index = start
            .and_then(|id| self.index_of(id))
            .or_else(|| self.resume_episode.as_ref().and_then(|id| self.index_of(id)))
            .unwrap_or(0);

        Some(PlaylistContext::Series {
            show_id: self.show_id.clone(),
            show_title: self.show_title.clone(),
            current_index,
            episodes: self.ordered_episodes.iter().map(EpisodeInfo::from).collect(),
            auto_play_next: true,
        })
    }
}

/// What the playback surface receives when playback starts, so it can
/// advance through a series without asking for a new plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaylistContext {
    /// Single item with no continuation
    SingleItem { id: MediaItemId },

    /// Episodes of one series in playback order
    Series {
        show_id: MediaItemId,
        show_title: String,
        /// Index of the episode playback starts (or currently is) at
        current_index: usize,
        episodes: Vec<EpisodeInfo>,
        auto_play_next: bool,
    },
}

/// Minimal episode information for the playback surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub id: MediaItemId,
    pub title: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub duration_ms: Option<u64>,
    pub status: WatchStatus,
}

impl From<&MediaItem> for EpisodeInfo {
    fn from(item: &MediaItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title().to_string(),
            season_number: item.season_number.unwrap_or(0),
            episode_number: item.episode_number.unwrap_or(0),
            duration_ms: item
                .watch_progress
                .as_ref()
                .and_then(|p| p.duration_ms)
                .or(item.runtime_ms),
            status: item.watch_status(),
        }
    }
}

impl PlaylistContext {
    /// Ordered ids the playback surface walks through
    pub fn item_ids(&self) -> Vec<MediaItemId> {
        match self {
            PlaylistContext::SingleItem { id } => vec![id.clone()],
            PlaylistContext::Series { episodes, .. } => {
                episodes.iter().map(|e| e.id.clone()).collect()
            }
        }
    }

    pub fn current_index(&self) -> usize {
        match self {
            PlaylistContext::SingleItem { .. } => 0,
            PlaylistContext::Series { current_index, .. } => *current_index,
        }
    }

    pub fn current_item(&self) -> Option<MediaItemId> {
        match self {
            PlaylistContext::SingleItem { id } => Some(id.clone()),
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => episodes.get(*current_index).map(|e| e.id.clone()),
        }
    }

    /// Get the next item in the playlist after the current one
    pub fn get_next_item(&self) -> Option<MediaItemId> {
        match self {
            PlaylistContext::SingleItem { .. } => None,
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => episodes.get(*current_index + 1).map(|e| e.id.clone()),
        }
    }

    pub fn get_previous_item(&self) -> Option<MediaItemId> {
        match self {
            PlaylistContext::SingleItem { .. } => None,
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => current_index
                .checked_sub(1)
                .and_then(|index| episodes.get(index))
                .map(|e| e.id.clone()),
        }
    }

    /// Move forward one episode. Returns the new current id, or `None` at the
    /// end of the series (the index is left unchanged).
    pub fn advance(&mut self) -> Option<MediaItemId> {
        match self {
            PlaylistContext::SingleItem { .. } => None,
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => {
                let next = episodes.get(*current_index + 1)?.id.clone();
                *current_index += 1;
                Some(next)
            }
        }
    }

    /// Update the current index when playing a different item
    pub fn update_current_index(&mut self, item_id: &MediaItemId) -> bool {
        match self {
            PlaylistContext::SingleItem { .. } => false,
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => {
                if let Some(new_index) = episodes.iter().position(|e| &e.id == item_id) {
                    *current_index = new_index;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn has_next(&self) -> bool {
        self.get_next_item().is_some()
    }

    /// Get information about the next episode (for the up-next overlay)
    pub fn get_next_episode_info(&self) -> Option<&EpisodeInfo> {
        match self {
            PlaylistContext::SingleItem { .. } => None,
            PlaylistContext::Series {
                episodes,
                current_index,
                ..
            } => episodes.get(*current_index + 1),
        }
    }
}
