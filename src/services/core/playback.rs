use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::models::{
    MediaItem, MediaItemId, PlaybackPlan, RESUME_GUARD_BAND, ResumeInfo, WatchStatus,
};

/// Derives resume and continuation decisions from progress records
#[derive(Debug, Clone, Copy)]
pub struct PlaybackPlanner {
    resume_guard_band: f64,
}

impl Default for PlaybackPlanner {
    fn default() -> Self {
        Self::new(RESUME_GUARD_BAND)
    }
}

impl PlaybackPlanner {
    pub fn new(resume_guard_band: f64) -> Self {
        Self { resume_guard_band }
    }

    /// Resume is offered for a single item only when its own progress passes
    /// the guard band. Shows never resume directly, their episodes do.
    pub fn is_resumable(&self, item: &MediaItem) -> bool {
        !item.is_show()
            && item
                .watch_progress
                .as_ref()
                .is_some_and(|progress| progress.is_resumable(self.resume_guard_band))
    }

    /// Keep an authoritative resume answer only when it is worth prompting for
    pub fn resume_prompt(&self, info: ResumeInfo) -> Option<ResumeInfo> {
        if info.resume_allowed == Some(false) || info.completed {
            return None;
        }
        info.as_progress()
            .is_resumable(self.resume_guard_band)
            .then_some(info)
    }

    /// Build the continuation plan for `show` from its episodes
    pub fn plan(&self, show: &MediaItem, episodes: Vec<MediaItem>) -> PlaybackPlan {
        let ordered_episodes = order_episodes(episodes);
        let summary = show.watch_summary.as_ref();

        let contains = |id: &MediaItemId| ordered_episodes.iter().any(|e| &e.id == id);

        let resume_episode = summary
            .and_then(|s| s.resume_episode_id.as_ref())
            .filter(|&id| contains(id))
            .or_else(|| {
                ordered_episodes
                    .iter()
                    .find(|e| e.watch_status() == WatchStatus::InProgress)
                    .map(|e| &e.id)
            })
            .or_else(|| {
                ordered_episodes
                    .iter()
                    .find(|e| e.watch_status() != WatchStatus::Watched)
                    .map(|e| &e.id)
            })
            .or_else(|| ordered_episodes.first().map(|e| &e.id))
            .cloned();

        let next_episode = summary
            .and_then(|s| s.next_episode_id.as_ref())
            .filter(|&id| contains(id))
            .cloned()
            .or_else(|| {
                let resume = resume_episode.as_ref()?;
                let index = ordered_episodes.iter().position(|e| &e.id == resume)?;
                ordered_episodes.get(index + 1).map(|e| e.id.clone())
            });

        debug!(
            "Planned {} episodes for show {}: resume={:?}, next={:?}",
            ordered_episodes.len(),
            show.id,
            resume_episode,
            next_episode
        );

        PlaybackPlan {
            show_id: show.id.clone(),
            show_title: show.title().to_string(),
            ordered_episodes,
            resume_episode,
            next_episode,
        }
    }
}

/// Collapse duplicate ids (later records merged into the first) and sort by
/// season, episode, then title. Missing numbers count as 0.
pub fn order_episodes(episodes: Vec<MediaItem>) -> Vec<MediaItem> {
    let mut positions: HashMap<MediaItemId, usize> = HashMap::new();
    let mut unique: Vec<MediaItem> = Vec::with_capacity(episodes.len());

    for episode in episodes {
        match positions.get(&episode.id) {
            Some(&index) => unique[index].merge(episode),
            None => {
                positions.insert(episode.id.clone(), unique.len());
                unique.push(episode);
            }
        }
    }

    unique.sort_by(compare_episodes);
    unique
}

fn compare_episodes(a: &MediaItem, b: &MediaItem) -> Ordering {
    a.season_number
        .unwrap_or(0)
        .cmp(&b.season_number.unwrap_or(0))
        .then_with(|| a.episode_number.unwrap_or(0).cmp(&b.episode_number.unwrap_or(0)))
        .then_with(|| a.title().cmp(b.title()))
        .then_with(|| a.id.as_str().cmp(b.id.as_str()))
}
