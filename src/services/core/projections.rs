//! Read-side views over cached items. Nothing here mutates state.

use std::collections::BTreeMap;

use crate::models::MediaItem;

/// Bucket used for titles that do not start with a letter or digit
pub const OTHER_LETTER: char = '#';

/// Resumable items, most recently watched first
pub fn continue_watching<'a>(
    items: impl IntoIterator<Item = &'a MediaItem>,
    guard_band: f64,
) -> Vec<&'a MediaItem> {
    let mut resumable: Vec<&MediaItem> = items
        .into_iter()
        .filter(|item| {
            item.watch_progress
                .as_ref()
                .is_some_and(|p| !p.completed && p.position_ms > 0 && p.is_resumable(guard_band))
        })
        .collect();
    resumable.sort_by(|a, b| last_watched(b).cmp(&last_watched(a)));
    resumable
}

/// Newest imports first; items without an import time go last
pub fn recently_added<'a>(
    items: impl IntoIterator<Item = &'a MediaItem>,
    limit: usize,
) -> Vec<&'a MediaItem> {
    let mut added: Vec<&MediaItem> = items.into_iter().collect();
    added.sort_by(|a, b| b.first_imported_at.cmp(&a.first_imported_at));
    added.truncate(limit);
    added
}

/// Group by the first alphanumeric character of the sort title
pub fn group_by_letter<'a>(
    items: impl IntoIterator<Item = &'a MediaItem>,
) -> BTreeMap<char, Vec<&'a MediaItem>> {
    let mut groups: BTreeMap<char, Vec<&MediaItem>> = BTreeMap::new();
    for item in items {
        groups.entry(letter_of(item)).or_default().push(item);
    }
    groups
}

/// Group by primary genre; items with no genre are collected under `None`
pub fn group_by_genre<'a>(
    items: impl IntoIterator<Item = &'a MediaItem>,
) -> BTreeMap<Option<String>, Vec<&'a MediaItem>> {
    let mut groups: BTreeMap<Option<String>, Vec<&MediaItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.primary_genre().map(str::to_string))
            .or_default()
            .push(item);
    }
    groups
}

fn letter_of(item: &MediaItem) -> char {
    match item.sort_key().chars().next() {
        Some(c) if c.is_alphanumeric() => c.to_uppercase().next().unwrap_or(c),
        _ => OTHER_LETTER,
    }
}

fn last_watched(item: &MediaItem) -> Option<chrono::DateTime<chrono::Utc>> {
    item.watch_progress.as_ref().and_then(|p| p.last_watched_at)
}
