use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::events::ScanEvent;
use crate::models::{LibraryId, MediaItem, ScanJob, ScanJobId, ScanStatus};
use crate::services::core::progress::normalize;

/// Key of a scan job list: one per library plus the aggregate view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanBucket {
    All,
    Library(LibraryId),
}

impl ScanBucket {
    pub fn for_library(library_id: Option<&LibraryId>) -> Self {
        match library_id {
            Some(id) => ScanBucket::Library(id.clone()),
            None => ScanBucket::All,
        }
    }
}

#[derive(Debug, Default)]
struct BucketState {
    jobs: Vec<ScanJob>,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

/// Scan job lists reconciled from snapshots and the live event feed.
///
/// Every stored job has been through [`normalize`]. Jobs are kept newest
/// first: snapshots keep the server's order and unseen jobs are prepended.
#[derive(Debug, Default)]
pub struct ScanRegistry {
    buckets: HashMap<ScanBucket, BucketState>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self, bucket: &ScanBucket) -> &[ScanJob] {
        self.buckets
            .get(bucket)
            .map(|state| state.jobs.as_slice())
            .unwrap_or_default()
    }

    pub fn job(&self, bucket: &ScanBucket, id: &ScanJobId) -> Option<&ScanJob> {
        self.jobs(bucket).iter().find(|job| &job.id == id)
    }

    pub fn is_loading(&self, bucket: &ScanBucket) -> bool {
        self.buckets.get(bucket).is_some_and(|state| state.loading)
    }

    pub fn error(&self, bucket: &ScanBucket) -> Option<&str> {
        self.buckets
            .get(bucket)
            .and_then(|state| state.error.as_deref())
    }

    /// Jobs still waiting for or holding a worker, across all libraries
    pub fn active_jobs(&self) -> Vec<&ScanJob> {
        self.jobs(&ScanBucket::All)
            .iter()
            .filter(|job| job.status.is_active())
            .collect()
    }

    /// Mark a snapshot request as in flight. The returned generation must be
    /// handed back to [`ScanRegistry::finish_snapshot`].
    pub fn begin_snapshot(&mut self, bucket: ScanBucket) -> u64 {
        let state = self.buckets.entry(bucket).or_default();
        state.generation += 1;
        state.loading = true;
        state.generation
    }

    /// Apply a snapshot response. Responses from superseded requests are
    /// discarded; a failure keeps the previous jobs and records the error.
    /// Returns whether the response was applied.
    pub fn finish_snapshot(
        &mut self,
        bucket: &ScanBucket,
        generation: u64,
        result: Result<Vec<ScanJob>, String>,
    ) -> bool {
        let Some(state) = self.buckets.get_mut(bucket) else {
            return false;
        };
        if state.generation != generation {
            debug!(
                "Discarding stale scan snapshot for {:?} (generation {} < {})",
                bucket, generation, state.generation
            );
            return false;
        }

        state.loading = false;
        match result {
            Ok(jobs) => {
                state.jobs = jobs.into_iter().map(normalize).collect();
                state.error = None;
            }
            Err(error) => state.error = Some(error),
        }
        true
    }

    /// Replace a bucket with a snapshot that is already in hand
    pub fn load_snapshot(&mut self, library_id: Option<&LibraryId>, jobs: Vec<ScanJob>) {
        let bucket = ScanBucket::for_library(library_id);
        let generation = self.begin_snapshot(bucket.clone());
        self.finish_snapshot(&bucket, generation, Ok(jobs));
    }

    /// Merge one push event into its library bucket and the aggregate bucket.
    ///
    /// Returns the item payload embedded in the event, if any, so the caller
    /// can forward it to the item cache. Events without a job id are dropped.
    pub fn apply_event(&mut self, event: &ScanEvent, now: DateTime<Utc>) -> Option<MediaItem> {
        let Some(scan_id) = event.scan_id.as_ref() else {
            debug!("Dropping scan event without scan_id");
            return None;
        };

        // a known job stays in the library it was first filed under
        let stored = self.stored_library(scan_id);
        if let (Some(stored), Some(incoming)) = (&stored, &event.library_id) {
            if stored != incoming {
                debug!(
                    "Scan {} reported for library {} but belongs to {}",
                    scan_id, incoming, stored
                );
            }
        }
        let library_id = stored.or_else(|| event.library_id.clone());

        let mut targets = vec![ScanBucket::All];
        if let Some(library_id) = library_id.clone() {
            targets.push(ScanBucket::Library(library_id));
        }

        for bucket in targets {
            let state = self.buckets.entry(bucket).or_default();
            match state.jobs.iter().position(|job| &job.id == scan_id) {
                Some(index) => {
                    let job = state.jobs[index].clone();
                    state.jobs[index] = merge_event(job, event, now);
                }
                None => {
                    trace!("Creating scan job {} from event", scan_id);
                    let mut job = ScanJob::new(scan_id.clone(), ScanStatus::Pending);
                    job.created_at = Some(now);
                    job.library_id = library_id.clone();
                    state.jobs.insert(0, merge_event(job, event, now));
                }
            }
        }

        event.media_item.clone().map(|mut item| {
            if item.library_id.is_none() {
                item.library_id = library_id;
            }
            item
        })
    }

    /// Library of an already stored job, looked up in the aggregate view
    /// first and then in the per-library buckets
    fn stored_library(&self, scan_id: &ScanJobId) -> Option<LibraryId> {
        self.job(&ScanBucket::All, scan_id)
            .and_then(|job| job.library_id.clone())
            .or_else(|| {
                self.buckets.iter().find_map(|(bucket, state)| match bucket {
                    ScanBucket::Library(library_id) => state
                        .jobs
                        .iter()
                        .any(|job| &job.id == scan_id)
                        .then(|| library_id.clone()),
                    ScanBucket::All => None,
                })
            })
    }

    /// Insert a job the backend just accepted, ahead of any event for it
    pub fn insert_started(&mut self, job: ScanJob) {
        let job = normalize(job);
        let mut targets = vec![ScanBucket::All];
        if let Some(library_id) = job.library_id.clone() {
            targets.push(ScanBucket::Library(library_id));
        }

        for bucket in targets {
            let state = self.buckets.entry(bucket).or_default();
            match state.jobs.iter_mut().find(|existing| existing.id == job.id) {
                Some(existing) => *existing = job.clone(),
                None => state.jobs.insert(0, job.clone()),
            }
        }
    }

    /// Forget a deleted library: its bucket and its jobs in the aggregate view
    pub fn remove_library(&mut self, library_id: &LibraryId) {
        self.buckets
            .remove(&ScanBucket::Library(library_id.clone()));
        if let Some(all) = self.buckets.get_mut(&ScanBucket::All) {
            all.jobs
                .retain(|job| job.library_id.as_ref() != Some(library_id));
        }
    }
}

/// Event-wins-when-present merge of one event into a stored job. The job's
/// library is only filled in, never replaced.
fn merge_event(mut job: ScanJob, event: &ScanEvent, now: DateTime<Utc>) -> ScanJob {
    if job.library_id.is_none() {
        job.library_id = event.library_id.clone();
    }
    if let Some(name) = &event.library_name {
        job.library_name = Some(name.clone());
    }
    if let Some(summary) = &event.summary {
        job.summary = Some(summary.clone());
    }
    if let Some(message) = &event.message {
        job.message = Some(message.clone());
    }

    let incoming = event.counters();
    let counters = &mut job.counters;
    counters.total = incoming.total.or(counters.total);
    counters.processed = incoming.processed.or(counters.processed);
    counters.new_files = incoming.new_files.or(counters.new_files);
    counters.updated_files = incoming.updated_files.or(counters.updated_files);
    counters.removed_files = incoming.removed_files.or(counters.removed_files);
    counters.matched = incoming.matched.or(counters.matched);
    counters.unmatched = incoming.unmatched.or(counters.unmatched);

    if let Some(status) = event.status {
        job.status = status;

        let total_known = job.counters.total.is_some_and(|total| total > 0);
        if status == ScanStatus::Completed && incoming.processed.is_none() && total_known {
            // completed implies fully processed unless the event says otherwise
            job.counters.processed = None;
        }
        if matches!(status, ScanStatus::Started | ScanStatus::Running) && job.started_at.is_none() {
            job.started_at = Some(now);
        }
    }

    if job.status.is_terminal() && job.finished_at.is_none() {
        job.finished_at = Some(now);
    }

    normalize(job)
}
