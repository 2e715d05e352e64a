use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LibraryId, ScanJobId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Queued,
    Scheduled,
    Running,
    Started,
    Discovered,
    Progress,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ScanStatus {
    /// Job is waiting for or currently using a worker
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ScanStatus::Pending
                | ScanStatus::Queued
                | ScanStatus::Scheduled
                | ScanStatus::Running
                | ScanStatus::Started
                | ScanStatus::Discovered
                | ScanStatus::Progress
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }

    /// Still waiting in the queue, so it can be dequeued rather than cancelled
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            ScanStatus::Pending | ScanStatus::Queued | ScanStatus::Scheduled
        )
    }

    /// A worker has picked the job up
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ScanStatus::Running | ScanStatus::Started | ScanStatus::Discovered | ScanStatus::Progress
        )
    }
}

/// File counters reported by a scan worker. `None` means "not reported".
/// Values are signed on the wire; normalization clamps them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub total: Option<i64>,
    pub processed: Option<i64>,
    pub new_files: Option<i64>,
    pub updated_files: Option<i64>,
    pub removed_files: Option<i64>,
    pub matched: Option<i64>,
    pub unmatched: Option<i64>,
}

/// One background library scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScanJobRecord", into = "ScanJobRecord")]
pub struct ScanJob {
    pub id: ScanJobId,
    pub library_id: Option<LibraryId>,
    pub library_name: Option<String>,
    pub status: ScanStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counters: ScanCounters,
    pub summary: Option<String>,
    pub message: Option<String>,
    pub log: Option<String>,
}

impl ScanJob {
    pub fn new(id: impl Into<ScanJobId>, status: ScanStatus) -> Self {
        Self {
            id: id.into(),
            library_id: None,
            library_name: None,
            status,
            created_at: None,
            started_at: None,
            finished_at: None,
            counters: ScanCounters::default(),
            summary: None,
            message: None,
            log: None,
        }
    }

    pub fn total(&self) -> u64 {
        self.counters.total.unwrap_or(0).max(0) as u64
    }

    pub fn processed(&self) -> u64 {
        self.counters.processed.unwrap_or(0).max(0) as u64
    }

    /// Completion ratio in `[0, 1]`, or `None` while the total is unknown
    pub fn fraction_done(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.processed().min(total) as f64 / total as f64),
        }
    }
}

/// Wire shape of a scan job. Consumers historically read both the
/// `*_files` and the short counter names, so both are emitted with the
/// same value and either is accepted on input.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScanJobRecord {
    id: ScanJobId,
    #[serde(default, alias = "library_id")]
    library: Option<LibraryId>,
    #[serde(default)]
    library_name: Option<String>,
    #[serde(default)]
    status: ScanStatus,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    total_files: Option<i64>,
    #[serde(default)]
    total: Option<i64>,
    #[serde(default, skip_serializing)]
    files: Option<i64>,
    #[serde(default)]
    processed_files: Option<i64>,
    #[serde(default)]
    processed: Option<i64>,
    #[serde(default)]
    new_files: Option<i64>,
    #[serde(default)]
    updated_files: Option<i64>,
    #[serde(default)]
    removed_files: Option<i64>,
    #[serde(default, alias = "matched")]
    matched_items: Option<i64>,
    #[serde(default, alias = "unmatched")]
    unmatched_files: Option<i64>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    log: Option<String>,
}

impl From<ScanJobRecord> for ScanJob {
    fn from(record: ScanJobRecord) -> Self {
        Self {
            id: record.id,
            library_id: record.library,
            library_name: record.library_name,
            status: record.status,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            counters: ScanCounters {
                total: record.total_files.or(record.total).or(record.files),
                processed: record.processed_files.or(record.processed),
                new_files: record.new_files,
                updated_files: record.updated_files,
                removed_files: record.removed_files,
                matched: record.matched_items,
                unmatched: record.unmatched_files,
            },
            summary: record.summary,
            message: record.message,
            log: record.log,
        }
    }
}

impl From<ScanJob> for ScanJobRecord {
    fn from(job: ScanJob) -> Self {
        let counters = job.counters;
        Self {
            id: job.id,
            library: job.library_id,
            library_name: job.library_name,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            total_files: counters.total,
            total: counters.total,
            files: None,
            processed_files: counters.processed,
            processed: counters.processed,
            new_files: counters.new_files,
            updated_files: counters.updated_files,
            removed_files: counters.removed_files,
            matched_items: counters.matched,
            unmatched_files: counters.unmatched,
            summary: job.summary,
            message: job.message,
            log: job.log,
        }
    }
}
