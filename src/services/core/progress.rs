//! Scan progress normalization
//!
//! Snapshots and push events report counters in slightly different shapes.
//! Everything stored in the scan registry passes through [`normalize`] so the
//! progress display can rely on `0 <= processed <= total`.

use crate::models::{ScanCounters, ScanJob, ScanStatus};

/// Canonicalize a scan job record. Pure, total and idempotent.
///
/// - a missing `processed` becomes `total` for completed jobs, else `0`
/// - counters are never negative
/// - `processed` is capped at `total` whenever `total` is known and positive
pub fn normalize(mut job: ScanJob) -> ScanJob {
    job.counters = normalize_counters(job.counters, job.status);
    job
}

fn normalize_counters(counters: ScanCounters, status: ScanStatus) -> ScanCounters {
    let total = counters.total.map(non_negative);

    let processed = match counters.processed {
        Some(processed) => non_negative(processed),
        None if status == ScanStatus::Completed => total.unwrap_or(0),
        None => 0,
    };
    let processed = match total {
        Some(total) if total > 0 => processed.min(total),
        _ => processed,
    };

    ScanCounters {
        total,
        processed: Some(processed),
        new_files: counters.new_files.map(non_negative),
        updated_files: counters.updated_files.map(non_negative),
        removed_files: counters.removed_files.map(non_negative),
        matched: counters.matched.map(non_negative),
        unmatched: counters.unmatched.map(non_negative),
    }
}

fn non_negative(value: i64) -> i64 {
    value.max(0)
}
