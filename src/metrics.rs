// Run metrics module
//
// Provides lightweight counters for reporting on a pack run

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters collected over one pack run
///
/// Uses atomic operations so the workflow and any listener can share one
/// instance without locks. Logged once at the end of the run.
#[derive(Debug)]
pub struct Metrics {
    /// Projects archived, verified and removed from the source tree
    pub projects_archived: AtomicUsize,

    pub projects_failed: AtomicUsize,

    pub projects_skipped: AtomicUsize,

    /// Projects that would have been archived in a dry run
    pub projects_planned: AtomicUsize,

    /// Files copied into staging across all projects
    pub files_staged: AtomicU64,

    /// Size of all verified archives
    pub bytes_archived: AtomicU64,

    /// Time spent packing archived projects, in milliseconds
    pub total_pack_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            projects_archived: AtomicUsize::new(0),
            projects_failed: AtomicUsize::new(0),
            projects_skipped: AtomicUsize::new(0),
            projects_planned: AtomicUsize::new(0),
            files_staged: AtomicU64::new(0),
            bytes_archived: AtomicU64::new(0),
            total_pack_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a verified archive of `bytes` produced in `duration`
    pub fn record_archived(&self, bytes: u64, duration: Duration) {
        self.projects_archived.fetch_add(1, Ordering::Relaxed);
        self.bytes_archived.fetch_add(bytes, Ordering::Relaxed);
        self.total_pack_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.projects_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.projects_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planned(&self) {
        self.projects_planned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files_staged(&self, count: usize) {
        self.files_staged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Number of projects that reached any terminal status
    pub fn processed(&self) -> usize {
        self.projects_archived.load(Ordering::Relaxed)
            + self.projects_failed.load(Ordering::Relaxed)
            + self.projects_skipped.load(Ordering::Relaxed)
            + self.projects_planned.load(Ordering::Relaxed)
    }

    /// Average pack time per archived project in milliseconds
    pub fn avg_pack_time_ms(&self) -> f64 {
        let total = self.total_pack_time_ms.load(Ordering::Relaxed);
        let count = self.projects_archived.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Pack Run Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Projects: {} archived, {} skipped, {} failed, {} planned",
            self.projects_archived.load(Ordering::Relaxed),
            self.projects_skipped.load(Ordering::Relaxed),
            self.projects_failed.load(Ordering::Relaxed),
            self.projects_planned.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Staged {} files, wrote {:.2} MiB of archives",
            self.files_staged.load(Ordering::Relaxed),
            self.bytes_archived.load(Ordering::Relaxed) as f64 / (1024.0 * 1024.0)
        );
        tracing::info!(
            "Total pack time: {:.2}s (avg: {:.2}ms per project)",
            self.total_pack_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_pack_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
