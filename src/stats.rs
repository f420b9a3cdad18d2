use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single combine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CombineStats {
    pub source_files: u64,
    pub resources: u64,
    pub duplicates_identical: u64,
    pub duplicates_differing: u64,
    pub unkeyed_dropped: u64,
    pub namespace_renames: u64,
    pub merged_dictionary_references: u64,
    pub theme_dictionaries: u64,
    pub cycles_broken: u64,
}

impl CombineStats {
    pub fn duplicates(&self) -> u64 {
        self.duplicates_identical + self.duplicates_differing
    }
}

/// Totals across the jobs of a batch, updated from worker threads.
#[derive(Default)]
pub struct BatchStats {
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub files_written: AtomicU64,
    pub files_unchanged: AtomicU64,
    pub source_files: AtomicU64,
    pub resources: AtomicU64,
    pub duplicates: AtomicU64,
    pub unkeyed_dropped: AtomicU64,
    pub cycles_broken: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub files_written: u64,
    pub files_unchanged: u64,
    pub source_files: u64,
    pub resources: u64,
    pub duplicates: u64,
    pub unkeyed_dropped: u64,
    pub cycles_broken: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished job. `written` is false when the target was already up to date.
    pub fn record_success(&self, stats: &CombineStats, written: bool) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        if written {
            self.files_written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files_unchanged.fetch_add(1, Ordering::Relaxed);
        }
        self.source_files.fetch_add(stats.source_files, Ordering::Relaxed);
        self.resources.fetch_add(stats.resources, Ordering::Relaxed);
        self.duplicates.fetch_add(stats.duplicates(), Ordering::Relaxed);
        self.unkeyed_dropped
            .fetch_add(stats.unkeyed_dropped, Ordering::Relaxed);
        self.cycles_broken.fetch_add(stats.cycles_broken, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            files_unchanged: self.files_unchanged.load(Ordering::Relaxed),
            source_files: self.source_files.load(Ordering::Relaxed),
            resources: self.resources.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            unkeyed_dropped: self.unkeyed_dropped.load(Ordering::Relaxed),
            cycles_broken: self.cycles_broken.load(Ordering::Relaxed),
        }
    }
}
