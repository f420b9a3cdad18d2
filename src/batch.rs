//! Several independent combine jobs run in parallel.
//!
//! Jobs share nothing but the logger and the batch counters. Each one holds
//! the advisory lock for its target while it runs, so two jobs (or two
//! processes) aimed at the same target serialize instead of racing.

use crate::config::CombineOptions;
use crate::diagnostics::Logger;
use crate::error::Result;
use crate::lock;
use crate::merge::{CombineOutcome, Combiner};
use crate::stats::BatchStats;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Where a job's inputs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Manifest(PathBuf),
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineJob {
    pub sources: SourceSpec,
    pub target: PathBuf,
}

impl CombineJob {
    /// Parses `MANIFEST=TARGET`, the command-line form of a batch job.
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let (manifest, target) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected MANIFEST=TARGET, got `{}`", spec))?;
        let (manifest, target) = (manifest.trim(), target.trim());
        if manifest.is_empty() || target.is_empty() {
            return Err(format!("expected MANIFEST=TARGET, got `{}`", spec));
        }
        Ok(Self {
            sources: SourceSpec::Manifest(PathBuf::from(manifest)),
            target: PathBuf::from(target),
        })
    }
}

/// Lock id for a target. Targets with the same file name share a lock, which
/// errs on the side of serializing.
pub fn resource_id(target: &Path) -> String {
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.to_string_lossy().into_owned())
}

/// Runs one job under the lock for its target.
pub fn run_job(
    job: &CombineJob,
    options: &CombineOptions,
    lock_timeout: Duration,
    logger: &dyn Logger,
) -> Result<CombineOutcome> {
    lock::with_exclusive_access(&resource_id(&job.target), lock_timeout, || {
        let combiner = Combiner::new(options.clone(), logger);
        match &job.sources {
            SourceSpec::Manifest(manifest) => combiner.combine_manifest(manifest, &job.target),
            SourceSpec::Files(files) => combiner.combine(files, &job.target),
        }
    })
}

/// Runs every job on the rayon pool. Results come back in job order; one
/// failing job does not stop the others.
pub fn run_batch(
    jobs: &[CombineJob],
    options: &CombineOptions,
    lock_timeout: Duration,
    logger: &dyn Logger,
    stats: &BatchStats,
) -> Vec<Result<CombineOutcome>> {
    info!(jobs = jobs.len(), "Starting batch");

    let results: Vec<Result<CombineOutcome>> = jobs
        .par_iter()
        .map(|job| {
            let result = run_job(job, options, lock_timeout, logger);
            match &result {
                Ok(outcome) => stats.record_success(&outcome.stats, outcome.status.written()),
                Err(e) => {
                    error!(path = %job.target.display(), error = %e, "Combine failed");
                    stats.record_failure();
                }
            }
            result
        })
        .collect();

    let summary = stats.summary();
    info!(
        succeeded = summary.jobs_succeeded,
        failed = summary.jobs_failed,
        written = summary.files_written,
        unchanged = summary.files_unchanged,
        "Batch complete"
    );
    results
}
