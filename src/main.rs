use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use xaml_combine::batch::{self, CombineJob, SourceSpec};
use xaml_combine::config::{CombineOptions, CyclePolicy, DEFAULT_FILE_HEADER, LOCK_TIMEOUT};
use xaml_combine::diagnostics::{Diagnostic, Logger, RecordingLogger, TracingLogger};
use xaml_combine::merge::CombineOutcome;
use xaml_combine::parser;
use xaml_combine::stats::{BatchStats, BatchSummary};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "xaml-combine")]
#[command(about = "Merge XAML resource dictionaries into one dependency-ordered dictionary")]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine source dictionaries into a single target dictionary
    Combine(CombineArgs),
    /// Run several combine jobs in parallel
    Batch(BatchArgs),
}

#[derive(Args)]
struct CombineArgs {
    /// Manifest listing source files, one per line
    #[arg(short = 's', long = "source-file")]
    source_file: Option<PathBuf>,

    /// Source files, in addition to the manifest
    sources: Vec<PathBuf>,

    /// Path of the combined dictionary
    #[arg(short = 't', long = "target-file")]
    target_file: PathBuf,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Job as MANIFEST=TARGET (repeatable)
    #[arg(short = 'j', long = "job", required = true, value_parser = CombineJob::parse)]
    jobs: Vec<CombineJob>,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(Args)]
struct OptionArgs {
    /// Import merged dictionary references into the target
    #[arg(long = "md")]
    import_merged_dictionaries: bool,

    /// Write a header comment at the top of the target
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    write_file_header: bool,

    /// Header comment text
    #[arg(long, default_value = DEFAULT_FILE_HEADER)]
    file_header: String,

    /// List the source files in the header
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_source_files_in_file_header: bool,

    /// Fail on reference cycles instead of breaking them
    #[arg(long)]
    strict_cycles: bool,

    /// Seconds to wait for another process combining into the same target
    #[arg(long, default_value_t = LOCK_TIMEOUT.as_secs())]
    lock_timeout: u64,

    /// Write a JSON report of outcomes and diagnostics to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl OptionArgs {
    fn combine_options(&self) -> CombineOptions {
        CombineOptions {
            import_merged_dictionaries: self.import_merged_dictionaries,
            write_file_header: self.write_file_header,
            file_header: self.file_header.clone(),
            include_source_files_in_file_header: self.include_source_files_in_file_header,
            cycle_policy: if self.strict_cycles {
                CyclePolicy::Strict
            } else {
                CyclePolicy::Permissive
            },
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct JobReport {
    target: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<CombineOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct Report {
    summary: BatchSummary,
    jobs: Vec<JobReport>,
    diagnostics: Vec<Diagnostic>,
}

fn run_combine(args: CombineArgs) -> Result<bool> {
    let mut sources = args.sources;
    if let Some(manifest) = &args.source_file {
        let listed = parser::read_manifest(manifest)
            .with_context(|| format!("Failed to read manifest: {}", manifest.display()))?;
        sources.extend(listed);
    }
    if sources.is_empty() {
        bail!("No source files given (use --source-file or list them as arguments)");
    }

    let job = CombineJob {
        sources: SourceSpec::Files(sources),
        target: args.target_file,
    };
    run_jobs(&[job], &args.options)
}

fn run_batch(args: BatchArgs) -> Result<bool> {
    run_jobs(&args.jobs, &args.options)
}

/// Returns whether every job succeeded.
fn run_jobs(jobs: &[CombineJob], args: &OptionArgs) -> Result<bool> {
    let options = args.combine_options();
    let lock_timeout = Duration::from_secs(args.lock_timeout);
    let recorder = args.report.as_ref().map(|_| RecordingLogger::echoing());
    let logger: &dyn Logger = match &recorder {
        Some(recorder) => recorder,
        None => &TracingLogger,
    };

    let start = Instant::now();
    let stats = BatchStats::new();
    let results = if jobs.len() == 1 {
        let result = batch::run_job(&jobs[0], &options, lock_timeout, logger);
        match &result {
            Ok(outcome) => stats.record_success(&outcome.stats, outcome.status.written()),
            Err(e) => {
                error!(path = %jobs[0].target.display(), error = %e, "Combine failed");
                stats.record_failure();
            }
        }
        vec![result]
    } else {
        batch::run_batch(jobs, &options, lock_timeout, logger, &stats)
    };

    let summary = stats.summary();
    info!(
        duration_secs = start.elapsed().as_secs_f64(),
        sources = summary.source_files,
        resources = summary.resources,
        duplicates = summary.duplicates,
        dropped = summary.unkeyed_dropped,
        cycles = summary.cycles_broken,
        "Summary"
    );

    if let (Some(path), Some(recorder)) = (&args.report, &recorder) {
        let report = Report {
            summary,
            jobs: jobs
                .iter()
                .zip(results.iter())
                .map(|(job, result)| JobReport {
                    target: job.target.clone(),
                    outcome: result.as_ref().ok().cloned(),
                    error: result.as_ref().err().map(|e| error_chain(e)),
                })
                .collect(),
            diagnostics: recorder.records(),
        };
        write_report(path, &report)?;
    }

    Ok(summary.jobs_failed == 0)
}

/// `error: cause: cause`, the same shape `{:#}` gives for anyhow errors.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Combine(args) => run_combine(args),
        Commands::Batch(args) => run_batch(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
