//! Run processing driver

use crate::config::CliConfig;
use crate::output::ProgressReporter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use testadvisor::{AdvisorError, Processor, RunOutcome};
use tracing::{debug, warn};

/// Outcome of one `process` invocation
#[derive(Debug, Default)]
pub struct ProcessSummary {
    /// Per-run outcomes in registry order
    pub outcomes: Vec<RunOutcome>,
    /// Wall-clock time
    pub duration: Duration,
}

impl ProcessSummary {
    /// Runs that produced a signal document
    #[must_use]
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Runs that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.processed()
    }

    /// Whether every run succeeded
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.failed() == 0
    }
}

/// Processes runs on a small pool of scoped worker threads.
///
/// Each run is handled by exactly one worker, so a run directory is never
/// written concurrently.
#[derive(Debug)]
pub struct RunDriver<'a> {
    processor: &'a Processor,
    config: CliConfig,
    reporter: ProgressReporter,
    cli_version: String,
}

impl<'a> RunDriver<'a> {
    /// Create a new driver
    #[must_use]
    pub fn new(processor: &'a Processor, config: CliConfig, cli_version: impl Into<String>) -> Self {
        let reporter = ProgressReporter::new(
            config.color.should_color(),
            config.verbosity.is_quiet(),
        );
        Self {
            processor,
            config,
            reporter,
            cli_version: cli_version.into(),
        }
    }

    /// Process the given runs and report progress
    pub fn run(&mut self, runs: Vec<PathBuf>) -> ProcessSummary {
        let start = Instant::now();
        if runs.is_empty() {
            self.reporter.info("No test runs to process");
            return ProcessSummary::default();
        }

        let jobs = self.config.effective_jobs().clamp(1, runs.len());
        debug!(runs = runs.len(), jobs, "processing test runs");
        self.reporter.header("Processing Test Runs");
        self.reporter.start_progress(runs.len() as u64, "starting");

        let outcomes = if jobs == 1 {
            runs.into_iter().map(|run| self.process_one(run)).collect()
        } else {
            self.process_parallel(runs, jobs)
        };

        self.reporter.finish();
        let summary = ProcessSummary {
            outcomes,
            duration: start.elapsed(),
        };
        self.reporter
            .summary(summary.processed(), summary.failed(), summary.duration);
        summary
    }

    fn process_parallel(&self, runs: Vec<PathBuf>, jobs: usize) -> Vec<RunOutcome> {
        let mut buckets: Vec<Vec<(usize, PathBuf)>> = vec![Vec::new(); jobs];
        for (index, run) in runs.into_iter().enumerate() {
            buckets[index % jobs].push((index, run));
        }

        let mut indexed: Vec<(usize, RunOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .into_iter()
                .map(|bucket| {
                    let assigned = bucket.clone();
                    let handle = scope.spawn(move || {
                        bucket
                            .into_iter()
                            .map(|(index, run)| (index, self.process_one(run)))
                            .collect::<Vec<_>>()
                    });
                    (handle, assigned)
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|(handle, assigned)| bucket_outcomes(handle.join(), assigned))
                .collect()
        });
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn process_one(&self, run: PathBuf) -> RunOutcome {
        self.reporter.set_message(&run_label(&run));
        let result = self.processor.process_run(&run, &self.cli_version);
        match &result {
            Ok(signal) => self
                .reporter
                .success(&format!("{} -> {}", run_label(&run), signal.display())),
            Err(e) => {
                warn!(run = %run.display(), error = %e, "run processing failed");
                self.reporter.failure(&format!("{}: {e}", run_label(&run)));
            }
        }
        self.reporter.increment(1);
        RunOutcome { run, result }
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }
}

/// Outcomes of one worker bucket. A panicked worker fails every run it was
/// assigned so none of them goes missing from the summary.
fn bucket_outcomes(
    joined: std::thread::Result<Vec<(usize, RunOutcome)>>,
    assigned: Vec<(usize, PathBuf)>,
) -> Vec<(usize, RunOutcome)> {
    match joined {
        Ok(outcomes) => outcomes,
        Err(_) => {
            warn!(runs = assigned.len(), "worker thread panicked");
            assigned
                .into_iter()
                .map(|(index, run)| {
                    let result = Err(AdvisorError::registry("worker thread panicked"));
                    (index, RunOutcome { run, result })
                })
                .collect()
        }
    }
}

fn run_label(run: &Path) -> String {
    run.file_name()
        .map_or_else(|| run.display().to_string(), |n| n.to_string_lossy().into_owned())
}
