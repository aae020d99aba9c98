//! Turns a run directory into its `test-signal.json`.

use crate::adapter::{ResultAdapter, TestAdvisorResultAdapter};
use crate::config::AdvisorConfig;
use crate::engine::CaseAnalyzer;
use crate::model::{TestCase, TestRun};
use crate::properties::{
    CLIENT_GUID_KEY, SANDBOX_INSTANCE_KEY, SANDBOX_ORG_ID_KEY, SANDBOX_ORG_NAME_KEY,
    TEST_SUITE_NAME_KEY,
};
use crate::registry::{run_id_of, Registry};
use crate::result::AdvisorResult;
use crate::signal::{TestExecution, TestRunSignal, TestStatus};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of processing one run directory
#[derive(Debug)]
pub struct RunOutcome {
    /// Run directory
    pub run: PathBuf,
    /// Signal file written, or the error that aborted the run
    pub result: AdvisorResult<PathBuf>,
}

impl RunOutcome {
    /// Whether the run was processed
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Processes test runs of one registry
pub struct Processor {
    registry: Registry,
    analyzer: CaseAnalyzer,
    adapter: Box<dyn ResultAdapter>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("registry", &self.registry)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Create a processor with a configuration snapshot
    #[must_use]
    pub fn new(registry: Registry, config: AdvisorConfig) -> Self {
        Self {
            registry,
            analyzer: CaseAnalyzer::new(config),
            adapter: Box::new(TestAdvisorResultAdapter::new()),
        }
    }

    /// Use a different adapter for the current run's raw result
    #[must_use]
    pub fn with_adapter(mut self, adapter: Box<dyn ResultAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Registry being processed
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Configuration snapshot
    #[must_use]
    pub const fn config(&self) -> &AdvisorConfig {
        self.analyzer.config()
    }

    /// Runs that `process_pending` would pick up
    ///
    /// # Errors
    ///
    /// Returns error if the registry cannot be listed
    pub fn pending_runs(&self, force: bool) -> AdvisorResult<Vec<PathBuf>> {
        if force {
            self.registry.all_runs()
        } else {
            self.registry.unprocessed_runs()
        }
    }

    /// Process every pending run in order. A failing run is reported in its
    /// outcome and does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns error if the registry cannot be listed
    pub fn process_pending(&self, force: bool, cli_version: &str) -> AdvisorResult<Vec<RunOutcome>> {
        Ok(self
            .pending_runs(force)?
            .into_iter()
            .map(|run| {
                let result = self.process_run(&run, cli_version);
                if let Err(e) = &result {
                    warn!(run = %run.display(), error = %e, "run processing failed");
                }
                RunOutcome { run, result }
            })
            .collect())
    }

    /// Process one run directory and write its signal document
    ///
    /// # Errors
    ///
    /// Returns error if properties or the run's raw result cannot be read,
    /// or the signal document cannot be written
    pub fn process_run(&self, run_dir: &Path, cli_version: &str) -> AdvisorResult<PathBuf> {
        let started = Instant::now();
        let mut signal = self.initial_signal(run_dir, cli_version)?;
        info!(run_id = %signal.test_run_id, "processing test run");

        let test_run = self
            .registry
            .load_test_run_with(run_dir, self.adapter.as_ref())?;
        signal.build_start_time = test_run.suite_start_time;
        signal.build_end_time = test_run.suite_end_time;
        signal.client_library_version.clone_from(&test_run.library_version);
        if signal.test_suite_name.is_empty() {
            signal.test_suite_name.clone_from(&test_run.suite_name);
        }
        if signal.client_build_id.is_empty() {
            signal.client_build_id.clone_from(&test_run.suite_info);
        }

        signal.test_executions = test_run
            .test_cases
            .into_iter()
            .map(|case| self.process_test_case(run_dir, case))
            .collect::<AdvisorResult<Vec<_>>>()?;

        let path = self.registry.save_signal_in(run_dir, &signal)?;
        info!(
            run_id = %signal.test_run_id,
            test_cases = signal.test_executions.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "test run processed"
        );
        Ok(path)
    }

    fn initial_signal(&self, run_dir: &Path, cli_version: &str) -> AdvisorResult<TestRunSignal> {
        let props = self.registry.properties()?;
        let mut signal = TestRunSignal::new(run_id_of(run_dir));
        signal.client_registry_guid = props
            .get(CLIENT_GUID_KEY)
            .and_then(|guid| Uuid::parse_str(guid).ok());
        signal.client_cli_version = cli_version.to_string();
        signal.sandbox_instance = props.get_or_empty(SANDBOX_INSTANCE_KEY).to_string();
        signal.sandbox_org_id = props.get_or_empty(SANDBOX_ORG_ID_KEY).to_string();
        signal.sandbox_org_name = props.get_or_empty(SANDBOX_ORG_NAME_KEY).to_string();
        signal.test_suite_name = props.get_or_empty(TEST_SUITE_NAME_KEY).to_string();
        Ok(signal)
    }

    /// Build the execution record of one test case
    ///
    /// # Errors
    ///
    /// Returns error if the registry cannot be listed or a diff-area
    /// sidecar cannot be written
    pub fn process_test_case(&self, run_dir: &Path, mut case: TestCase) -> AdvisorResult<TestExecution> {
        info!(test_case = %case.name, "processing test case");
        case.sort_events();

        let mut execution = TestExecution::new(case.name.clone());
        execution.start_time = case.start_time;
        execution.end_time = case.end_time;
        execution.status = TestStatus::from_raw(&case.status, self.config().status_match);

        let Some((baseline_run, baseline_dir)) = self.load_baseline(run_dir, &case.name)? else {
            debug!(test_case = %case.name, "no baseline found");
            let analysis = self.analyzer.analyze(&case, None)?;
            execution.test_signals = analysis.signals;
            return Ok(execution);
        };

        execution.baseline_build_id = Some(run_id_of(&baseline_dir));
        execution.baseline_build_id_start_time = baseline_run.suite_start_time;
        execution.baseline_external_id = self.registry.external_id(&baseline_dir);

        let Some(mut baseline_case) = baseline_run.take_case(&case.name) else {
            let analysis = self.analyzer.analyze(&case, None)?;
            execution.test_signals = analysis.signals;
            return Ok(execution);
        };
        baseline_case.sort_events();

        if self.config().screenshot_comparison {
            if let Some((second_run, _)) = self.load_baseline(&baseline_dir, &case.name)? {
                if let Some(mut second_case) = second_run.take_case(&case.name) {
                    second_case.sort_events();
                    self.analyzer.discover_excluded_areas(&mut case, &second_case);
                }
            }
        }

        let analysis = self.analyzer.analyze(&case, Some(&baseline_case))?;
        execution.similarity = analysis.similarity;
        execution.test_signals = analysis.signals;
        Ok(execution)
    }

    /// Baseline run of a test case, loaded. A baseline whose result turns
    /// unreadable after selection counts as missing.
    fn load_baseline(&self, run_dir: &Path, test_case: &str) -> AdvisorResult<Option<(TestRun, PathBuf)>> {
        let Some(dir) = self.registry.baseline_for(run_dir, test_case)? else {
            return Ok(None);
        };
        match self.registry.load_test_run(&dir) {
            Ok(run) => {
                debug!(test_case, baseline = %dir.display(), "baseline selected");
                Ok(Some((run, dir)))
            }
            Err(e) => {
                warn!(baseline = %dir.display(), error = %e, "baseline result unreadable");
                Ok(None)
            }
        }
    }
}
