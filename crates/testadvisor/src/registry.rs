//! File-system registry of test runs.
//!
//! ```text
//! <root>/
//!   testadvisor.properties
//!   TestRun-YYYYMMDD-HHmmss/
//!     test-result.json      raw result, input of the adapter
//!     test-signal.json      derived signal document (present => processed)
//!     test-result.record    upload receipt (present => uploaded)
//!     *.png                 screenshots and comparison artifacts
//! ```

use crate::adapter::{resolve_screenshots, ResultAdapter, TestAdvisorResultAdapter};
use crate::model::TestRun;
use crate::properties::Properties;
use crate::result::{AdvisorError, AdvisorResult};
use crate::signal::TestRunSignal;
use chrono::Utc;
use regex::Regex;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable overriding the registry root
pub const REGISTRY_ENV: &str = "TESTADVISOR";
/// Default registry directory under the working directory
pub const DEFAULT_REGISTRY_DIR: &str = ".testadvisor";
/// Properties file name
pub const PROPERTIES_FILENAME: &str = "testadvisor.properties";
/// Raw result file name
pub const TEST_RESULT_FILENAME: &str = "test-result.json";
/// Signal document file name
pub const SIGNAL_FILENAME: &str = "test-signal.json";
/// Upload receipt file name
pub const PORTAL_RECORD_FILENAME: &str = "test-result.record";
/// Prefix of every run directory
pub const TEST_RUN_PREFIX: &str = "TestRun-";

fn run_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"TestRun-\d{8}-\d{6}").ok())
        .as_ref()
}

/// Extract `TestRun-YYYYMMDD-HHmmss` from a path string, or synthesize one
/// from the current UTC time when the path holds none.
///
/// The innermost (last) occurrence wins, so a registry root whose own path
/// carries a run id does not shadow the run directory below it.
#[must_use]
pub fn extract_run_id(path: &str) -> String {
    run_id_pattern()
        .and_then(|re| re.find_iter(path).last())
        .map_or_else(new_run_id, |m| m.as_str().to_string())
}

/// Run id of a run directory: its own name when that is a run id, else
/// whatever [`extract_run_id`] finds in the full path
#[must_use]
pub fn run_id_of(run: &Path) -> String {
    match run.file_name().and_then(|n| n.to_str()) {
        Some(name) if is_run_id(name) => name.to_string(),
        _ => extract_run_id(&run.to_string_lossy()),
    }
}

/// Run id for the current UTC time
#[must_use]
pub fn new_run_id() -> String {
    format!("{TEST_RUN_PREFIX}{}", Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Whether a directory name is a run id
#[must_use]
pub fn is_run_id(name: &str) -> bool {
    run_id_pattern()
        .and_then(|re| re.find(name))
        .is_some_and(|m| m.start() == 0 && m.end() == name.len())
}

/// Handle on a registry root
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
}

impl Registry {
    /// Open (and create if needed) a registry at `root`.
    ///
    /// Writes a properties file with default keys when none exists.
    ///
    /// # Errors
    ///
    /// Returns error if the root or properties file cannot be created
    pub fn open(root: impl Into<PathBuf>) -> AdvisorResult<Self> {
        let registry = Self { root: root.into() };
        fs::create_dir_all(&registry.root)?;
        if !registry.properties_path().exists() {
            let mut props = Properties::with_defaults();
            props.ensure_client_guid();
            props.store(&registry.properties_path())?;
            debug!(root = %registry.root.display(), "created registry properties");
        }
        Ok(registry)
    }

    /// Open the registry named by `TESTADVISOR`, or `.testadvisor` under the
    /// current directory
    ///
    /// # Errors
    ///
    /// Returns error if the registry cannot be created
    pub fn from_env() -> AdvisorResult<Self> {
        let root = match std::env::var_os(REGISTRY_ENV) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => std::env::current_dir()?.join(DEFAULT_REGISTRY_DIR),
        };
        Self::open(root)
    }

    /// Registry root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Properties file location
    #[must_use]
    pub fn properties_path(&self) -> PathBuf {
        self.root.join(PROPERTIES_FILENAME)
    }

    /// Current registry properties
    ///
    /// # Errors
    ///
    /// Returns error if the properties file cannot be read
    pub fn properties(&self) -> AdvisorResult<Properties> {
        Properties::load(&self.properties_path())
    }

    /// Set one property and persist the whole file. A client GUID is
    /// generated when absent.
    ///
    /// # Errors
    ///
    /// Returns error if the properties file cannot be read or written
    pub fn save_property(&self, key: &str, value: &str) -> AdvisorResult<()> {
        let mut props = self.properties()?;
        props.set(key, value);
        props.ensure_client_guid();
        props.store(&self.properties_path())
    }

    /// Directory of a run id
    #[must_use]
    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    /// Every run directory, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be listed
    pub fn all_runs(&self) -> AdvisorResult<Vec<PathBuf>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if entry.file_name().to_str().is_some_and(is_run_id) {
                runs.push(entry.path());
            }
        }
        runs.sort_by_key(|p| run_id_of(p));
        Ok(runs)
    }

    /// Runs without a signal document
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be listed
    pub fn unprocessed_runs(&self) -> AdvisorResult<Vec<PathBuf>> {
        Ok(self
            .all_runs()?
            .into_iter()
            .filter(|run| !run.join(SIGNAL_FILENAME).is_file())
            .collect())
    }

    /// Signal files of processed runs that have no upload receipt
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be listed
    pub fn ready_to_upload_runs(&self) -> AdvisorResult<Vec<PathBuf>> {
        Ok(self
            .all_runs()?
            .into_iter()
            .filter(|run| run.join(SIGNAL_FILENAME).is_file())
            .filter(|run| !run.join(PORTAL_RECORD_FILENAME).exists())
            .map(|run| run.join(SIGNAL_FILENAME))
            .collect())
    }

    /// Raw result file of a run, if present
    #[must_use]
    pub fn result_file(&self, run: &Path) -> Option<PathBuf> {
        let path = run.join(TEST_RESULT_FILENAME);
        path.is_file().then_some(path)
    }

    /// Adapt a run's raw result with the given adapter
    ///
    /// # Errors
    ///
    /// Returns error if the result is missing, unreadable or malformed
    pub fn load_test_run_with(
        &self,
        run: &Path,
        adapter: &dyn ResultAdapter,
    ) -> AdvisorResult<TestRun> {
        let path = self.result_file(run).ok_or_else(|| {
            AdvisorError::registry(format!("no {TEST_RESULT_FILENAME} in {}", run.display()))
        })?;
        let mut reader = BufReader::new(File::open(&path)?);
        let mut test_run = adapter.process(&mut reader)?;
        resolve_screenshots(&mut test_run, run);
        Ok(test_run)
    }

    /// Adapt a run's raw result with the default adapter
    ///
    /// # Errors
    ///
    /// Returns error if the result is missing, unreadable or malformed
    pub fn load_test_run(&self, run: &Path) -> AdvisorResult<TestRun> {
        self.load_test_run_with(run, &TestAdvisorResultAdapter)
    }

    /// Write a signal document into its run directory
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be serialized or written
    pub fn save_signal(&self, signal: &TestRunSignal) -> AdvisorResult<PathBuf> {
        self.save_signal_in(&self.run_path(&signal.test_run_id), signal)
    }

    /// Write a signal document into an explicit run directory
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be serialized or written
    pub fn save_signal_in(&self, run: &Path, signal: &TestRunSignal) -> AdvisorResult<PathBuf> {
        fs::create_dir_all(run)?;
        let path = run.join(SIGNAL_FILENAME);
        fs::write(&path, signal.to_json()?)?;
        debug!(path = %path.display(), "saved signal document");
        Ok(path)
    }

    /// Read a signal document
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_signal(&self, signal_path: &Path) -> AdvisorResult<TestRunSignal> {
        let text = fs::read_to_string(signal_path)?;
        TestRunSignal::from_json(&text)
    }

    /// Store the portal response next to a signal document, marking the run
    /// as uploaded
    ///
    /// # Errors
    ///
    /// Returns error if the receipt cannot be written
    pub fn save_portal_response(&self, signal_path: &Path, response: &str) -> AdvisorResult<()> {
        let dir = signal_path.parent().ok_or_else(|| {
            AdvisorError::registry(format!("{} has no parent", signal_path.display()))
        })?;
        fs::write(dir.join(PORTAL_RECORD_FILENAME), response)?;
        Ok(())
    }

    /// Portal id of an uploaded run, read from the `"Id"` field of its
    /// receipt. `None` when the receipt is absent or not such JSON.
    #[must_use]
    pub fn external_id(&self, run: &Path) -> Option<String> {
        let text = fs::read_to_string(run.join(PORTAL_RECORD_FILENAME)).ok()?;
        let value: serde_json::Value = serde_json::from_str(&text).ok()?;
        value.get("Id")?.as_str().map(str::to_string)
    }

    /// Most recent run strictly older than `current` whose raw result holds
    /// `test_case`. Runs with a missing or unreadable result are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be listed
    pub fn baseline_for(&self, current: &Path, test_case: &str) -> AdvisorResult<Option<PathBuf>> {
        let current_id = run_id_of(current);
        let mut older: Vec<PathBuf> = self
            .all_runs()?
            .into_iter()
            .filter(|run| run_id_of(run) < current_id)
            .collect();
        older.reverse();

        for run in older {
            match self.load_test_run(&run) {
                Ok(test_run) if test_run.contains_case(test_case) => {
                    debug!(baseline = %run.display(), test_case, "baseline found");
                    return Ok(Some(run));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(run = %run.display(), error = %e, "skipping run without usable result");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::properties::CLIENT_GUID_KEY;
    use tempfile::TempDir;

    fn result_with_cases(names: &[&str]) -> String {
        let cases: Vec<String> = names
            .iter()
            .map(|n| format!(r#"{{"testCaseFullName": "{n}", "testStatus": "PASS"}}"#))
            .collect();
        format!(r#"{{"testCaseExecutionList": [{}]}}"#, cases.join(","))
    }

    fn add_run(registry: &Registry, id: &str, cases: &[&str]) -> PathBuf {
        let run = registry.run_path(id);
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join(TEST_RESULT_FILENAME), result_with_cases(cases)).unwrap();
        run
    }

    mod run_id_tests {
        use super::*;

        #[test]
        fn test_extract_from_path() {
            assert_eq!(
                extract_run_id("/home/u/.testadvisor/TestRun-20210525-033613/test-signal.json"),
                "TestRun-20210525-033613"
            );
        }

        #[test]
        fn test_innermost_run_id_wins() {
            assert_eq!(
                extract_run_id("/ci/TestRun-20200101-000000-artifacts/TestRun-20210525-033613"),
                "TestRun-20210525-033613"
            );
        }

        #[test]
        fn test_run_id_of_prefers_dir_name() {
            let run = Path::new("/ci/TestRun-20200101-000000/TestRun-20210525-033613");
            assert_eq!(run_id_of(run), "TestRun-20210525-033613");
            let nested = Path::new("/ci/TestRun-20210525-033613/screenshots");
            assert_eq!(run_id_of(nested), "TestRun-20210525-033613");
        }

        #[test]
        fn test_synthesized_when_missing() {
            let id = extract_run_id("/tmp/nothing-here");
            assert!(is_run_id(&id), "{id}");
        }

        #[test]
        fn test_is_run_id() {
            assert!(is_run_id("TestRun-20210525-033613"));
            assert!(!is_run_id("TestRun-2021052-033613"));
            assert!(!is_run_id("xTestRun-20210525-033613"));
        }
    }

    mod run_id_property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_extracts_embedded_run_id(
                prefix in "[a-z/]{0,20}",
                date in 0u32..100_000_000,
                time in 0u32..1_000_000,
                suffix in "(/[a-z.]{0,12})?"
            ) {
                let id = format!("TestRun-{date:08}-{time:06}");
                let path = format!("{prefix}{id}{suffix}");
                prop_assert_eq!(extract_run_id(&path), id);
            }
        }
    }

    mod properties_tests {
        use super::*;

        #[test]
        fn test_open_creates_root_and_properties() {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("nested").join(".testadvisor");
            let registry = Registry::open(&root).unwrap();
            assert!(registry.properties_path().is_file());
            let props = registry.properties().unwrap();
            assert_eq!(props.get("portal.clientid"), Some("clientid"));
            assert!(props.get(CLIENT_GUID_KEY).is_some());
        }

        #[test]
        fn test_open_keeps_existing_properties() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join(PROPERTIES_FILENAME), "SandboxInstance=CS1\n").unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let props = registry.properties().unwrap();
            assert_eq!(props.get("SandboxInstance"), Some("CS1"));
            assert_eq!(props.get("portal.clientid"), None);
        }

        #[test]
        fn test_save_property_persists_and_adds_guid() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join(PROPERTIES_FILENAME), "").unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            registry.save_property("SandboxOrgName", "bst").unwrap();

            let props = registry.properties().unwrap();
            assert_eq!(props.get("SandboxOrgName"), Some("bst"));
            let guid = props.get(CLIENT_GUID_KEY).unwrap().to_string();

            registry.save_property("SandboxOrgId", "00D").unwrap();
            assert_eq!(registry.properties().unwrap().get(CLIENT_GUID_KEY), Some(guid.as_str()));
        }
    }

    mod listing_tests {
        use super::*;

        #[test]
        fn test_all_runs_sorted_and_filtered() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            add_run(&registry, "TestRun-20210102-000000", &[]);
            add_run(&registry, "TestRun-20210101-000000", &[]);
            fs::create_dir_all(dir.path().join("other")).unwrap();
            fs::create_dir_all(dir.path().join("TestRun-tmp")).unwrap();
            fs::create_dir_all(dir.path().join("TestRun-20210104-000000.bak")).unwrap();
            fs::write(dir.path().join("TestRun-20210103-000000"), "not a dir").unwrap();

            let runs = registry.all_runs().unwrap();
            let names: Vec<_> = runs
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
                .collect();
            assert_eq!(names, ["TestRun-20210101-000000", "TestRun-20210102-000000"]);
        }

        #[test]
        fn test_unprocessed_and_ready_to_upload() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let fresh = add_run(&registry, "TestRun-20210101-000000", &[]);
            let processed = add_run(&registry, "TestRun-20210102-000000", &[]);
            let uploaded = add_run(&registry, "TestRun-20210103-000000", &[]);

            for run in [&processed, &uploaded] {
                let id = extract_run_id(&run.to_string_lossy());
                registry.save_signal(&TestRunSignal::new(id)).unwrap();
            }
            registry
                .save_portal_response(&uploaded.join(SIGNAL_FILENAME), r#"{"Id":"a0B1"}"#)
                .unwrap();

            assert_eq!(registry.unprocessed_runs().unwrap(), vec![fresh]);
            assert_eq!(
                registry.ready_to_upload_runs().unwrap(),
                vec![processed.join(SIGNAL_FILENAME)]
            );
            assert_eq!(registry.external_id(&uploaded), Some("a0B1".to_string()));
            assert_eq!(registry.external_id(&processed), None);
        }

        #[test]
        fn test_external_id_opaque_receipt() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let run = add_run(&registry, "TestRun-20210101-000000", &[]);
            fs::write(run.join(PORTAL_RECORD_FILENAME), "uploaded ok").unwrap();
            assert_eq!(registry.external_id(&run), None);
        }
    }

    mod signal_file_tests {
        use super::*;

        #[test]
        fn test_save_and_load_signal() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let mut signal = TestRunSignal::new("TestRun-20210525-033613");
            signal.test_suite_name = "suite".to_string();

            let path = registry.save_signal(&signal).unwrap();
            assert_eq!(
                path,
                registry.run_path("TestRun-20210525-033613").join(SIGNAL_FILENAME)
            );
            assert_eq!(registry.load_signal(&path).unwrap(), signal);
        }

        #[test]
        fn test_load_signal_missing_file() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            assert!(registry.load_signal(&dir.path().join("nope.json")).is_err());
        }
    }

    mod baseline_tests {
        use super::*;

        #[test]
        fn test_picks_most_recent_older_run_with_case() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let oldest = add_run(&registry, "TestRun-20210101-000000", &["a", "b"]);
            let older = add_run(&registry, "TestRun-20210102-000000", &["a"]);
            let current = add_run(&registry, "TestRun-20210103-000000", &["a", "b"]);
            add_run(&registry, "TestRun-20210104-000000", &["a", "b"]);

            assert_eq!(registry.baseline_for(&current, "a").unwrap(), Some(older));
            assert_eq!(registry.baseline_for(&current, "b").unwrap(), Some(oldest.clone()));
            assert_eq!(registry.baseline_for(&current, "c").unwrap(), None);
            assert_eq!(registry.baseline_for(&oldest, "a").unwrap(), None);
        }

        #[test]
        fn test_root_path_holding_a_run_id() {
            let dir = TempDir::new().unwrap();
            let root = dir
                .path()
                .join("TestRun-20200101-000000-artifacts")
                .join(".testadvisor");
            let registry = Registry::open(&root).unwrap();
            let old = add_run(&registry, "TestRun-20210101-000000", &["a"]);
            let current = add_run(&registry, "TestRun-20210102-000000", &["a"]);

            assert_eq!(registry.all_runs().unwrap(), vec![old.clone(), current.clone()]);
            assert_eq!(registry.baseline_for(&current, "a").unwrap(), Some(old));
        }

        #[test]
        fn test_skips_runs_with_unusable_result() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let good = add_run(&registry, "TestRun-20210101-000000", &["a"]);
            let broken = registry.run_path("TestRun-20210102-000000");
            fs::create_dir_all(&broken).unwrap();
            fs::write(broken.join(TEST_RESULT_FILENAME), "{ not json").unwrap();
            fs::create_dir_all(registry.run_path("TestRun-20210103-000000")).unwrap();
            let current = add_run(&registry, "TestRun-20210104-000000", &["a"]);

            assert_eq!(registry.baseline_for(&current, "a").unwrap(), Some(good));
        }

        #[test]
        fn test_load_test_run_resolves_screenshots() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let run = registry.run_path("TestRun-20210101-000000");
            fs::create_dir_all(&run).unwrap();
            fs::write(
                run.join(TEST_RESULT_FILENAME),
                r#"{"testCaseExecutionList": [{"testCaseFullName": "a", "eventList": [
                    {"eventTime": "2021-01-01T00:00:01Z", "screenshotPath": "1.png"}]}]}"#,
            )
            .unwrap();
            let test_run = registry.load_test_run(&run).unwrap();
            assert_eq!(
                test_run.test_cases[0].events[0].screenshot_path,
                Some(run.join("1.png"))
            );
        }

        #[test]
        fn test_load_test_run_missing_result() {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let run = registry.run_path("TestRun-20210101-000000");
            fs::create_dir_all(&run).unwrap();
            assert!(matches!(
                registry.load_test_run(&run),
                Err(AdvisorError::Registry { .. })
            ));
        }
    }
}
