//! Result adapters turn a raw result document into a [`TestRun`].

use crate::model::{TestCase, TestEvent, TestRun};
use crate::result::{AdvisorError, AdvisorResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Converts a raw result stream into an in-memory test run
pub trait ResultAdapter: Send + Sync {
    /// Parse a raw result document
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Adapter`] when the document is unreadable or
    /// malformed
    fn process(&self, reader: &mut dyn Read) -> AdvisorResult<TestRun>;
}

/// Adapter for the canonical `test-result.json` document
#[derive(Debug, Clone, Copy, Default)]
pub struct TestAdvisorResultAdapter;

impl TestAdvisorResultAdapter {
    /// Create the adapter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ResultAdapter for TestAdvisorResultAdapter {
    fn process(&self, reader: &mut dyn Read) -> AdvisorResult<TestRun> {
        let raw: RawTestRun = serde_json::from_reader(reader)
            .map_err(|e| AdvisorError::adapter(format!("malformed test result: {e}")))?;
        Ok(raw.into())
    }
}

/// Make relative screenshot paths absolute against the run directory
pub fn resolve_screenshots(run: &mut TestRun, run_dir: &Path) {
    for event in run.test_cases.iter_mut().flat_map(|c| c.events.iter_mut()) {
        if let Some(path) = event.screenshot_path.as_mut() {
            if !path.as_os_str().is_empty() && path.is_relative() {
                *path = run_dir.join(&*path);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestRun {
    #[serde(default)]
    test_suite_name: String,
    #[serde(default)]
    test_suite_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    test_suite_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    test_advisor_version: String,
    #[serde(default)]
    tests_suite_info: String,
    #[serde(default)]
    test_case_execution_list: Vec<RawTestCase>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestCase {
    test_case_full_name: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    test_status: String,
    #[serde(default)]
    event_list: Vec<RawTestEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestEvent {
    event_time: DateTime<Utc>,
    #[serde(default)]
    event_source: String,
    #[serde(default)]
    event_content: String,
    #[serde(default)]
    event_level: String,
    #[serde(default)]
    screenshot_record_number: Option<u32>,
    #[serde(default)]
    screenshot_path: Option<String>,
    #[serde(default)]
    selenium_cmd: Option<String>,
    #[serde(default)]
    selenium_cmd_param: Option<String>,
    #[serde(default)]
    selenium_locator: Option<String>,
}

impl From<RawTestRun> for TestRun {
    fn from(raw: RawTestRun) -> Self {
        Self {
            suite_name: raw.test_suite_name,
            suite_start_time: raw.test_suite_start_time,
            suite_end_time: raw.test_suite_end_time,
            library_version: raw.test_advisor_version,
            suite_info: raw.tests_suite_info,
            test_cases: raw
                .test_case_execution_list
                .into_iter()
                .map(TestCase::from)
                .collect(),
        }
    }
}

impl From<RawTestCase> for TestCase {
    fn from(raw: RawTestCase) -> Self {
        Self {
            name: raw.test_case_full_name,
            start_time: raw.start_time,
            end_time: raw.end_time,
            status: raw.test_status,
            events: raw.event_list.into_iter().map(TestEvent::from).collect(),
        }
    }
}

impl From<RawTestEvent> for TestEvent {
    fn from(raw: RawTestEvent) -> Self {
        Self {
            name: raw.event_source,
            value: raw.event_content,
            level: raw.event_level,
            time: raw.event_time,
            screenshot_path: raw
                .screenshot_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            screenshot_recorder_number: raw.screenshot_record_number,
            cmd: raw.selenium_cmd.unwrap_or_default(),
            cmd_param: raw.selenium_cmd_param.unwrap_or_default(),
            locator: raw.selenium_locator.unwrap_or_default(),
            excluded_areas: Vec::new(),
        }
    }
}
