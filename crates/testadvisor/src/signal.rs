//! Test run signal document persisted as `test-signal.json`.
//!
//! Instants are serialized as ISO-8601 strings, rectangles as
//! `{"minX","minY","maxX","maxY"}` records.

use crate::result::AdvisorResult;
use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Pixel rectangle with inclusive bounds on both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rectangle {
    /// Left-most column
    pub min_x: u32,
    /// Top-most row
    pub min_y: u32,
    /// Right-most column
    pub max_x: u32,
    /// Bottom-most row
    pub max_y: u32,
}

impl Rectangle {
    /// Create a rectangle from its corners, normalizing their order
    #[must_use]
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Single-pixel rectangle
    #[must_use]
    pub const fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    /// Width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Number of pixels covered
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Whether the pixel lies inside
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether the rectangles share at least one pixel
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Smallest rectangle covering both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow to include a pixel
    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Mapped test case status. Declaration order is significant for partial
/// matching: the first constant contained in the raw status wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    /// Test passed
    Pass,
    /// Test failed
    Fail,
    /// Test skipped
    Skip,
}

impl TestStatus {
    /// All constants in matching order
    pub const ALL: [Self; 3] = [Self::Pass, Self::Fail, Self::Skip];

    /// Constant name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }

    /// Map a free-form status string, `None` when nothing matches
    #[must_use]
    pub fn from_raw(raw: &str, mode: StatusMatch) -> Option<Self> {
        let upper = raw.to_uppercase();
        match mode {
            StatusMatch::Partial => Self::ALL.into_iter().find(|s| upper.contains(s.name())),
            StatusMatch::Exact => Self::ALL.into_iter().find(|s| upper.trim() == s.name()),
        }
    }
}

/// How raw status strings are matched against [`TestStatus`] names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMatch {
    /// Raw status contains the constant name
    #[default]
    Partial,
    /// Raw status equals the constant name
    Exact,
}

impl FromStr for StatusMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partial" => Ok(Self::Partial),
            "exact" => Ok(Self::Exact),
            other => Err(format!("unknown status match mode '{other}'")),
        }
    }
}

/// Base64-encoded MD5 of the locator, empty for an empty locator
#[must_use]
pub fn locator_hash(locator: &str) -> String {
    if locator.is_empty() {
        return String::new();
    }
    let digest = Md5::digest(locator.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// A reportable fact about a test execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSignal {
    /// Event source name
    pub signal_name: String,
    /// Event content
    pub signal_value: String,
    /// Event instant
    pub signal_time: DateTime<Utc>,
    /// Recorder screenshot number of the event
    #[serde(default)]
    pub screenshot_recorder_number: Option<u32>,
    /// Browser-driver command
    #[serde(default)]
    pub selenium_cmd: String,
    /// Base64 MD5 of the locator
    #[serde(default)]
    pub locator_hash: String,
    /// Visual difference in hundredths of a percent (0..=10000)
    #[serde(default)]
    pub screenshot_diff_ratio: Option<u32>,
    /// Recorder number of the matched baseline screenshot
    #[serde(default)]
    pub baseline_screenshot_recorder_number: Option<u32>,
    /// Mismatching regions
    #[serde(default)]
    pub screenshot_diff_areas: Vec<Rectangle>,
    /// Instant of the preceding matched step
    #[serde(default)]
    pub previous_signal_time: Option<DateTime<Utc>>,
}

impl TestSignal {
    /// Create a plain signal
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            signal_name: name.into(),
            signal_value: value.into(),
            signal_time: time,
            screenshot_recorder_number: None,
            selenium_cmd: String::new(),
            locator_hash: String::new(),
            screenshot_diff_ratio: None,
            baseline_screenshot_recorder_number: None,
            screenshot_diff_areas: Vec::new(),
            previous_signal_time: None,
        }
    }

    /// Whether this signal reports a screenshot difference
    #[must_use]
    pub const fn is_visual(&self) -> bool {
        self.screenshot_diff_ratio.is_some()
    }
}

/// Per test case outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecution {
    /// Fully qualified test name
    pub test_case_name: String,
    /// Start instant
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// End instant
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Mapped status
    #[serde(default)]
    pub status: Option<TestStatus>,
    /// Run id of the baseline
    #[serde(default)]
    pub baseline_build_id: Option<String>,
    /// Suite start of the baseline run
    #[serde(default)]
    pub baseline_build_id_start_time: Option<DateTime<Utc>>,
    /// Portal id of the baseline run upload
    #[serde(default)]
    pub baseline_external_id: Option<String>,
    /// Percentage of current steps matched to a baseline step
    #[serde(default)]
    pub similarity: u32,
    /// Signals in event-time order
    #[serde(default)]
    pub test_signals: Vec<TestSignal>,
}

impl TestExecution {
    /// Create an execution without baseline linkage
    #[must_use]
    pub fn new(test_case_name: impl Into<String>) -> Self {
        Self {
            test_case_name: test_case_name.into(),
            start_time: None,
            end_time: None,
            status: None,
            baseline_build_id: None,
            baseline_build_id_start_time: None,
            baseline_external_id: None,
            similarity: 0,
            test_signals: Vec::new(),
        }
    }

    /// Number of visual difference signals
    #[must_use]
    pub fn visual_signal_count(&self) -> usize {
        self.test_signals.iter().filter(|s| s.is_visual()).count()
    }
}

/// Derived signal document for one test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSignal {
    /// Registry GUID of the client
    #[serde(default)]
    pub client_registry_guid: Option<Uuid>,
    /// Build id reported by the client
    #[serde(default)]
    pub client_build_id: String,
    /// CLI version that produced the document
    #[serde(default)]
    pub client_cli_version: String,
    /// Recorder library version
    #[serde(default)]
    pub client_library_version: String,
    /// Sandbox instance
    #[serde(default)]
    pub sandbox_instance: String,
    /// Sandbox org id
    #[serde(default)]
    pub sandbox_org_id: String,
    /// Sandbox org name
    #[serde(default)]
    pub sandbox_org_name: String,
    /// Suite name
    #[serde(default)]
    pub test_suite_name: String,
    /// Suite start instant
    #[serde(default)]
    pub build_start_time: Option<DateTime<Utc>>,
    /// Suite end instant
    #[serde(default)]
    pub build_end_time: Option<DateTime<Utc>>,
    /// `TestRun-YYYYMMDD-HHmmss`
    #[serde(default)]
    pub test_run_id: String,
    /// One record per test case, in input order
    #[serde(default)]
    pub test_executions: Vec<TestExecution>,
}

impl TestRunSignal {
    /// Create an empty document for a run
    #[must_use]
    pub fn new(test_run_id: impl Into<String>) -> Self {
        Self {
            test_run_id: test_run_id.into(),
            ..Self::default()
        }
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> AdvisorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> AdvisorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find an execution by test case name
    #[must_use]
    pub fn execution(&self, name: &str) -> Option<&TestExecution> {
        self.test_executions.iter().find(|e| e.test_case_name == name)
    }
}
