//! In-memory test run model produced by a result adapter.
//!
//! A [`TestRun`] owns its [`TestCase`]s which own their [`TestEvent`]s. The
//! values only live for the duration of one processing invocation.

use crate::signal::Rectangle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Severity of a recorded event, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    /// Every level
    All,
    /// Highly detailed tracing
    Finest,
    /// Fairly detailed tracing
    Finer,
    /// Tracing information
    Fine,
    /// Static configuration messages
    Config,
    /// Informational messages
    Info,
    /// Potential problem
    Warning,
    /// Serious failure
    Severe,
    /// No level at all
    Off,
}

impl EventLevel {
    /// Canonical upper-case name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Finest => "FINEST",
            Self::Finer => "FINER",
            Self::Fine => "FINE",
            Self::Config => "CONFIG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Severe => "SEVERE",
            Self::Off => "OFF",
        }
    }

    /// Levels that can turn an event into a reportable signal
    #[must_use]
    pub const fn is_reportable(self) -> bool {
        matches!(self, Self::Severe | Self::Warning)
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "FINEST" => Ok(Self::Finest),
            "FINER" => Ok(Self::Finer),
            "FINE" => Ok(Self::Fine),
            "CONFIG" => Ok(Self::Config),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "SEVERE" => Ok(Self::Severe),
            "OFF" => Ok(Self::Off),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

/// A point-in-time observation during a test case
#[derive(Debug, Clone, PartialEq)]
pub struct TestEvent {
    /// Event source name (e.g. `SELENIUM`, `AUTOMATION`)
    pub name: String,
    /// Event content
    pub value: String,
    /// Raw level string as recorded
    pub level: String,
    /// When the event was observed
    pub time: DateTime<Utc>,
    /// Screenshot captured for this event, if any
    pub screenshot_path: Option<PathBuf>,
    /// Recorder-assigned screenshot number
    pub screenshot_recorder_number: Option<u32>,
    /// Browser-driver command
    pub cmd: String,
    /// Browser-driver command parameter
    pub cmd_param: String,
    /// Element locator the command acted on
    pub locator: String,
    /// Volatile regions assigned by the excluded-areas discovery pass
    pub excluded_areas: Vec<Rectangle>,
}

impl TestEvent {
    /// Create an event without screenshot or driver hints
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        level: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            level: level.into(),
            time,
            screenshot_path: None,
            screenshot_recorder_number: None,
            cmd: String::new(),
            cmd_param: String::new(),
            locator: String::new(),
            excluded_areas: Vec::new(),
        }
    }

    /// Attach a screenshot
    #[must_use]
    pub fn with_screenshot(mut self, path: impl Into<PathBuf>, recorder_number: u32) -> Self {
        self.screenshot_path = Some(path.into());
        self.screenshot_recorder_number = Some(recorder_number);
        self
    }

    /// Attach browser-driver hints
    #[must_use]
    pub fn with_command(
        mut self,
        cmd: impl Into<String>,
        cmd_param: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        self.cmd = cmd.into();
        self.cmd_param = cmd_param.into();
        self.locator = locator.into();
        self
    }

    /// Parsed level, `None` when the recorder used an unknown name
    #[must_use]
    pub fn level(&self) -> Option<EventLevel> {
        self.level.parse().ok()
    }

    /// Screenshot path when present and non-empty
    #[must_use]
    pub fn screenshot(&self) -> Option<&Path> {
        self.screenshot_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Whether this event can become a step
    #[must_use]
    pub fn is_step_candidate(&self) -> bool {
        self.screenshot().is_some()
    }

    /// Whether both events captured the same UI action.
    ///
    /// Compares `cmd` and `locator` only; `cmd_param` is ignored so that
    /// typed values and similar parameters do not split otherwise identical
    /// steps.
    #[must_use]
    pub fn same_action(&self, other: &Self) -> bool {
        self.cmd == other.cmd && self.locator == other.locator
    }
}

/// One test within a run
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// Fully qualified test name
    pub name: String,
    /// Start instant
    pub start_time: Option<DateTime<Utc>>,
    /// End instant
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form status as recorded
    pub status: String,
    /// Events in input order
    pub events: Vec<TestEvent>,
}

impl TestCase {
    /// Create an empty test case
    #[must_use]
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: None,
            end_time: None,
            status: status.into(),
            events: Vec::new(),
        }
    }

    /// Add an event
    #[must_use]
    pub fn with_event(mut self, event: TestEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Set start and end instants
    #[must_use]
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Sort events oldest first; ties keep input order
    pub fn sort_events(&mut self) {
        self.events.sort_by_key(|e| e.time);
    }
}

/// One execution of a test suite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRun {
    /// Suite name
    pub suite_name: String,
    /// Suite start instant
    pub suite_start_time: Option<DateTime<Utc>>,
    /// Suite end instant
    pub suite_end_time: Option<DateTime<Utc>>,
    /// Version of the recording client library
    pub library_version: String,
    /// Free-form suite info (used as build id)
    pub suite_info: String,
    /// Test cases in input order
    pub test_cases: Vec<TestCase>,
}

impl TestRun {
    /// Find a test case by its fully qualified name
    #[must_use]
    pub fn find_case(&self, name: &str) -> Option<&TestCase> {
        self.test_cases.iter().find(|c| c.name == name)
    }

    /// Take a test case out of the run by name
    #[must_use]
    pub fn take_case(mut self, name: &str) -> Option<TestCase> {
        let pos = self.test_cases.iter().position(|c| c.name == name)?;
        Some(self.test_cases.swap_remove(pos))
    }

    /// Whether the run contains the named test case
    #[must_use]
    pub fn contains_case(&self, name: &str) -> bool {
        self.find_case(name).is_some()
    }
}
