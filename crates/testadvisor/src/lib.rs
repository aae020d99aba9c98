//! TestAdvisor: client-side post-processor for recorded UI test runs.
//!
//! A recorder leaves one directory per test run in a local registry. This
//! crate turns such a run into a compact signal document by comparing it
//! against earlier runs of the same test cases.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────────┐   ┌──────────────────┐
//! │ test-result  │──►│ Adapter   │──►│ CaseAnalyzer   │──►│ test-signal.json │
//! │ .json        │   │ (TestRun) │   │ steps + pixels │   │ (TestRunSignal)  │
//! └──────────────┘   └───────────┘   └───────▲────────┘   └──────────────────┘
//!                                            │
//!                            Registry::baseline_for (older runs)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use testadvisor::{AdvisorConfig, Processor, Registry};
//!
//! let registry = Registry::from_env()?;
//! let processor = Processor::new(registry, AdvisorConfig::default());
//! for outcome in processor.process_pending(false, env!("CARGO_PKG_VERSION"))? {
//!     println!("{}: {}", outcome.run.display(), outcome.is_ok());
//! }
//! # Ok::<(), testadvisor::AdvisorError>(())
//! ```

#![warn(missing_docs)]

mod adapter;
#[allow(clippy::missing_const_for_fn)]
pub mod comparator;
mod config;
#[allow(clippy::module_name_repetitions)]
pub mod engine;
mod model;
mod processor;
mod properties;
pub mod registry;
mod result;
mod signal;
pub mod steps;

pub use adapter::{resolve_screenshots, ResultAdapter, TestAdvisorResultAdapter};
pub use comparator::{ComparisonResult, ComparisonState, ScreenshotComparator};
pub use config::{
    AdvisorConfig, COLOR_THRESHOLD_KEY, CONFIG_KEYS, EXPORT_DIFF_AREA_KEY, EXPORT_DIFF_IMAGE_KEY,
    MIN_DIFF_AREA_SIZE_KEY, MIN_DIFF_RATIO_KEY, RECTANGLE_GAP_KEY, SCREENSHOT_COMPARISON_KEY,
    SIGNAL_LEVEL_KEY, STATUS_MATCH_KEY,
};
pub use engine::{CaseAnalysis, CaseAnalyzer};
pub use model::{EventLevel, TestCase, TestEvent, TestRun};
pub use processor::{Processor, RunOutcome};
pub use properties::{
    Properties, CLIENT_GUID_KEY, DEFAULT_PROPERTIES, SANDBOX_INSTANCE_KEY, SANDBOX_ORG_ID_KEY,
    SANDBOX_ORG_NAME_KEY, TEST_SUITE_NAME_KEY,
};
pub use registry::{extract_run_id, run_id_of, Registry};
pub use result::{AdvisorError, AdvisorResult};
pub use signal::{
    locator_hash, Rectangle, StatusMatch, TestExecution, TestRunSignal, TestSignal, TestStatus,
};
