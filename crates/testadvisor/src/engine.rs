//! Per test case signal extraction.
//!
//! Two passes run over the time-sorted events of one test case:
//!
//! 1. **Discovery**: current steps are aligned against a second, older
//!    baseline. Regions that differ there are volatile and are stored on
//!    the current step as excluded areas.
//! 2. **Scoring**: current steps are aligned against the direct baseline
//!    and compared with the excluded areas masked out. Each mismatch
//!    becomes a visual signal. Severe and warning events become plain
//!    signals independently of any matching.

use crate::comparator::{ComparisonResult, ScreenshotComparator};
use crate::config::AdvisorConfig;
use crate::model::{TestCase, TestEvent};
use crate::result::AdvisorResult;
use crate::signal::{locator_hash, TestSignal};
use crate::steps::{align_steps, reduce_steps, screenshot_readable, similarity, StepMatch};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of the annotated image written by the scoring pass
pub const COMPARE_RESULT_SUFFIX: &str = ".compareresult.png";
/// Suffix of the annotated image written by the discovery pass
pub const IGNORED_AREAS_SUFFIX: &str = ".ignoredareas.png";
/// Suffix of the rectangle sidecar written for scoring mismatches
pub const DIFF_AREAS_SUFFIX: &str = ".diffareas.json";

/// Outcome of analyzing one test case
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseAnalysis {
    /// Signals in event-time order
    pub signals: Vec<TestSignal>,
    /// Percentage of current steps matched against the baseline
    pub similarity: u32,
    /// Number of current steps
    pub total_steps: usize,
    /// Number of current steps with a baseline match
    pub matched_steps: usize,
}

/// Path of a derived artifact next to a screenshot
#[must_use]
pub fn artifact_path(screenshot: &Path, suffix: &str) -> PathBuf {
    let mut name = screenshot
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    screenshot.with_file_name(name)
}

/// Plain signal carrying the event's identity and driver hints
#[must_use]
pub fn event_signal(event: &TestEvent) -> TestSignal {
    let mut signal = TestSignal::new(event.name.clone(), event.value.clone(), event.time);
    signal.screenshot_recorder_number = event.screenshot_recorder_number;
    signal.selenium_cmd.clone_from(&event.cmd);
    signal.locator_hash = locator_hash(&event.locator);
    signal
}

fn step_refs<'a>(case: &'a TestCase, steps: &[usize]) -> Vec<&'a TestEvent> {
    steps.iter().map(|&i| &case.events[i]).collect()
}

/// Analyzes test cases with a fixed configuration
#[derive(Debug, Clone)]
pub struct CaseAnalyzer {
    config: AdvisorConfig,
    comparator: ScreenshotComparator,
}

impl CaseAnalyzer {
    /// Create an analyzer from a configuration snapshot
    #[must_use]
    pub fn new(config: AdvisorConfig) -> Self {
        let comparator = ScreenshotComparator::from_config(&config);
        Self { config, comparator }
    }

    /// Replace the comparator
    #[must_use]
    pub fn with_comparator(mut self, comparator: ScreenshotComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Configuration snapshot in use
    #[must_use]
    pub const fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Attach excluded areas to `current` steps by comparing them against
    /// the matching steps of `second`. Both cases must be time-sorted.
    /// Returns the number of steps that received areas.
    pub fn discover_excluded_areas(&self, current: &mut TestCase, second: &TestCase) -> usize {
        let cur_steps = reduce_steps(&current.events);
        let second_steps = reduce_steps(&second.events);
        let matches = align_steps(
            &step_refs(current, &cur_steps),
            &step_refs(second, &second_steps),
            screenshot_readable,
        );

        let mut updated = 0;
        for StepMatch { current: ci, baseline: bi } in matches {
            let event_index = cur_steps[ci];
            let reference = &second.events[second_steps[bi]];
            let (Some(base_shot), Some(cur_shot)) = (
                reference.screenshot(),
                current.events[event_index].screenshot().map(Path::to_path_buf),
            ) else {
                continue;
            };
            let output = artifact_path(&cur_shot, IGNORED_AREAS_SUFFIX);
            match self.comparator.compare(base_shot, &cur_shot, &output) {
                Ok(result) => {
                    if !result.rectangles.is_empty() {
                        updated += 1;
                    }
                    current.events[event_index].excluded_areas = result.rectangles;
                }
                Err(e) => {
                    warn!(screenshot = %cur_shot.display(), error = %e, "excluded area discovery skipped");
                }
            }
        }

        debug!(test_case = %current.name, steps = updated, "excluded areas discovered");
        updated
    }

    /// Produce signals and similarity for a time-sorted test case
    ///
    /// # Errors
    ///
    /// Returns error if a requested diff-area sidecar cannot be written
    pub fn analyze(&self, current: &TestCase, baseline: Option<&TestCase>) -> AdvisorResult<CaseAnalysis> {
        let cur_steps = reduce_steps(&current.events);

        // event index -> baseline event index
        let mut matched: Vec<Option<usize>> = vec![None; current.events.len()];
        let mut matched_steps = 0;
        if let Some(baseline) = baseline {
            let base_steps = reduce_steps(&baseline.events);
            let matches = align_steps(
                &step_refs(current, &cur_steps),
                &step_refs(baseline, &base_steps),
                screenshot_readable,
            );
            matched_steps = matches.len();
            for m in matches {
                matched[cur_steps[m.current]] = Some(base_steps[m.baseline]);
            }
        }

        let similarity = if baseline.is_some() {
            similarity(matched_steps, cur_steps.len())
        } else {
            0
        };
        info!(
            test_case = %current.name,
            steps = cur_steps.len(),
            matched = matched_steps,
            similarity,
            "analyzed steps"
        );

        let mut signals = Vec::new();
        let mut previous_step_time: Option<DateTime<Utc>> = None;

        for (index, event) in current.events.iter().enumerate() {
            if self.config.emits_signal_for(event.level()) {
                signals.push(event_signal(event));
            }

            let (Some(baseline), Some(base_index)) = (baseline, matched[index]) else {
                continue;
            };
            let reference = &baseline.events[base_index];

            if self.config.screenshot_comparison {
                if let Some(signal) = self.score_step(event, reference, previous_step_time)? {
                    signals.push(signal);
                }
            }
            previous_step_time = Some(event.time);
        }

        Ok(CaseAnalysis {
            signals,
            similarity,
            total_steps: cur_steps.len(),
            matched_steps,
        })
    }

    fn score_step(
        &self,
        event: &TestEvent,
        reference: &TestEvent,
        previous_step_time: Option<DateTime<Utc>>,
    ) -> AdvisorResult<Option<TestSignal>> {
        let (Some(base_shot), Some(cur_shot)) = (reference.screenshot(), event.screenshot()) else {
            return Ok(None);
        };
        let output = artifact_path(cur_shot, COMPARE_RESULT_SUFFIX);
        let result = match self
            .comparator
            .compare_masked(base_shot, cur_shot, &output, &event.excluded_areas)
        {
            Ok(result) => result,
            Err(e) => {
                warn!(screenshot = %cur_shot.display(), error = %e, "screenshot comparison skipped");
                return Ok(None);
            }
        };
        if !result.is_mismatch() {
            return Ok(None);
        }

        info!(
            screenshot = %cur_shot.display(),
            ratio = result.diff_ratio_hundredths(),
            areas = result.rectangles.len(),
            "screenshot difference found"
        );
        if self.config.export_screenshot_diff_area {
            write_diff_areas(cur_shot, &result)?;
        }

        let mut signal = event_signal(event);
        signal.screenshot_diff_ratio = Some(result.diff_ratio_hundredths());
        signal.baseline_screenshot_recorder_number = reference.screenshot_recorder_number;
        signal.screenshot_diff_areas = result.rectangles;
        signal.previous_signal_time = previous_step_time;
        Ok(Some(signal))
    }
}

fn write_diff_areas(screenshot: &Path, result: &ComparisonResult) -> AdvisorResult<()> {
    let path = artifact_path(screenshot, DIFF_AREAS_SUFFIX);
    fs::write(&path, serde_json::to_string_pretty(&result.rectangles)?)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::comparator::encode_png;
    use crate::model::EventLevel;
    use crate::signal::Rectangle;
    use chrono::TimeZone;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn png(dir: &Path, name: &str, block: Option<Rectangle>) -> PathBuf {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        if let Some(r) = block {
            for y in r.min_y..=r.max_y {
                for x in r.min_x..=r.max_x {
                    img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        let path = dir.join(name);
        fs::write(&path, encode_png(&img).unwrap()).unwrap();
        path
    }

    fn step(path: &Path, locator: &str, t: i64, n: u32) -> TestEvent {
        TestEvent::new("SELENIUM", "click", "INFO", at(t))
            .with_command("click", "", locator)
            .with_screenshot(path, n)
    }

    fn comparing() -> CaseAnalyzer {
        CaseAnalyzer::new(AdvisorConfig::default().with_screenshot_comparison(true))
    }

    #[test]
    fn test_artifact_path() {
        assert_eq!(
            artifact_path(Path::new("/run/shots/3.png"), COMPARE_RESULT_SUFFIX),
            PathBuf::from("/run/shots/3.png.compareresult.png")
        );
    }

    #[test]
    fn test_event_signal_fields() {
        let event = TestEvent::new("SELENIUM", "NoSuchElement", "WARNING", at(2))
            .with_command("click", "x", "abc")
            .with_screenshot("2.png", 7);
        let signal = event_signal(&event);
        assert_eq!(signal.signal_name, "SELENIUM");
        assert_eq!(signal.signal_value, "NoSuchElement");
        assert_eq!(signal.signal_time, at(2));
        assert_eq!(signal.screenshot_recorder_number, Some(7));
        assert_eq!(signal.selenium_cmd, "click");
        assert_eq!(signal.locator_hash, "kAFQmDzST7DWlj99KOF/cg==");
        assert!(!signal.is_visual());
    }

    mod signal_tests {
        use super::*;

        fn mixed_case() -> TestCase {
            TestCase::new("t", "FAIL")
                .with_event(TestEvent::new("A", "one", "INFO", at(1)))
                .with_event(TestEvent::new("SELENIUM", "NoSuchElementException", "WARNING", at(2)))
                .with_event(TestEvent::new("B", "three", "INFO", at(3)))
                .with_event(TestEvent::new("AUTOMATION", "assertEquals", "SEVERE", at(4)))
        }

        #[test]
        fn test_without_baseline_emits_severe_and_warning() {
            let analysis = comparing().analyze(&mixed_case(), None).unwrap();
            assert_eq!(analysis.similarity, 0);
            let values: Vec<_> = analysis.signals.iter().map(|s| s.signal_value.as_str()).collect();
            assert_eq!(values, ["NoSuchElementException", "assertEquals"]);
            assert!(analysis.signals.iter().all(|s| s.locator_hash.is_empty()));
        }

        #[test]
        fn test_signal_level_raises_threshold() {
            let analyzer = CaseAnalyzer::new(AdvisorConfig::default().with_signal_level(EventLevel::Severe));
            let analysis = analyzer.analyze(&mixed_case(), None).unwrap();
            assert_eq!(analysis.signals.len(), 1);
            assert_eq!(analysis.signals[0].signal_value, "assertEquals");
        }

        #[test]
        fn test_low_signal_level_never_emits_info() {
            let analyzer = CaseAnalyzer::new(AdvisorConfig::default().with_signal_level(EventLevel::All));
            let analysis = analyzer.analyze(&mixed_case(), None).unwrap();
            assert_eq!(analysis.signals.len(), 2);
        }
    }

    mod visual_tests {
        use super::*;

        #[test]
        fn test_identical_steps_no_visual_signal() {
            let dir = TempDir::new().unwrap();
            let a = png(dir.path(), "a.png", None);
            let b = png(dir.path(), "b.png", None);
            let current = TestCase::new("t", "PASS")
                .with_event(step(&a, "#1", 1, 1))
                .with_event(step(&a, "#2", 2, 2));
            let baseline = TestCase::new("t", "PASS")
                .with_event(step(&b, "#1", 1, 1))
                .with_event(step(&b, "#2", 2, 2));

            let analysis = comparing().analyze(&current, Some(&baseline)).unwrap();
            assert_eq!(analysis.similarity, 100);
            assert_eq!(analysis.matched_steps, 2);
            assert!(analysis.signals.is_empty());
        }

        #[test]
        fn test_mismatch_emits_visual_signal() {
            let dir = TempDir::new().unwrap();
            let base1 = png(dir.path(), "base1.png", None);
            let base2 = png(dir.path(), "base2.png", None);
            let cur1 = png(dir.path(), "cur1.png", None);
            let cur2 = png(dir.path(), "cur2.png", Some(Rectangle::new(0, 0, 9, 9)));

            let current = TestCase::new("t", "FAIL")
                .with_event(step(&cur1, "#1", 1, 11))
                .with_event(step(&cur2, "#2", 2, 12));
            let baseline = TestCase::new("t", "PASS")
                .with_event(step(&base1, "#1", 1, 21))
                .with_event(step(&base2, "#2", 2, 22));

            let analyzer = CaseAnalyzer::new(
                AdvisorConfig::default()
                    .with_screenshot_comparison(true)
                    .with_export_diff_area(true)
                    .with_export_diff_image(true),
            );
            let analysis = analyzer.analyze(&current, Some(&baseline)).unwrap();
            assert_eq!(analysis.similarity, 100);
            assert_eq!(analysis.signals.len(), 1);

            let signal = &analysis.signals[0];
            assert_eq!(signal.signal_time, at(2));
            assert_eq!(signal.screenshot_recorder_number, Some(12));
            assert_eq!(signal.baseline_screenshot_recorder_number, Some(22));
            assert_eq!(signal.screenshot_diff_ratio, Some(625));
            assert_eq!(signal.screenshot_diff_areas, vec![Rectangle::new(0, 0, 9, 9)]);
            assert_eq!(signal.previous_signal_time, Some(at(1)));

            assert!(artifact_path(&cur2, COMPARE_RESULT_SUFFIX).is_file());
            let sidecar = fs::read_to_string(artifact_path(&cur2, DIFF_AREAS_SUFFIX)).unwrap();
            let areas: Vec<Rectangle> = serde_json::from_str(&sidecar).unwrap();
            assert_eq!(areas, signal.screenshot_diff_areas);
        }

        #[test]
        fn test_comparison_disabled_keeps_similarity() {
            let dir = TempDir::new().unwrap();
            let base = png(dir.path(), "base.png", None);
            let cur = png(dir.path(), "cur.png", Some(Rectangle::new(0, 0, 9, 9)));
            let current = TestCase::new("t", "FAIL").with_event(step(&cur, "#1", 1, 1));
            let baseline = TestCase::new("t", "PASS").with_event(step(&base, "#1", 1, 1));

            let analysis = CaseAnalyzer::new(AdvisorConfig::default())
                .analyze(&current, Some(&baseline))
                .unwrap();
            assert_eq!(analysis.similarity, 100);
            assert!(analysis.signals.is_empty());
        }

        #[test]
        fn test_missing_baseline_screenshot_is_unmatched() {
            let dir = TempDir::new().unwrap();
            let cur = png(dir.path(), "cur.png", None);
            let current = TestCase::new("t", "PASS").with_event(step(&cur, "#1", 1, 1));
            let baseline =
                TestCase::new("t", "PASS").with_event(step(&dir.path().join("gone.png"), "#1", 1, 1));

            let analysis = comparing().analyze(&current, Some(&baseline)).unwrap();
            assert_eq!(analysis.similarity, 0);
            assert_eq!(analysis.matched_steps, 0);
        }

        #[test]
        fn test_discovery_masks_volatile_region() {
            let dir = TempDir::new().unwrap();
            let clock = Rectangle::new(20, 20, 29, 29);
            let cur = png(dir.path(), "cur.png", Some(clock));
            let base = png(dir.path(), "base.png", None);
            let second = png(dir.path(), "second.png", None);

            let mut current = TestCase::new("t", "PASS").with_event(step(&cur, "#1", 1, 1));
            let baseline = TestCase::new("t", "PASS").with_event(step(&base, "#1", 1, 1));
            let older = TestCase::new("t", "PASS").with_event(step(&second, "#1", 1, 1));

            let analyzer = comparing();
            assert_eq!(analyzer.discover_excluded_areas(&mut current, &older), 1);
            assert_eq!(current.events[0].excluded_areas, vec![clock]);

            let analysis = analyzer.analyze(&current, Some(&baseline)).unwrap();
            assert_eq!(analysis.similarity, 100);
            assert!(analysis.signals.is_empty());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        const LEVELS: [&str; 6] = ["SEVERE", "WARNING", "INFO", "FINE", "CONFIG", "bogus"];

        fn arb_case() -> impl Strategy<Value = TestCase> {
            prop::collection::vec((0i64..20, 0usize..LEVELS.len()), 0..40).prop_map(|specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .fold(TestCase::new("t", "PASS"), |case, (i, (t, level))| {
                        case.with_event(TestEvent::new("S", format!("{i}"), LEVELS[level], at(t)))
                    })
            })
        }

        fn arb_level() -> impl Strategy<Value = EventLevel> {
            prop::sample::select(vec![
                EventLevel::All,
                EventLevel::Info,
                EventLevel::Warning,
                EventLevel::Severe,
                EventLevel::Off,
            ])
        }

        proptest! {
            #[test]
            fn prop_signals_sorted_by_time(case in arb_case(), level in arb_level()) {
                let mut case = case;
                case.sort_events();
                let analyzer = CaseAnalyzer::new(AdvisorConfig::default().with_signal_level(level));
                let analysis = analyzer.analyze(&case, None).unwrap();
                for pair in analysis.signals.windows(2) {
                    prop_assert!(pair[0].signal_time <= pair[1].signal_time);
                }
            }

            #[test]
            fn prop_only_severe_or_warning_signal(case in arb_case(), level in arb_level()) {
                let mut case = case;
                case.sort_events();
                let analyzer = CaseAnalyzer::new(AdvisorConfig::default().with_signal_level(level));
                let analysis = analyzer.analyze(&case, None).unwrap();
                for signal in &analysis.signals {
                    let source = case
                        .events
                        .iter()
                        .find(|e| e.value == signal.signal_value)
                        .unwrap();
                    prop_assert!(matches!(source.level.as_str(), "SEVERE" | "WARNING"));
                }
            }
        }
    }
}
