//! Step reduction and monotone step alignment.
//!
//! A step is an event that carries a screenshot. Steps are referenced by
//! index into the owning test case's time-sorted event list, so alignment
//! never clones events.

use crate::model::TestEvent;
use std::fs::File;
use std::path::Path;

/// A current step paired with the baseline step it was aligned to.
/// Both fields index into the respective step lists, not event lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMatch {
    /// Index into the current step list
    pub current: usize,
    /// Index into the baseline step list
    pub baseline: usize,
}

/// Reduce time-sorted events to step indices.
///
/// Events without a screenshot are skipped. An event equivalent to the
/// previously retained step (same command and locator) is collapsed into
/// it, keeping the first occurrence.
#[must_use]
pub fn reduce_steps(events: &[TestEvent]) -> Vec<usize> {
    let mut steps: Vec<usize> = Vec::new();
    for (index, event) in events.iter().enumerate() {
        if !event.is_step_candidate() {
            continue;
        }
        if let Some(&last) = steps.last() {
            if events[last].same_action(event) {
                continue;
            }
        }
        steps.push(index);
    }
    steps
}

/// Screenshot exists as a readable regular file
#[must_use]
pub fn screenshot_readable(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

/// Greedy monotone alignment of current steps against baseline steps.
///
/// For each current step the baseline cursor advances past steps with a
/// different action. A pair is emitted only when `usable` accepts both
/// screenshots; the cursor then moves past the matched baseline step. A
/// rejected pair leaves the cursor in place.
pub fn align_steps<F>(current: &[&TestEvent], baseline: &[&TestEvent], usable: F) -> Vec<StepMatch>
where
    F: Fn(&Path) -> bool,
{
    let mut matches = Vec::new();
    let mut j = 0;

    for (i, step) in current.iter().enumerate() {
        while j < baseline.len() && !step.same_action(baseline[j]) {
            j += 1;
        }
        if j >= baseline.len() {
            continue;
        }
        let both_usable = step.screenshot().is_some_and(&usable)
            && baseline[j].screenshot().is_some_and(&usable);
        if both_usable {
            matches.push(StepMatch {
                current: i,
                baseline: j,
            });
            j += 1;
        }
    }

    matches
}

/// Integer percentage of current steps that found a baseline match.
/// Zero when there are no current steps.
#[must_use]
pub fn similarity(matched: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let percent = matched.min(total) * 100 / total;
    u32::try_from(percent).unwrap_or(100)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn step(cmd: &str, locator: &str, t: i64) -> TestEvent {
        TestEvent::new("SELENIUM", cmd, "INFO", at(t))
            .with_command(cmd, "", locator)
            .with_screenshot(format!("{t}.png"), u32::try_from(t).unwrap())
    }

    fn always(_: &Path) -> bool {
        true
    }

    mod reduce_tests {
        use super::*;

        #[test]
        fn test_skips_events_without_screenshot() {
            let events = vec![
                TestEvent::new("A", "", "INFO", at(0)),
                step("click", "#a", 1),
                TestEvent::new("B", "", "WARNING", at(2)).with_screenshot("", 9),
                step("click", "#b", 3),
            ];
            assert_eq!(reduce_steps(&events), vec![1, 3]);
        }

        #[test]
        fn test_collapses_consecutive_duplicates() {
            let events = vec![
                step("click", "#a", 1),
                step("click", "#a", 2),
                TestEvent::new("log", "", "INFO", at(3)),
                step("click", "#a", 4),
                step("type", "#a", 5),
                step("click", "#a", 6),
            ];
            assert_eq!(reduce_steps(&events), vec![0, 4, 5]);
        }

        #[test]
        fn test_param_does_not_split_steps() {
            let events = vec![
                step("type", "#q", 1).with_command("type", "foo", "#q"),
                step("type", "#q", 2).with_command("type", "bar", "#q"),
            ];
            assert_eq!(reduce_steps(&events), vec![0]);
        }
    }

    mod align_tests {
        use super::*;

        #[test]
        fn test_identical_sequences() {
            let a = [step("c", "#1", 1), step("c", "#2", 2)];
            let b = [step("c", "#1", 1), step("c", "#2", 2)];
            let cur: Vec<_> = a.iter().collect();
            let base: Vec<_> = b.iter().collect();
            let m = align_steps(&cur, &base, always);
            assert_eq!(
                m,
                vec![
                    StepMatch { current: 0, baseline: 0 },
                    StepMatch { current: 1, baseline: 1 }
                ]
            );
        }

        #[test]
        fn test_baseline_extra_leading_step() {
            let base_events = [step("c", "A", 1), step("c", "B", 2), step("c", "C", 3)];
            let cur_events = [step("c", "B", 1), step("c", "C", 2)];
            let cur: Vec<_> = cur_events.iter().collect();
            let base: Vec<_> = base_events.iter().collect();
            let m = align_steps(&cur, &base, always);
            assert_eq!(
                m,
                vec![
                    StepMatch { current: 0, baseline: 1 },
                    StepMatch { current: 1, baseline: 2 }
                ]
            );
        }

        #[test]
        fn test_never_rewinds_baseline() {
            let base_events = [step("c", "B", 1), step("c", "A", 2)];
            let cur_events = [step("c", "A", 1), step("c", "B", 2)];
            let cur: Vec<_> = cur_events.iter().collect();
            let base: Vec<_> = base_events.iter().collect();
            let m = align_steps(&cur, &base, always);
            assert_eq!(m, vec![StepMatch { current: 0, baseline: 1 }]);
        }

        #[test]
        fn test_missing_screenshot_blocks_match() {
            let base_events = [step("c", "A", 1), step("c", "B", 2)];
            let cur_events = [step("c", "A", 1), step("c", "B", 2)];
            let cur: Vec<_> = cur_events.iter().collect();
            let base: Vec<_> = base_events.iter().collect();
            let m = align_steps(&cur, &base, |p| p != Path::new("1.png"));
            assert_eq!(m, vec![StepMatch { current: 1, baseline: 1 }]);
        }

        #[test]
        fn test_screenshot_readable() {
            let dir = tempfile::TempDir::new().unwrap();
            let file = dir.path().join("a.png");
            std::fs::write(&file, b"png").unwrap();
            assert!(screenshot_readable(&file));
            assert!(!screenshot_readable(dir.path()));
            assert!(!screenshot_readable(&dir.path().join("missing.png")));
        }
    }

    mod similarity_tests {
        use super::*;

        #[test]
        fn test_similarity_values() {
            assert_eq!(similarity(0, 0), 0);
            assert_eq!(similarity(2, 2), 100);
            assert_eq!(similarity(1, 3), 33);
            assert_eq!(similarity(2, 3), 66);
            assert_eq!(similarity(0, 5), 0);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_events() -> impl Strategy<Value = Vec<TestEvent>> {
            prop::collection::vec((0usize..3, 0usize..3, any::<bool>()), 0..30).prop_map(|specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(t, (cmd, loc, shot))| {
                        let t = i64::try_from(t).unwrap();
                        let event = TestEvent::new("S", "", "INFO", at(t))
                            .with_command(format!("cmd{cmd}"), "", format!("#l{loc}"));
                        if shot {
                            event.with_screenshot(format!("{t}.png"), 1)
                        } else {
                            event
                        }
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_reduction_is_idempotent(events in arb_events()) {
                let steps = reduce_steps(&events);
                let reduced: Vec<TestEvent> = steps.iter().map(|&i| events[i].clone()).collect();
                let again = reduce_steps(&reduced);
                prop_assert_eq!(again, (0..reduced.len()).collect::<Vec<_>>());
            }

            #[test]
            fn prop_alignment_is_monotone(
                cur_events in arb_events(),
                base_events in arb_events(),
                missing in 0usize..40
            ) {
                let missing = format!("{missing}.png");
                let cur: Vec<&TestEvent> = reduce_steps(&cur_events).into_iter().map(|i| &cur_events[i]).collect();
                let base: Vec<&TestEvent> = reduce_steps(&base_events).into_iter().map(|i| &base_events[i]).collect();
                let matches = align_steps(&cur, &base, |p| p != Path::new(&missing));

                for pair in matches.windows(2) {
                    prop_assert!(pair[0].current < pair[1].current);
                    prop_assert!(pair[0].baseline < pair[1].baseline);
                }
                for m in &matches {
                    prop_assert!(cur[m.current].same_action(base[m.baseline]));
                }
            }

            #[test]
            fn prop_similarity_bounds(total in 0usize..200, matched in 0usize..200) {
                let matched = matched.min(total);
                let score = similarity(matched, total);
                prop_assert!(score <= 100);
                prop_assert_eq!(score == 100, total > 0 && matched == total);
            }
        }
    }
}
