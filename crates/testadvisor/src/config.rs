//! Processing configuration.
//!
//! An [`AdvisorConfig`] is an immutable snapshot taken when a processor is
//! built. Values come from `testadvisor.*` keys; see [`AdvisorConfig::from_lookup`].

use crate::model::EventLevel;
use crate::signal::StatusMatch;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Master switch for screenshot comparison
pub const SCREENSHOT_COMPARISON_KEY: &str = "testadvisor.screenshotcomparison";
/// Minimum level for non-visual signals
pub const SIGNAL_LEVEL_KEY: &str = "testadvisor.signallevel";
/// Write a `.diffareas.json` sidecar for each mismatch
pub const EXPORT_DIFF_AREA_KEY: &str = "testadvisor.exportscreenshotdiffarea";
/// Write annotated comparison PNGs
pub const EXPORT_DIFF_IMAGE_KEY: &str = "testadvisor.exportscreenshotdiffimage";
/// Minimum rectangle area in pixels
pub const MIN_DIFF_AREA_SIZE_KEY: &str = "testadvisor.screenshotmindiffareasize";
/// Minimum difference in percent
pub const MIN_DIFF_RATIO_KEY: &str = "testadvisor.screenshotmindiffratio";
/// Status matching mode (`partial` or `exact`)
pub const STATUS_MATCH_KEY: &str = "testadvisor.statusmatch";
/// Per-pixel color tolerance (sum of RGB channel deltas)
pub const COLOR_THRESHOLD_KEY: &str = "testadvisor.colorthreshold";
/// Pixel gap under which differing pixels join one rectangle
pub const RECTANGLE_GAP_KEY: &str = "testadvisor.rectanglegap";

/// Every recognized key
pub const CONFIG_KEYS: [&str; 9] = [
    SCREENSHOT_COMPARISON_KEY,
    SIGNAL_LEVEL_KEY,
    EXPORT_DIFF_AREA_KEY,
    EXPORT_DIFF_IMAGE_KEY,
    MIN_DIFF_AREA_SIZE_KEY,
    MIN_DIFF_RATIO_KEY,
    STATUS_MATCH_KEY,
    COLOR_THRESHOLD_KEY,
    RECTANGLE_GAP_KEY,
];

/// Processing configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Run the excluded-area discovery and screenshot scoring passes
    pub screenshot_comparison: bool,
    /// Minimum level for non-visual signals
    pub signal_level: EventLevel,
    /// Write rectangle sidecars for mismatches
    pub export_screenshot_diff_area: bool,
    /// Write annotated comparison images
    pub export_screenshot_diff_image: bool,
    /// Rectangles smaller than this many pixels are ignored
    pub screenshot_min_diff_area_size: u32,
    /// Differences below this percentage are reported as a match
    pub screenshot_min_diff_ratio: u32,
    /// Status mapping mode
    pub status_match: StatusMatch,
    /// Per-pixel color tolerance (0-765)
    pub color_threshold: u16,
    /// Gap in pixels bridged when grouping differences into rectangles
    pub rectangle_gap: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            screenshot_comparison: false,
            signal_level: EventLevel::Warning,
            export_screenshot_diff_area: false,
            export_screenshot_diff_image: false,
            screenshot_min_diff_area_size: 20,
            screenshot_min_diff_ratio: 1,
            status_match: StatusMatch::Partial,
            color_threshold: 10,
            rectangle_gap: 5,
        }
    }
}

impl AdvisorConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a key lookup.
    ///
    /// Missing keys keep their default. Values that do not parse are logged
    /// and also keep their default.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            screenshot_comparison: read_bool(&lookup, SCREENSHOT_COMPARISON_KEY)
                .unwrap_or(defaults.screenshot_comparison),
            signal_level: read_parsed(&lookup, SIGNAL_LEVEL_KEY).unwrap_or(defaults.signal_level),
            export_screenshot_diff_area: read_bool(&lookup, EXPORT_DIFF_AREA_KEY)
                .unwrap_or(defaults.export_screenshot_diff_area),
            export_screenshot_diff_image: read_bool(&lookup, EXPORT_DIFF_IMAGE_KEY)
                .unwrap_or(defaults.export_screenshot_diff_image),
            screenshot_min_diff_area_size: read_parsed(&lookup, MIN_DIFF_AREA_SIZE_KEY)
                .unwrap_or(defaults.screenshot_min_diff_area_size),
            screenshot_min_diff_ratio: read_parsed(&lookup, MIN_DIFF_RATIO_KEY)
                .unwrap_or(defaults.screenshot_min_diff_ratio),
            status_match: read_parsed(&lookup, STATUS_MATCH_KEY).unwrap_or(defaults.status_match),
            color_threshold: read_parsed(&lookup, COLOR_THRESHOLD_KEY)
                .unwrap_or(defaults.color_threshold),
            rectangle_gap: read_parsed(&lookup, RECTANGLE_GAP_KEY)
                .unwrap_or(defaults.rectangle_gap),
        }
    }

    /// Environment variable name for a key, e.g.
    /// `testadvisor.signallevel` → `TESTADVISOR_SIGNALLEVEL`
    #[must_use]
    pub fn env_var_name(key: &str) -> String {
        key.to_ascii_uppercase().replace('.', "_")
    }

    /// Enable or disable screenshot comparison
    #[must_use]
    pub const fn with_screenshot_comparison(mut self, enabled: bool) -> Self {
        self.screenshot_comparison = enabled;
        self
    }

    /// Set the minimum signal level
    #[must_use]
    pub const fn with_signal_level(mut self, level: EventLevel) -> Self {
        self.signal_level = level;
        self
    }

    /// Enable rectangle sidecar export
    #[must_use]
    pub const fn with_export_diff_area(mut self, enabled: bool) -> Self {
        self.export_screenshot_diff_area = enabled;
        self
    }

    /// Enable annotated image export
    #[must_use]
    pub const fn with_export_diff_image(mut self, enabled: bool) -> Self {
        self.export_screenshot_diff_image = enabled;
        self
    }

    /// Set the minimum rectangle area
    #[must_use]
    pub const fn with_min_diff_area_size(mut self, pixels: u32) -> Self {
        self.screenshot_min_diff_area_size = pixels;
        self
    }

    /// Set the minimum difference percentage
    #[must_use]
    pub const fn with_min_diff_ratio(mut self, percent: u32) -> Self {
        self.screenshot_min_diff_ratio = percent;
        self
    }

    /// Set the status match mode
    #[must_use]
    pub const fn with_status_match(mut self, mode: StatusMatch) -> Self {
        self.status_match = mode;
        self
    }

    /// Set the per-pixel color tolerance
    #[must_use]
    pub const fn with_color_threshold(mut self, threshold: u16) -> Self {
        self.color_threshold = threshold;
        self
    }

    /// Set the rectangle grouping gap
    #[must_use]
    pub const fn with_rectangle_gap(mut self, gap: u32) -> Self {
        self.rectangle_gap = gap;
        self
    }

    /// Whether a non-visual signal is emitted for an event level
    #[must_use]
    pub fn emits_signal_for(&self, level: Option<EventLevel>) -> bool {
        level.is_some_and(|l| l.is_reportable() && l >= self.signal_level)
    }
}

fn read_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" | "" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "invalid boolean configuration value, using default");
            None
        }
    }
}

fn read_parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "invalid configuration value, using default");
            None
        }
    }
}
