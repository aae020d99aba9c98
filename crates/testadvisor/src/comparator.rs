//! Screenshot comparison with rectangle clustering and exclusion masks.
//!
//! Pixels are compared on the summed absolute RGB delta. Differing pixels
//! are grouped into rectangles: two pixels belong to the same group when
//! their Chebyshev distance is at most the configured gap. Intersecting
//! groups are merged and groups below the minimum area are dropped.

use crate::config::AdvisorConfig;
use crate::result::{AdvisorError, AdvisorResult};
use crate::signal::Rectangle;
use image::{ImageEncoder, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Outline color of difference rectangles
const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Translucent fill of difference rectangles
const DIFF_FILL: Rgba<u8> = Rgba([255, 0, 0, 64]);
/// Outline color of excluded rectangles
const EXCLUDED_COLOR: Rgba<u8> = Rgba([0, 128, 255, 255]);

/// Verdict of a screenshot comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonState {
    /// Images agree within thresholds
    Match,
    /// Images differ beyond thresholds
    Mismatch,
    /// Images have different dimensions
    SizeMismatch,
}

/// Result of comparing two screenshots
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    /// Verdict
    pub state: ComparisonState,
    /// Difference rectangles that passed the minimum area filter
    pub rectangles: Vec<Rectangle>,
    /// Share of differing pixels, 0.0 to 100.0
    pub difference_percent: f64,
}

impl ComparisonResult {
    /// Whether the verdict is [`ComparisonState::Mismatch`]
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        self.state == ComparisonState::Mismatch
    }

    /// Difference percent as hundredths of a percent, clamped to 0..=10000
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn diff_ratio_hundredths(&self) -> u32 {
        (self.difference_percent * 100.0).round().clamp(0.0, 10_000.0) as u32
    }
}

/// Compares screenshot files and optionally writes annotated PNGs
#[derive(Debug, Clone)]
pub struct ScreenshotComparator {
    min_area: u64,
    min_ratio: f64,
    color_threshold: u32,
    rectangle_gap: u32,
    export_image: bool,
}

impl Default for ScreenshotComparator {
    fn default() -> Self {
        Self::from_config(&AdvisorConfig::default())
    }
}

impl ScreenshotComparator {
    /// Comparator tuned by a configuration snapshot
    #[must_use]
    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self {
            min_area: u64::from(config.screenshot_min_diff_area_size),
            min_ratio: f64::from(config.screenshot_min_diff_ratio),
            color_threshold: u32::from(config.color_threshold),
            rectangle_gap: config.rectangle_gap,
            export_image: config.export_screenshot_diff_image,
        }
    }

    /// Set minimum rectangle area in pixels
    #[must_use]
    pub const fn with_min_area(mut self, pixels: u64) -> Self {
        self.min_area = pixels;
        self
    }

    /// Set minimum difference percent for a mismatch
    #[must_use]
    pub const fn with_min_ratio(mut self, percent: f64) -> Self {
        self.min_ratio = percent;
        self
    }

    /// Set whether annotated PNGs are written
    #[must_use]
    pub const fn with_export_image(mut self, enabled: bool) -> Self {
        self.export_image = enabled;
        self
    }

    /// Compare two screenshot files
    ///
    /// # Errors
    ///
    /// Returns error if either image cannot be decoded or the annotated
    /// output cannot be written
    pub fn compare(
        &self,
        baseline: &Path,
        current: &Path,
        output: &Path,
    ) -> AdvisorResult<ComparisonResult> {
        self.compare_masked(baseline, current, output, &[])
    }

    /// Compare two screenshot files ignoring pixels inside `excluded`
    ///
    /// # Errors
    ///
    /// Returns error if either image cannot be decoded or the annotated
    /// output cannot be written
    pub fn compare_masked(
        &self,
        baseline: &Path,
        current: &Path,
        output: &Path,
        excluded: &[Rectangle],
    ) -> AdvisorResult<ComparisonResult> {
        let expected = load_rgba(baseline)?;
        let actual = load_rgba(current)?;
        let result = self.compare_images(&expected, &actual, excluded);

        if self.export_image {
            let annotated = annotate(&actual, &result, excluded);
            fs::write(output, encode_png(&annotated)?)?;
            debug!(path = %output.display(), "wrote comparison image");
        }

        Ok(result)
    }

    /// Compare decoded images
    #[must_use]
    pub fn compare_images(
        &self,
        expected: &RgbaImage,
        actual: &RgbaImage,
        excluded: &[Rectangle],
    ) -> ComparisonResult {
        if expected.dimensions() != actual.dimensions() {
            return ComparisonResult {
                state: ComparisonState::SizeMismatch,
                rectangles: Vec::new(),
                difference_percent: 100.0,
            };
        }

        let (width, height) = actual.dimensions();
        let total_pixels = u64::from(width) * u64::from(height);
        if total_pixels == 0 {
            return ComparisonResult {
                state: ComparisonState::Match,
                rectangles: Vec::new(),
                difference_percent: 0.0,
            };
        }

        let mut mask = vec![false; pixel_count(width, height)];
        let mut diff_pixels: u64 = 0;
        for (x, y, pixel) in actual.enumerate_pixels() {
            if excluded.iter().any(|r| r.contains(x, y)) {
                continue;
            }
            if pixel_diff(*pixel, *expected.get_pixel(x, y)) > self.color_threshold {
                mask[index_of(x, y, width)] = true;
                diff_pixels += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let difference_percent = diff_pixels as f64 / total_pixels as f64 * 100.0;

        let rectangles: Vec<Rectangle> = cluster(&mask, width, height, self.rectangle_gap)
            .into_iter()
            .filter(|r| r.area() >= self.min_area)
            .collect();

        let state = if rectangles.is_empty() || difference_percent < self.min_ratio {
            ComparisonState::Match
        } else {
            ComparisonState::Mismatch
        };

        ComparisonResult {
            state,
            rectangles,
            difference_percent,
        }
    }
}

fn load_rgba(path: &Path) -> AdvisorResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| AdvisorError::image_processing(format!("{}: {e}", path.display())))
}

/// Encode an RGBA image as PNG bytes
///
/// # Errors
///
/// Returns error if encoding fails
pub fn encode_png(img: &RgbaImage) -> AdvisorResult<Vec<u8>> {
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| AdvisorError::image_processing(format!("failed to encode PNG: {e}")))?;
    Ok(buffer)
}

/// Sum of absolute RGB channel differences
fn pixel_diff(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    let Rgba([r1, g1, b1, _]) = a;
    let Rgba([r2, g2, b2, _]) = b;
    u32::from(r1.abs_diff(r2)) + u32::from(g1.abs_diff(g2)) + u32::from(b1.abs_diff(b2))
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn index_of(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// Group marked pixels into bounding rectangles
#[allow(clippy::cast_possible_truncation)]
fn cluster(mask: &[bool], width: u32, height: u32, gap: u32) -> Vec<Rectangle> {
    let mut visited = vec![false; mask.len()];
    let mut queue = VecDeque::new();
    let mut rectangles = Vec::new();
    let w = width as usize;

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut rect = Rectangle::point((start % w) as u32, (start / w) as u32);

        while let Some(idx) = queue.pop_front() {
            let x = (idx % w) as u32;
            let y = (idx / w) as u32;
            rect.include(x, y);

            let x_end = x.saturating_add(gap).min(width - 1);
            let y_end = y.saturating_add(gap).min(height - 1);
            for ny in y.saturating_sub(gap)..=y_end {
                for nx in x.saturating_sub(gap)..=x_end {
                    let n = index_of(nx, ny, width);
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        rectangles.push(rect);
    }

    merge_intersecting(rectangles)
}

/// Merge rectangles until none intersect
fn merge_intersecting(mut rects: Vec<Rectangle>) -> Vec<Rectangle> {
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if rects[i].intersects(&rects[j]) {
                    let other = rects.swap_remove(j);
                    rects[i] = rects[i].union(&other);
                    merged = true;
                    break 'outer;
                }
            }
        }
    }
    rects.sort_by_key(|r| (r.min_y, r.min_x));
    rects
}

/// Copy of `actual` with difference rectangles highlighted and excluded
/// rectangles outlined
fn annotate(actual: &RgbaImage, result: &ComparisonResult, excluded: &[Rectangle]) -> RgbaImage {
    let mut img = actual.clone();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img;
    }

    if result.state == ComparisonState::SizeMismatch {
        draw_outline(&mut img, &Rectangle::new(0, 0, width - 1, height - 1), DIFF_COLOR);
        return img;
    }

    for rect in excluded {
        draw_outline(&mut img, rect, EXCLUDED_COLOR);
    }
    for rect in &result.rectangles {
        draw_highlight(&mut img, rect, DIFF_FILL);
        draw_outline(&mut img, rect, DIFF_COLOR);
    }
    img
}

fn draw_outline(img: &mut RgbaImage, rect: &Rectangle, color: Rgba<u8>) {
    let (width, height) = img.dimensions();
    if rect.min_x >= width || rect.min_y >= height {
        return;
    }
    let x_end = rect.max_x.min(width - 1);
    let y_end = rect.max_y.min(height - 1);

    for x in rect.min_x..=x_end {
        img.put_pixel(x, rect.min_y, color);
        img.put_pixel(x, y_end, color);
    }
    for y in rect.min_y..=y_end {
        img.put_pixel(rect.min_x, y, color);
        img.put_pixel(x_end, y, color);
    }
}

fn draw_highlight(img: &mut RgbaImage, rect: &Rectangle, color: Rgba<u8>) {
    let (width, height) = img.dimensions();
    let alpha = f32::from(color[3]) / 255.0;

    for y in rect.min_y..=rect.max_y.min(height.saturating_sub(1)) {
        for x in rect.min_x..=rect.max_x.min(width.saturating_sub(1)) {
            let pixel = *img.get_pixel(x, y);
            img.put_pixel(
                x,
                y,
                Rgba([
                    blend_channel(pixel[0], color[0], alpha),
                    blend_channel(pixel[1], color[1], alpha),
                    blend_channel(pixel[2], color[2], alpha),
                    255,
                ]),
            );
        }
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn blend_channel(base: u8, overlay: u8, alpha: f32) -> u8 {
    let result = f32::from(base).mul_add(1.0 - alpha, f32::from(overlay) * alpha);
    result.clamp(0.0, 255.0) as u8
}
