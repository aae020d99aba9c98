//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use testadvisor::TestRunSignal;

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Registry listing printed by `status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Run directories without a signal document
    pub unprocessed: Vec<PathBuf>,
    /// Signal documents awaiting upload
    pub ready_to_upload: Vec<PathBuf>,
}

impl StatusReport {
    /// Render in the requested format
    ///
    /// # Errors
    ///
    /// Returns error if JSON serialization fails
    pub fn render(&self, format: OutputFormat) -> serde_json::Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Text => {
                let mut out = format!("Unprocessed runs: {}\n", self.unprocessed.len());
                for run in &self.unprocessed {
                    out.push_str(&format!("  {}\n", run.display()));
                }
                out.push_str(&format!("Ready to upload: {}\n", self.ready_to_upload.len()));
                for signal in &self.ready_to_upload {
                    out.push_str(&format!("  {}\n", signal.display()));
                }
                Ok(out)
            }
        }
    }
}

/// One-screen summary of a signal document
#[must_use]
pub fn render_signal_summary(signal: &TestRunSignal) -> String {
    let mut out = format!("Test run {}\n", signal.test_run_id);
    if !signal.test_suite_name.is_empty() {
        out.push_str(&format!("Suite: {}\n", signal.test_suite_name));
    }
    if !signal.client_build_id.is_empty() {
        out.push_str(&format!("Build: {}\n", signal.client_build_id));
    }
    out.push_str(&format!("Test cases: {}\n", signal.test_executions.len()));
    for execution in &signal.test_executions {
        let status = execution.status.map_or("-", |s| s.name());
        out.push_str(&format!(
            "  {} [{}] similarity {}%, {} signals ({} visual)",
            execution.test_case_name,
            status,
            execution.similarity,
            execution.test_signals.len(),
            execution.visual_signal_count(),
        ));
        if let Some(baseline) = &execution.baseline_build_id {
            out.push_str(&format!(", baseline {baseline}"));
        }
        out.push('\n');
    }
    out
}

/// Progress reporter for run processing
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` runs
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("✓", "OK", Style::new().green().bold(), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // shown even in quiet mode
        self.line("✗", "FAIL", Style::new().red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("⚠", "WARN", Style::new().yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("ℹ", "INFO", Style::new().blue().bold(), message);
    }

    fn line(&self, symbol: &str, plain: &str, prefix_style: Style, message: &str) {
        let prefix = if self.use_color {
            prefix_style.apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        let line = format!("{prefix} {message}");
        match self.progress_bar {
            Some(ref pb) if !pb.is_finished() => pb.println(line),
            _ => {
                let _ = self.term.write_line(&line);
            }
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the processing summary
    pub fn summary(&self, processed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");
        let _ = self
            .term
            .write_line(&summary_line(processed, failed, duration, self.use_color));
    }
}

fn summary_line(processed: usize, failed: usize, duration: Duration, use_color: bool) -> String {
    let total = processed + failed;
    let secs = duration.as_secs_f64();
    if use_color {
        let status = if failed > 0 {
            style("FAILED").red().bold().to_string()
        } else {
            style("DONE").green().bold().to_string()
        };
        let failed_text = if failed > 0 {
            Style::new().red().apply_to(failed).to_string()
        } else {
            failed.to_string()
        };
        format!(
            "{status} {total} runs in {secs:.2}s ({} processed, {failed_text} failed)",
            Style::new().green().apply_to(processed)
        )
    } else {
        let status = if failed > 0 { "FAILED" } else { "DONE" };
        format!("{status} {total} runs in {secs:.2}s ({processed} processed, {failed} failed)")
    }
}
