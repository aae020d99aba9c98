//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// TestAdvisor: turn recorded test runs into screenshot-aware signals
#[derive(Parser, Debug)]
#[command(name = "testadvisor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Registry root (defaults to $TESTADVISOR, then ./.testadvisor)
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Override a configuration key, e.g. -D testadvisor.screenshotcomparison=true
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_key_value, global = true)]
    pub define: Vec<(String, String)>,

    /// Log output format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write registry properties
    Setup(SetupArgs),

    /// Process test runs into signal documents
    Process(ProcessArgs),

    /// List unprocessed runs and signals ready to upload
    Status(StatusArgs),

    /// Summarize a signal document
    Show(ShowArgs),
}

/// Arguments for the setup command
#[derive(Parser, Debug)]
pub struct SetupArgs {
    /// Property to persist (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,
}

/// Arguments for the process command
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Process only this run directory
    #[arg(long)]
    pub run: Option<PathBuf>,

    /// Reprocess runs that already have a signal document
    #[arg(long)]
    pub force: bool,

    /// Number of parallel workers (0 = available parallelism)
    #[arg(short = 'j', long, default_value = "0")]
    pub parallel: usize,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, default_value = "text")]
    pub format: StatusFormat,
}

/// Arguments for the show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Path to a test-signal.json
    pub signal_file: PathBuf,
}

/// Status output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Parse `KEY=VALUE`. The value may be empty and may contain `=`.
///
/// # Errors
///
/// Returns error if there is no `=` or the key is empty
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
