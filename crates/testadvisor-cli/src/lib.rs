//! TestAdvisor CLI library
//!
//! Command-line front end for the `testadvisor` crate: registry setup,
//! run processing, status listing and signal inspection.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)] // String building is clear and correct
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod logging;
mod output;
mod runner;

pub use commands::{
    parse_key_value, Cli, ColorArg, Commands, LogFormatArg, ProcessArgs, SetupArgs, ShowArgs,
    StatusArgs, StatusFormat,
};
pub use config::{
    process_env, resolve_advisor_config, CliConfig, ColorChoice, LogFormat, Verbosity,
};
pub use error::{CliError, CliResult};
pub use logging::{default_filter, init_tracing};
pub use output::{render_signal_summary, OutputFormat, ProgressReporter, StatusReport};
pub use runner::{ProcessSummary, RunDriver};
