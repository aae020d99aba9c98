//! TestAdvisor CLI: process recorded test runs into signal documents
//!
//! ## Usage
//!
//! ```bash
//! testadvisor setup --set SandboxOrgName=acme   # Persist a registry property
//! testadvisor process                           # Process every unprocessed run
//! testadvisor process --run <dir> --force       # Reprocess one run
//! testadvisor status --format json              # List pending work
//! testadvisor show <dir>/test-signal.json       # Summarize a signal document
//! ```

use clap::Parser;
use std::process::ExitCode;
use testadvisor::{Processor, Registry, TestRunSignal};
use testadvisor_cli::{
    init_tracing, process_env, render_signal_summary, resolve_advisor_config, Cli, CliConfig,
    CliError, CliResult, Commands, OutputFormat, ProcessArgs, RunDriver, SetupArgs, ShowArgs,
    StatusArgs, StatusFormat, StatusReport, Verbosity,
};
use tracing::{debug, info};

const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity, config.log_format);
    debug!(version = CLI_VERSION, "testadvisor starting");

    match &cli.command {
        Commands::Setup(args) => run_setup(&cli, args),
        Commands::Process(args) => run_process(&cli, config, args),
        Commands::Status(args) => run_status(&cli, args),
        Commands::Show(args) => run_show(args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let parallel = match &cli.command {
        Commands::Process(args) => args.parallel,
        _ => 0,
    };
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.clone().into())
        .with_parallel_jobs(parallel)
        .with_log_format(cli.log_format.into())
}

fn open_registry(cli: &Cli) -> CliResult<Registry> {
    let registry = match &cli.registry {
        Some(root) => Registry::open(root.clone())?,
        None => Registry::from_env()?,
    };
    debug!(root = %registry.root().display(), "registry opened");
    Ok(registry)
}

fn run_setup(cli: &Cli, args: &SetupArgs) -> CliResult<()> {
    let registry = open_registry(cli)?;
    for (key, value) in &args.set {
        registry.save_property(key, value)?;
        info!(key = %key, "property saved");
    }
    print!("{}", registry.properties()?.render());
    Ok(())
}

fn run_process(cli: &Cli, config: CliConfig, args: &ProcessArgs) -> CliResult<()> {
    let registry = open_registry(cli)?;
    let advisor_config = resolve_advisor_config(&registry.properties()?, process_env, &cli.define);
    debug!(?advisor_config, "processing configuration");

    let processor = Processor::new(registry, advisor_config);
    let runs = match &args.run {
        Some(run) => {
            if !run.is_dir() {
                return Err(CliError::invalid_argument(format!(
                    "run directory not found: {}",
                    run.display()
                )));
            }
            vec![run.clone()]
        }
        None => processor.pending_runs(args.force)?,
    };

    let summary = RunDriver::new(&processor, config, CLI_VERSION).run(runs);
    if summary.all_ok() {
        Ok(())
    } else {
        Err(CliError::processing(format!(
            "{} of {} runs failed",
            summary.failed(),
            summary.outcomes.len()
        )))
    }
}

fn run_status(cli: &Cli, args: &StatusArgs) -> CliResult<()> {
    let registry = open_registry(cli)?;
    let report = StatusReport {
        unprocessed: registry.unprocessed_runs()?,
        ready_to_upload: registry.ready_to_upload_runs()?,
    };
    let format = match args.format {
        StatusFormat::Text => OutputFormat::Text,
        StatusFormat::Json => OutputFormat::Json,
    };
    let rendered = report
        .render(format)
        .map_err(|e| CliError::processing(format!("cannot render status: {e}")))?;
    print!("{rendered}");
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

fn run_show(args: &ShowArgs) -> CliResult<()> {
    let text = std::fs::read_to_string(&args.signal_file)?;
    let signal = TestRunSignal::from_json(&text)?;
    print!("{}", render_signal_summary(&signal));
    Ok(())
}
