//! `radiome`'s CLI entry point (§6): parses arguments, validates the
//! inputs/output directories and config file, builds the run's [`Context`],
//! loads the pipeline configuration, and drives [`Pipeline::run`] through
//! the selected executor (§5). Mirrors `cli.py`'s `main()` — argument
//! names, pre-execute validation order, and the exit-code convention (§6:
//! `0` success, `1` configuration/input failure, uncaught errors also
//! surface as `1`; `2` is reserved and unused here, matching the reference
//! runner).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cli_utils::{init_logging, install_error_handling, LoggingFormat, LoggingLevel};
use common::eyre::{bail, Context as _, Result};
use common::tracing::{error, info};
use execution_graph::ResourceEstimate;
use executor::{ParallelExecutor, SequentialExecutor};
use workflow::{parse_pipeline_config, Context, Pipeline, WorkflowRegistry};

/// Radiome Runner: executes a content-addressed pipeline of composable
/// sub-workflows against a BIDS-like input dataset.
#[derive(Debug, Parser)]
#[clap(name = "radiome", version, about = "Radiome Runner")]
struct Args {
    /// The directory with the input dataset.
    inputs_dir: PathBuf,

    /// The directory where the output files should be stored.
    output_dir: PathBuf,

    /// The location of the pipeline config file.
    #[clap(long = "config_file")]
    config_file: PathBuf,

    /// The label(s) of the participant(s) that should be analyzed. Every
    /// participant found in `inputs_dir` is analyzed when omitted.
    #[clap(long = "participant_label")]
    participant_label: Vec<String>,

    /// Number of CPUs available to the run.
    #[clap(long, default_value_t = 1)]
    n_cpus: usize,

    /// Memory budget, in megabytes, available to the run.
    #[clap(long, default_value_t = 4096)]
    memory_mb: u64,

    /// Dispatch jobs on the parallel executor instead of the sequential
    /// one (§5). The sequential executor is the default: deterministic,
    /// single-threaded, easiest to reason about when diagnosing a pipeline.
    #[clap(long)]
    parallel: bool,

    /// Worker slots for the parallel executor. Ignored unless `--parallel`
    /// is set.
    #[clap(long, default_value_t = 4)]
    n_workers: usize,

    /// Keep every job's working directory after the run completes instead
    /// of deleting it at `State` teardown (§3, §4.5).
    #[clap(long)]
    save_working_dir: bool,

    /// Emit additional diagnostics while building and running the graph.
    #[clap(long)]
    diagnostics: bool,

    #[clap(long, default_value = "info")]
    log_level: LoggingLevel,

    #[clap(long, default_value = "plain")]
    log_format: LoggingFormat,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = install_error_handling() {
        eprintln!("failed to install error reporting: {error}");
    }
    if let Err(error) = init_logging(args.log_level, args.log_format) {
        eprintln!("failed to initialize logging: {error}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            error!("{report:?}");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    validate_paths(&args)?;

    info!(
        inputs_dir = %args.inputs_dir.display(),
        output_dir = %args.output_dir.display(),
        "building pipeline",
    );

    let config_text = std::fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("couldn't read config file {}", args.config_file.display()))?;
    let pipeline_config = parse_pipeline_config(&config_text)
        .wrap_err("pipeline configuration failed to parse")?;

    let context = Context::new(
        args.output_dir.join(".radiome-work"),
        args.inputs_dir.clone(),
        args.output_dir.clone(),
        args.participant_label.clone(),
        args.n_cpus,
        args.memory_mb,
        args.save_working_dir,
        pipeline_config,
        args.diagnostics,
    );

    // No in-process sub-workflows are compiled into this binary: loading
    // one by path or by `gh://` locator is the dynamic plugin loader,
    // explicitly out of scope for this core (§1, §6). A distribution that
    // bundles concrete sub-workflows registers them here before the run.
    let registry = WorkflowRegistry::new();

    let gathered = if args.parallel {
        let executor = ParallelExecutor::new(
            context.working_dir.clone(),
            args.save_working_dir,
            ResourceEstimate {
                cpu: args.n_cpus as f64,
                memory: args.memory_mb as f64 / 1024.0,
                storage: f64::INFINITY,
            },
            args.n_workers,
        );
        Pipeline::run(&context, &registry, &executor).await?
    } else {
        let executor = SequentialExecutor::new(context.working_dir.clone(), args.save_working_dir);
        Pipeline::run(&context, &registry, &executor).await?
    };

    let total = gathered.iter().count();
    let invalid = gathered
        .iter()
        .filter(|(_, resource)| matches!(resource, execution_graph::Resource::Invalid(_)))
        .count();
    info!(total, invalid, "run complete");

    Ok(())
}

/// Pre-execute validation (§7's "configuration" error kind): the config
/// file and inputs directory must exist; the output directory is created
/// if missing. Mirrors `cli.py`'s checks, which run before anything else.
fn validate_paths(args: &Args) -> Result<()> {
    if !args.config_file.exists() {
        bail!("couldn't find config file {}", args.config_file.display());
    }
    if !args.inputs_dir.exists() {
        bail!("invalid inputs dir {}", args.inputs_dir.display());
    }
    if !args.output_dir.exists() {
        std::fs::create_dir_all(&args.output_dir).wrap_err_with(|| {
            format!("invalid output dir {}", args.output_dir.display())
        })?;
        info!(
            "output dir {} didn't exist, created",
            args.output_dir.display()
        );
    }
    Ok(())
}
