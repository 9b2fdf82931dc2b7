//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - layers CLI flags over the environment configuration
//! - dispatches `predict`, `check` and `batch`
//! - prints JSON responses or terminal summaries

use clap::Parser;
use rayon::prelude::*;
use tracing::info;

use crate::cli::{BatchArgs, Cli, Command, CommonArgs, TargetArgs};
use crate::data::TapClient;
use crate::domain::{ClassificationPolicy, PipelineConfig};
use crate::error::AppError;
use crate::io::read_batch_requests;
use crate::quality::enforce;
use crate::report::{BatchLine, format_check_summary, format_error, format_prediction, to_json_line};

pub mod pipeline;

use pipeline::{Pipeline, RunContext, check_source};

/// Entry point for the `xpc` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::logging::init(&cli.common.log_level);

    let config = config_from_args(PipelineConfig::from_env()?, &cli.common);

    match cli.command {
        Command::Predict(args) => handle_predict(config, &args),
        Command::Check(args) => handle_check(config, &args),
        Command::Batch(args) => handle_batch(config, &args),
    }
}

fn handle_predict(config: PipelineConfig, args: &TargetArgs) -> Result<(), AppError> {
    let pipeline = Pipeline::from_config(config)?;
    match pipeline.run(&RunContext::generated(), &args.to_request()) {
        Ok(result) => {
            println!("{}", format_prediction(&result)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", format_error(&err)?);
            Err(err)
        }
    }
}

/// Prints the summary, then fails with the verdict's error kind if rejected.
fn handle_check(config: PipelineConfig, args: &TargetArgs) -> Result<(), AppError> {
    let catalog = TapClient::new(config.tap_url.clone(), config.request_timeout)?;
    let report = check_source(&catalog, &config, &RunContext::generated(), &args.to_request())?;
    println!("{}", format_check_summary(&report, &config.quality));
    enforce(&report.verdict)
}

/// Rows run independently; one JSON line per row, in file order.
fn handle_batch(config: PipelineConfig, args: &BatchArgs) -> Result<(), AppError> {
    let entries = read_batch_requests(&args.input)?;
    let pipeline = Pipeline::from_config(config)?;
    info!(rows = entries.len(), input = %args.input.display(), "Starting batch");

    let lines: Vec<BatchLine> = entries
        .par_iter()
        .map(|entry| {
            let ctx = RunContext::new(format!("batch-{}", entry.line));
            let outcome = match &entry.request {
                Ok(request) => pipeline.run(&ctx, request),
                Err(msg) => Err(AppError::invalid_request(format!("Line {}: {msg}", entry.line))),
            };
            BatchLine::from_outcome(entry.line, ctx.correlation_id, &outcome)
        })
        .collect();

    let failed = lines.iter().filter(|l| l.error.is_some()).count();
    for line in &lines {
        println!("{}", to_json_line(line)?);
    }
    info!(succeeded = lines.len() - failed, failed, "Batch finished");
    Ok(())
}

/// CLI flags override whatever the environment provided.
pub fn config_from_args(mut config: PipelineConfig, args: &CommonArgs) -> PipelineConfig {
    if let Some(dir) = &args.staging_dir {
        config.staging_root = dir.clone();
    }
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(url) = &args.tap_url {
        config.tap_url = url.clone();
    }
    if let Some(url) = &args.datalink_url {
        config.datalink_url = url.clone();
    }
    if args.strict {
        config.quality.policy = ClassificationPolicy::Strict;
    }
    config
}
