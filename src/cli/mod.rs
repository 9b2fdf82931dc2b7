//! Command-line parsing for the Gaia XP spectrum classifier.
//!
//! Argument parsing stays here; dispatch lives in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::PredictionRequest;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "xpc", version, about = "Gaia XP spectrum classifier (resolve, gate, fetch, infer)")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline for one source and print the JSON response.
    Predict(TargetArgs),
    /// Resolve a source and print its quality verdict (no download).
    Check(TargetArgs),
    /// Run the pipeline for every row of a CSV file, in parallel.
    Batch(BatchArgs),
}

/// Options shared by every command. Unset values fall back to the environment.
#[derive(Debug, Args, Clone, Default)]
pub struct CommonArgs {
    /// Parent directory for per-run staging directories (env: STAGING_DIR).
    #[arg(long, global = true)]
    pub staging_dir: Option<PathBuf>,

    /// Model weight file (env: MODEL_PATH).
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// Catalog TAP sync endpoint (env: GAIA_TAP_URL).
    #[arg(long, global = true)]
    pub tap_url: Option<String>,

    /// Bulk data endpoint (env: GAIA_DATALINK_URL).
    #[arg(long, global = true)]
    pub datalink_url: Option<String>,

    /// Also reject sources with galaxy/quasar probability >= 0.5.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

/// Source selection: an identifier or a coordinate pair.
#[derive(Debug, Args, Clone)]
pub struct TargetArgs {
    /// Catalog identifier, e.g. "Gaia DR3 4111834567779557376".
    #[arg(long)]
    pub id: Option<String>,

    /// Right ascension in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub ra: Option<f64>,

    /// Declination in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub dec: Option<f64>,
}

impl TargetArgs {
    /// Validation of the combination happens in the pipeline.
    pub fn to_request(&self) -> PredictionRequest {
        PredictionRequest {
            source_id: self.id.clone(),
            ra: self.ra,
            dec: self.dec,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    /// CSV with `source_id`, `ra`, `dec` columns (blank cells mean absent).
    #[arg(long, short = 'i')]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_declination_and_global_flags() {
        let cli = Cli::try_parse_from([
            "xpc", "predict", "--ra", "256.52", "--dec", "-26.58", "--strict", "--staging-dir", "/tmp/xp",
        ])
        .unwrap();
        assert!(cli.common.strict);
        assert_eq!(cli.common.staging_dir, Some(PathBuf::from("/tmp/xp")));
        let Command::Predict(target) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(target.to_request(), PredictionRequest::by_coordinates(256.52, -26.58));
    }

    #[test]
    fn batch_requires_input() {
        assert!(Cli::try_parse_from(["xpc", "batch"]).is_err());
        let cli = Cli::try_parse_from(["xpc", "batch", "--input", "rows.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Batch(_)));
    }
}
