//! Run configuration.
//!
//! Defaults match the public Gaia archive and the thresholds the quality gate
//! was tuned with. `from_env` layers `.env`/process variables on top; the CLI
//! then overrides individual fields.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_TAP_URL: &str = "https://gea.esac.esa.int/tap-server/tap/sync";
pub const DEFAULT_DATALINK_URL: &str = "https://gea.esac.esa.int/data-server/data";
pub const DEFAULT_DATA_RELEASE: &str = "Gaia DR3";
pub const DEFAULT_RETRIEVAL_TYPE: &str = "XP_SAMPLED";
pub const DEFAULT_STAGING_DIR: &str = "./temp";
pub const DEFAULT_MODEL_PATH: &str = "./models/cnn_ensemble.json";

/// Which classification probabilities count as a non-stellar soft issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationPolicy {
    /// Star probability below threshold under combmod or specmod.
    #[default]
    StarProbability,
    /// Additionally, galaxy/quasar probability at or above threshold under any method.
    Strict,
}

/// Thresholds applied by the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// RUWE above this is poor astrometry.
    pub ruwe_max: f64,
    /// Parallax S/N at or below this is poor astrometry.
    pub parallax_over_error_min: f64,
    /// Star probability below this is a non-stellar issue.
    pub star_prob_min: f64,
    /// Galaxy/quasar probability at or above this is a non-stellar issue (strict policy).
    pub non_stellar_prob_max: f64,
    pub policy: ClassificationPolicy,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            ruwe_max: 1.4,
            parallax_over_error_min: 3.0,
            star_prob_min: 0.5,
            non_stellar_prob_max: 0.5,
            policy: ClassificationPolicy::StarProbability,
        }
    }
}

/// Angular search box used to turn coordinates into the nearest catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeBox {
    pub width_deg: f64,
    pub height_deg: f64,
}

impl Default for ConeBox {
    fn default() -> Self {
        Self {
            width_deg: 0.1,
            height_deg: 0.1,
        }
    }
}

/// Everything a pipeline run needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub tap_url: String,
    pub datalink_url: String,
    pub data_release: String,
    pub retrieval_type: String,
    pub cone_box: ConeBox,
    pub request_timeout: Duration,
    /// Parent of the per-run staging directories.
    pub staging_root: PathBuf,
    pub model_path: PathBuf,
    pub quality: QualityThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tap_url: DEFAULT_TAP_URL.to_string(),
            datalink_url: DEFAULT_DATALINK_URL.to_string(),
            data_release: DEFAULT_DATA_RELEASE.to_string(),
            retrieval_type: DEFAULT_RETRIEVAL_TYPE.to_string(),
            cone_box: ConeBox::default(),
            request_timeout: Duration::from_secs(60),
            staging_root: PathBuf::from(DEFAULT_STAGING_DIR),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            quality: QualityThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Build from `.env` and process environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (unset variables keep defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(url) = lookup("GAIA_TAP_URL") {
            config.tap_url = url;
        }
        if let Some(url) = lookup("GAIA_DATALINK_URL") {
            config.datalink_url = url;
        }
        if let Some(dir) = lookup("STAGING_DIR") {
            config.staging_root = PathBuf::from(dir);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                AppError::internal(format!("Invalid REQUEST_TIMEOUT_SECS '{raw}': {e}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
