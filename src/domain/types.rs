//! Shared domain types.
//!
//! These types are intentionally kept lightweight and immutable once built so a
//! single pipeline run can hand them from stage to stage without copying state
//! back into the stages that produced them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Scoring methodology of the catalog's discrete source classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    /// Combined photometry + astrometry + spectra.
    CombMod,
    /// Spectra only.
    SpecMod,
    /// Gaussian mixture over the "all other sources" model.
    AllosMod,
}

impl ScoringMethod {
    pub const ALL: [ScoringMethod; 3] = [ScoringMethod::CombMod, ScoringMethod::SpecMod, ScoringMethod::AllosMod];

    pub fn column_token(self) -> &'static str {
        match self {
            ScoringMethod::CombMod => "combmod",
            ScoringMethod::SpecMod => "specmod",
            ScoringMethod::AllosMod => "allosmod",
        }
    }
}

/// Classification category scored by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceClass {
    Star,
    BinaryStar,
    Galaxy,
    Quasar,
}

impl SourceClass {
    pub const ALL: [SourceClass; 4] = [
        SourceClass::Star,
        SourceClass::BinaryStar,
        SourceClass::Galaxy,
        SourceClass::Quasar,
    ];

    pub fn column_token(self) -> &'static str {
        match self {
            SourceClass::Star => "star",
            SourceClass::BinaryStar => "binarystar",
            SourceClass::Galaxy => "galaxy",
            SourceClass::Quasar => "quasar",
        }
    }
}

/// Per-methodology class probabilities for one object.
///
/// Only the (method, class) pairs the catalog actually scored are present;
/// e.g. the `allosmod` model has no binary-star column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    values: BTreeMap<(ScoringMethod, SourceClass), f64>,
}

impl ClassProbabilities {
    /// Every column the catalog publishes, in query order.
    pub const COLUMNS: [(ScoringMethod, SourceClass); 11] = [
        (ScoringMethod::CombMod, SourceClass::Star),
        (ScoringMethod::SpecMod, SourceClass::Star),
        (ScoringMethod::CombMod, SourceClass::BinaryStar),
        (ScoringMethod::SpecMod, SourceClass::BinaryStar),
        (ScoringMethod::CombMod, SourceClass::Galaxy),
        (ScoringMethod::SpecMod, SourceClass::Galaxy),
        (ScoringMethod::CombMod, SourceClass::Quasar),
        (ScoringMethod::SpecMod, SourceClass::Quasar),
        (ScoringMethod::AllosMod, SourceClass::Galaxy),
        (ScoringMethod::AllosMod, SourceClass::Star),
        (ScoringMethod::AllosMod, SourceClass::Quasar),
    ];

    pub fn column_name(method: ScoringMethod, class: SourceClass) -> String {
        format!("classprob_dsc_{}_{}", method.column_token(), class.column_token())
    }

    pub fn insert(&mut self, method: ScoringMethod, class: SourceClass, probability: f64) {
        self.values.insert((method, class), probability);
    }

    pub fn get(&self, method: ScoringMethod, class: SourceClass) -> Option<f64> {
        self.values.get(&(method, class)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScoringMethod, SourceClass, f64)> + '_ {
        self.values.iter().map(|(&(m, c), &p)| (m, c, p))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One catalog row for a single object (core astrometry + classification).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub source_id: u64,
    pub ra: f64,
    pub dec: f64,
    pub parallax: Option<f64>,
    pub parallax_over_error: Option<f64>,
    pub ruwe: Option<f64>,
    /// Whether sampled BP/RP spectra exist for this object.
    pub has_spectrum: bool,
    pub class_probabilities: ClassProbabilities,
}

/// Minimal catalog row: identifier and position only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub source_id: u64,
    pub ra: f64,
    pub dec: f64,
}

/// A validated resolution request: identifier XOR coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceQuery {
    Identifier(u64),
    Coordinates { ra: f64, dec: f64 },
}

impl SourceQuery {
    pub fn is_identifier(&self) -> bool {
        matches!(self, SourceQuery::Identifier(_))
    }
}

impl fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceQuery::Identifier(id) => write!(f, "source_id={id}"),
            SourceQuery::Coordinates { ra, dec } => write!(f, "ra={ra}, dec={dec}"),
        }
    }
}

/// A non-fatal quality concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityIssue {
    /// RUWE too high, parallax missing, or parallax S/N too low.
    PoorAstrometry,
    /// Classifier probabilities suggest the object is not a star.
    NonStellar(NonStellarReason),
}

/// Which probability raised a `NonStellar` issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NonStellarReason {
    /// Star probability below threshold.
    LowStarProbability,
    /// Galaxy or quasar probability at or above threshold (strict policy).
    GalaxyOrQuasar,
}

impl QualityIssue {
    pub fn message(self) -> &'static str {
        match self {
            QualityIssue::PoorAstrometry => "The source has poor parameters, it might not be properly resolved.",
            QualityIssue::NonStellar(NonStellarReason::LowStarProbability) => {
                "The source is most likely not a star (galaxy, quasar or unclassified)."
            }
            QualityIssue::NonStellar(NonStellarReason::GalaxyOrQuasar) => {
                "The source is most likely a galaxy or quasar."
            }
        }
    }
}

/// Outcome of the quality gate.
///
/// `missing_spectrum` dominates: when set, the verdict is a rejection no matter
/// which soft issues were also detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub issues: Vec<QualityIssue>,
    pub missing_spectrum: bool,
}

impl QualityVerdict {
    pub fn is_accepted(&self) -> bool {
        !self.missing_spectrum && self.issues.is_empty()
    }

    /// Semicolon-joined issue messages, in detection order.
    pub fn issue_summary(&self) -> String {
        self.issues.iter().map(|i| i.message()).collect::<Vec<_>>().join("; ")
    }
}

/// Raw flux series for one object, read from the staging area.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSample {
    /// Name of the staged product the flux was read from.
    pub product: String,
    pub flux: Vec<f64>,
}

/// Binary classification for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub source_id: u64,
    /// Rounded class label (0 or 1).
    pub label: u8,
    /// Sigmoid probability before rounding.
    pub probability: f64,
    /// Matched coordinates; only set when the request was by identifier.
    pub ra: Option<f64>,
    pub dec: Option<f64>,
}

/// Inbound request: either `{ source_id }` or `{ ra, dec }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ra: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dec: Option<f64>,
}

impl PredictionRequest {
    pub fn by_id(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Self::default()
        }
    }

    pub fn by_coordinates(ra: f64, dec: f64) -> Self {
        Self {
            source_id: None,
            ra: Some(ra),
            dec: Some(dec),
        }
    }
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Vec<f64>,
    pub probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ra: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dec: Option<f64>,
}

impl From<&PredictionResult> for PredictionResponse {
    fn from(result: &PredictionResult) -> Self {
        Self {
            prediction: vec![f64::from(result.label)],
            probability: result.probability,
            ra: result.ra,
            dec: result.dec,
        }
    }
}

/// States of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Start,
    Resolved,
    QualityChecked,
    DataFetched,
    Inferred,
    Done,
    /// Terminal failure, reachable from any non-terminal stage.
    Failed(ErrorKind),
}

impl PipelineStage {
    /// Stage a successful step from `self` leads to; terminal stages map to themselves.
    pub fn next(self) -> PipelineStage {
        match self {
            PipelineStage::Start => PipelineStage::Resolved,
            PipelineStage::Resolved => PipelineStage::QualityChecked,
            PipelineStage::QualityChecked => PipelineStage::DataFetched,
            PipelineStage::DataFetched => PipelineStage::Inferred,
            PipelineStage::Inferred => PipelineStage::Done,
            terminal @ (PipelineStage::Done | PipelineStage::Failed(_)) => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Start => "start",
            PipelineStage::Resolved => "resolved",
            PipelineStage::QualityChecked => "quality_checked",
            PipelineStage::DataFetched => "data_fetched",
            PipelineStage::Inferred => "inferred",
            PipelineStage::Done => "done",
            PipelineStage::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_probability_columns_match_catalog_names() {
        assert_eq!(
            ClassProbabilities::column_name(ScoringMethod::CombMod, SourceClass::BinaryStar),
            "classprob_dsc_combmod_binarystar"
        );
        assert_eq!(
            ClassProbabilities::column_name(ScoringMethod::AllosMod, SourceClass::Quasar),
            "classprob_dsc_allosmod_quasar"
        );
    }

    #[test]
    fn verdict_summary_joins_in_detection_order() {
        let verdict = QualityVerdict {
            issues: vec![
                QualityIssue::PoorAstrometry,
                QualityIssue::NonStellar(NonStellarReason::LowStarProbability),
            ],
            missing_spectrum: false,
        };
        assert!(!verdict.is_accepted());
        let summary = verdict.issue_summary();
        let (first, second) = summary.split_once("; ").unwrap();
        assert_eq!(first, QualityIssue::PoorAstrometry.message());
        assert_eq!(second, QualityIssue::NonStellar(NonStellarReason::LowStarProbability).message());
    }

    #[test]
    fn stages_advance_linearly_and_stop_at_terminals() {
        let mut stage = PipelineStage::Start;
        let mut seen = vec![stage.name()];
        while !stage.is_terminal() {
            stage = stage.next();
            seen.push(stage.name());
        }
        assert_eq!(
            seen,
            vec!["start", "resolved", "quality_checked", "data_fetched", "inferred", "done"]
        );
        let failed = PipelineStage::Failed(ErrorKind::NoData);
        assert_eq!(failed.next(), failed);
        assert_eq!(failed.name(), "failed");
    }

    #[test]
    fn response_only_carries_coordinates_when_present() {
        let result = PredictionResult {
            source_id: 1,
            label: 1,
            probability: 0.9,
            ra: None,
            dec: None,
        };
        let json = serde_json::to_string(&PredictionResponse::from(&result)).unwrap();
        assert_eq!(json, r#"{"prediction":[1.0],"probability":0.9}"#);
    }
}
