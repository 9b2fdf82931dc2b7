//! Accept/reject a resolved source before any data is downloaded.
//!
//! `check_quality` is a pure function of the row and the thresholds. Every
//! condition is evaluated; soft issues are collected in a fixed order
//! (astrometry, then classification) so the reported summary is stable.

use tracing::{debug, warn};

use crate::domain::{
    ClassificationPolicy, NonStellarReason, QualityIssue, QualityThresholds, QualityVerdict, ResolvedSource, ScoringMethod,
    SourceClass,
};
use crate::error::{AppError, ErrorKind};

pub const NO_SPECTRUM_MESSAGE: &str = "The source has no BP-RP spectrum data in Gaia Data Release 3!";

/// Methods whose star probability must clear `star_prob_min`.
const STAR_METHODS: [ScoringMethod; 2] = [ScoringMethod::CombMod, ScoringMethod::SpecMod];

pub fn check_quality(source: &ResolvedSource, thresholds: &QualityThresholds) -> QualityVerdict {
    let mut issues = Vec::new();
    if has_poor_astrometry(source, thresholds) {
        issues.push(QualityIssue::PoorAstrometry);
    }
    if let Some(reason) = non_stellar_reason(source, thresholds) {
        issues.push(QualityIssue::NonStellar(reason));
    }
    QualityVerdict {
        issues,
        missing_spectrum: !source.has_spectrum,
    }
}

/// Turn a verdict into the stage result.
///
/// A missing spectrum is reported instead of any soft issues.
pub fn enforce(verdict: &QualityVerdict) -> Result<(), AppError> {
    if verdict.missing_spectrum {
        return Err(AppError::new(ErrorKind::NoData, NO_SPECTRUM_MESSAGE));
    }
    if !verdict.issues.is_empty() {
        return Err(AppError::new(ErrorKind::PoorQuality, verdict.issue_summary()));
    }
    Ok(())
}

/// Check and enforce in one step, logging the outcome.
pub fn gate(source: &ResolvedSource, thresholds: &QualityThresholds) -> Result<QualityVerdict, AppError> {
    let verdict = check_quality(source, thresholds);
    debug!(
        source_id = source.source_id,
        ruwe = ?source.ruwe,
        parallax_over_error = ?source.parallax_over_error,
        issues = verdict.issues.len(),
        missing_spectrum = verdict.missing_spectrum,
        "Quality verdict"
    );
    if let Err(e) = enforce(&verdict) {
        warn!(source_id = source.source_id, kind = e.kind().name(), "{}", e.message());
        return Err(e);
    }
    Ok(verdict)
}

/// Null RUWE or null parallax S/N count as failing, like a null parallax.
fn has_poor_astrometry(source: &ResolvedSource, t: &QualityThresholds) -> bool {
    let ruwe_bad = source.ruwe.is_none_or(|r| r > t.ruwe_max);
    let parallax_missing = source.parallax.is_none();
    let snr_bad = source
        .parallax_over_error
        .is_none_or(|poe| poe <= t.parallax_over_error_min);
    ruwe_bad || parallax_missing || snr_bad
}

/// Missing probabilities never raise the issue on their own.
fn non_stellar_reason(source: &ResolvedSource, t: &QualityThresholds) -> Option<NonStellarReason> {
    let probs = &source.class_probabilities;
    let low_star = STAR_METHODS
        .iter()
        .filter_map(|&m| probs.get(m, SourceClass::Star))
        .any(|p| p < t.star_prob_min);
    if low_star {
        return Some(NonStellarReason::LowStarProbability);
    }
    let galaxy_or_quasar = match t.policy {
        ClassificationPolicy::StarProbability => false,
        ClassificationPolicy::Strict => probs
            .iter()
            .any(|(_, class, p)| matches!(class, SourceClass::Galaxy | SourceClass::Quasar) && p >= t.non_stellar_prob_max),
    };
    galaxy_or_quasar.then_some(NonStellarReason::GalaxyOrQuasar)
}
