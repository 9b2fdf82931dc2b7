//! Output formatting for the `xpc` commands.

use serde::Serialize;

use crate::app::pipeline::CheckReport;
use crate::domain::{ClassificationPolicy, ClassProbabilities, PredictionResponse, PredictionResult, QualityThresholds};
use crate::error::AppError;
use crate::quality::enforce;

/// Compact JSON for one value, as printed on stdout.
pub fn to_json_line<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::internal(format!("Failed to serialize output: {e}")))
}

pub fn format_prediction(result: &PredictionResult) -> Result<String, AppError> {
    to_json_line(&PredictionResponse::from(result))
}

pub fn format_error(err: &AppError) -> Result<String, AppError> {
    to_json_line(&err.to_response())
}

/// Terminal summary for `xpc check`.
pub fn format_check_summary(report: &CheckReport, thresholds: &QualityThresholds) -> String {
    let source = &report.source;
    let mut out = String::new();

    out.push_str("=== xpc - Source Check ===\n");
    out.push_str(&format!("Query: {}\n", report.query));
    out.push_str(&format!("Source: {}\n", source.source_id));
    out.push_str(&format!("Position: ra={:.6} dec={:.6}\n", source.ra, source.dec));
    out.push_str(&format!(
        "Astrometry: ruwe={} parallax={} parallax_over_error={}\n",
        fmt_opt(source.ruwe, 3),
        fmt_opt(source.parallax, 3),
        fmt_opt(source.parallax_over_error, 2),
    ));
    out.push_str(&format!(
        "Sampled XP spectrum: {}\n",
        if source.has_spectrum { "yes" } else { "no" }
    ));

    out.push_str("\nClass probabilities:\n");
    if source.class_probabilities.is_empty() {
        out.push_str("  (none)\n");
    }
    for (method, class) in ClassProbabilities::COLUMNS {
        if let Some(p) = source.class_probabilities.get(method, class) {
            out.push_str(&format!(
                "  {:<9} {:<11} {p:.4}\n",
                method.column_token(),
                class.column_token()
            ));
        }
    }

    out.push_str(&format!(
        "\nThresholds: ruwe<={:.2} | parallax_over_error>{:.2} | star>={:.2} | policy={}\n",
        thresholds.ruwe_max,
        thresholds.parallax_over_error_min,
        thresholds.star_prob_min,
        policy_name(thresholds.policy),
    ));

    match enforce(&report.verdict) {
        Ok(()) => out.push_str("Verdict: ACCEPTED\n"),
        Err(e) => {
            out.push_str(&format!("Verdict: REJECTED ({})\n", e.kind().name()));
            if report.verdict.missing_spectrum {
                out.push_str(&format!("  - {}\n", e.message()));
            }
            for issue in &report.verdict.issues {
                out.push_str(&format!("  - {}\n", issue.message()));
            }
        }
    }

    out
}

fn policy_name(policy: ClassificationPolicy) -> &'static str {
    match policy {
        ClassificationPolicy::StarProbability => "star-probability",
        ClassificationPolicy::Strict => "strict",
    }
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(v) => format!("{v:.decimals$}"),
        None => "n/a".to_string(),
    }
}
