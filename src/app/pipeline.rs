//! The prediction pipeline shared by every CLI command.
//!
//! Resolve -> quality gate -> fetch -> preprocess + infer, run strictly in
//! sequence. Collaborators are trait objects so the same orchestrator drives
//! the live archive and in-memory test doubles.
//!
//! Staging cleanup is tied to the `StagingArea` guard: it is released right
//! after inference on both outcomes, and dropped (removed) on any other exit,
//! including unwinding out of the classifier.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::data::{BulkDataService, CatalogClient, DataLinkClient, TapClient, fetch_spectrum};
use crate::domain::{
    PipelineConfig, PipelineStage, PredictionRequest, PredictionResult, QualityVerdict, ResolvedSource,
    SourceQuery,
};
use crate::error::AppError;
use crate::models::{Classifier, CnnEnsemble, infer};
use crate::quality::{check_quality, gate};
use crate::resolve::Resolver;

/// Per-run context: identifiers that tag every log line of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: Uuid,
    pub correlation_id: String,
}

impl RunContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Context whose correlation id is the run id itself.
    pub fn generated() -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            correlation_id: run_id.to_string(),
        }
    }
}

/// Resolved source plus its (unenforced) quality verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub query: SourceQuery,
    pub source: ResolvedSource,
    pub verdict: QualityVerdict,
}

pub struct Pipeline {
    config: PipelineConfig,
    catalog: Arc<dyn CatalogClient>,
    data_service: Arc<dyn BulkDataService>,
    classifier: Arc<dyn Classifier>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<dyn CatalogClient>,
        data_service: Arc<dyn BulkDataService>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            config,
            catalog,
            data_service,
            classifier,
        }
    }

    /// Wire the archive clients and load the model named in `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, AppError> {
        let classifier = CnnEnsemble::load(&config.model_path)?;
        let catalog = TapClient::new(config.tap_url.clone(), config.request_timeout)?;
        let data_service = DataLinkClient::new(config.datalink_url.clone(), config.request_timeout)?;
        Ok(Self::new(
            config,
            Arc::new(catalog),
            Arc::new(data_service),
            Arc::new(classifier),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline once.
    pub fn run(&self, ctx: &RunContext, request: &PredictionRequest) -> Result<PredictionResult, AppError> {
        let span = info_span!("pipeline", run_id = %ctx.run_id, correlation_id = %ctx.correlation_id);
        let _enter = span.enter();
        info!(?request, "Received prediction request");

        let started = Instant::now();
        let mut stage = PipelineStage::Start;
        let outcome = self.execute(request, &mut stage);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => info!(
                source_id = result.source_id,
                label = result.label,
                elapsed_ms,
                "Request completed"
            ),
            Err(e) => {
                let failed_stage = stage.next();
                advance(&mut stage, PipelineStage::Failed(e.kind()));
                if e.kind().is_client_error() {
                    warn!(
                        failed_stage = failed_stage.name(),
                        kind = e.kind().name(),
                        elapsed_ms,
                        "Request rejected: {e}"
                    );
                } else {
                    error!(
                        failed_stage = failed_stage.name(),
                        kind = e.kind().name(),
                        elapsed_ms,
                        "Request failed: {e}"
                    );
                }
            }
        }
        outcome
    }

    pub fn check(&self, ctx: &RunContext, request: &PredictionRequest) -> Result<CheckReport, AppError> {
        check_source(self.catalog.as_ref(), &self.config, ctx, request)
    }

    fn execute(&self, request: &PredictionRequest, stage: &mut PipelineStage) -> Result<PredictionResult, AppError> {
        let query = SourceQuery::try_from(request)?;
        let source = Resolver::new(self.catalog.as_ref(), self.config.cone_box).resolve(&query)?;
        advance(stage, PipelineStage::Resolved);

        gate(&source, &self.config.quality)?;
        advance(stage, PipelineStage::QualityChecked);

        let staging = fetch_spectrum(self.data_service.as_ref(), &source, &self.config)?;
        advance(stage, PipelineStage::DataFetched);

        let inference = infer(self.classifier.as_ref(), &staging);
        staging.release();
        let inference = inference?;
        advance(stage, PipelineStage::Inferred);

        // Coordinates are echoed back only to callers who sent an identifier.
        let (ra, dec) = if query.is_identifier() {
            (Some(source.ra), Some(source.dec))
        } else {
            (None, None)
        };
        let result = PredictionResult {
            source_id: source.source_id,
            label: inference.label,
            probability: inference.probability,
            ra,
            dec,
        };
        advance(stage, PipelineStage::Done);
        Ok(result)
    }
}

/// Resolve and evaluate quality without downloading anything.
pub fn check_source(
    catalog: &dyn CatalogClient,
    config: &PipelineConfig,
    ctx: &RunContext,
    request: &PredictionRequest,
) -> Result<CheckReport, AppError> {
    let span = info_span!("pipeline", run_id = %ctx.run_id, correlation_id = %ctx.correlation_id);
    let _enter = span.enter();

    let query = SourceQuery::try_from(request)?;
    let source = Resolver::new(catalog, config.cone_box).resolve(&query)?;
    let verdict = check_quality(&source, &config.quality);
    info!(accepted = verdict.is_accepted(), "Quality evaluated");
    Ok(CheckReport { query, source, verdict })
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    info!(from = stage.name(), to = next.name(), "Stage transition");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::path::Path;

    use crate::data::{CatalogError, DataServiceError, ProductMap, ProductTable};
    use crate::domain::{CatalogEntry, ClassProbabilities, ConeBox, ScoringMethod, SourceClass};
    use crate::error::ErrorKind;
    use crate::models::{ModelError, Tensor3};

    const SOURCE_ID: u64 = 4111834567779557376;

    struct MockCatalog {
        cone: Vec<CatalogEntry>,
        source: ResolvedSource,
    }

    impl CatalogClient for MockCatalog {
        fn query_by_identifier(&self, _: u64) -> Result<Vec<CatalogEntry>, CatalogError> {
            Ok(Vec::new())
        }

        fn query_by_cone(&self, _: f64, _: f64, _: ConeBox) -> Result<Vec<CatalogEntry>, CatalogError> {
            Ok(self.cone.clone())
        }

        fn query_joined(&self, source_id: u64) -> Result<Vec<ResolvedSource>, CatalogError> {
            if source_id == self.source.source_id {
                Ok(vec![self.source.clone()])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Serves a flux column of `points` ones under an XP_SAMPLED key.
    struct MockService {
        points: usize,
    }

    impl BulkDataService for MockService {
        fn fetch_products(&self, source_id: u64, retrieval_type: &str, _: &str) -> Result<ProductMap, DataServiceError> {
            let table = ProductTable {
                headers: vec!["source_id".to_string(), "flux".to_string()],
                rows: (0..self.points)
                    .map(|_| vec![source_id.to_string(), "1.0".to_string()])
                    .collect(),
            };
            let mut products = ProductMap::new();
            products.insert(format!("{retrieval_type}-Gaia DR3 {source_id}.csv"), vec![table]);
            Ok(products)
        }
    }

    enum MockModel {
        Score(f64),
        Fail,
        Panic,
    }

    impl Classifier for MockModel {
        fn forward(&self, input: &Tensor3) -> Result<Vec<f64>, ModelError> {
            match self {
                MockModel::Score(s) => Ok(vec![*s; input.batch()]),
                MockModel::Fail => Err(ModelError::Numerical("weights missing".to_string())),
                MockModel::Panic => panic!("model crashed"),
            }
        }
    }

    fn catalog_row() -> ResolvedSource {
        let mut probs = ClassProbabilities::default();
        probs.insert(ScoringMethod::CombMod, SourceClass::Star, 0.95);
        probs.insert(ScoringMethod::SpecMod, SourceClass::Star, 0.95);
        ResolvedSource {
            source_id: SOURCE_ID,
            ra: 256.5229102004341,
            dec: -26.580565130784702,
            parallax: Some(2.5),
            parallax_over_error: Some(15.0),
            ruwe: Some(1.1),
            has_spectrum: true,
            class_probabilities: probs,
        }
    }

    fn pipeline(staging_root: &Path, source: ResolvedSource, cone: Vec<CatalogEntry>, model: MockModel) -> Pipeline {
        let config = PipelineConfig {
            staging_root: staging_root.to_path_buf(),
            ..PipelineConfig::default()
        };
        Pipeline::new(
            config,
            Arc::new(MockCatalog { cone, source }),
            Arc::new(MockService { points: 343 }),
            Arc::new(model),
        )
    }

    fn staging_is_clean(root: &Path) -> bool {
        !root.exists() || fs::read_dir(root).map(|mut d| d.next().is_none()).unwrap_or(false)
    }

    #[test]
    fn identifier_request_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let p = pipeline(&root, catalog_row(), Vec::new(), MockModel::Score(2.0));

        let result = p
            .run(&RunContext::new("test"), &PredictionRequest::by_id(SOURCE_ID.to_string()))
            .unwrap();

        assert_eq!(result.source_id, SOURCE_ID);
        assert_eq!(result.label, 1);
        assert!((result.probability - 0.881).abs() < 1e-3);
        assert_eq!(result.ra, Some(256.5229102004341));
        assert_eq!(result.dec, Some(-26.580565130784702));
        assert!(staging_is_clean(&root));
    }

    #[test]
    fn coordinate_request_omits_coordinates() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let cone = vec![CatalogEntry {
            source_id: SOURCE_ID,
            ra: 256.5229102004341,
            dec: -26.580565130784702,
        }];
        let p = pipeline(&root, catalog_row(), cone, MockModel::Score(-2.0));

        let result = p
            .run(
                &RunContext::generated(),
                &PredictionRequest::by_coordinates(256.5229102004341, -26.580565130784702),
            )
            .unwrap();
        assert_eq!(result.label, 0);
        assert_eq!((result.ra, result.dec), (None, None));
        assert!(staging_is_clean(&root));
    }

    #[test]
    fn unmatched_coordinates_never_create_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let p = pipeline(&root, catalog_row(), Vec::new(), MockModel::Score(2.0));

        let err = p
            .run(
                &RunContext::generated(),
                &PredictionRequest::by_coordinates(256.5229102004341, -26.580565130784702),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSourceFound);
        assert!(!root.exists());
    }

    #[test]
    fn missing_target_is_invalid_request() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), catalog_row(), Vec::new(), MockModel::Score(2.0));
        let err = p
            .run(&RunContext::generated(), &PredictionRequest::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn poor_quality_leaves_no_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let mut row = catalog_row();
        row.ruwe = Some(1.5);
        let p = pipeline(&root, row, Vec::new(), MockModel::Score(2.0));

        let err = p
            .run(&RunContext::generated(), &PredictionRequest::by_id(SOURCE_ID.to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoorQuality);
        assert!(staging_is_clean(&root));
    }

    #[test]
    fn inference_failure_still_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let p = pipeline(&root, catalog_row(), Vec::new(), MockModel::Fail);

        let err = p
            .run(&RunContext::generated(), &PredictionRequest::by_id(SOURCE_ID.to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceError);
        assert!(err.message().contains("weights missing"));
        assert!(root.exists());
        assert!(staging_is_clean(&root));
    }

    #[test]
    fn panicking_model_still_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let p = pipeline(&root, catalog_row(), Vec::new(), MockModel::Panic);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            p.run(&RunContext::generated(), &PredictionRequest::by_id(SOURCE_ID.to_string()))
        }));
        assert!(outcome.is_err());
        assert!(staging_is_clean(&root));
    }

    #[test]
    fn rejection_is_attributed_to_the_attempted_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let mut row = catalog_row();
        row.ruwe = Some(1.5);
        let p = pipeline(tmp.path(), row, Vec::new(), MockModel::Score(2.0));

        let mut stage = PipelineStage::Start;
        let err = p
            .execute(&PredictionRequest::by_id(SOURCE_ID.to_string()), &mut stage)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoorQuality);
        assert_eq!(stage, PipelineStage::Resolved);
        assert_eq!(stage.next(), PipelineStage::QualityChecked);

        let mut stage = PipelineStage::Start;
        let p = pipeline(tmp.path(), catalog_row(), Vec::new(), MockModel::Fail);
        p.execute(&PredictionRequest::by_id(SOURCE_ID.to_string()), &mut stage)
            .unwrap_err();
        assert_eq!(stage.next(), PipelineStage::Inferred);
    }

    #[test]
    fn check_reports_verdict_without_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let mut row = catalog_row();
        row.has_spectrum = false;
        let p = pipeline(&root, row, Vec::new(), MockModel::Score(2.0));

        let report = p
            .check(&RunContext::generated(), &PredictionRequest::by_id("Gaia DR3 4111834567779557376"))
            .unwrap();
        assert_eq!(report.query, SourceQuery::Identifier(SOURCE_ID));
        assert!(report.verdict.missing_spectrum);
        assert!(!root.exists());
    }
}
