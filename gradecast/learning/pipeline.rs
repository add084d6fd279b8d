//! Training and inference entry points.
//!
//! Training reads the fixed train/test split, fits the transformer, tunes and
//! ranks every registered candidate, stacks the best of them, and publishes
//! the artifacts only once every stage has succeeded. Inference loads the
//! published artifacts once and serves predictions through `&self`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    combining::{CombinationReviewer, Ensembler, StackingRegressor},
    config::TrainerConfig,
    dataset::{Dataset, Frame, StudentRecord},
    error::{LearningError, Result, Stage},
    evaluation::{CandidateReport, MetricsRecord, ModelEvaluator},
    models::Regressor,
    registry::CandidateRegistry,
    savor::{load_artifact, save_artifact, Artifact},
    telemetry::{self, LearningTelemetry},
    transform::{FeatureTransformer, TransformerState},
    tuning::{ExcludedCandidate, GridSearch, KFold},
};

/// Stack composition and quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    /// Member names with their share of absolute meta-model weight.
    pub members: Vec<(String, f64)>,
    /// Metric suite of the stack.
    pub metrics: MetricsRecord,
}

/// Human-readable record of one training run, saved next to the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Completion time.
    pub created_at: DateTime<Utc>,
    /// Training rows.
    pub train_rows: usize,
    /// Held-out rows.
    pub test_rows: usize,
    /// Names of the transformed feature columns.
    pub feature_columns: Vec<String>,
    /// Ranked candidates, best first.
    pub candidates: Vec<CandidateReport>,
    /// Candidates dropped during tuning.
    pub excluded: Vec<ExcludedCandidate>,
    /// Stacked ensemble.
    pub ensemble: EnsembleSummary,
    /// Held-out R2 of the ensemble.
    pub final_r2: f64,
}

impl Artifact for TrainingReport {
    const KIND: &'static str = "training_report";
}

/// Published artifact locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Transformer state.
    pub preprocessor: PathBuf,
    /// Stacked ensemble.
    pub model: PathBuf,
    /// Training report.
    pub report: PathBuf,
}

/// Everything a successful training run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Run report.
    pub report: TrainingReport,
    /// Where the artifacts were published.
    pub paths: ArtifactPaths,
    /// Fitted transformer.
    pub transformer: TransformerState,
    /// Fitted ensemble.
    pub ensemble: StackingRegressor,
}

impl TrainingOutcome {
    /// Held-out R2 of the ensemble.
    #[must_use]
    pub const fn final_r2(&self) -> f64 {
        self.report.final_r2
    }
}

/// Batch training job.
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: TrainerConfig,
    registry: CandidateRegistry,
    telemetry: Option<LearningTelemetry>,
}

impl TrainingPipeline {
    /// Pipeline using the registry selected by `config.grid`.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let registry = CandidateRegistry::for_profile(config.grid, config.seed);
        Ok(Self {
            config,
            registry,
            telemetry: None,
        })
    }

    /// Replaces the candidate registry.
    pub fn with_registry(mut self, registry: CandidateRegistry) -> Result<Self> {
        registry.validate()?;
        self.registry = registry;
        Ok(self)
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Active registry.
    #[must_use]
    pub const fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    /// Reads both CSV files and trains.
    pub fn run(
        &self,
        train_csv: impl AsRef<Path>,
        test_csv: impl AsRef<Path>,
    ) -> Result<TrainingOutcome> {
        let train = Dataset::from_csv_path(train_csv)?;
        let test = Dataset::from_csv_path(test_csv)?;
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            Stage::Ingestion,
            "datasets_loaded",
            json!({ "train_rows": train.len(), "test_rows": test.len() }),
        );
        self.run_datasets(&train, &test)
    }

    /// Trains on in-memory datasets and publishes the artifacts.
    ///
    /// Nothing is written unless every stage succeeds.
    pub fn run_datasets(&self, train: &Dataset, test: &Dataset) -> Result<TrainingOutcome> {
        let telemetry = self.telemetry.as_ref();
        self.registry.validate()?;
        let kfold = KFold::new(self.config.folds)?;

        let (transformer, train_x) = FeatureTransformer::default().fit_transform(&train.features)?;
        let test_x = transformer.transform(&test.features)?;
        telemetry::log(
            telemetry,
            LogLevel::Info,
            Stage::Transformation,
            "transformer_fitted",
            json!({
                "columns": transformer.n_output_columns(),
                "vocabulary": transformer
                    .categorical
                    .iter()
                    .map(|c| (c.name.clone(), c.width()))
                    .collect::<Vec<_>>(),
            }),
        );

        let tuning = GridSearch::new(kfold).tune_all(
            &self.registry,
            train_x.view(),
            train.target.view(),
            telemetry,
        )?;
        let ranked = ModelEvaluator::new(kfold).evaluate(
            tuning.tuned,
            train_x.view(),
            train.target.view(),
            test_x.view(),
            test.target.view(),
            telemetry,
        )?;
        let ensemble = Ensembler::new(kfold, self.config.top_n, CombinationReviewer).build(
            &ranked,
            train_x.view(),
            train.target.view(),
            test_x.view(),
            test.target.view(),
            telemetry,
        )?;

        let report = TrainingReport {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            train_rows: train.len(),
            test_rows: test.len(),
            feature_columns: transformer.output_names(),
            candidates: ranked.into_iter().map(|c| c.report).collect(),
            excluded: tuning.excluded,
            final_r2: ensemble.metrics.test_r2,
            ensemble: EnsembleSummary {
                members: ensemble.member_weights,
                metrics: ensemble.metrics,
            },
        };

        let paths = ArtifactPaths {
            preprocessor: save_artifact(&transformer, self.config.preprocessor_path())?,
            model: save_artifact(&ensemble.model, self.config.model_path())?,
            report: save_artifact(&report, self.config.report_path())?,
        };
        telemetry::log(
            telemetry,
            LogLevel::Info,
            Stage::Persistence,
            "artifacts_published",
            json!({
                "preprocessor": paths.preprocessor,
                "model": paths.model,
                "report": paths.report,
                "final_r2": report.final_r2,
            }),
        );
        telemetry::event(
            telemetry,
            "learning.training.completed",
            json!({ "run_id": report.run_id, "final_r2": report.final_r2 }),
        );

        Ok(TrainingOutcome {
            report,
            paths,
            transformer,
            ensemble: ensemble.model,
        })
    }
}

/// One served prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted score.
    pub score: f64,
}

impl Prediction {
    /// Whether the score lies above `threshold`.
    #[must_use]
    pub fn is_out_of_range(&self, threshold: f64) -> bool {
        self.score > threshold
    }
}

/// Read-only inference over loaded artifacts; shareable across threads.
#[derive(Debug, Clone)]
pub struct PredictPipeline {
    transformer: TransformerState,
    model: StackingRegressor,
    threshold: f64,
}

impl PredictPipeline {
    /// Loads the artifacts named by `config`.
    pub fn load(config: &TrainerConfig) -> Result<Self> {
        Self::from_paths(
            config.preprocessor_path(),
            config.model_path(),
            config.out_of_range_threshold,
        )
    }

    /// Loads artifacts from explicit paths.
    pub fn from_paths(
        preprocessor: impl AsRef<Path>,
        model: impl AsRef<Path>,
        threshold: f64,
    ) -> Result<Self> {
        Ok(Self {
            transformer: load_artifact(preprocessor)?,
            model: load_artifact(model)?,
            threshold,
        })
    }

    /// Score above which predictions are flagged.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Predicts one score per record, in order.
    pub fn predict(&self, records: &[StudentRecord]) -> Result<Vec<Prediction>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let frame = Frame::from_records(records);
        let x = self
            .transformer
            .transform(&frame)
            .map_err(|err| err.at_stage(Stage::Inference))?;
        let scores = self
            .model
            .predict(x.view())
            .map_err(|err| err.at_stage(Stage::Inference))?;
        Ok(scores.iter().map(|&score| Prediction { score }).collect())
    }

    /// Predicts a single record.
    pub fn predict_one(&self, record: &StudentRecord) -> Result<Prediction> {
        self.predict(std::slice::from_ref(record))?
            .pop()
            .ok_or_else(|| {
                LearningError::evaluation("no prediction produced").at_stage(Stage::Inference)
            })
    }
}
