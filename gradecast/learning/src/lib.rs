#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::many_single_char_names)]

//! Gradecast learning stack: exam-score regression with per-algorithm grid
//! search, held-out ranking, and stacked ensembling.

/// Structured errors tagged by pipeline stage.
#[path = "../error.rs"]
pub mod error;

/// Trainer configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Student tables, CSV ingestion, and train/test splitting.
#[path = "../dataset.rs"]
pub mod dataset;

/// Seeded synthetic student tables.
#[path = "../synthetic.rs"]
pub mod synthetic;

/// Feature transformation.
#[path = "../transform/main.rs"]
pub mod transform;

/// Regression algorithms.
#[path = "../ML/main.rs"]
pub mod models;

/// Candidate catalog and hyperparameter grids.
#[path = "../registry.rs"]
pub mod registry;

/// Grid search and cross-validation.
#[path = "../tuning/main.rs"]
pub mod tuning;

/// Metrics and ranking.
#[path = "../evaluation/main.rs"]
pub mod evaluation;

/// Stacked ensembling.
#[path = "../combining/main.rs"]
pub mod combining;

/// Artifact persistence.
#[path = "../savor.rs"]
pub mod savor;

/// Training and inference entry points.
#[path = "../pipeline.rs"]
pub mod pipeline;

pub use combining::{EnsembleResult, Ensembler, StackingRegressor};
pub use config::{GridProfile, TrainerConfig};
pub use dataset::{ingest, Dataset, Frame, IngestionOutput, StudentRecord};
pub use error::{LearningError, Result, Stage};
pub use evaluation::{CandidateReport, MetricsRecord, ModelEvaluator};
pub use models::{Model, ParamSet, Regressor};
pub use pipeline::{
    PredictPipeline, Prediction, TrainingOutcome, TrainingPipeline, TrainingReport,
};
pub use registry::{CandidateRegistry, CandidateSpec, ParamGrid};
pub use telemetry::{LearningTelemetry, LearningTelemetryBuilder};
pub use transform::{FeatureTransformer, TransformerState};
pub use tuning::{GridSearch, KFold, TunedCandidate, TuningOutcome};
