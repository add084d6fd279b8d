//! Metric computation and held-out ranking of tuned candidates.

/// Regression metrics.
pub mod metrics;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    error::{Result, Stage},
    models::{Model, ParamSet, Regressor},
    telemetry::{self, LearningTelemetry},
    tuning::{cross_validate, KFold, TunedCandidate},
};

pub use metrics::{mean_absolute_error, mean_squared_error, r2_score, root_mean_squared_error};

/// Cross-validated and held-out quality of one fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Mean fold R2 on the training set.
    pub cv_r2: f64,
    /// `sqrt(-mean(fold neg MSE))` on the training set.
    pub cv_rmse: f64,
    /// `-mean(fold neg MAE)` on the training set.
    pub cv_mae: f64,
    /// R2 on the held-out set.
    pub test_r2: f64,
    /// RMSE on the held-out set.
    pub test_rmse: f64,
    /// MAE on the held-out set.
    pub test_mae: f64,
}

impl MetricsRecord {
    /// Scores `fitted` on the held-out split and cross-validates fresh clones
    /// of it on the training split.
    pub fn compute<R: Regressor + Clone>(
        fitted: &R,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, f64>,
        test_x: ArrayView2<'_, f64>,
        test_y: ArrayView1<'_, f64>,
        kfold: &KFold,
    ) -> Result<Self> {
        let cv = cross_validate(fitted, train_x, train_y, kfold)
            .map_err(|err| err.at_stage(Stage::Evaluation))?;
        let predicted = fitted
            .predict(test_x)
            .map_err(|err| err.at_stage(Stage::Evaluation))?;
        Ok(Self {
            cv_r2: cv.mean_r2(),
            cv_rmse: cv.rmse(),
            cv_mae: cv.mae(),
            test_r2: r2_score(test_y, predicted.view())?,
            test_rmse: root_mean_squared_error(test_y, predicted.view())?,
            test_mae: mean_absolute_error(test_y, predicted.view())?,
        })
    }

    /// JSON rendering for logs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Report row for one ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    /// 1-based position by held-out R2.
    pub rank: usize,
    /// Registry name.
    pub name: String,
    /// Algorithm family tag.
    pub family: String,
    /// Winning configuration.
    pub best_params: ParamSet,
    /// Mean cross-validated R2 found by the grid search.
    pub best_cv_score: f64,
    /// Full metric suite.
    pub metrics: MetricsRecord,
    /// Configurations enumerated during tuning.
    pub configurations_tried: usize,
    /// Configurations that failed to fit.
    pub configurations_failed: usize,
}

/// A ranked candidate together with its fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedCandidate {
    /// Report row.
    pub report: CandidateReport,
    /// Model fitted on the full training split.
    pub model: Model,
}

/// Scores tuned candidates and ranks them.
#[derive(Debug, Clone, Copy)]
pub struct ModelEvaluator {
    kfold: KFold,
}

impl ModelEvaluator {
    /// Evaluator cross-validating with `kfold`.
    #[must_use]
    pub const fn new(kfold: KFold) -> Self {
        Self { kfold }
    }

    /// Computes a [`MetricsRecord`] per candidate and sorts by held-out R2,
    /// best first. The sort is stable, so equal scores keep input order.
    pub fn evaluate(
        &self,
        tuned: Vec<TunedCandidate>,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, f64>,
        test_x: ArrayView2<'_, f64>,
        test_y: ArrayView1<'_, f64>,
        telemetry: Option<&LearningTelemetry>,
    ) -> Result<Vec<EvaluatedCandidate>> {
        let mut evaluated = Vec::with_capacity(tuned.len());
        for candidate in tuned {
            let metrics = MetricsRecord::compute(
                &candidate.model,
                train_x,
                train_y,
                test_x,
                test_y,
                &self.kfold,
            )?;
            telemetry::log(
                telemetry,
                LogLevel::Info,
                Stage::Evaluation,
                "candidate_evaluated",
                json!({ "candidate": candidate.name, "metrics": metrics.to_json() }),
            );
            evaluated.push(EvaluatedCandidate {
                report: CandidateReport {
                    rank: 0,
                    family: candidate.model.family().to_string(),
                    name: candidate.name,
                    best_params: candidate.best_params,
                    best_cv_score: candidate.best_score,
                    metrics,
                    configurations_tried: candidate.configurations_tried,
                    configurations_failed: candidate.configurations_failed,
                },
                model: candidate.model,
            });
        }
        rank(&mut evaluated);
        let ranking: Vec<_> = evaluated
            .iter()
            .map(|c| {
                json!({
                    "rank": c.report.rank,
                    "candidate": c.report.name,
                    "test_r2": c.report.metrics.test_r2,
                })
            })
            .collect();
        telemetry::log(
            telemetry,
            LogLevel::Info,
            Stage::Evaluation,
            "candidates_ranked",
            json!({ "ranking": ranking }),
        );
        telemetry::event(
            telemetry,
            "learning.candidates.ranked",
            json!({ "count": evaluated.len() }),
        );
        Ok(evaluated)
    }
}

/// Stable descending sort by held-out R2, then 1-based ranks.
pub fn rank(candidates: &mut [EvaluatedCandidate]) {
    candidates.sort_by(|a, b| b.report.metrics.test_r2.total_cmp(&a.report.metrics.test_r2));
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        candidate.report.rank = idx + 1;
    }
}
