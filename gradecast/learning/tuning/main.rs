//! Per-candidate exhaustive grid search scored by k-fold cross-validated R2.

/// Fold splitting, scorers, and cross-validation drivers.
pub mod kfold;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    error::{LearningError, Result, Stage},
    models::{Model, ParamSet, Regressor},
    registry::{CandidateRegistry, CandidateSpec},
    telemetry::{self, LearningTelemetry},
};

pub use kfold::{
    cross_val_predict, cross_val_scores, cross_validate, CvScores, Fold, KFold, Scorer,
};

/// Winner of one candidate's grid search, refit on the full training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunedCandidate {
    /// Registry name.
    pub name: String,
    /// Winning configuration.
    pub best_params: ParamSet,
    /// Mean cross-validated R2 of the winning configuration.
    pub best_score: f64,
    /// Winning configuration fitted on every training row.
    pub model: Model,
    /// Configurations enumerated.
    pub configurations_tried: usize,
    /// Configurations whose fit failed.
    pub configurations_failed: usize,
}

/// Candidate dropped because none of its configurations could be fitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    /// Registry name.
    pub name: String,
    /// Failure that excluded it.
    pub reason: String,
}

/// Result of tuning a whole registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    /// Surviving candidates, registry order.
    pub tuned: Vec<TunedCandidate>,
    /// Candidates that failed every configuration, registry order.
    pub excluded: Vec<ExcludedCandidate>,
}

/// Grid search over one candidate at a time.
#[derive(Debug, Clone, Copy)]
pub struct GridSearch {
    kfold: KFold,
}

impl GridSearch {
    /// Search scored with `kfold`.
    #[must_use]
    pub const fn new(kfold: KFold) -> Self {
        Self { kfold }
    }

    /// Splitter used for scoring.
    #[must_use]
    pub const fn kfold(&self) -> &KFold {
        &self.kfold
    }

    /// Scores every configuration of `spec` and refits the best one.
    ///
    /// Configurations are visited in grid enumeration order and the best is
    /// replaced only by a strictly higher mean R2, so ties keep the earlier
    /// configuration. Fit failures are counted and skipped; metric failures
    /// are returned immediately. If nothing fits, a `Tuning` error is returned.
    pub fn tune(
        &self,
        spec: &CandidateSpec,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        telemetry: Option<&LearningTelemetry>,
    ) -> Result<TunedCandidate> {
        let mut configurations = spec.grid.expand();
        if configurations.is_empty() {
            configurations.push(spec.grid.defaults());
        }
        let tried = configurations.len();
        let mut failed = 0;
        let mut last_failure = None;
        let mut best: Option<(ParamSet, f64)> = None;

        for params in configurations {
            let template = params.build();
            match cross_val_scores(&template, x, y, &self.kfold, Scorer::R2) {
                Ok(scores) => {
                    let score = kfold::mean(&scores);
                    if score.is_nan() {
                        failed += 1;
                        last_failure = Some("mean R2 is NaN".to_string());
                        continue;
                    }
                    if best.as_ref().map_or(true, |(_, b)| score > *b) {
                        best = Some((params, score));
                    }
                }
                Err(err @ LearningError::Evaluation { .. }) => return Err(err),
                Err(err) => {
                    failed += 1;
                    telemetry::log(
                        telemetry,
                        LogLevel::Debug,
                        Stage::Tuning,
                        "configuration_failed",
                        json!({
                            "candidate": spec.name,
                            "params": params.to_json(),
                            "error": err.to_string(),
                        }),
                    );
                    last_failure = Some(err.to_string());
                }
            }
        }

        let Some((best_params, best_score)) = best else {
            return Err(LearningError::tuning(format!(
                "all {tried} configurations of {} failed; last error: {}",
                spec.name,
                last_failure.unwrap_or_default()
            )));
        };

        let mut model = best_params.build();
        model.fit(x, y)?;

        telemetry::log(
            telemetry,
            LogLevel::Info,
            Stage::Tuning,
            "candidate_tuned",
            json!({
                "candidate": spec.name,
                "configurations": tried,
                "failed": failed,
                "best_score": best_score,
                "best_params": best_params.to_json(),
            }),
        );
        telemetry::event(
            telemetry,
            "learning.candidate.tuned",
            json!({ "candidate": spec.name, "best_score": best_score }),
        );

        Ok(TunedCandidate {
            name: spec.name.clone(),
            best_params,
            best_score,
            model,
            configurations_tried: tried,
            configurations_failed: failed,
        })
    }

    /// Tunes every candidate in registry order.
    ///
    /// Candidates whose whole grid fails are excluded and logged; any other
    /// error aborts. Fails when no candidate survives.
    pub fn tune_all(
        &self,
        registry: &CandidateRegistry,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        telemetry: Option<&LearningTelemetry>,
    ) -> Result<TuningOutcome> {
        let mut tuned = Vec::with_capacity(registry.len());
        let mut excluded = Vec::new();
        for spec in registry.iter() {
            match self.tune(spec, x, y, telemetry) {
                Ok(candidate) => tuned.push(candidate),
                Err(err @ LearningError::Tuning { .. }) => {
                    telemetry::log(
                        telemetry,
                        LogLevel::Warn,
                        Stage::Tuning,
                        "candidate_excluded",
                        json!({ "candidate": spec.name, "error": err.to_string() }),
                    );
                    telemetry::event(
                        telemetry,
                        "learning.candidate.excluded",
                        json!({ "candidate": spec.name }),
                    );
                    excluded.push(ExcludedCandidate {
                        name: spec.name.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        if tuned.is_empty() {
            return Err(LearningError::tuning(format!(
                "none of the {} candidates could be fitted",
                registry.len()
            )));
        }
        Ok(TuningOutcome { tuned, excluded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{DistanceMetric, KNeighborsParams, Weights},
        registry::{KNeighborsGrid, ParamGrid, RidgeGrid, SvrGrid},
    };
    use ndarray::{Array1, Array2};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| ((i * 13) % 40) as f64);
        let y = x.column(0).mapv(|v| 3.0 * v + (v * 0.7).sin() * 4.0);
        (x, y)
    }

    fn search() -> GridSearch {
        GridSearch::new(KFold::new(5).unwrap())
    }

    #[test]
    fn best_configuration_is_from_grid_and_refit() {
        let (x, y) = data();
        let spec = CandidateSpec::new(
            "Ridge",
            ParamGrid::Ridge(RidgeGrid {
                alpha: vec![1000.0, 0.01],
                ..RidgeGrid::default()
            }),
        );
        let tuned = search().tune(&spec, x.view(), y.view(), None).unwrap();
        assert!(spec.grid.contains(&tuned.best_params));
        assert_eq!(tuned.configurations_tried, 2);
        assert_eq!(tuned.model.params(), tuned.best_params);
        match tuned.best_params {
            ParamSet::Ridge(p) => assert!((p.alpha - 0.01).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tuned.model.predict(x.view()).unwrap().len(), 40);
    }

    #[test]
    fn ties_keep_first_enumerated_configuration() {
        // one integer feature: both metrics give identical neighbours
        let (x, y) = data();
        let spec = CandidateSpec::new(
            "KNeighborsRegressor",
            ParamGrid::KNeighbors(KNeighborsGrid {
                n_neighbors: vec![3],
                weights: vec![Weights::Uniform],
                metric: vec![DistanceMetric::Manhattan, DistanceMetric::Euclidean],
            }),
        );
        let tuned = search().tune(&spec, x.view(), y.view(), None).unwrap();
        assert_eq!(
            tuned.best_params,
            ParamSet::KNeighbors(KNeighborsParams {
                n_neighbors: 3,
                weights: Weights::Uniform,
                metric: DistanceMetric::Manhattan,
            })
        );
    }

    #[test]
    fn best_score_is_mean_fold_r2_of_winner() {
        let (x, y) = data();
        let kfold = KFold::new(5).unwrap();
        let spec = CandidateSpec::new("Ridge", ParamGrid::Ridge(RidgeGrid::default()));
        let tuned = GridSearch::new(kfold)
            .tune(&spec, x.view(), y.view(), None)
            .unwrap();
        let winner = tuned.best_params.build();
        let folds = cross_val_scores(&winner, x.view(), y.view(), &kfold, Scorer::R2).unwrap();
        let expected = cross_validate(&winner, x.view(), y.view(), &kfold)
            .unwrap()
            .mean_r2();
        assert_eq!(folds.len(), 5);
        assert_eq!(tuned.best_score.to_bits(), expected.to_bits());
    }

    #[test]
    fn failing_configurations_are_skipped() {
        let (x, y) = data();
        let spec = CandidateSpec::new(
            "Ridge",
            ParamGrid::Ridge(RidgeGrid {
                alpha: vec![-1.0, 1.0],
                ..RidgeGrid::default()
            }),
        );
        let tuned = search().tune(&spec, x.view(), y.view(), None).unwrap();
        assert_eq!(tuned.configurations_failed, 1);
        assert!(tuned.best_score.is_finite());
    }

    #[test]
    fn candidate_failing_everywhere_is_excluded_not_fatal() {
        let (x, y) = data();
        let mut registry = CandidateRegistry::new();
        registry
            .insert(CandidateSpec::new(
                "SVR",
                ParamGrid::Svr(SvrGrid {
                    c: vec![0.0],
                    ..SvrGrid::default()
                }),
            ))
            .unwrap();
        registry
            .insert(CandidateSpec::new(
                "Ridge",
                ParamGrid::Ridge(RidgeGrid::default()),
            ))
            .unwrap();
        let telemetry = LearningTelemetry::builder("learning").build().unwrap();
        let outcome = search()
            .tune_all(&registry, x.view(), y.view(), Some(&telemetry))
            .unwrap();
        assert_eq!(outcome.tuned.len(), 1);
        assert_eq!(outcome.tuned[0].name, "Ridge");
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].name, "SVR");
        assert!(telemetry
            .events()
            .iter()
            .any(|e| e.event_type == "learning.candidate.excluded"));
    }

    #[test]
    fn no_surviving_candidate_is_fatal() {
        let (x, y) = data();
        let mut registry = CandidateRegistry::new();
        registry
            .insert(CandidateSpec::new(
                "SVR",
                ParamGrid::Svr(SvrGrid {
                    c: vec![0.0],
                    ..SvrGrid::default()
                }),
            ))
            .unwrap();
        let err = search()
            .tune_all(&registry, x.view(), y.view(), None)
            .unwrap_err();
        assert!(matches!(err, LearningError::Tuning { .. }));
    }

    #[test]
    fn undefined_metric_aborts_instead_of_excluding() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(20, 70.0);
        let registry = {
            let mut r = CandidateRegistry::new();
            r.insert(CandidateSpec::new("Ridge", ParamGrid::Ridge(RidgeGrid::default())))
                .unwrap();
            r
        };
        let err = search()
            .tune_all(&registry, x.view(), y.view(), None)
            .unwrap_err();
        assert!(matches!(err, LearningError::Evaluation { .. }));
    }

    #[test]
    fn repeated_runs_score_identically() {
        let (x, y) = data();
        let registry = CandidateRegistry::compact(7);
        let spec = registry.get("RandomForestRegressor").unwrap();
        let a = search().tune(spec, x.view(), y.view(), None).unwrap();
        let b = search().tune(spec, x.view(), y.view(), None).unwrap();
        assert_eq!(a.best_score.to_bits(), b.best_score.to_bits());
        assert_eq!(a.best_params, b.best_params);
    }
}
