use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use super::{
    func::normalize_weights,
    reviewer::CombinationReviewer,
    stacking::{StackMember, StackingRegressor},
};
use crate::{
    error::{LearningError, Result, Stage},
    evaluation::{EvaluatedCandidate, MetricsRecord},
    models::Regressor,
    telemetry::{self, LearningTelemetry},
    tuning::KFold,
};

/// Result produced by the ensembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Metric suite of the stack.
    pub metrics: MetricsRecord,
    /// Fitted stack; the artifact served at inference.
    pub model: StackingRegressor,
    /// Share of absolute meta-model weight per member, stacking order.
    pub member_weights: Vec<(String, f64)>,
}

/// Stacks the top ranked candidates under a linear meta-model.
#[derive(Debug)]
pub struct Ensembler {
    kfold: KFold,
    top_n: usize,
    reviewer: CombinationReviewer,
}

impl Ensembler {
    /// Ensembler keeping at most `top_n` members.
    #[must_use]
    pub fn new(kfold: KFold, top_n: usize, reviewer: CombinationReviewer) -> Self {
        Self {
            kfold,
            top_n,
            reviewer,
        }
    }

    /// Fits the stack on the training split and scores it like any candidate.
    ///
    /// `ranked` must be best first; fewer than `top_n` entries are all used.
    pub fn build(
        &self,
        ranked: &[EvaluatedCandidate],
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, f64>,
        test_x: ArrayView2<'_, f64>,
        test_y: ArrayView1<'_, f64>,
        telemetry: Option<&LearningTelemetry>,
    ) -> Result<EnsembleResult> {
        if self.top_n == 0 || ranked.is_empty() {
            return Err(LearningError::tuning("no ranked candidates to stack")
                .at_stage(Stage::Ensembling));
        }
        let members: Vec<StackMember> = ranked
            .iter()
            .take(self.top_n)
            .map(|candidate| StackMember {
                name: candidate.report.name.clone(),
                model: candidate.model.clone(),
            })
            .collect();
        let mut model = StackingRegressor::new(members, self.kfold)?;
        model
            .fit(train_x, train_y)
            .map_err(|err| err.at_stage(Stage::Ensembling))?;

        let held_out = model
            .predict(test_x)
            .map_err(|err| err.at_stage(Stage::Ensembling))?;
        self.reviewer.review(&held_out.to_vec(), test_x.nrows())?;

        let metrics =
            MetricsRecord::compute(&model, train_x, train_y, test_x, test_y, &self.kfold)?;
        let coef = model
            .meta_coefficients()
            .map(|fit| fit.coef.to_vec())
            .unwrap_or_default();
        let member_weights: Vec<(String, f64)> = model
            .member_names()
            .map(str::to_string)
            .zip(normalize_weights(&coef))
            .collect();

        telemetry::log(
            telemetry,
            LogLevel::Info,
            Stage::Ensembling,
            "ensemble_built",
            json!({
                "members": member_weights,
                "metrics": metrics.to_json(),
            }),
        );
        telemetry::event(
            telemetry,
            "learning.ensemble.built",
            json!({ "members": member_weights.len(), "test_r2": metrics.test_r2 }),
        );
        Ok(EnsembleResult {
            metrics,
            model,
            member_weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        evaluation::ModelEvaluator,
        models::{KNeighborsParams, LinearParams, ParamSet, RidgeParams},
        tuning::TunedCandidate,
    };
    use ndarray::{Array1, Array2, Axis};

    fn split() -> (Array2<f64>, Array1<f64>, Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((70, 2), |(i, j)| ((i * (j + 4) * 5) % 31) as f64);
        let y = x.column(0).mapv(|v| 0.8 * v + 10.0) + x.column(1).mapv(|v| (v / 3.0).sin());
        let train: Vec<usize> = (0..55).collect();
        let test: Vec<usize> = (55..70).collect();
        (
            x.select(Axis(0), &train),
            y.select(Axis(0), &train),
            x.select(Axis(0), &test),
            y.select(Axis(0), &test),
        )
    }

    fn ranked(params: &[ParamSet], x: &Array2<f64>, y: &Array1<f64>) -> Vec<TunedCandidate> {
        params
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let mut model = p.build();
                model.fit(x.view(), y.view()).unwrap();
                TunedCandidate {
                    name: format!("candidate-{idx}"),
                    best_params: *p,
                    best_score: 0.0,
                    model,
                    configurations_tried: 1,
                    configurations_failed: 0,
                }
            })
            .collect()
    }

    #[test]
    fn keeps_at_most_top_n_members_in_rank_order() {
        let (tx, ty, vx, vy) = split();
        let kfold = KFold::new(5).unwrap();
        let tuned = ranked(
            &[
                ParamSet::KNeighbors(KNeighborsParams::default()),
                ParamSet::Ridge(RidgeParams::default()),
                ParamSet::Linear(LinearParams::default()),
            ],
            &tx,
            &ty,
        );
        let evaluated = ModelEvaluator::new(kfold)
            .evaluate(tuned, tx.view(), ty.view(), vx.view(), vy.view(), None)
            .unwrap();
        let telemetry = LearningTelemetry::builder("learning").build().unwrap();
        let result = Ensembler::new(kfold, 2, CombinationReviewer)
            .build(&evaluated, tx.view(), ty.view(), vx.view(), vy.view(), Some(&telemetry))
            .unwrap();
        let names: Vec<&str> = result.model.member_names().collect();
        let expected: Vec<&str> = evaluated
            .iter()
            .take(2)
            .map(|c| c.report.name.as_str())
            .collect();
        assert_eq!(names, expected);
        assert_eq!(result.member_weights.len(), 2);
        assert!(result.metrics.test_r2.is_finite());
        assert!(telemetry
            .events()
            .iter()
            .any(|e| e.event_type == "learning.ensemble.built"));
    }

    #[test]
    fn one_candidate_degrades_to_single_member_stack() {
        let (tx, ty, vx, vy) = split();
        let kfold = KFold::new(5).unwrap();
        let tuned = ranked(&[ParamSet::Ridge(RidgeParams::default())], &tx, &ty);
        let evaluated = ModelEvaluator::new(kfold)
            .evaluate(tuned, tx.view(), ty.view(), vx.view(), vy.view(), None)
            .unwrap();
        let result = Ensembler::new(kfold, 5, CombinationReviewer)
            .build(&evaluated, tx.view(), ty.view(), vx.view(), vy.view(), None)
            .unwrap();
        assert_eq!(result.model.members().len(), 1);
        assert!((result.member_weights[0].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nothing_to_stack_is_an_error() {
        let (tx, ty, vx, vy) = split();
        let err = Ensembler::new(KFold::new(5).unwrap(), 5, CombinationReviewer)
            .build(&[], tx.view(), ty.view(), vx.view(), vy.view(), None)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Ensembling);
    }
}
