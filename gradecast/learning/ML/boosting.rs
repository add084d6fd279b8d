use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, mean, not_fitted},
        tree::{RegressionTree, TreeBuilder},
        Regressor,
    },
};

const ADABOOST_BASE_DEPTH: usize = 3;
const XGBOOST_LAMBDA: f64 = 1.0;

/// Per-sample loss of AdaBoost.R2, relative to the largest error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaBoostLoss {
    /// `e / max_e`.
    Linear,
    /// `(e / max_e)^2`.
    Square,
    /// `1 - exp(-e / max_e)`.
    Exponential,
}

impl AdaBoostLoss {
    fn apply(self, relative: f64) -> f64 {
        match self {
            Self::Linear => relative,
            Self::Square => relative * relative,
            Self::Exponential => 1.0 - (-relative).exp(),
        }
    }
}

/// AdaBoost.R2 options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    /// Boosting rounds (upper bound; early stop on perfect or useless fits).
    pub n_estimators: usize,
    /// Shrinks each estimator's vote and the weight update.
    pub learning_rate: f64,
    /// Error shaping.
    pub loss: AdaBoostLoss,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            loss: AdaBoostLoss::Linear,
        }
    }
}

/// AdaBoost.R2 over depth-3 trees fitted on the current sample weights.
///
/// Predictions are the weighted median of the estimators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    /// Configuration.
    pub params: AdaBoostParams,
    estimators: Vec<(RegressionTree, f64)>,
    n_features: usize,
}

impl AdaBoostRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: AdaBoostParams) -> Self {
        Self {
            params,
            estimators: Vec::new(),
            n_features: 0,
        }
    }

    /// Number of estimators kept by the last fit.
    #[must_use]
    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }

    fn weighted_median(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut votes: Vec<(f64, f64)> = self
            .estimators
            .iter()
            .map(|(tree, weight)| (tree.predict_row(row), *weight))
            .collect();
        votes.sort_by(|a, b| a.0.total_cmp(&b.0));
        let total: f64 = votes.iter().map(|(_, w)| w).sum();
        let half = total / 2.0;
        let mut cumulative = 0.0;
        for (value, weight) in &votes {
            cumulative += weight;
            if cumulative >= half {
                return *value;
            }
        }
        votes.last().map_or(0.0, |(value, _)| *value)
    }
}

impl Regressor for AdaBoostRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_estimators == 0
            || self.params.learning_rate.is_nan()
            || self.params.learning_rate <= 0.0
        {
            return Err(LearningError::tuning(
                "adaboost needs estimators and a positive learning rate",
            ));
        }
        self.estimators.clear();
        let n = x.nrows();
        let builder = TreeBuilder {
            max_depth: Some(ADABOOST_BASE_DEPTH),
            min_samples_split: 2,
            min_samples_leaf: 1,
            leaf_l2: 0.0,
        };
        #[allow(clippy::cast_precision_loss)]
        let mut weights = vec![1.0 / n as f64; n];
        let lr = self.params.learning_rate;
        let mut estimators = Vec::new();
        for round in 0..self.params.n_estimators {
            let tree = builder.build(x, y, &weights, (0..n).collect())?;
            let errors: Vec<f64> = (0..n)
                .map(|i| (tree.predict_row(x.row(i)) - y[i]).abs())
                .collect();
            let max_error = errors.iter().copied().fold(0.0, f64::max);
            if max_error <= 0.0 {
                estimators.push((tree, 1.0));
                break;
            }
            let losses: Vec<f64> = errors
                .iter()
                .map(|e| self.params.loss.apply(e / max_error))
                .collect();
            let avg_loss: f64 = losses.iter().zip(&weights).map(|(l, w)| l * w).sum();
            if avg_loss >= 0.5 {
                if round == 0 {
                    estimators.push((tree, 1.0));
                }
                break;
            }
            let beta = avg_loss / (1.0 - avg_loss);
            let vote = if beta > 0.0 { lr * (1.0 / beta).ln() } else { 1.0 };
            if beta > 0.0 {
                for (w, l) in weights.iter_mut().zip(&losses) {
                    *w *= beta.powf((1.0 - l) * lr);
                }
            }
            estimators.push((tree, vote));
            let total: f64 = weights.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                break;
            }
            weights.iter_mut().for_each(|w| *w /= total);
        }
        self.estimators = estimators;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(not_fitted("AdaBoostRegressor"));
        }
        check_predict_input(x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| self.weighted_median(row)).collect())
    }
}

/// Second-order gradient boosting options (squared error, lambda fixed at 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    /// Boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage per round.
    pub learning_rate: f64,
    /// Depth of each tree.
    pub max_depth: usize,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
        }
    }
}

/// Depth-wise gradient boosted trees with L2-regularised leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    /// Configuration.
    pub params: GradientBoostingParams,
    base_score: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostingRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_estimators == 0
            || self.params.learning_rate.is_nan()
            || self.params.learning_rate <= 0.0
        {
            return Err(LearningError::tuning(
                "gradient boosting needs rounds and a positive learning rate",
            ));
        }
        self.trees.clear();
        let n = x.nrows();
        let builder = TreeBuilder {
            max_depth: Some(self.params.max_depth),
            min_samples_split: 2,
            min_samples_leaf: 1,
            leaf_l2: XGBOOST_LAMBDA,
        };
        // unit hessians for squared error
        let weights = vec![1.0; n];
        let base_score = mean(y);
        let mut current = Array1::from_elem(n, base_score);
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let residual = &y - &current;
            let tree = builder.build(x, residual.view(), &weights, (0..n).collect())?;
            for (i, value) in current.iter_mut().enumerate() {
                *value += self.params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }
        self.base_score = base_score;
        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted("GradientBoostingRegressor"));
        }
        check_predict_input(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees.iter().fold(self.base_score, |acc, tree| {
                    acc + self.params.learning_rate * tree.predict_row(row)
                })
            })
            .collect())
    }
}
