use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, not_fitted},
        tree::{RegressionTree, TreeBuilder},
        Regressor,
    },
};

/// Random forest options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomForestParams {
    /// Trees in the ensemble.
    pub n_estimators: usize,
    /// Depth limit per tree.
    pub max_depth: Option<usize>,
    /// Samples a node needs before it may split.
    pub min_samples_split: usize,
    /// Samples each child must keep.
    pub min_samples_leaf: usize,
    /// Bootstrap seed.
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Mean of CART trees grown on seeded bootstrap resamples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    /// Configuration.
    pub params: RandomForestParams,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_estimators == 0 {
            return Err(LearningError::tuning("random forest needs at least one tree"));
        }
        self.trees.clear();
        let builder = TreeBuilder {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            leaf_l2: 0.0,
        };
        let n = x.nrows();
        let weights = vec![1.0; n];
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(builder.build(x, y, &weights, sample)?);
        }
        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted("RandomForestRegressor"));
        }
        check_predict_input(x, self.n_features)?;
        #[allow(clippy::cast_precision_loss)]
        let count = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>() / count)
            .collect())
    }
}
