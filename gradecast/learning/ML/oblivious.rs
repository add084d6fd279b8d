use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, mean, not_fitted},
        Regressor,
    },
};

/// Oblivious boosting options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObliviousBoostingParams {
    /// Boosting rounds.
    pub iterations: usize,
    /// Shrinkage per round.
    pub learning_rate: f64,
    /// Levels per tree; a tree has `2^depth` leaves.
    pub depth: usize,
    /// L2 regularisation of leaf values.
    pub l2_leaf_reg: f64,
    /// Upper bound on candidate borders per feature.
    pub border_count: usize,
}

impl Default for ObliviousBoostingParams {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.1,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 32,
        }
    }
}

/// Symmetric tree: every level applies the same `x[feature] > border` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousTree {
    splits: Vec<(usize, f64)>,
    leaves: Vec<f64>,
}

impl ObliviousTree {
    fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        self.splits
            .iter()
            .fold(0, |idx, &(feature, border)| (idx << 1) | usize::from(row[feature] > border))
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.leaves[self.leaf_index(row)]
    }
}

/// Quantile borders of one column: at most `count` distinct cut points strictly
/// inside the observed range.
fn quantile_borders(column: ArrayView1<'_, f64>, count: usize) -> Vec<f64> {
    let mut sorted = column.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() < 2 {
        return Vec::new();
    }
    if distinct.len() <= count + 1 {
        return distinct.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    }
    let n = sorted.len();
    let max = sorted[n - 1];
    let mut borders: Vec<f64> = (1..=count)
        .map(|q| sorted[(q * n / (count + 1)).min(n - 1)])
        .filter(|b| *b < max)
        .collect();
    borders.dedup();
    borders
}

/// Gradient boosting over oblivious trees with quantised features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousBoostingRegressor {
    /// Configuration.
    pub params: ObliviousBoostingParams,
    base_score: f64,
    trees: Vec<ObliviousTree>,
    n_features: usize,
}

impl ObliviousBoostingRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: ObliviousBoostingParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    fn score(&self, sum: f64, count: f64) -> f64 {
        let denom = count + self.params.l2_leaf_reg;
        if denom > 0.0 {
            sum * sum / denom
        } else {
            0.0
        }
    }

    /// Picks `(feature, border_index)` maximising the summed leaf score.
    fn best_level(
        &self,
        bins: &[Vec<usize>],
        borders: &[Vec<f64>],
        residual: &Array1<f64>,
        leaf_of: &[usize],
        n_leaves: usize,
    ) -> Option<(usize, usize)> {
        let mut best: Option<(f64, usize, usize)> = None;
        for (feature, feature_borders) in borders.iter().enumerate() {
            if feature_borders.is_empty() {
                continue;
            }
            let n_bins = feature_borders.len() + 1;
            let mut sums = vec![0.0; n_leaves * n_bins];
            let mut counts = vec![0.0; n_leaves * n_bins];
            for (i, &leaf) in leaf_of.iter().enumerate() {
                let slot = leaf * n_bins + bins[feature][i];
                sums[slot] += residual[i];
                counts[slot] += 1.0;
            }
            let totals: Vec<(f64, f64)> = (0..n_leaves)
                .map(|leaf| {
                    let range = leaf * n_bins..(leaf + 1) * n_bins;
                    (
                        sums[range.clone()].iter().sum::<f64>(),
                        counts[range].iter().sum::<f64>(),
                    )
                })
                .collect();
            let mut left = vec![(0.0, 0.0); n_leaves];
            for border in 0..feature_borders.len() {
                let mut score = 0.0;
                for leaf in 0..n_leaves {
                    let slot = leaf * n_bins + border;
                    left[leaf].0 += sums[slot];
                    left[leaf].1 += counts[slot];
                    let (total_sum, total_count) = totals[leaf];
                    score += self.score(left[leaf].0, left[leaf].1)
                        + self.score(total_sum - left[leaf].0, total_count - left[leaf].1);
                }
                if best.map_or(true, |(b, _, _)| score > b) {
                    best = Some((score, feature, border));
                }
            }
        }
        best.map(|(_, feature, border)| (feature, border))
    }
}

impl Regressor for ObliviousBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let p = self.params;
        if p.iterations == 0 || p.depth == 0 || p.border_count == 0 || p.l2_leaf_reg < 0.0 {
            return Err(LearningError::tuning(
                "oblivious boosting needs iterations, depth, borders and l2_leaf_reg >= 0",
            ));
        }
        if p.learning_rate.is_nan() || p.learning_rate <= 0.0 {
            return Err(LearningError::tuning("learning_rate must be positive"));
        }
        self.trees.clear();
        let n = x.nrows();
        let borders: Vec<Vec<f64>> = x
            .columns()
            .into_iter()
            .map(|col| quantile_borders(col, p.border_count))
            .collect();
        // bins[f][i] = number of borders strictly below x[i, f]
        let bins: Vec<Vec<usize>> = x
            .columns()
            .into_iter()
            .zip(&borders)
            .map(|(col, fb)| col.iter().map(|v| fb.partition_point(|b| b < v)).collect())
            .collect();
        let base_score = mean(y);
        let mut current = Array1::from_elem(n, base_score);
        let mut trees = Vec::with_capacity(p.iterations);
        for _ in 0..p.iterations {
            let residual = &y - &current;
            let mut leaf_of = vec![0usize; n];
            let mut splits = Vec::with_capacity(p.depth);
            for level in 0..p.depth {
                let n_leaves = 1 << level;
                let Some((feature, border)) =
                    self.best_level(&bins, &borders, &residual, &leaf_of, n_leaves)
                else {
                    break;
                };
                for (i, leaf) in leaf_of.iter_mut().enumerate() {
                    *leaf = (*leaf << 1) | usize::from(bins[feature][i] > border);
                }
                splits.push((feature, borders[feature][border]));
            }
            let n_leaves = 1 << splits.len();
            let mut sums = vec![0.0; n_leaves];
            let mut counts = vec![0.0; n_leaves];
            for (i, &leaf) in leaf_of.iter().enumerate() {
                sums[leaf] += residual[i];
                counts[leaf] += 1.0;
            }
            let leaves: Vec<f64> = sums
                .iter()
                .zip(&counts)
                .map(|(s, c)| {
                    let denom = c + p.l2_leaf_reg;
                    if denom > 0.0 {
                        p.learning_rate * s / denom
                    } else {
                        0.0
                    }
                })
                .collect();
            for (value, &leaf) in current.iter_mut().zip(&leaf_of) {
                *value += leaves[leaf];
            }
            trees.push(ObliviousTree { splits, leaves });
        }
        self.base_score = base_score;
        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted("ObliviousBoostingRegressor"));
        }
        check_predict_input(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .fold(self.base_score, |acc, tree| acc + tree.predict_row(row))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn borders_stay_inside_range() {
        let column = Array1::from_iter((0..100).map(f64::from));
        let borders = quantile_borders(column.view(), 8);
        assert!(!borders.is_empty() && borders.len() <= 8);
        assert!(borders.iter().all(|b| *b > 0.0 && *b < 99.0));
        assert!(borders.windows(2).all(|w| w[0] < w[1]));
        let few = quantile_borders(array![1.0, 1.0, 3.0].view(), 8);
        assert_eq!(few, vec![2.0]);
        assert!(quantile_borders(array![4.0, 4.0].view(), 8).is_empty());
    }

    #[test]
    fn learns_interaction_of_two_binary_features() {
        let x = Array2::from_shape_fn((64, 2), |(i, j)| ((i >> j) & 1) as f64);
        let y = x.rows().into_iter().map(|r| 10.0 * r[0] + 5.0 * r[1] * r[0]).collect::<Array1<f64>>();
        let mut model = ObliviousBoostingRegressor::new(ObliviousBoostingParams {
            iterations: 60,
            learning_rate: 0.3,
            depth: 2,
            ..ObliviousBoostingParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(array![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]].view()).unwrap();
        assert!((pred[0] - 0.0).abs() < 0.5);
        assert!((pred[1] - 10.0).abs() < 0.5);
        assert!((pred[2] - 15.0).abs() < 0.5);
        assert!(model.trees.iter().all(|t| t.leaves.len() == 1 << t.splits.len()));
    }

    #[test]
    fn constant_features_yield_mean_prediction() {
        let x = Array2::from_elem((10, 3), 1.0);
        let y = Array1::from_iter((0..10).map(f64::from));
        let mut model = ObliviousBoostingRegressor::new(ObliviousBoostingParams {
            iterations: 5,
            ..ObliviousBoostingParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert!(pred.iter().all(|v| (v - 4.5).abs() < 1e-9));
    }
}
