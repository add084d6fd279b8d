use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, not_fitted},
        Regressor,
    },
};

/// Node of a flattened binary tree; children are indices into the node table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Terminal prediction.
    Leaf {
        /// Predicted value.
        value: f64,
    },
    /// `x[feature] <= threshold` goes left.
    Split {
        /// Column index.
        feature: usize,
        /// Midpoint between neighbouring training values.
        threshold: f64,
        /// Left child.
        left: usize,
        /// Right child.
        right: usize,
    },
}

/// Fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
}

impl RegressionTree {
    #[cfg(test)]
    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Prediction for one row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => idx = if row[*feature] <= *threshold { *left } else { *right },
                None => return 0.0,
            }
        }
    }

    /// Predictions for every row.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Growth limits and leaf regularisation shared by every tree learner.
///
/// Split quality is `(sum w*y)^2 / (sum w + leaf_l2)` summed over both
/// children; with `leaf_l2 = 0` this is weighted variance reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeBuilder {
    /// Depth limit, unlimited when `None`.
    pub max_depth: Option<usize>,
    /// Samples a node needs before it may split.
    pub min_samples_split: usize,
    /// Samples each child must keep.
    pub min_samples_leaf: usize,
    /// L2 shrinkage of leaf values.
    pub leaf_l2: f64,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder {
    /// Grows a tree over `indices` (repeats allowed) with per-sample `weights`.
    pub fn build(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weights: &[f64],
        indices: Vec<usize>,
    ) -> Result<RegressionTree> {
        if indices.is_empty() {
            return Err(LearningError::tuning("cannot grow a tree on zero samples"));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(LearningError::tuning(
                "min_samples_leaf must be >= 1 and min_samples_split >= 2",
            ));
        }
        let mut nodes = Vec::new();
        self.grow(x, y, weights, indices, 0, &mut nodes);
        Ok(RegressionTree {
            nodes,
            n_features: x.ncols(),
        })
    }

    fn leaf_value(&self, sum_w: f64, sum_wy: f64) -> f64 {
        let denom = sum_w + self.leaf_l2;
        if denom > 0.0 {
            sum_wy / denom
        } else {
            0.0
        }
    }

    fn score(&self, sum_w: f64, sum_wy: f64) -> f64 {
        let denom = sum_w + self.leaf_l2;
        if denom > 0.0 {
            sum_wy * sum_wy / denom
        } else {
            0.0
        }
    }

    fn grow(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weights: &[f64],
        indices: Vec<usize>,
        depth: usize,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let (sum_w, sum_wy) = indices
            .iter()
            .fold((0.0, 0.0), |(w, wy), &i| (w + weights[i], wy + weights[i] * y[i]));
        let node_id = nodes.len();
        nodes.push(Node::Leaf {
            value: self.leaf_value(sum_w, sum_wy),
        });
        let depth_ok = self.max_depth.map_or(true, |limit| depth < limit);
        if !depth_ok
            || indices.len() < self.min_samples_split
            || indices.len() < 2 * self.min_samples_leaf
        {
            return node_id;
        }
        let Some(best) = self.best_split(x, y, weights, &indices, self.score(sum_w, sum_wy)) else {
            return node_id;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature]] <= best.threshold);
        let left = self.grow(x, y, weights, left_idx, depth + 1, nodes);
        let right = self.grow(x, y, weights, right_idx, depth + 1, nodes);
        nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    fn best_split(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weights: &[f64],
        indices: &[usize],
        parent_score: f64,
    ) -> Option<Candidate> {
        let n = indices.len();
        let min_gain = 1e-12 * parent_score.abs().max(1.0);
        let mut best: Option<Candidate> = None;
        let mut order = indices.to_vec();
        for feature in 0..x.ncols() {
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
            let total_w: f64 = order.iter().map(|&i| weights[i]).sum();
            let total_wy: f64 = order.iter().map(|&i| weights[i] * y[i]).sum();
            let (mut left_w, mut left_wy) = (0.0, 0.0);
            for pos in 1..n {
                let prev = order[pos - 1];
                left_w += weights[prev];
                left_wy += weights[prev] * y[prev];
                if pos < self.min_samples_leaf || n - pos < self.min_samples_leaf {
                    continue;
                }
                let lo = x[[prev, feature]];
                let hi = x[[order[pos], feature]];
                if lo == hi {
                    continue;
                }
                let right_w = total_w - left_w;
                if left_w <= 0.0 || right_w <= 0.0 {
                    continue;
                }
                let gain = self.score(left_w, left_wy) + self.score(right_w, total_wy - left_wy)
                    - parent_score;
                let threshold = lo + (hi - lo) / 2.0;
                if gain > best.as_ref().map_or(min_gain, |b| b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// CART options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTreeParams {
    /// Depth limit, unlimited when `None`.
    pub max_depth: Option<usize>,
    /// Samples a node needs before it may split.
    pub min_samples_split: usize,
    /// Samples each child must keep.
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl DecisionTreeParams {
    /// Unregularised builder with these limits.
    #[must_use]
    pub const fn builder(&self) -> TreeBuilder {
        TreeBuilder {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            leaf_l2: 0.0,
        }
    }
}

/// Single CART regression tree, squared-error criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    /// Configuration.
    pub params: DecisionTreeParams,
    tree: Option<RegressionTree>,
}

impl DecisionTreeRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: DecisionTreeParams) -> Self {
        Self { params, tree: None }
    }

    #[cfg(test)]
    const fn tree(&self) -> Option<&RegressionTree> {
        self.tree.as_ref()
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.tree = None;
        let weights = vec![1.0; x.nrows()];
        self.tree = Some(
            self.params
                .builder()
                .build(x, y, &weights, (0..x.nrows()).collect())?,
        );
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.tree
            .as_ref()
            .ok_or_else(|| not_fitted("DecisionTreeRegressor"))?
            .predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn steps() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| if v < 6.0 { 1.0 } else { 5.0 });
        (x, y)
    }

    #[test]
    fn unlimited_tree_interpolates_training_data() {
        let (x, y) = steps();
        let mut model = DecisionTreeRegressor::new(DecisionTreeParams::default());
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), y);
        // a single threshold separates the two plateaus
        assert_eq!(model.tree().unwrap().depth(), 1);
        let root = &model.tree().unwrap().nodes[0];
        assert!(matches!(root, Node::Split { feature: 0, threshold, .. } if (*threshold - 5.5).abs() < 1e-12));
    }

    #[test]
    fn depth_and_leaf_limits_are_respected() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| (v * 0.7).sin());
        let mut model = DecisionTreeRegressor::new(DecisionTreeParams {
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 4,
        });
        model.fit(x.view(), y.view()).unwrap();
        let tree = model.tree().unwrap();
        assert!(tree.depth() <= 3);
        let pred = model.predict(x.view()).unwrap();
        let mut distinct: Vec<f64> = pred.to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        assert!(distinct.len() <= 8);
    }

    #[test]
    fn leaf_l2_shrinks_towards_zero() {
        let x = array![[0.0], [1.0]];
        let y = array![4.0, 4.0];
        let builder = TreeBuilder {
            max_depth: Some(0),
            min_samples_split: 2,
            min_samples_leaf: 1,
            leaf_l2: 2.0,
        };
        let tree = builder.build(x.view(), y.view(), &[1.0, 1.0], vec![0, 1]).unwrap();
        assert!((tree.predict_row(x.row(0)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_samples_do_not_move_leaves() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 1.0, 100.0];
        let builder = DecisionTreeParams {
            max_depth: Some(0),
            ..DecisionTreeParams::default()
        }
        .builder();
        let tree = builder.build(x.view(), y.view(), &[1.0, 1.0, 0.0], vec![0, 1, 2]).unwrap();
        assert!((tree.predict_row(x.row(2)) - 1.0).abs() < 1e-12);
    }
}
