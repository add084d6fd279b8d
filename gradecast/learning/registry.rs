//! Candidate registry: the closed catalog of regressors and their search spaces.
//!
//! Grids are typed per family. A configuration list is the cartesian product
//! of the grid's fields in declaration order, last field varying fastest; an
//! empty field falls back to that parameter's default.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::GridProfile,
    error::{LearningError, Result},
    models::{
        AdaBoostLoss, AdaBoostParams, DecisionTreeParams, DistanceMetric, Gamma,
        GradientBoostingParams, KNeighborsParams, Kernel, LassoParams, LinearParams,
        ObliviousBoostingParams, ParamSet, RandomForestParams, RidgeParams, RidgeSolver,
        Selection, SvrParams, Weights,
    },
};

fn axis<T: Clone>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}

/// k-NN search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KNeighborsGrid {
    /// Neighbour counts.
    pub n_neighbors: Vec<usize>,
    /// Weightings.
    pub weights: Vec<Weights>,
    /// Distances.
    pub metric: Vec<DistanceMetric>,
}

/// Decision tree search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionTreeGrid {
    /// Depth limits (`None` = unlimited).
    pub max_depth: Vec<Option<usize>>,
    /// Split thresholds.
    pub min_samples_split: Vec<usize>,
    /// Leaf sizes.
    pub min_samples_leaf: Vec<usize>,
}

/// Random forest search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestGrid {
    /// Tree counts.
    pub n_estimators: Vec<usize>,
    /// Depth limits.
    pub max_depth: Vec<Option<usize>>,
    /// Split thresholds.
    pub min_samples_split: Vec<usize>,
    /// Bootstrap seed shared by every configuration.
    pub seed: u64,
}

/// AdaBoost search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaBoostGrid {
    /// Round counts.
    pub n_estimators: Vec<usize>,
    /// Learning rates.
    pub learning_rate: Vec<f64>,
    /// Loss shapes.
    pub loss: Vec<AdaBoostLoss>,
}

/// SVR search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvrGrid {
    /// Kernels.
    pub kernel: Vec<Kernel>,
    /// Box constraints.
    pub c: Vec<f64>,
    /// Width heuristics.
    pub gamma: Vec<Gamma>,
    /// Tube widths.
    pub epsilon: Vec<f64>,
    /// Sweep budgets.
    pub max_passes: Vec<usize>,
}

/// Ordinary least squares search space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearGrid {
    /// Intercept toggles.
    pub fit_intercept: Vec<bool>,
}

/// Ridge search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RidgeGrid {
    /// Penalties.
    pub alpha: Vec<f64>,
    /// Solvers.
    pub solver: Vec<RidgeSolver>,
    /// Solver tolerances.
    pub tol: Vec<f64>,
}

/// Lasso search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LassoGrid {
    /// Penalties.
    pub alpha: Vec<f64>,
    /// Coordinate orders.
    pub selection: Vec<Selection>,
    /// Pass budgets.
    pub max_iter: Vec<usize>,
    /// Permutation seed shared by every configuration.
    pub seed: u64,
}

/// Oblivious boosting search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObliviousBoostingGrid {
    /// Round counts.
    pub iterations: Vec<usize>,
    /// Learning rates.
    pub learning_rate: Vec<f64>,
    /// Tree depths.
    pub depth: Vec<usize>,
}

/// Depth-wise gradient boosting search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingGrid {
    /// Round counts.
    pub n_estimators: Vec<usize>,
    /// Learning rates.
    pub learning_rate: Vec<f64>,
    /// Tree depths.
    pub max_depth: Vec<usize>,
}

/// Search space of one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "grid", rename_all = "snake_case")]
pub enum ParamGrid {
    /// k-NN.
    KNeighbors(KNeighborsGrid),
    /// CART.
    DecisionTree(DecisionTreeGrid),
    /// Random forest.
    RandomForest(RandomForestGrid),
    /// AdaBoost.R2.
    AdaBoost(AdaBoostGrid),
    /// Epsilon-SVR.
    Svr(SvrGrid),
    /// Ordinary least squares.
    Linear(LinearGrid),
    /// Ridge.
    Ridge(RidgeGrid),
    /// Lasso.
    Lasso(LassoGrid),
    /// Oblivious boosting.
    #[serde(rename = "catboost")]
    CatBoost(ObliviousBoostingGrid),
    /// Depth-wise gradient boosting.
    #[serde(rename = "xgboost")]
    XGBoost(GradientBoostingGrid),
}

impl ParamGrid {
    /// Default configuration of the family.
    #[must_use]
    pub fn defaults(&self) -> ParamSet {
        match self {
            Self::KNeighbors(_) => ParamSet::KNeighbors(KNeighborsParams::default()),
            Self::DecisionTree(_) => ParamSet::DecisionTree(DecisionTreeParams::default()),
            Self::RandomForest(g) => ParamSet::RandomForest(RandomForestParams {
                seed: g.seed,
                ..RandomForestParams::default()
            }),
            Self::AdaBoost(_) => ParamSet::AdaBoost(AdaBoostParams::default()),
            Self::Svr(_) => ParamSet::Svr(SvrParams::default()),
            Self::Linear(_) => ParamSet::Linear(LinearParams::default()),
            Self::Ridge(_) => ParamSet::Ridge(RidgeParams::default()),
            Self::Lasso(g) => ParamSet::Lasso(LassoParams {
                seed: g.seed,
                ..LassoParams::default()
            }),
            Self::CatBoost(_) => ParamSet::CatBoost(ObliviousBoostingParams::default()),
            Self::XGBoost(_) => ParamSet::XGBoost(GradientBoostingParams::default()),
        }
    }

    /// Family tag, matching [`ParamSet::family`].
    #[must_use]
    pub fn family(&self) -> &'static str {
        self.defaults().family()
    }

    /// Every configuration in enumeration order.
    #[must_use]
    pub fn expand(&self) -> Vec<ParamSet> {
        let mut out = Vec::new();
        match self {
            Self::KNeighbors(g) => {
                let d = KNeighborsParams::default();
                for n_neighbors in axis(&g.n_neighbors, d.n_neighbors) {
                    for weights in axis(&g.weights, d.weights) {
                        for metric in axis(&g.metric, d.metric) {
                            out.push(ParamSet::KNeighbors(KNeighborsParams {
                                n_neighbors,
                                weights,
                                metric,
                            }));
                        }
                    }
                }
            }
            Self::DecisionTree(g) => {
                let d = DecisionTreeParams::default();
                for max_depth in axis(&g.max_depth, d.max_depth) {
                    for min_samples_split in axis(&g.min_samples_split, d.min_samples_split) {
                        for min_samples_leaf in axis(&g.min_samples_leaf, d.min_samples_leaf) {
                            out.push(ParamSet::DecisionTree(DecisionTreeParams {
                                max_depth,
                                min_samples_split,
                                min_samples_leaf,
                            }));
                        }
                    }
                }
            }
            Self::RandomForest(g) => {
                let d = RandomForestParams::default();
                for n_estimators in axis(&g.n_estimators, d.n_estimators) {
                    for max_depth in axis(&g.max_depth, d.max_depth) {
                        for min_samples_split in axis(&g.min_samples_split, d.min_samples_split) {
                            out.push(ParamSet::RandomForest(RandomForestParams {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                min_samples_leaf: d.min_samples_leaf,
                                seed: g.seed,
                            }));
                        }
                    }
                }
            }
            Self::AdaBoost(g) => {
                let d = AdaBoostParams::default();
                for n_estimators in axis(&g.n_estimators, d.n_estimators) {
                    for learning_rate in axis(&g.learning_rate, d.learning_rate) {
                        for loss in axis(&g.loss, d.loss) {
                            out.push(ParamSet::AdaBoost(AdaBoostParams {
                                n_estimators,
                                learning_rate,
                                loss,
                            }));
                        }
                    }
                }
            }
            Self::Svr(g) => {
                let d = SvrParams::default();
                for kernel in axis(&g.kernel, d.kernel) {
                    for c in axis(&g.c, d.c) {
                        for gamma in axis(&g.gamma, d.gamma) {
                            for epsilon in axis(&g.epsilon, d.epsilon) {
                                for max_passes in axis(&g.max_passes, d.max_passes) {
                                    out.push(ParamSet::Svr(SvrParams {
                                        kernel,
                                        c,
                                        gamma,
                                        epsilon,
                                        max_passes,
                                        tol: d.tol,
                                    }));
                                }
                            }
                        }
                    }
                }
            }
            Self::Linear(g) => {
                for fit_intercept in axis(&g.fit_intercept, LinearParams::default().fit_intercept) {
                    out.push(ParamSet::Linear(LinearParams { fit_intercept }));
                }
            }
            Self::Ridge(g) => {
                let d = RidgeParams::default();
                for alpha in axis(&g.alpha, d.alpha) {
                    for solver in axis(&g.solver, d.solver) {
                        for tol in axis(&g.tol, d.tol) {
                            out.push(ParamSet::Ridge(RidgeParams { alpha, solver, tol }));
                        }
                    }
                }
            }
            Self::Lasso(g) => {
                let d = LassoParams::default();
                for alpha in axis(&g.alpha, d.alpha) {
                    for selection in axis(&g.selection, d.selection) {
                        for max_iter in axis(&g.max_iter, d.max_iter) {
                            out.push(ParamSet::Lasso(LassoParams {
                                alpha,
                                selection,
                                max_iter,
                                tol: d.tol,
                                seed: g.seed,
                            }));
                        }
                    }
                }
            }
            Self::CatBoost(g) => {
                let d = ObliviousBoostingParams::default();
                for iterations in axis(&g.iterations, d.iterations) {
                    for learning_rate in axis(&g.learning_rate, d.learning_rate) {
                        for depth in axis(&g.depth, d.depth) {
                            out.push(ParamSet::CatBoost(ObliviousBoostingParams {
                                iterations,
                                learning_rate,
                                depth,
                                ..d
                            }));
                        }
                    }
                }
            }
            Self::XGBoost(g) => {
                let d = GradientBoostingParams::default();
                for n_estimators in axis(&g.n_estimators, d.n_estimators) {
                    for learning_rate in axis(&g.learning_rate, d.learning_rate) {
                        for max_depth in axis(&g.max_depth, d.max_depth) {
                            out.push(ParamSet::XGBoost(GradientBoostingParams {
                                n_estimators,
                                learning_rate,
                                max_depth,
                            }));
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expand().len()
    }

    /// Always false: an empty grid still yields the default configuration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `params` is one of the enumerated configurations.
    #[must_use]
    pub fn contains(&self, params: &ParamSet) -> bool {
        self.expand().contains(params)
    }

    /// Rejects values the algorithms would refuse at fit time.
    pub fn validate(&self) -> Result<()> {
        let bad = |what: &str| {
            Err(LearningError::Config(format!(
                "{} grid: {what}",
                self.family()
            )))
        };
        let positive = |values: &[f64]| values.iter().all(|v| *v > 0.0);
        let non_negative = |values: &[f64]| values.iter().all(|v| *v >= 0.0);
        match self {
            Self::KNeighbors(g) if g.n_neighbors.contains(&0) => bad("n_neighbors must be >= 1"),
            Self::DecisionTree(g)
                if g.min_samples_split.iter().any(|v| *v < 2)
                    || g.min_samples_leaf.contains(&0) =>
            {
                bad("min_samples_split must be >= 2 and min_samples_leaf >= 1")
            }
            Self::RandomForest(g)
                if g.n_estimators.contains(&0) || g.min_samples_split.iter().any(|v| *v < 2) =>
            {
                bad("n_estimators must be >= 1 and min_samples_split >= 2")
            }
            Self::AdaBoost(g) if g.n_estimators.contains(&0) || !positive(&g.learning_rate) => {
                bad("n_estimators and learning_rate must be positive")
            }
            Self::Svr(g)
                if !positive(&g.c) || !non_negative(&g.epsilon) || g.max_passes.contains(&0) =>
            {
                bad("c must be positive, epsilon non-negative, max_passes >= 1")
            }
            Self::Ridge(g) if !non_negative(&g.alpha) || !positive(&g.tol) => {
                bad("alpha must be non-negative and tol positive")
            }
            Self::Lasso(g) if !non_negative(&g.alpha) || g.max_iter.contains(&0) => {
                bad("alpha must be non-negative and max_iter >= 1")
            }
            Self::CatBoost(g)
                if g.iterations.contains(&0)
                    || g.depth.contains(&0)
                    || !positive(&g.learning_rate) =>
            {
                bad("iterations, depth and learning_rate must be positive")
            }
            Self::XGBoost(g) if g.n_estimators.contains(&0) || !positive(&g.learning_rate) => {
                bad("n_estimators and learning_rate must be positive")
            }
            _ => Ok(()),
        }
    }
}

/// Named candidate: a family and its search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// Display name, unique within a registry.
    pub name: String,
    /// Search space.
    pub grid: ParamGrid,
}

impl CandidateSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(name: impl Into<String>, grid: ParamGrid) -> Self {
        Self {
            name: name.into(),
            grid,
        }
    }
}

/// Ordered, read-only catalog of candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRegistry {
    candidates: IndexMap<String, CandidateSpec>,
}

impl CandidateRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for a grid profile.
    #[must_use]
    pub fn for_profile(profile: GridProfile, seed: u64) -> Self {
        match profile {
            GridProfile::Full => Self::full(seed),
            GridProfile::Compact => Self::compact(seed),
        }
    }

    /// The ten standard regressors with multi-point grids.
    #[must_use]
    pub fn full(seed: u64) -> Self {
        Self::from_specs(vec![
            CandidateSpec::new(
                "KNeighborsRegressor",
                ParamGrid::KNeighbors(KNeighborsGrid {
                    n_neighbors: vec![3, 5, 7],
                    weights: vec![Weights::Uniform, Weights::Distance],
                    metric: vec![DistanceMetric::Euclidean, DistanceMetric::Manhattan],
                }),
            ),
            CandidateSpec::new(
                "DecisionTreeRegressor",
                ParamGrid::DecisionTree(DecisionTreeGrid {
                    max_depth: vec![None, Some(5), Some(10)],
                    min_samples_split: vec![2, 5, 10],
                    min_samples_leaf: vec![1, 2, 3],
                }),
            ),
            CandidateSpec::new(
                "RandomForestRegressor",
                ParamGrid::RandomForest(RandomForestGrid {
                    n_estimators: vec![50, 100],
                    max_depth: vec![None, Some(5), Some(10)],
                    min_samples_split: vec![2, 5],
                    seed,
                }),
            ),
            CandidateSpec::new(
                "AdaBoostRegressor",
                ParamGrid::AdaBoost(AdaBoostGrid {
                    n_estimators: vec![50, 100],
                    learning_rate: vec![0.1, 0.5, 1.0],
                    loss: vec![
                        AdaBoostLoss::Linear,
                        AdaBoostLoss::Square,
                        AdaBoostLoss::Exponential,
                    ],
                }),
            ),
            CandidateSpec::new(
                "SVR",
                ParamGrid::Svr(SvrGrid {
                    kernel: vec![Kernel::Linear, Kernel::Rbf],
                    c: vec![1.0, 10.0],
                    gamma: vec![Gamma::Scale, Gamma::Auto],
                    epsilon: vec![0.1, 1.0],
                    max_passes: vec![200],
                }),
            ),
            CandidateSpec::new("LinearRegression", ParamGrid::Linear(LinearGrid::default())),
            CandidateSpec::new(
                "Ridge",
                ParamGrid::Ridge(RidgeGrid {
                    alpha: vec![0.1, 1.0, 10.0],
                    solver: vec![RidgeSolver::Cholesky, RidgeSolver::ConjugateGradient],
                    tol: vec![1e-3, 1e-4],
                }),
            ),
            CandidateSpec::new(
                "Lasso",
                ParamGrid::Lasso(LassoGrid {
                    alpha: vec![0.1, 1.0, 10.0],
                    selection: vec![Selection::Cyclic, Selection::Random],
                    max_iter: vec![1000, 2000],
                    seed,
                }),
            ),
            CandidateSpec::new(
                "CatBoostRegressor",
                ParamGrid::CatBoost(ObliviousBoostingGrid {
                    iterations: vec![100, 200],
                    learning_rate: vec![0.03, 0.1, 0.3],
                    depth: vec![4, 6],
                }),
            ),
            CandidateSpec::new(
                "XGBRegressor",
                ParamGrid::XGBoost(GradientBoostingGrid {
                    n_estimators: vec![100, 200],
                    learning_rate: vec![0.05, 0.1, 0.3],
                    max_depth: vec![3, 5],
                }),
            ),
        ])
    }

    /// Same ten candidates with two-point grids and small ensembles.
    #[must_use]
    pub fn compact(seed: u64) -> Self {
        Self::from_specs(vec![
            CandidateSpec::new(
                "KNeighborsRegressor",
                ParamGrid::KNeighbors(KNeighborsGrid {
                    n_neighbors: vec![5, 9],
                    ..KNeighborsGrid::default()
                }),
            ),
            CandidateSpec::new(
                "DecisionTreeRegressor",
                ParamGrid::DecisionTree(DecisionTreeGrid {
                    max_depth: vec![Some(4), Some(8)],
                    min_samples_leaf: vec![5],
                    ..DecisionTreeGrid::default()
                }),
            ),
            CandidateSpec::new(
                "RandomForestRegressor",
                ParamGrid::RandomForest(RandomForestGrid {
                    n_estimators: vec![8],
                    max_depth: vec![Some(6), Some(10)],
                    min_samples_split: vec![4],
                    seed,
                }),
            ),
            CandidateSpec::new(
                "AdaBoostRegressor",
                ParamGrid::AdaBoost(AdaBoostGrid {
                    n_estimators: vec![10],
                    learning_rate: vec![0.5, 1.0],
                    loss: vec![AdaBoostLoss::Linear],
                }),
            ),
            CandidateSpec::new(
                "SVR",
                ParamGrid::Svr(SvrGrid {
                    kernel: vec![Kernel::Linear, Kernel::Rbf],
                    c: vec![10.0],
                    gamma: vec![Gamma::Scale],
                    epsilon: vec![0.5],
                    max_passes: vec![50],
                }),
            ),
            CandidateSpec::new("LinearRegression", ParamGrid::Linear(LinearGrid::default())),
            CandidateSpec::new(
                "Ridge",
                ParamGrid::Ridge(RidgeGrid {
                    alpha: vec![0.1, 10.0],
                    ..RidgeGrid::default()
                }),
            ),
            CandidateSpec::new(
                "Lasso",
                ParamGrid::Lasso(LassoGrid {
                    alpha: vec![0.1, 1.0],
                    max_iter: vec![500],
                    seed,
                    ..LassoGrid::default()
                }),
            ),
            CandidateSpec::new(
                "CatBoostRegressor",
                ParamGrid::CatBoost(ObliviousBoostingGrid {
                    iterations: vec![20],
                    learning_rate: vec![0.1, 0.3],
                    depth: vec![4],
                }),
            ),
            CandidateSpec::new(
                "XGBRegressor",
                ParamGrid::XGBoost(GradientBoostingGrid {
                    n_estimators: vec![20],
                    learning_rate: vec![0.1, 0.3],
                    max_depth: vec![3],
                }),
            ),
        ])
    }

    fn from_specs(specs: Vec<CandidateSpec>) -> Self {
        Self {
            candidates: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Appends a candidate; names must be unique.
    pub fn insert(&mut self, spec: CandidateSpec) -> Result<()> {
        if self.candidates.contains_key(&spec.name) {
            return Err(LearningError::Config(format!(
                "candidate '{}' registered twice",
                spec.name
            )));
        }
        self.candidates.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Keeps only the named candidates, preserving registry order.
    pub fn retain(&mut self, names: &[String]) -> Result<()> {
        if let Some(unknown) = names.iter().find(|n| !self.candidates.contains_key(*n)) {
            return Err(LearningError::Config(format!("unknown candidate '{unknown}'")));
        }
        self.candidates.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Looks up a candidate by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CandidateSpec> {
        self.candidates.get(name)
    }

    /// Candidates in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidateSpec> {
        self.candidates.values()
    }

    /// Candidate names in registry order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.candidates.keys().map(String::as_str)
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Total configurations across all grids.
    #[must_use]
    pub fn total_configurations(&self) -> usize {
        self.iter().map(|spec| spec.grid.len()).sum()
    }

    /// Checks names and every grid; run once before training.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(LearningError::Config("candidate registry is empty".into()));
        }
        for spec in self.iter() {
            if spec.name.trim().is_empty() {
                return Err(LearningError::Config("candidate with empty name".into()));
            }
            spec.grid.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_registry_lists_the_ten_families_in_order() {
        let registry = CandidateRegistry::full(42);
        registry.validate().unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            [
                "KNeighborsRegressor",
                "DecisionTreeRegressor",
                "RandomForestRegressor",
                "AdaBoostRegressor",
                "SVR",
                "LinearRegression",
                "Ridge",
                "Lasso",
                "CatBoostRegressor",
                "XGBRegressor"
            ]
        );
        assert_eq!(registry.get("DecisionTreeRegressor").unwrap().grid.len(), 27);
        assert_eq!(registry.get("LinearRegression").unwrap().grid.len(), 1);
        let compact = CandidateRegistry::compact(42);
        compact.validate().unwrap();
        assert_eq!(compact.names().collect::<Vec<_>>(), names);
        assert!(compact.total_configurations() < registry.total_configurations());
    }

    #[test]
    fn every_grid_beyond_linear_is_multi_point() {
        for spec in CandidateRegistry::full(1).iter() {
            if spec.name != "LinearRegression" {
                assert!(spec.grid.len() > 1, "{}", spec.name);
            }
            assert_eq!(spec.grid.defaults().build().family(), spec.grid.family());
        }
    }

    #[test]
    fn enumeration_varies_last_field_fastest() {
        let grid = ParamGrid::Ridge(RidgeGrid {
            alpha: vec![0.1, 1.0],
            solver: vec![RidgeSolver::Cholesky, RidgeSolver::ConjugateGradient],
            tol: vec![],
        });
        let configs = grid.expand();
        assert_eq!(configs.len(), 4);
        let alphas: Vec<(f64, RidgeSolver)> = configs
            .iter()
            .map(|p| match p {
                ParamSet::Ridge(r) => (r.alpha, r.solver),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(alphas[0], (0.1, RidgeSolver::Cholesky));
        assert_eq!(alphas[1], (0.1, RidgeSolver::ConjugateGradient));
        assert_eq!(alphas[2], (1.0, RidgeSolver::Cholesky));
        assert!(configs.iter().all(|p| grid.contains(p)));
    }

    #[test]
    fn invalid_values_and_duplicates_are_rejected() {
        let grid = ParamGrid::KNeighbors(KNeighborsGrid {
            n_neighbors: vec![0, 3],
            ..KNeighborsGrid::default()
        });
        assert!(matches!(grid.validate(), Err(LearningError::Config(_))));
        let mut registry = CandidateRegistry::compact(0);
        let dup = registry.get("Ridge").unwrap().clone();
        assert!(registry.insert(dup).is_err());
    }

    #[test]
    fn unknown_grid_field_fails_to_parse() {
        let text = r#"{"family":"ridge","grid":{"alpha":[1.0],"penalty":["l2"]}}"#;
        assert!(serde_json::from_str::<ParamGrid>(text).is_err());
        let ok = r#"{"family":"ridge","grid":{"alpha":[1.0, 2.0]}}"#;
        assert_eq!(serde_json::from_str::<ParamGrid>(ok).unwrap().len(), 2);
    }

    #[test]
    fn retain_keeps_order_and_rejects_unknown_names() {
        let mut registry = CandidateRegistry::compact(0);
        registry
            .retain(&["Ridge".to_string(), "SVR".to_string()])
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["SVR", "Ridge"]);
        assert!(registry.retain(&["Nope".to_string()]).is_err());
    }
}
