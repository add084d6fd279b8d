//! Regression algorithms behind a common [`Regressor`] capability.

/// AdaBoost.R2 and depth-wise gradient boosting.
pub mod boosting;
/// Bagged regression trees.
pub mod forest;
/// Shared numeric helpers and input checks.
pub mod func;
/// Least squares family: ordinary, ridge, lasso.
pub mod linear;
/// Brute-force nearest neighbours.
pub mod neighbors;
/// Symmetric (oblivious) tree boosting.
pub mod oblivious;
/// Epsilon support vector regression.
pub mod svr;
/// CART regression trees.
pub mod tree;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use boosting::{
    AdaBoostLoss, AdaBoostParams, AdaBoostRegressor, GradientBoostingParams,
    GradientBoostingRegressor,
};
pub use forest::{RandomForestParams, RandomForestRegressor};
pub use linear::{
    LassoParams, LassoRegression, LinearFit, LinearParams, LinearRegression, RidgeParams,
    RidgeRegression, RidgeSolver, Selection,
};
pub use neighbors::{DistanceMetric, KNeighborsParams, KNeighborsRegressor, Weights};
pub use oblivious::{ObliviousBoostingParams, ObliviousBoostingRegressor};
pub use svr::{Gamma, Kernel, SupportVectorRegressor, SvrParams};
pub use tree::{DecisionTreeParams, DecisionTreeRegressor};

/// Fit/predict capability shared by every algorithm.
///
/// `fit` discards any previous state, so one template can be refit per fold.
pub trait Regressor {
    /// Fits on `x` (rows are samples) against `y`.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;
    /// Predicts one value per row of `x`.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

/// Closed set of regression algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Model {
    /// k nearest neighbours.
    KNeighbors(KNeighborsRegressor),
    /// Single CART tree.
    DecisionTree(DecisionTreeRegressor),
    /// Bagged CART trees.
    RandomForest(RandomForestRegressor),
    /// AdaBoost.R2 over shallow trees.
    AdaBoost(AdaBoostRegressor),
    /// Epsilon support vector regression.
    Svr(SupportVectorRegressor),
    /// Ordinary least squares.
    Linear(LinearRegression),
    /// L2-penalised least squares.
    Ridge(RidgeRegression),
    /// L1-penalised least squares.
    Lasso(LassoRegression),
    /// Oblivious-tree gradient boosting.
    #[serde(rename = "catboost")]
    CatBoost(ObliviousBoostingRegressor),
    /// Depth-wise second-order gradient boosting.
    #[serde(rename = "xgboost")]
    XGBoost(GradientBoostingRegressor),
}

impl Model {
    /// Hyperparameters the model was built with.
    #[must_use]
    pub fn params(&self) -> ParamSet {
        match self {
            Self::KNeighbors(m) => ParamSet::KNeighbors(m.params),
            Self::DecisionTree(m) => ParamSet::DecisionTree(m.params),
            Self::RandomForest(m) => ParamSet::RandomForest(m.params),
            Self::AdaBoost(m) => ParamSet::AdaBoost(m.params),
            Self::Svr(m) => ParamSet::Svr(m.params),
            Self::Linear(m) => ParamSet::Linear(m.params),
            Self::Ridge(m) => ParamSet::Ridge(m.params),
            Self::Lasso(m) => ParamSet::Lasso(m.params),
            Self::CatBoost(m) => ParamSet::CatBoost(m.params),
            Self::XGBoost(m) => ParamSet::XGBoost(m.params),
        }
    }

    /// Family tag, as used in serialized artifacts.
    #[must_use]
    pub fn family(&self) -> &'static str {
        self.params().family()
    }
}

impl Regressor for Model {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        match self {
            Self::KNeighbors(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::RandomForest(m) => m.fit(x, y),
            Self::AdaBoost(m) => m.fit(x, y),
            Self::Svr(m) => m.fit(x, y),
            Self::Linear(m) => m.fit(x, y),
            Self::Ridge(m) => m.fit(x, y),
            Self::Lasso(m) => m.fit(x, y),
            Self::CatBoost(m) => m.fit(x, y),
            Self::XGBoost(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        match self {
            Self::KNeighbors(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::RandomForest(m) => m.predict(x),
            Self::AdaBoost(m) => m.predict(x),
            Self::Svr(m) => m.predict(x),
            Self::Linear(m) => m.predict(x),
            Self::Ridge(m) => m.predict(x),
            Self::Lasso(m) => m.predict(x),
            Self::CatBoost(m) => m.predict(x),
            Self::XGBoost(m) => m.predict(x),
        }
    }
}

/// One concrete hyperparameter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "params", rename_all = "snake_case")]
pub enum ParamSet {
    /// See [`KNeighborsParams`].
    KNeighbors(KNeighborsParams),
    /// See [`DecisionTreeParams`].
    DecisionTree(DecisionTreeParams),
    /// See [`RandomForestParams`].
    RandomForest(RandomForestParams),
    /// See [`AdaBoostParams`].
    AdaBoost(AdaBoostParams),
    /// See [`SvrParams`].
    Svr(SvrParams),
    /// See [`LinearParams`].
    Linear(LinearParams),
    /// See [`RidgeParams`].
    Ridge(RidgeParams),
    /// See [`LassoParams`].
    Lasso(LassoParams),
    /// See [`ObliviousBoostingParams`].
    #[serde(rename = "catboost")]
    CatBoost(ObliviousBoostingParams),
    /// See [`GradientBoostingParams`].
    #[serde(rename = "xgboost")]
    XGBoost(GradientBoostingParams),
}

impl ParamSet {
    /// Instantiates an unfitted model.
    #[must_use]
    pub fn build(&self) -> Model {
        match *self {
            Self::KNeighbors(p) => Model::KNeighbors(KNeighborsRegressor::new(p)),
            Self::DecisionTree(p) => Model::DecisionTree(DecisionTreeRegressor::new(p)),
            Self::RandomForest(p) => Model::RandomForest(RandomForestRegressor::new(p)),
            Self::AdaBoost(p) => Model::AdaBoost(AdaBoostRegressor::new(p)),
            Self::Svr(p) => Model::Svr(SupportVectorRegressor::new(p)),
            Self::Linear(p) => Model::Linear(LinearRegression::new(p)),
            Self::Ridge(p) => Model::Ridge(RidgeRegression::new(p)),
            Self::Lasso(p) => Model::Lasso(LassoRegression::new(p)),
            Self::CatBoost(p) => Model::CatBoost(ObliviousBoostingRegressor::new(p)),
            Self::XGBoost(p) => Model::XGBoost(GradientBoostingRegressor::new(p)),
        }
    }

    /// Family tag.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::KNeighbors(_) => "k_neighbors",
            Self::DecisionTree(_) => "decision_tree",
            Self::RandomForest(_) => "random_forest",
            Self::AdaBoost(_) => "ada_boost",
            Self::Svr(_) => "svr",
            Self::Linear(_) => "linear",
            Self::Ridge(_) => "ridge",
            Self::Lasso(_) => "lasso",
            Self::CatBoost(_) => "catboost",
            Self::XGBoost(_) => "xgboost",
        }
    }

    /// JSON rendering of the bare parameters, for logs and reports.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("params").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}
