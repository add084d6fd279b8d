use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, not_fitted, squared_distance},
        Regressor,
    },
};

/// Neighbour weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weights {
    /// Plain mean of the neighbours.
    Uniform,
    /// Inverse-distance weighted mean; exact matches take all the weight.
    Distance,
}

/// Distance between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// L2 distance.
    Euclidean,
    /// L1 distance.
    Manhattan,
}

impl DistanceMetric {
    fn distance(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Euclidean => squared_distance(a, b).sqrt(),
            Self::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

/// k-NN options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KNeighborsParams {
    /// Neighbours consulted per query (capped at the training size).
    pub n_neighbors: usize,
    /// Weighting scheme.
    pub weights: Weights,
    /// Distance.
    pub metric: DistanceMetric,
}

impl Default for KNeighborsParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
            metric: DistanceMetric::Euclidean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Memory {
    x: Array2<f64>,
    y: Array1<f64>,
}

/// Brute-force k nearest neighbours regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsRegressor {
    /// Configuration.
    pub params: KNeighborsParams,
    memory: Option<Memory>,
}

impl KNeighborsRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: KNeighborsParams) -> Self {
        Self {
            params,
            memory: None,
        }
    }

    fn predict_row(&self, memory: &Memory, row: ArrayView1<'_, f64>) -> f64 {
        let mut ranked: Vec<(f64, usize)> = memory
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, sample)| (self.params.metric.distance(sample, row), idx))
            .collect();
        ranked.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        let k = self.params.n_neighbors.min(ranked.len());
        let neighbours = &ranked[..k];
        match self.params.weights {
            Weights::Uniform => {
                let total: f64 = neighbours.iter().map(|(_, idx)| memory.y[*idx]).sum();
                #[allow(clippy::cast_precision_loss)]
                let count = k as f64;
                total / count
            }
            Weights::Distance => {
                let exact: Vec<f64> = neighbours
                    .iter()
                    .filter(|(dist, _)| *dist == 0.0)
                    .map(|(_, idx)| memory.y[*idx])
                    .collect();
                if !exact.is_empty() {
                    #[allow(clippy::cast_precision_loss)]
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = neighbours.iter().fold((0.0, 0.0), |(num, den), (dist, idx)| {
                    (num + memory.y[*idx] / dist, den + 1.0 / dist)
                });
                num / den
            }
        }
    }
}

impl Regressor for KNeighborsRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_neighbors == 0 {
            return Err(LearningError::tuning("n_neighbors must be positive"));
        }
        self.memory = Some(Memory {
            x: x.to_owned(),
            y: y.to_owned(),
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or_else(|| not_fitted("KNeighborsRegressor"))?;
        check_predict_input(x, memory.x.ncols())?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(memory, row)).collect())
    }
}
