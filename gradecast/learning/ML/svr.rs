use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{check_fit_input, check_predict_input, mean, not_fitted, squared_distance},
        Regressor,
    },
};

/// Kernel function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// Dot product.
    Linear,
    /// Gaussian radial basis, `exp(-gamma * |a - b|^2)`.
    Rbf,
}

/// RBF width heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// `1 / (n_features * var(X))`.
    Scale,
    /// `1 / n_features`.
    Auto,
}

impl Gamma {
    fn resolve(self, x: ArrayView2<'_, f64>) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let p = x.ncols() as f64;
        match self {
            Self::Auto => 1.0 / p,
            Self::Scale => {
                let var = x.var(0.0);
                if var > 0.0 {
                    1.0 / (p * var)
                } else {
                    1.0
                }
            }
        }
    }
}

/// Epsilon-SVR options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    /// Kernel.
    pub kernel: Kernel,
    /// Box constraint on dual coefficients.
    pub c: f64,
    /// RBF width; ignored by the linear kernel.
    pub gamma: Gamma,
    /// Width of the loss-free tube.
    pub epsilon: f64,
    /// Upper bound on coordinate-descent sweeps.
    pub max_passes: usize,
    /// Stop once no dual coefficient moves more than this in a sweep.
    pub tol: f64,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            c: 1.0,
            gamma: Gamma::Scale,
            epsilon: 0.1,
            max_passes: 200,
            tol: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kernel", rename_all = "snake_case")]
enum SvrFit {
    Linear {
        weights: Array1<f64>,
        bias: f64,
    },
    Rbf {
        support: Array2<f64>,
        coef: Array1<f64>,
        gamma: f64,
        bias: f64,
    },
}

/// Epsilon support vector regression solved in the dual by coordinate descent.
///
/// The bias is folded into the kernel (`K + 1`) and the target mean is
/// removed before solving, so the dual has only box constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorRegressor {
    /// Configuration.
    pub params: SvrParams,
    fitted: Option<SvrFit>,
    n_features: usize,
    n_passes: usize,
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

impl SupportVectorRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: SvrParams) -> Self {
        Self {
            params,
            fitted: None,
            n_features: 0,
            n_passes: 0,
        }
    }

    /// Sweeps used by the last fit.
    #[must_use]
    pub const fn n_passes(&self) -> usize {
        self.n_passes
    }

    fn kernel_matrix(&self, x: ArrayView2<'_, f64>, gamma: f64) -> Array2<f64> {
        let n = x.nrows();
        let mut gram = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let k = match self.params.kernel {
                    Kernel::Linear => x.row(i).dot(&x.row(j)),
                    Kernel::Rbf => (-gamma * squared_distance(x.row(i), x.row(j))).exp(),
                } + 1.0;
                gram[[i, j]] = k;
                gram[[j, i]] = k;
            }
        }
        gram
    }
}

impl Regressor for SupportVectorRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let p = self.params;
        let valid = p.c > 0.0 && p.epsilon >= 0.0 && p.max_passes > 0;
        if !valid {
            return Err(LearningError::tuning(
                "svr needs c > 0, epsilon >= 0 and at least one pass",
            ));
        }
        self.fitted = None;
        let n = x.nrows();
        let offset = mean(y);
        let target = &y - offset;
        let gamma = p.gamma.resolve(x);
        let gram = self.kernel_matrix(x, gamma);
        let mut beta = Array1::<f64>::zeros(n);
        let mut fitted_values = Array1::<f64>::zeros(n);
        let mut passes = 0;
        for _ in 0..p.max_passes {
            passes += 1;
            let mut max_delta = 0.0_f64;
            for i in 0..n {
                let kii = gram[[i, i]];
                let gradient = fitted_values[i] - target[i];
                let proposal =
                    soft_threshold(beta[i] - gradient / kii, p.epsilon / kii).clamp(-p.c, p.c);
                let delta = proposal - beta[i];
                if delta != 0.0 {
                    beta[i] = proposal;
                    fitted_values.scaled_add(delta, &gram.column(i));
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < p.tol {
                break;
            }
        }
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(LearningError::tuning("svr dual diverged"));
        }
        let bias = beta.sum() + offset;
        let fit = match p.kernel {
            Kernel::Linear => SvrFit::Linear {
                weights: x.t().dot(&beta),
                bias,
            },
            Kernel::Rbf => {
                let support: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
                SvrFit::Rbf {
                    support: x.select(Axis(0), &support),
                    coef: support.iter().map(|&i| beta[i]).collect(),
                    gamma,
                    bias,
                }
            }
        };
        self.fitted = Some(fit);
        self.n_features = x.ncols();
        self.n_passes = passes;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| not_fitted("SupportVectorRegressor"))?;
        check_predict_input(x, self.n_features)?;
        Ok(match fit {
            SvrFit::Linear { weights, bias } => x.dot(weights) + *bias,
            SvrFit::Rbf {
                support,
                coef,
                gamma,
                bias,
            } => x
                .rows()
                .into_iter()
                .map(|row| {
                    support
                        .rows()
                        .into_iter()
                        .zip(coef.iter())
                        .map(|(sv, c)| c * (-gamma * squared_distance(sv, row)).exp())
                        .sum::<f64>()
                        + bias
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn linear_kernel_fits_line_within_tube() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64 / 10.0 - 1.5);
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let mut model = SupportVectorRegressor::new(SvrParams {
            kernel: Kernel::Linear,
            c: 10.0,
            epsilon: 0.05,
            max_passes: 1000,
            tol: 1e-7,
            ..SvrParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        let worst = (&pred - &y).iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        assert!(worst < 0.2, "worst residual {worst}");
    }

    #[test]
    fn rbf_kernel_follows_curve() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64 / 6.0);
        let y = x.column(0).mapv(|v| 50.0 + 5.0 * v.sin());
        let mut model = SupportVectorRegressor::new(SvrParams {
            c: 10.0,
            epsilon: 0.1,
            ..SvrParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        let mse = (&pred - &y).mapv(|d| d * d).mean().unwrap();
        assert!(mse < 0.2 * y.var(0.0), "mse {mse}");
    }

    #[test]
    fn gamma_heuristics() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        assert!((Gamma::Auto.resolve(x.view()) - 0.5).abs() < 1e-12);
        // var of all entries is 1
        assert!((Gamma::Scale.resolve(x.view()) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_box_constraint_is_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut model = SupportVectorRegressor::new(SvrParams {
            c: 0.0,
            ..SvrParams::default()
        });
        assert!(model.fit(x.view(), y.view()).is_err());
    }
}
