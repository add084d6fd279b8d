use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    models::{
        func::{
            check_fit_input, check_predict_input, cholesky_solve, column_means,
            conjugate_gradient, mean, not_fitted, solve_normal_equations,
        },
        Regressor,
    },
};

/// Fitted affine map `x . coef + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// One coefficient per input column.
    pub coef: Array1<f64>,
    /// Constant term.
    pub intercept: f64,
}

impl LinearFit {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.coef.len())?;
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

struct Centred {
    x: Array2<f64>,
    y: Array1<f64>,
    x_mean: Array1<f64>,
    y_mean: f64,
}

fn centre(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Centred {
    let x_mean = column_means(x);
    let y_mean = mean(y);
    Centred {
        x: &x - &x_mean,
        y: &y - y_mean,
        x_mean,
        y_mean,
    }
}

impl Centred {
    fn finish(&self, coef: Array1<f64>) -> LinearFit {
        let intercept = self.y_mean - self.x_mean.dot(&coef);
        LinearFit { coef, intercept }
    }
}

/// Ordinary least squares options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearParams {
    /// Estimate a constant term.
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

/// Ordinary least squares through the normal equations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Configuration.
    pub params: LinearParams,
    fitted: Option<LinearFit>,
}

impl LinearRegression {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: LinearParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Fitted coefficients, if any.
    #[must_use]
    pub const fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.fitted = None;
        let fit = if self.params.fit_intercept {
            let c = centre(x, y);
            let gram = c.x.t().dot(&c.x);
            let rhs = c.x.t().dot(&c.y);
            c.finish(solve_normal_equations(&gram, &rhs)?)
        } else {
            let gram = x.t().dot(&x);
            let rhs = x.t().dot(&y);
            LinearFit {
                coef: solve_normal_equations(&gram, &rhs)?,
                intercept: 0.0,
            }
        };
        self.fitted = Some(fit);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| not_fitted("LinearRegression"))?
            .predict(x)
    }
}

/// Linear system solver used by [`RidgeRegression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RidgeSolver {
    /// Direct Cholesky factorization.
    Cholesky,
    /// Iterative conjugate gradient, stopped at `tol`.
    ConjugateGradient,
}

/// Ridge options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgeParams {
    /// L2 penalty strength.
    pub alpha: f64,
    /// Solver for the penalised normal equations.
    pub solver: RidgeSolver,
    /// Relative residual tolerance of iterative solvers.
    pub tol: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            solver: RidgeSolver::Cholesky,
            tol: 1e-4,
        }
    }
}

/// L2-penalised least squares; the intercept is not penalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    /// Configuration.
    pub params: RidgeParams,
    fitted: Option<LinearFit>,
}

impl RidgeRegression {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: RidgeParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.alpha.is_nan() || self.params.alpha < 0.0 {
            return Err(LearningError::tuning("ridge alpha must be non-negative"));
        }
        self.fitted = None;
        let c = centre(x, y);
        let mut gram = c.x.t().dot(&c.x);
        gram.diag_mut().mapv_inplace(|v| v + self.params.alpha);
        let rhs = c.x.t().dot(&c.y);
        let coef = match self.params.solver {
            RidgeSolver::Cholesky => match cholesky_solve(&gram, &rhs) {
                Some(coef) => coef,
                None => solve_normal_equations(&gram, &rhs)?,
            },
            RidgeSolver::ConjugateGradient => {
                conjugate_gradient(&gram, &rhs, self.params.tol, 10 * rhs.len().max(100))
            }
        };
        if coef.iter().any(|v| !v.is_finite()) {
            return Err(LearningError::tuning("ridge solution diverged"));
        }
        self.fitted = Some(c.finish(coef));
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| not_fitted("Ridge"))?
            .predict(x)
    }
}

/// Coordinate visiting order of [`LassoRegression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Columns in order.
    Cyclic,
    /// A fresh seeded permutation of the columns on every pass.
    Random,
}

/// Lasso options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LassoParams {
    /// L1 penalty strength on the `1/(2n)`-scaled squared loss.
    pub alpha: f64,
    /// Coordinate order.
    pub selection: Selection,
    /// Maximum passes over the coordinates.
    pub max_iter: usize,
    /// Stop once the largest coefficient update is below `tol * max|coef|`.
    pub tol: f64,
    /// Seed for [`Selection::Random`].
    pub seed: u64,
}

impl Default for LassoParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            selection: Selection::Cyclic,
            max_iter: 1000,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// L1-penalised least squares by coordinate descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoRegression {
    /// Configuration.
    pub params: LassoParams,
    fitted: Option<LinearFit>,
    n_iter: usize,
}

impl LassoRegression {
    /// Unfitted model.
    #[must_use]
    pub const fn new(params: LassoParams) -> Self {
        Self {
            params,
            fitted: None,
            n_iter: 0,
        }
    }

    /// Passes run by the last fit.
    #[must_use]
    pub const fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Fitted coefficients, if any.
    #[must_use]
    pub const fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

impl Regressor for LassoRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.alpha.is_nan() || self.params.alpha < 0.0 || self.params.max_iter == 0 {
            return Err(LearningError::tuning(
                "lasso needs a non-negative alpha and at least one iteration",
            ));
        }
        self.fitted = None;
        let c = centre(x, y);
        let (n, p) = c.x.dim();
        #[allow(clippy::cast_precision_loss)]
        let penalty = self.params.alpha * n as f64;
        let norms: Vec<f64> = c.x.axis_iter(Axis(1)).map(|col| col.dot(&col)).collect();
        let mut coef = Array1::<f64>::zeros(p);
        let mut residual = c.y.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut order: Vec<usize> = (0..p).collect();
        let mut passes = 0;
        for _ in 0..self.params.max_iter {
            passes += 1;
            if self.params.selection == Selection::Random {
                order.shuffle(&mut rng);
            }
            let mut max_update = 0.0_f64;
            for &j in &order {
                if norms[j] == 0.0 {
                    continue;
                }
                let column = c.x.column(j);
                let old = coef[j];
                let rho = column.dot(&residual) + norms[j] * old;
                let new = soft_threshold(rho, penalty) / norms[j];
                if new != old {
                    residual.scaled_add(old - new, &column);
                    coef[j] = new;
                    max_update = max_update.max((new - old).abs());
                }
            }
            let max_coef = coef.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            if max_update <= self.params.tol * max_coef || max_coef == 0.0 {
                break;
            }
        }
        if coef.iter().any(|v| !v.is_finite()) {
            return Err(LearningError::tuning("lasso coordinate descent diverged"));
        }
        self.n_iter = passes;
        self.fitted = Some(c.finish(coef));
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| not_fitted("Lasso"))?
            .predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn plane() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 1.0],
            [1.0, 0.0],
            [2.0, 2.0],
            [3.0, 1.0],
            [4.0, 3.0],
            [5.0, 0.0]
        ];
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(1).mapv(|v| 3.0 * v) + 4.0;
        (x, y)
    }

    #[test]
    fn ordinary_least_squares_recovers_plane() {
        let (x, y) = plane();
        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(x.view(), y.view()).unwrap();
        let fit = model.coefficients().unwrap();
        assert!((fit.coef[0] - 2.0).abs() < 1e-8);
        assert!((fit.coef[1] + 3.0).abs() < 1e-8);
        assert!((fit.intercept - 4.0).abs() < 1e-8);
    }

    #[test]
    fn collinear_columns_still_predict() {
        let x = array![[1.0, 0.0, 2.0], [0.0, 1.0, 3.0], [1.0, 0.0, 5.0], [0.0, 1.0, 1.0]];
        let y = array![3.0, 4.0, 6.0, 2.0];
        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert!(pred.iter().all(|v| v.is_finite()));
        let sse: f64 = (&pred - &y).mapv(|d| d * d).sum();
        assert!(sse < 5.0);
    }

    #[test]
    fn ridge_solvers_agree_and_shrink() {
        let (x, y) = plane();
        let mut direct = RidgeRegression::new(RidgeParams {
            alpha: 5.0,
            ..RidgeParams::default()
        });
        let mut iterative = RidgeRegression::new(RidgeParams {
            alpha: 5.0,
            solver: RidgeSolver::ConjugateGradient,
            tol: 1e-10,
        });
        direct.fit(x.view(), y.view()).unwrap();
        iterative.fit(x.view(), y.view()).unwrap();
        let a = direct.predict(x.view()).unwrap();
        let b = iterative.predict(x.view()).unwrap();
        assert!((&a - &b).iter().all(|d| d.abs() < 1e-6));
        let fit = direct.fitted.as_ref().unwrap();
        assert!(fit.coef[0].abs() < 2.0);
    }

    #[test]
    fn lasso_zeroes_coefficients_under_heavy_penalty() {
        let (x, y) = plane();
        let mut model = LassoRegression::new(LassoParams {
            alpha: 100.0,
            ..LassoParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        let fit = model.coefficients().unwrap();
        assert!(fit.coef.iter().all(|c| *c == 0.0));
        assert!((fit.intercept - mean(y.view())).abs() < 1e-12);
    }

    #[test]
    fn lasso_random_selection_is_seeded() {
        let (x, y) = plane();
        let params = LassoParams {
            alpha: 0.01,
            selection: Selection::Random,
            ..LassoParams::default()
        };
        let mut first = LassoRegression::new(params);
        let mut second = LassoRegression::new(params);
        first.fit(x.view(), y.view()).unwrap();
        second.fit(x.view(), y.view()).unwrap();
        assert_eq!(first, second);
        assert!((first.coefficients().unwrap().coef[0] - 2.0).abs() < 0.1);
    }

    #[test]
    fn predict_before_fit_fails() {
        let (x, _) = plane();
        let model = RidgeRegression::new(RidgeParams::default());
        assert!(matches!(model.predict(x.view()), Err(LearningError::Tuning { .. })));
    }
}
