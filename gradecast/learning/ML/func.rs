use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{LearningError, Result};

/// Validates a training pair before fitting.
pub fn check_fit_input(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(LearningError::tuning("cannot fit on an empty matrix"));
    }
    if x.nrows() != y.len() {
        return Err(LearningError::tuning(format!(
            "feature rows ({}) and targets ({}) differ",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(LearningError::tuning("training data contains non-finite values"));
    }
    Ok(())
}

/// Validates a prediction matrix against the fitted width.
pub fn check_predict_input(x: ArrayView2<'_, f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(LearningError::tuning(format!(
            "model fitted on {n_features} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Error for predicting with an unfitted model.
pub fn not_fitted(name: &str) -> LearningError {
    LearningError::tuning(format!("{name} used before fit"))
}

/// Column means of `x`.
#[must_use]
pub fn column_means(x: ArrayView2<'_, f64>) -> Array1<f64> {
    x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Mean of a vector (0.0 when empty).
#[must_use]
pub fn mean(v: ArrayView1<'_, f64>) -> f64 {
    v.mean().unwrap_or(0.0)
}

/// Solves `a * w = b` for symmetric positive definite `a` by Cholesky factorization.
///
/// Returns `None` when `a` is not numerically positive definite.
#[must_use]
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 1e-12 * a[[i, i]].abs().max(1e-300) || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in i + 1..n {
            sum -= l[[k, i]] * w[k];
        }
        w[i] = sum / l[[i, i]];
    }
    Some(w)
}

/// Solves the (possibly rank-deficient) normal equations `a * w = b`.
///
/// Retries with a growing diagonal jitter so collinear one-hot blocks still
/// yield a near minimum-norm solution.
pub fn solve_normal_equations(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if let Some(w) = cholesky_solve(a, b) {
        return Ok(w);
    }
    #[allow(clippy::cast_precision_loss)]
    let base = (a.diag().sum() / a.nrows().max(1) as f64).max(1.0);
    let mut jitter = base * 1e-10;
    while jitter <= base * 1e-3 {
        let mut shifted = a.clone();
        shifted.diag_mut().mapv_inplace(|v| v + jitter);
        if let Some(w) = cholesky_solve(&shifted, b) {
            return Ok(w);
        }
        jitter *= 10.0;
    }
    Err(LearningError::tuning("normal equations are singular"))
}

/// Conjugate gradient for symmetric positive semi-definite `a`.
///
/// Stops when the residual norm falls below `tol * |b|` or after `max_iter` steps.
#[must_use]
pub fn conjugate_gradient(
    a: &Array2<f64>,
    b: &Array1<f64>,
    tol: f64,
    max_iter: usize,
) -> Array1<f64> {
    let mut w = Array1::<f64>::zeros(b.len());
    let mut r = b.clone();
    let mut p = r.clone();
    let mut rs_old = r.dot(&r);
    let threshold = (tol * b.dot(b).sqrt()).powi(2);
    for _ in 0..max_iter {
        if rs_old <= threshold {
            break;
        }
        let ap = a.dot(&p);
        let curvature = p.dot(&ap);
        if curvature <= 0.0 {
            break;
        }
        let step = rs_old / curvature;
        w.scaled_add(step, &p);
        r.scaled_add(-step, &ap);
        let rs_new = r.dot(&r);
        p = &r + &(&p * (rs_new / rs_old));
        rs_old = rs_new;
    }
    w
}

/// Squared euclidean distance between two rows.
#[must_use]
pub fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cholesky_solves_spd_system() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let w = cholesky_solve(&a, &b).unwrap();
        let back = a.dot(&w);
        assert!((back[0] - 1.0).abs() < 1e-10 && (back[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn singular_system_falls_back_to_jitter() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![2.0, 2.0];
        assert!(cholesky_solve(&a, &b).is_none());
        let w = solve_normal_equations(&a, &b).unwrap();
        assert!((w[0] + w[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn conjugate_gradient_matches_cholesky() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = array![1.0, 2.0, 3.0];
        let direct = cholesky_solve(&a, &b).unwrap();
        let iterative = conjugate_gradient(&a, &b, 1e-10, 50);
        assert!((&direct - &iterative).iter().all(|d| d.abs() < 1e-8));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![1.0, 2.0];
        assert!(check_fit_input(x.view(), y.view()).is_err());
    }
}
