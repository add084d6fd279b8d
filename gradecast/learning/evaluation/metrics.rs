use ndarray::ArrayView1;

use crate::error::{LearningError, Result};

fn check_pair(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<()> {
    if y_true.is_empty() {
        return Err(LearningError::evaluation("cannot score zero samples"));
    }
    if y_true.len() != y_pred.len() {
        return Err(LearningError::evaluation(format!(
            "{} targets scored against {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_pred.iter().any(|v| !v.is_finite()) {
        return Err(LearningError::evaluation("predictions contain non-finite values"));
    }
    Ok(())
}

/// Mean squared error.
pub fn mean_squared_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64> {
    check_pair(y_true, y_pred)?;
    #[allow(clippy::cast_precision_loss)]
    let n = y_true.len() as f64;
    Ok(y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n)
}

/// Square root of [`mean_squared_error`].
pub fn root_mean_squared_error(
    y_true: ArrayView1<'_, f64>,
    y_pred: ArrayView1<'_, f64>,
) -> Result<f64> {
    mean_squared_error(y_true, y_pred).map(f64::sqrt)
}

/// Mean absolute error.
pub fn mean_absolute_error(
    y_true: ArrayView1<'_, f64>,
    y_pred: ArrayView1<'_, f64>,
) -> Result<f64> {
    check_pair(y_true, y_pred)?;
    #[allow(clippy::cast_precision_loss)]
    let n = y_true.len() as f64;
    Ok(y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n)
}

/// Coefficient of determination.
///
/// Fails with an evaluation error when the targets have zero variance.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64> {
    check_pair(y_true, y_pred)?;
    #[allow(clippy::cast_precision_loss)]
    let mean = y_true.sum() / y_true.len() as f64;
    let total: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if total <= 0.0 {
        return Err(LearningError::evaluation(
            "R2 is undefined for targets with zero variance",
        ));
    }
    let residual: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(1.0 - residual / total)
}
