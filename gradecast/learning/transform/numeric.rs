use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};

/// Fitted median imputer followed by a standard scaler for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumnState {
    /// Column name.
    pub name: String,
    /// Fit-set median used for missing cells.
    pub median: f64,
    /// Fit-set mean after imputation.
    pub mean: f64,
    /// Fit-set standard deviation after imputation (1.0 when constant).
    pub scale: f64,
}

impl NumericColumnState {
    /// Fits imputation and scaling statistics.
    pub fn fit(name: &str, cells: &[Option<f64>]) -> Result<Self> {
        let mut observed: Vec<f64> = cells.iter().flatten().copied().collect();
        if observed.is_empty() {
            return Err(LearningError::transformation(format!(
                "numeric column '{name}' has no observed values"
            )));
        }
        observed.sort_by(f64::total_cmp);
        let mid = observed.len() / 2;
        let median = if observed.len() % 2 == 0 {
            (observed[mid - 1] + observed[mid]) / 2.0
        } else {
            observed[mid]
        };
        let imputed: Vec<f64> = cells.iter().map(|cell| cell.unwrap_or(median)).collect();
        #[allow(clippy::cast_precision_loss)]
        let n = imputed.len() as f64;
        let mean = imputed.iter().sum::<f64>() / n;
        let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let scale = if variance > 0.0 { variance.sqrt() } else { 1.0 };
        Ok(Self {
            name: name.to_string(),
            median,
            mean,
            scale,
        })
    }

    /// Imputes and standardizes one cell.
    #[must_use]
    pub fn apply(&self, cell: Option<f64>) -> f64 {
        (cell.unwrap_or(self.median) - self.mean) / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_fills_missing_before_scaling() {
        let state =
            NumericColumnState::fit("reading score", &[Some(1.0), None, Some(3.0), Some(10.0)])
                .unwrap();
        assert!((state.median - 3.0).abs() < 1e-12);
        // imputed column is [1, 3, 3, 10]
        assert!((state.mean - 4.25).abs() < 1e-12);
        assert!(state.apply(None).abs() < 1.0);
        assert!((state.apply(Some(state.mean))).abs() < 1e-12);
    }

    #[test]
    fn constant_column_keeps_unit_scale() {
        let state = NumericColumnState::fit("x", &[Some(5.0), Some(5.0)]).unwrap();
        assert!((state.scale - 1.0).abs() < f64::EPSILON);
        assert!(state.apply(Some(5.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn all_missing_column_is_rejected() {
        assert!(NumericColumnState::fit("x", &[None, None]).is_err());
    }
}
