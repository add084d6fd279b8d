use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result},
    evaluation::metrics::{mean_absolute_error, mean_squared_error, r2_score},
    models::Regressor,
};

/// Train/test indices of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Rows used for fitting.
    pub train: Vec<usize>,
    /// Rows scored.
    pub test: Vec<usize>,
}

/// Contiguous, unshuffled k-fold splitter.
///
/// The first `n % k` folds hold one extra sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    /// Splitter with `n_splits >= 2`.
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits < 2 {
            return Err(LearningError::Config(format!(
                "k-fold needs at least 2 splits, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    /// Number of folds.
    #[must_use]
    pub const fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Folds over `n_samples` rows.
    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if n_samples < self.n_splits {
            return Err(LearningError::tuning(format!(
                "cannot split {n_samples} samples into {} folds",
                self.n_splits
            )));
        }
        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut start = 0;
        Ok((0..self.n_splits)
            .map(|fold| {
                let size = base + usize::from(fold < extra);
                let end = start + size;
                let test: Vec<usize> = (start..end).collect();
                let train: Vec<usize> = (0..start).chain(end..n_samples).collect();
                start = end;
                Fold { train, test }
            })
            .collect())
    }
}

/// Per-fold scoring rule; higher is better for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// Coefficient of determination.
    R2,
    /// Negated mean squared error.
    NegMeanSquaredError,
    /// Negated mean absolute error.
    NegMeanAbsoluteError,
}

impl Scorer {
    /// Scores one fold.
    pub fn score(self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64> {
        match self {
            Self::R2 => r2_score(y_true, y_pred),
            Self::NegMeanSquaredError => mean_squared_error(y_true, y_pred).map(|v| -v),
            Self::NegMeanAbsoluteError => mean_absolute_error(y_true, y_pred).map(|v| -v),
        }
    }
}

/// Per-fold scores of every [`Scorer`] from a single cross-validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    /// R2 per fold.
    pub r2: Vec<f64>,
    /// Negative MSE per fold.
    pub neg_mse: Vec<f64>,
    /// Negative MAE per fold.
    pub neg_mae: Vec<f64>,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

impl CvScores {
    /// Fold scores of `scorer`.
    #[must_use]
    pub fn of(&self, scorer: Scorer) -> &[f64] {
        match scorer {
            Scorer::R2 => &self.r2,
            Scorer::NegMeanSquaredError => &self.neg_mse,
            Scorer::NegMeanAbsoluteError => &self.neg_mae,
        }
    }

    /// Mean fold R2.
    #[must_use]
    pub fn mean_r2(&self) -> f64 {
        mean(&self.r2)
    }

    /// `sqrt(-mean(neg_mse))`: squared errors are averaged across folds
    /// before the root, which differs from the mean of per-fold RMSEs.
    #[must_use]
    pub fn rmse(&self) -> f64 {
        (-mean(&self.neg_mse)).sqrt()
    }

    /// `-mean(neg_mae)`, a positive error.
    #[must_use]
    pub fn mae(&self) -> f64 {
        -mean(&self.neg_mae)
    }
}

/// Fits a fresh clone of `template` on each training fold and scores the
/// held-out fold with every scorer.
pub fn cross_validate<R: Regressor + Clone>(
    template: &R,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    kfold: &KFold,
) -> Result<CvScores> {
    let mut scores = CvScores::default();
    for fold in kfold.split(x.nrows())? {
        let (pred, truth) = fit_fold(template, x, y, &fold)?;
        scores.r2.push(Scorer::R2.score(truth.view(), pred.view())?);
        scores
            .neg_mse
            .push(Scorer::NegMeanSquaredError.score(truth.view(), pred.view())?);
        scores
            .neg_mae
            .push(Scorer::NegMeanAbsoluteError.score(truth.view(), pred.view())?);
    }
    Ok(scores)
}

/// Per-fold scores for a single scorer.
pub fn cross_val_scores<R: Regressor + Clone>(
    template: &R,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    kfold: &KFold,
    scorer: Scorer,
) -> Result<Vec<f64>> {
    kfold
        .split(x.nrows())?
        .iter()
        .map(|fold| {
            let (pred, truth) = fit_fold(template, x, y, fold)?;
            scorer.score(truth.view(), pred.view())
        })
        .collect()
}

/// Out-of-fold predictions: every row is predicted by a model that never saw it.
pub fn cross_val_predict<R: Regressor + Clone>(
    template: &R,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    kfold: &KFold,
) -> Result<Array1<f64>> {
    let mut out = Array1::<f64>::zeros(x.nrows());
    for fold in kfold.split(x.nrows())? {
        let (pred, _) = fit_fold(template, x, y, &fold)?;
        for (row, value) in fold.test.iter().zip(pred.iter()) {
            out[*row] = *value;
        }
    }
    Ok(out)
}

fn fit_fold<R: Regressor + Clone>(
    template: &R,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    fold: &Fold,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let mut model = template.clone();
    let train_x = x.select(Axis(0), &fold.train);
    let train_y = y.select(Axis(0), &fold.train);
    model.fit(train_x.view(), train_y.view())?;
    let test_x = x.select(Axis(0), &fold.test);
    let pred = model.predict(test_x.view())?;
    if pred.iter().any(|v| !v.is_finite()) {
        return Err(LearningError::tuning(
            "model produced non-finite predictions on a validation fold",
        ));
    }
    Ok((pred, y.select(Axis(0), &fold.test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinearParams, LinearRegression};
    use ndarray::{Array2, ArrayView1};

    #[test]
    fn folds_are_contiguous_and_cover_every_row_once() {
        let folds = KFold::new(5).unwrap().split(12).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2, 2]);
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[1].test, vec![3, 4, 5]);
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 12);
            assert!(fold.test.iter().all(|i| !fold.train.contains(i)));
        }
    }

    #[test]
    fn too_few_samples_or_splits_fail() {
        assert!(KFold::new(1).is_err());
        assert!(KFold::new(5).unwrap().split(4).is_err());
    }

    #[derive(Clone)]
    struct MeanModel(f64);

    impl Regressor for MeanModel {
        fn fit(&mut self, _x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
            self.0 = y.mean().unwrap_or(0.0);
            Ok(())
        }

        fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.0))
        }
    }

    #[derive(Clone)]
    struct DivergingModel;

    impl Regressor for DivergingModel {
        fn fit(&mut self, _x: ArrayView2<'_, f64>, _y: ArrayView1<'_, f64>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), f64::INFINITY))
        }
    }

    #[test]
    fn non_finite_fold_predictions_are_fit_failures() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let kfold = KFold::new(5).unwrap();
        let err = cross_validate(&DivergingModel, x.view(), y.view(), &kfold).unwrap_err();
        assert!(matches!(err, LearningError::Tuning { .. }));
        let err = cross_val_scores(&DivergingModel, x.view(), y.view(), &kfold, Scorer::R2)
            .unwrap_err();
        assert!(matches!(err, LearningError::Tuning { .. }));
        assert!(cross_val_predict(&DivergingModel, x.view(), y.view(), &kfold).is_err());
    }

    #[test]
    fn out_of_fold_predictions_exclude_own_fold() {
        let x = Array2::<f64>::zeros((4, 1));
        let y = ndarray::array![0.0, 0.0, 4.0, 4.0];
        let kfold = KFold::new(2).unwrap();
        let oof = cross_val_predict(&MeanModel(0.0), x.view(), y.view(), &kfold).unwrap();
        assert_eq!(oof.to_vec(), vec![4.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn single_pass_matches_per_scorer_passes() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = x.column(0).mapv(|v| 1.5 * v) + x.column(1).mapv(|v| (v * 0.9).sin());
        let kfold = KFold::new(5).unwrap();
        let template = LinearRegression::new(LinearParams::default());
        let all = cross_validate(&template, x.view(), y.view(), &kfold).unwrap();
        for scorer in [Scorer::R2, Scorer::NegMeanSquaredError, Scorer::NegMeanAbsoluteError] {
            let single = cross_val_scores(&template, x.view(), y.view(), &kfold, scorer).unwrap();
            assert_eq!(single, all.of(scorer));
        }
        let expected_rmse = (-all.neg_mse.iter().sum::<f64>() / 5.0).sqrt();
        assert!((all.rmse() - expected_rmse).abs() < 1e-12);
        assert!(all.mae() > 0.0);
    }

    #[test]
    fn rmse_is_root_of_mean_not_mean_of_roots() {
        let scores = CvScores {
            r2: vec![0.5, 0.5],
            neg_mse: vec![-1.0, -9.0],
            neg_mae: vec![-1.0, -3.0],
        };
        assert!((scores.rmse() - 5.0_f64.sqrt()).abs() < 1e-12);
        assert!((scores.mae() - 2.0).abs() < 1e-12);
        assert!((scores.mean_r2() - 0.5).abs() < 1e-12);
    }
}
