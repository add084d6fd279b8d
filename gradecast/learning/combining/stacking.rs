use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearningError, Result, Stage},
    models::{
        func::{check_fit_input, check_predict_input, not_fitted},
        LinearFit, LinearParams, LinearRegression, Model, Regressor,
    },
    tuning::{cross_val_predict, KFold},
};

/// One first-stage learner of the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackMember {
    /// Candidate name.
    pub name: String,
    /// Base model.
    pub model: Model,
}

/// Two-stage stacked regressor.
///
/// Each member's out-of-fold predictions on the training rows become one
/// column of the meta-features; a [`LinearRegression`] fitted on them
/// combines member predictions. Members are then refit on every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingRegressor {
    members: Vec<StackMember>,
    meta: LinearRegression,
    kfold: KFold,
    n_features: usize,
}

impl StackingRegressor {
    /// Unfitted stack over `members`, at least one.
    pub fn new(members: Vec<StackMember>, kfold: KFold) -> Result<Self> {
        if members.is_empty() {
            return Err(LearningError::tuning("a stack needs at least one member")
                .at_stage(Stage::Ensembling));
        }
        Ok(Self {
            members,
            meta: LinearRegression::new(LinearParams::default()),
            kfold,
            n_features: 0,
        })
    }

    /// Members in stacking order.
    #[must_use]
    pub fn members(&self) -> &[StackMember] {
        &self.members
    }

    /// Member names in stacking order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    /// Fitted meta-model coefficients (one per member) and intercept.
    #[must_use]
    pub const fn meta_coefficients(&self) -> Option<&LinearFit> {
        self.meta.coefficients()
    }

    /// Width of the feature matrix the stack was fitted on.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Member predictions laid out as meta-feature columns.
    pub fn member_predictions(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let mut meta_x = Array2::<f64>::zeros((x.nrows(), self.members.len()));
        for (j, member) in self.members.iter().enumerate() {
            let pred = member.model.predict(x)?;
            meta_x.column_mut(j).assign(&pred);
        }
        Ok(meta_x)
    }
}

impl Regressor for StackingRegressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = 0;
        let mut meta_x = Array2::<f64>::zeros((x.nrows(), self.members.len()));
        for (j, member) in self.members.iter().enumerate() {
            let oof = cross_val_predict(&member.model, x, y, &self.kfold)?;
            meta_x.column_mut(j).assign(&oof);
        }
        self.meta.fit(meta_x.view(), y)?;
        for member in &mut self.members {
            member.model.fit(x, y)?;
        }
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(not_fitted("StackingRegressor"));
        }
        check_predict_input(x, self.n_features)?;
        let meta_x = self.member_predictions(x)?;
        self.meta.predict(meta_x.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KNeighborsParams, ParamSet, RidgeParams};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| ((i * (j + 2) * 11) % 29) as f64);
        let y = x.column(0).mapv(|v| 1.5 * v + 3.0) + x.column(1).mapv(|v| (v * 0.4).sin());
        (x, y)
    }

    fn member(name: &str, params: ParamSet) -> StackMember {
        StackMember {
            name: name.into(),
            model: params.build(),
        }
    }

    #[test]
    fn single_member_stack_is_affine_in_base_prediction() {
        let (x, y) = data();
        let kfold = KFold::new(5).unwrap();
        let mut stack = StackingRegressor::new(
            vec![member("knn", ParamSet::KNeighbors(KNeighborsParams::default()))],
            kfold,
        )
        .unwrap();
        stack.fit(x.view(), y.view()).unwrap();
        let fit = stack.meta_coefficients().unwrap().clone();
        assert_eq!(fit.coef.len(), 1);
        let base = stack.members()[0].model.predict(x.view()).unwrap();
        let pred = stack.predict(x.view()).unwrap();
        for (p, b) in pred.iter().zip(base.iter()) {
            assert!((p - (fit.coef[0] * b + fit.intercept)).abs() < 1e-9);
        }
    }

    #[test]
    fn stack_fits_well_and_refits_members() {
        let (x, y) = data();
        let mut stack = StackingRegressor::new(
            vec![
                member("ridge", ParamSet::Ridge(RidgeParams::default())),
                member("knn", ParamSet::KNeighbors(KNeighborsParams::default())),
            ],
            KFold::new(5).unwrap(),
        )
        .unwrap();
        stack.fit(x.view(), y.view()).unwrap();
        assert_eq!(stack.member_names().collect::<Vec<_>>(), ["ridge", "knn"]);
        assert_eq!(stack.n_features(), 2);
        let pred = stack.predict(x.view()).unwrap();
        let mse = (&pred - &y).mapv(|d| d * d).mean().unwrap();
        assert!(mse < 0.1 * y.var(0.0), "mse {mse}");
    }

    #[test]
    fn empty_or_unfitted_stack_fails() {
        let kfold = KFold::new(5).unwrap();
        assert!(StackingRegressor::new(Vec::new(), kfold).is_err());
        let stack = StackingRegressor::new(
            vec![member("ridge", ParamSet::Ridge(RidgeParams::default()))],
            kfold,
        )
        .unwrap();
        assert!(stack.predict(Array2::zeros((1, 2)).view()).is_err());
    }

    #[test]
    fn survives_json_round_trip() {
        let (x, y) = data();
        let mut stack = StackingRegressor::new(
            vec![member("ridge", ParamSet::Ridge(RidgeParams::default()))],
            KFold::new(3).unwrap(),
        )
        .unwrap();
        stack.fit(x.view(), y.view()).unwrap();
        let text = serde_json::to_string(&stack).unwrap();
        let back: StackingRegressor = serde_json::from_str(&text).unwrap();
        let a = stack.predict(x.view()).unwrap();
        let b = back.predict(x.view()).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(p, q)| (p - q).abs() < 1e-12));
    }
}
