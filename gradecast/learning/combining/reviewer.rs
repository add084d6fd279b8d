use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result, Stage};

/// Reviewer that validates ensemble predictions.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CombinationReviewer;

impl CombinationReviewer {
    /// Ensures one finite prediction per requested row.
    pub fn review(&self, predictions: &[f64], rows: usize) -> Result<()> {
        if predictions.len() != rows {
            return Err(LearningError::evaluation(format!(
                "ensemble produced {} predictions for {rows} rows",
                predictions.len()
            ))
            .at_stage(Stage::Ensembling));
        }
        if predictions.iter().any(|value| !value.is_finite()) {
            return Err(
                LearningError::evaluation("ensemble produced non-finite values")
                    .at_stage(Stage::Ensembling),
            );
        }
        Ok(())
    }
}
