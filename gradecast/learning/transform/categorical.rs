use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};

/// Fitted most-frequent imputer, one-hot encoder, and non-centering scaler for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumnState {
    /// Column name.
    pub name: String,
    /// Fit-set mode used for missing cells (ties resolve to the smallest label).
    pub most_frequent: String,
    /// Sorted vocabulary observed during fit; one indicator column each.
    pub categories: Vec<String>,
    /// Per-indicator standard deviation on the fit set (1.0 when constant).
    pub scales: Vec<f64>,
}

impl CategoricalColumnState {
    /// Fits imputation, vocabulary, and scale factors.
    pub fn fit(name: &str, cells: &[Option<String>]) -> Result<Self> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for cell in cells.iter().flatten() {
            *counts.entry(cell.as_str()).or_default() += 1;
        }
        // BTreeMap iterates in label order, so the first maximum is the smallest label.
        let most_frequent = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (&label, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, _)| label.to_string())
            .ok_or_else(|| {
                LearningError::transformation(format!(
                    "categorical column '{name}' has no observed values"
                ))
            })?;
        let categories: Vec<String> = counts.keys().map(|label| (*label).to_string()).collect();
        let missing = cells.iter().filter(|cell| cell.is_none()).count();
        #[allow(clippy::cast_precision_loss)]
        let n = cells.len() as f64;
        let scales = categories
            .iter()
            .map(|label| {
                let mut hits = counts[label.as_str()];
                if *label == most_frequent {
                    hits += missing;
                }
                #[allow(clippy::cast_precision_loss)]
                let p = hits as f64 / n;
                let variance = p * (1.0 - p);
                if variance > 0.0 {
                    variance.sqrt()
                } else {
                    1.0
                }
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            most_frequent,
            categories,
            scales,
        })
    }

    /// Number of indicator columns produced.
    #[must_use]
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Writes the scaled indicators for one cell into `out` (length `width()`).
    ///
    /// Labels outside the vocabulary leave `out` all zero.
    pub fn apply(&self, cell: Option<&str>, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        let label = cell.unwrap_or(&self.most_frequent);
        if let Ok(idx) = self
            .categories
            .binary_search_by(|probe| probe.as_str().cmp(label))
        {
            out[idx] = 1.0 / self.scales[idx];
        }
    }
}
