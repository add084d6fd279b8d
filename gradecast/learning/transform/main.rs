//! Feature transformation from raw student tables to numeric matrices.

/// Categorical imputation, one-hot encoding, and scaling.
pub mod categorical;
/// Numeric imputation and standardization.
pub mod numeric;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Frame, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS},
    error::Result,
};

pub use categorical::CategoricalColumnState;
pub use numeric::NumericColumnState;

/// Declared input columns of the transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Numeric columns, emitted first in this order.
    pub numeric: Vec<String>,
    /// Categorical columns, expanded after the numeric block in this order.
    pub categorical: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            numeric: NUMERIC_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            categorical: CATEGORICAL_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// Builds [`TransformerState`] from a training frame.
#[derive(Debug, Clone, Default)]
pub struct FeatureTransformer {
    schema: FeatureSchema,
}

impl FeatureTransformer {
    /// Transformer over a custom schema.
    #[must_use]
    pub const fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    /// Fits every column's statistics on `frame`.
    pub fn fit(&self, frame: &Frame) -> Result<TransformerState> {
        let numeric = self
            .schema
            .numeric
            .iter()
            .map(|name| NumericColumnState::fit(name, &frame.numeric(name)?))
            .collect::<Result<Vec<_>>>()?;
        let categorical = self
            .schema
            .categorical
            .iter()
            .map(|name| CategoricalColumnState::fit(name, frame.require(name)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(TransformerState {
            schema: self.schema.clone(),
            numeric,
            categorical,
        })
    }

    /// Fits on `frame` and transforms it.
    pub fn fit_transform(&self, frame: &Frame) -> Result<(TransformerState, Array2<f64>)> {
        let state = self.fit(frame)?;
        let matrix = state.transform(frame)?;
        Ok((state, matrix))
    }
}

/// Fitted, immutable transformation statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerState {
    /// Schema the state was fitted against.
    pub schema: FeatureSchema,
    /// Per numeric column statistics.
    pub numeric: Vec<NumericColumnState>,
    /// Per categorical column statistics.
    pub categorical: Vec<CategoricalColumnState>,
}

impl TransformerState {
    /// Width of the produced matrix.
    #[must_use]
    pub fn n_output_columns(&self) -> usize {
        let categorical: usize = self.categorical.iter().map(CategoricalColumnState::width).sum();
        self.numeric.len() + categorical
    }

    /// Names of the produced columns (`column=label` for indicators).
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|col| col.name.clone())
            .chain(self.categorical.iter().flat_map(|col| {
                col.categories
                    .iter()
                    .map(move |label| format!("{}={label}", col.name))
            }))
            .collect()
    }

    /// Applies the fitted statistics; extra columns in `frame` are ignored.
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((frame.len(), self.n_output_columns()));
        for (col, state) in self.numeric.iter().enumerate() {
            let cells = frame.numeric(&state.name)?;
            for (row, cell) in cells.into_iter().enumerate() {
                matrix[[row, col]] = state.apply(cell);
            }
        }
        let mut offset = self.numeric.len();
        for state in &self.categorical {
            let cells = frame.require(&state.name)?;
            let width = state.width();
            let mut buffer = vec![0.0; width];
            for (row, cell) in cells.iter().enumerate() {
                state.apply(cell.as_deref(), &mut buffer);
                for (idx, value) in buffer.iter().enumerate() {
                    matrix[[row, offset + idx]] = *value;
                }
            }
            offset += width;
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::{StudentRecord, TARGET_COLUMN},
        error::LearningError,
        synthetic::student_frame,
    };

    #[test]
    fn output_shape_is_schema_determined() {
        let frame = student_frame(120, 11);
        let (state, matrix) = FeatureTransformer::default().fit_transform(&frame).unwrap();
        assert_eq!(matrix.nrows(), 120);
        // 2 numeric + 2 genders + 5 groups + 6 education levels + 2 lunch + 2 prep
        assert_eq!(matrix.ncols(), 19);
        assert_eq!(state.output_names().len(), 19);
        assert!(state.output_names()[0] == "reading score");
        assert!(frame.column(TARGET_COLUMN).is_some());
    }

    #[test]
    fn numeric_block_is_standardized_on_fit_set() {
        let frame = student_frame(200, 5);
        let (_, matrix) = FeatureTransformer::default().fit_transform(&frame).unwrap();
        let col = matrix.column(0);
        let mean = col.sum() / 200.0;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 200.0;
        assert!(mean.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unseen_category_maps_to_zero_block() {
        let frame = student_frame(80, 2);
        let state = FeatureTransformer::default().fit(&frame).unwrap();
        let row = Frame::from_records(&[StudentRecord {
            gender: Some("female".into()),
            race_ethnicity: Some("group Z".into()),
            parental_level_of_education: Some("bachelor's degree".into()),
            lunch: Some("standard".into()),
            test_preparation_course: Some("none".into()),
            reading_score: Some(70.0),
            writing_score: Some(72.0),
        }]);
        let matrix = state.transform(&row).unwrap();
        // race/ethnicity indicators follow 2 numeric + 2 gender columns
        assert!(matrix.row(0).iter().skip(4).take(5).all(|v| *v == 0.0));
        assert_eq!(matrix.ncols(), state.n_output_columns());
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let mut frame = student_frame(20, 1);
        frame.take_column("lunch");
        let err = FeatureTransformer::default().fit(&frame).unwrap_err();
        assert!(matches!(err, LearningError::Transformation { .. }));
        assert!(err.to_string().contains("lunch"));
    }
}
