use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use ndarray::Array1;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result, Stage};

/// Column holding the score to predict.
pub const TARGET_COLUMN: &str = "math score";
/// Numeric feature columns, in output order.
pub const NUMERIC_COLUMNS: [&str; 2] = ["reading score", "writing score"];
/// Categorical feature columns, in output order.
pub const CATEGORICAL_COLUMNS: [&str; 5] = [
    "gender",
    "race/ethnicity",
    "parental level of education",
    "lunch",
    "test preparation course",
];

/// One inference/training observation with the fixed student schema.
///
/// Missing cells are `None` and are imputed by the feature transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StudentRecord {
    /// Student gender.
    #[serde(rename = "gender")]
    pub gender: Option<String>,
    /// Ethnicity group label (e.g. `group B`).
    #[serde(rename = "race/ethnicity")]
    pub race_ethnicity: Option<String>,
    /// Highest parental education level.
    #[serde(rename = "parental level of education")]
    pub parental_level_of_education: Option<String>,
    /// Lunch programme.
    #[serde(rename = "lunch")]
    pub lunch: Option<String>,
    /// Test preparation course completion.
    #[serde(rename = "test preparation course")]
    pub test_preparation_course: Option<String>,
    /// Reading score.
    #[serde(rename = "reading score")]
    pub reading_score: Option<f64>,
    /// Writing score.
    #[serde(rename = "writing score")]
    pub writing_score: Option<f64>,
}

impl StudentRecord {
    fn cells(&self) -> [(&'static str, Option<String>); 7] {
        [
            ("gender", self.gender.clone()),
            ("race/ethnicity", self.race_ethnicity.clone()),
            (
                "parental level of education",
                self.parental_level_of_education.clone(),
            ),
            ("lunch", self.lunch.clone()),
            (
                "test preparation course",
                self.test_preparation_course.clone(),
            ),
            ("reading score", self.reading_score.map(|v| v.to_string())),
            ("writing score", self.writing_score.map(|v| v.to_string())),
        ]
    }
}

/// Column-oriented table of raw string cells keyed by header name.
///
/// Empty cells are stored as `None`. Column order follows the source header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: IndexMap<String, Vec<Option<String>>>,
    rows: usize,
}

impl Frame {
    /// Builds a frame from named columns of equal length.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<Option<String>>)>,
    ) -> Result<Self> {
        let mut frame = Self::default();
        for (idx, (name, cells)) in columns.into_iter().enumerate() {
            if idx == 0 {
                frame.rows = cells.len();
            } else if cells.len() != frame.rows {
                return Err(LearningError::transformation(format!(
                    "column '{name}' has {} rows, expected {}",
                    cells.len(),
                    frame.rows
                )));
            }
            frame.columns.insert(name, cells);
        }
        Ok(frame)
    }

    /// Builds a frame with the fixed feature columns from typed records.
    #[must_use]
    pub fn from_records(records: &[StudentRecord]) -> Self {
        let mut columns: IndexMap<String, Vec<Option<String>>> = IndexMap::new();
        for record in records {
            for (name, cell) in record.cells() {
                columns.entry(name.to_string()).or_default().push(cell);
            }
        }
        Self {
            columns,
            rows: records.len(),
        }
    }

    /// Reads a headered CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|err| {
            LearningError::ingestion(path, "opening csv", Some(Box::new(err)))
        })?;
        Self::from_csv_reader(file).map_err(|err| match err {
            LearningError::Ingestion {
                message, source, ..
            } => LearningError::ingestion(path, message, source),
            other => other,
        })
    }

    /// Reads headered CSV from any reader.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| csv_error("reading csv header", err))?
            .iter()
            .map(ToOwned::to_owned)
            .collect();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for (line, record) in reader.records().enumerate() {
            let record =
                record.map_err(|err| csv_error(&format!("reading row {}", line + 1), err))?;
            for (column, cell) in cells.iter_mut().zip(record.iter()) {
                column.push(if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_owned())
                });
            }
        }
        Self::from_columns(headers.into_iter().zip(cells))
    }

    /// Writes the frame as headered CSV, creating parent directories.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                LearningError::ingestion(path, "creating output dir", Some(Box::new(err)))
            })?;
        }
        let mut writer = csv::Writer::from_path(path)
            .map_err(|err| LearningError::ingestion(path, "creating csv", Some(Box::new(err))))?;
        let wrap =
            |err: csv::Error| LearningError::ingestion(path, "writing csv", Some(Box::new(err)));
        writer.write_record(self.columns.keys()).map_err(wrap)?;
        for row in 0..self.rows {
            writer
                .write_record(
                    self.columns
                        .values()
                        .map(|column| column[row].as_deref().unwrap_or("")),
                )
                .map_err(wrap)?;
        }
        writer.flush().map_err(|err| {
            LearningError::ingestion(path, "flushing csv", Some(Box::new(err)))
        })?;
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Raw cells of a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Raw cells of a required column.
    pub fn require(&self, name: &str) -> Result<&[Option<String>]> {
        self.column(name).ok_or_else(|| {
            LearningError::transformation(format!("required column '{name}' is absent"))
        })
    }

    /// Parses a required column as numbers, keeping missing cells as `None`.
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.require(name)?
            .iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(raw) => raw
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(Some)
                    .ok_or_else(|| {
                        LearningError::transformation(format!(
                            "column '{name}' row {row}: '{raw}' is not a number"
                        ))
                    }),
            })
            .collect()
    }

    /// Removes a column and returns its cells.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<Option<String>>> {
        self.columns.shift_remove(name)
    }

    /// Rows at `indices`, in that order.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, cells)| {
                (
                    name.clone(),
                    indices.iter().map(|&idx| cells[idx].clone()).collect(),
                )
            })
            .collect();
        Self {
            columns,
            rows: indices.len(),
        }
    }
}

/// Feature frame paired with the numeric target.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature columns (target removed).
    pub features: Frame,
    /// One target per row.
    pub target: Array1<f64>,
}

impl Dataset {
    /// Splits `target_column` off `frame`. Every target must be present and numeric.
    pub fn from_frame(mut frame: Frame, target_column: &str) -> Result<Self> {
        let target = frame.numeric(target_column)?;
        frame.take_column(target_column);
        let target = target
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| {
                    LearningError::transformation(format!(
                        "target '{target_column}' missing at row {row}"
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self {
            features: frame,
            target: Array1::from(target),
        })
    }

    /// Reads a headered CSV with the student schema.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_frame(Frame::from_csv_path(path)?, TARGET_COLUMN).map_err(|err| match err {
            LearningError::Transformation { message, .. } => LearningError::Transformation {
                stage: Stage::Ingestion,
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.target.len()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Shuffles rows with `seed` and splits off `test_ratio` of them as the test frame.
pub fn split_train_test(frame: &Frame, test_ratio: f64, seed: u64) -> Result<(Frame, Frame)> {
    if !(0.0..1.0).contains(&test_ratio) || test_ratio == 0.0 {
        return Err(LearningError::Config(format!(
            "test ratio must lie in (0, 1), got {test_ratio}"
        )));
    }
    let mut indices: Vec<usize> = (0..frame.len()).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let test_len = (frame.len() as f64 * test_ratio).ceil() as usize;
    if test_len == 0 || test_len >= frame.len() {
        return Err(LearningError::transformation(format!(
            "cannot split {} rows with test ratio {test_ratio}",
            frame.len()
        )));
    }
    let (test, train) = indices.split_at(test_len);
    Ok((frame.select_rows(train), frame.select_rows(test)))
}

/// Paths written by the one-shot ingestion step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionOutput {
    /// Copy of the raw input.
    pub raw: PathBuf,
    /// Training split.
    pub train: PathBuf,
    /// Held-out split.
    pub test: PathBuf,
    /// Rows in the training split.
    pub train_rows: usize,
    /// Rows in the held-out split.
    pub test_rows: usize,
}

/// Copies `raw_csv` into `out_dir` as `data.csv` and writes `train.csv`/`test.csv`.
pub fn ingest(
    raw_csv: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    test_ratio: f64,
    seed: u64,
) -> Result<IngestionOutput> {
    let frame = Frame::from_csv_path(raw_csv)?;
    frame.require(TARGET_COLUMN).map_err(|err| err.at_stage(Stage::Ingestion))?;
    let (train, test) = split_train_test(&frame, test_ratio, seed)?;
    let out_dir = out_dir.as_ref();
    let output = IngestionOutput {
        raw: out_dir.join("data.csv"),
        train: out_dir.join("train.csv"),
        test: out_dir.join("test.csv"),
        train_rows: train.len(),
        test_rows: test.len(),
    };
    frame.write_csv(&output.raw)?;
    train.write_csv(&output.train)?;
    test.write_csv(&output.test)?;
    Ok(output)
}

fn csv_error(message: &str, err: csv::Error) -> LearningError {
    LearningError::ingestion(PathBuf::from("<reader>"), message, Some(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "gender,race/ethnicity,parental level of education,lunch,test preparation course,math score,reading score,writing score
female,group B,bachelor's degree,standard,none,72,72,74
male,group C,some college,free/reduced,completed,69,,88
female,,master's degree,standard,none,90,95,93
";

    #[test]
    fn reads_csv_with_missing_cells() {
        let frame = Frame::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.numeric("reading score").unwrap()[1], None);
        assert_eq!(frame.require("race/ethnicity").unwrap()[2], None);
    }

    #[test]
    fn dataset_splits_off_target() {
        let frame = Frame::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        let dataset = Dataset::from_frame(frame, TARGET_COLUMN).unwrap();
        assert_eq!(dataset.target.to_vec(), vec![72.0, 69.0, 90.0]);
        assert!(dataset.features.column(TARGET_COLUMN).is_none());
    }

    #[test]
    fn malformed_number_is_a_transformation_error() {
        let frame =
            Frame::from_csv_reader("reading score,math score\nseventy,1\n".as_bytes()).unwrap();
        assert!(matches!(
            frame.numeric("reading score"),
            Err(LearningError::Transformation { .. })
        ));
    }

    #[test]
    fn split_is_disjoint_and_seeded() {
        let frame = Frame::from_columns([(
            "id".to_string(),
            (0..50).map(|idx| Some(idx.to_string())).collect(),
        )])
        .unwrap();
        let (train, test) = split_train_test(&frame, 0.2, 42).unwrap();
        assert_eq!((train.len(), test.len()), (40, 10));
        let mut ids: Vec<_> = train
            .require("id")
            .unwrap()
            .iter()
            .chain(test.require("id").unwrap())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
        let (again, _) = split_train_test(&frame, 0.2, 42).unwrap();
        assert_eq!(train, again);
    }

    #[test]
    fn ingest_writes_three_files() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        fs::write(&raw, SAMPLE).unwrap();
        let output = ingest(&raw, dir.path().join("artifacts"), 0.34, 7).unwrap();
        assert_eq!(output.train_rows + output.test_rows, 3);
        let train = Dataset::from_csv_path(&output.train).unwrap();
        assert_eq!(train.len(), output.train_rows);
        assert!(output.raw.exists());
    }

    #[test]
    fn records_round_trip_through_frame() {
        let record = StudentRecord {
            gender: Some("female".into()),
            reading_score: Some(70.0),
            ..StudentRecord::default()
        };
        let frame = Frame::from_records(&[record]);
        assert_eq!(frame.numeric("reading score").unwrap(), vec![Some(70.0)]);
        assert_eq!(frame.require("lunch").unwrap()[0], None);
    }
}
