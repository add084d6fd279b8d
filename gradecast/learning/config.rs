use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};

/// Which hyperparameter grids the candidate registry enumerates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GridProfile {
    /// Multi-point grids for every candidate.
    #[default]
    Full,
    /// Two-point grids and small ensembles for smoke runs.
    Compact,
}

/// Settings for one training run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    /// Cross-validation folds used for tuning, scoring, and stacking.
    pub folds: usize,
    /// Number of ranked candidates stacked into the ensemble.
    pub top_n: usize,
    /// Seed for every stochastic component.
    pub seed: u64,
    /// Grid profile for the candidate registry.
    pub grid: GridProfile,
    /// Directory receiving the published artifacts.
    pub artifacts_dir: PathBuf,
    /// File name of the fitted transformer state.
    pub preprocessor_file: String,
    /// File name of the fitted ensemble.
    pub model_file: String,
    /// File name of the training report.
    pub report_file: String,
    /// Predictions above this value are flagged as out of range.
    pub out_of_range_threshold: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            top_n: 5,
            seed: 42,
            grid: GridProfile::Full,
            artifacts_dir: PathBuf::from("artifacts"),
            preprocessor_file: "preprocess_obj.json".into(),
            model_file: "model.json".into(),
            report_file: "report.json".into(),
            out_of_range_threshold: 100.0,
        }
    }
}

impl TrainerConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| LearningError::Config(format!("reading {}: {err}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|err| LearningError::Config(format!("parsing {}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.folds < 2 {
            return Err(LearningError::Config(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.top_n == 0 {
            return Err(LearningError::Config("top_n must be positive".into()));
        }
        if !self.out_of_range_threshold.is_finite() {
            return Err(LearningError::Config(
                "out_of_range_threshold must be finite".into(),
            ));
        }
        for (field, name) in [
            ("preprocessor_file", &self.preprocessor_file),
            ("model_file", &self.model_file),
            ("report_file", &self.report_file),
        ] {
            if name.trim().is_empty() {
                return Err(LearningError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    /// Overrides the artifact directory.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Overrides the grid profile.
    #[must_use]
    pub fn with_grid(mut self, grid: GridProfile) -> Self {
        self.grid = grid;
        self
    }

    /// Location of the transformer artifact.
    #[must_use]
    pub fn preprocessor_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.preprocessor_file)
    }

    /// Location of the ensemble artifact.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.model_file)
    }

    /// Location of the training report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.report_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trainer.toml");
        fs::write(&path, "grid = \"compact\"\ntop_n = 3\n").unwrap();
        let config = TrainerConfig::load(&path).unwrap();
        assert_eq!(config.grid, GridProfile::Compact);
        assert_eq!(config.top_n, 3);
        assert_eq!(config.folds, 5);
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model.json"));
    }

    #[test]
    fn rejects_single_fold() {
        let config = TrainerConfig {
            folds: 1,
            ..TrainerConfig::default()
        };
        assert!(matches!(config.validate(), Err(LearningError::Config(_))));
    }
}
