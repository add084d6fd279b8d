use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed cause attached to I/O-backed failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage an error (or log record) belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// CSV reading and train/test splitting.
    Ingestion,
    /// Feature transformer fit/transform.
    Transformation,
    /// Per-candidate grid search.
    Tuning,
    /// Metric computation and ranking.
    Evaluation,
    /// Stacked ensemble construction.
    Ensembling,
    /// Artifact save/load.
    Persistence,
    /// Serving predictions from loaded artifacts.
    Inference,
    /// Configuration loading and validation.
    Config,
}

impl Stage {
    /// Stable lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Transformation => "transformation",
            Self::Tuning => "tuning",
            Self::Evaluation => "evaluation",
            Self::Ensembling => "ensembling",
            Self::Persistence => "persistence",
            Self::Inference => "inference",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the learning stack.
#[derive(Debug, Error)]
pub enum LearningError {
    /// Schema mismatch or malformed values at fit/transform time.
    #[error("transformation failed during {stage}: {message}")]
    Transformation {
        /// Stage that observed the failure.
        stage: Stage,
        /// Description of the failure.
        message: String,
    },
    /// A model could not be fitted or applied.
    #[error("tuning failed during {stage}: {message}")]
    Tuning {
        /// Stage that observed the failure.
        stage: Stage,
        /// Description of the failure.
        message: String,
    },
    /// A metric could not be computed (e.g. zero target variance).
    #[error("evaluation failed during {stage}: {message}")]
    Evaluation {
        /// Stage that observed the failure.
        stage: Stage,
        /// Description of the failure.
        message: String,
    },
    /// Artifact missing, unreadable, or incompatible.
    #[error("persistence failed for {}: {message}", .path.display())]
    Persistence {
        /// Artifact location.
        path: PathBuf,
        /// Description of the failure.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },
    /// Input table could not be read.
    #[error("ingestion failed for {}: {message}", .path.display())]
    Ingestion {
        /// Input location.
        path: PathBuf,
        /// Description of the failure.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },
    /// Invalid trainer configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LearningError {
    /// Transformation failure at the transformation stage.
    pub fn transformation(message: impl Into<String>) -> Self {
        Self::Transformation {
            stage: Stage::Transformation,
            message: message.into(),
        }
    }

    /// Fitting failure at the tuning stage.
    pub fn tuning(message: impl Into<String>) -> Self {
        Self::Tuning {
            stage: Stage::Tuning,
            message: message.into(),
        }
    }

    /// Metric failure at the evaluation stage.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            stage: Stage::Evaluation,
            message: message.into(),
        }
    }

    /// Persistence failure with an optional cause.
    pub fn persistence(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Ingestion failure with an optional cause.
    pub fn ingestion(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Ingestion {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Stage the error is attributed to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Transformation { stage, .. }
            | Self::Tuning { stage, .. }
            | Self::Evaluation { stage, .. } => *stage,
            Self::Persistence { .. } => Stage::Persistence,
            Self::Ingestion { .. } => Stage::Ingestion,
            Self::Config(_) => Stage::Config,
        }
    }

    /// Re-attributes staged errors to `stage`; other variants are unchanged.
    #[must_use]
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Transformation { message, .. } => Self::Transformation { stage, message },
            Self::Tuning { message, .. } => Self::Tuning { stage, message },
            Self::Evaluation { message, .. } => Self::Evaluation { stage, message },
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = LearningError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn restaging_keeps_message() {
        let err = LearningError::tuning("singular system").at_stage(Stage::Ensembling);
        assert_eq!(err.stage(), Stage::Ensembling);
        assert!(err.to_string().contains("ensembling"));
        assert!(err.to_string().contains("singular system"));
    }

    #[test]
    fn persistence_exposes_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = LearningError::persistence("artifacts/model.json", "missing", Some(Box::new(io)));
        assert_eq!(err.stage(), Stage::Persistence);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("artifacts/model.json"));
    }
}
