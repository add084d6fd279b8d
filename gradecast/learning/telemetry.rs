use std::{collections::VecDeque, fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use uuid::Uuid;

use crate::error::Stage;

const DEFAULT_JOURNAL_CAPACITY: usize = 256;

/// Event emitted by the learning stack (e.g. `learning.candidate.tuned`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: String,
    /// Module producing the event.
    pub source: String,
    /// Event type.
    pub event_type: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: Value,
}

/// Builder for learning telemetry sinks.
pub struct LearningTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    journal_capacity: usize,
}

impl LearningTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Number of events retained in memory.
    #[must_use]
    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<LearningTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?.with_min_level(self.min_level)),
            None => None,
        };
        Ok(LearningTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                journal: Mutex::new(VecDeque::new()),
                capacity: self.journal_capacity.max(1),
            }),
        })
    }
}

/// Telemetry handle shared across learning components.
#[derive(Clone)]
pub struct LearningTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for LearningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    journal: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
}

impl LearningTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> LearningTelemetryBuilder {
        LearningTelemetryBuilder::new(module)
    }

    /// Logs structured metadata for a pipeline stage.
    pub fn log(&self, level: LogLevel, stage: Stage, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message)
                .with_stage(stage.as_str())
                .with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Records an event in the journal.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let mut journal = self.inner.journal.lock();
        if journal.len() == self.inner.capacity {
            journal.pop_front();
        }
        journal.push_back(EventRecord {
            id: format!("evt-{}", Uuid::new_v4()),
            source: self.inner.module.clone(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
        });
        Ok(())
    }

    /// Snapshot of journaled events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.inner.journal.lock().iter().cloned().collect()
    }
}

/// Logs through an optional telemetry handle, ignoring sink failures.
pub(crate) fn log(
    telemetry: Option<&LearningTelemetry>,
    level: LogLevel,
    stage: Stage,
    message: &str,
    metadata: Value,
) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, stage, message, metadata);
    }
}

/// Emits through an optional telemetry handle, ignoring sink failures.
pub(crate) fn event(telemetry: Option<&LearningTelemetry>, event_type: &str, payload: Value) {
    if let Some(tel) = telemetry {
        let _ = tel.event(event_type, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("learning.log");
        let telemetry = LearningTelemetry::builder("learning")
            .log_path(&path)
            .build()
            .unwrap();
        telemetry
            .log(
                LogLevel::Info,
                Stage::Tuning,
                "candidate_tuned",
                json!({ "candidate": "Ridge" }),
            )
            .unwrap();
        telemetry
            .event("learning.candidate.tuned", json!({ "candidate": "Ridge" }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("candidate_tuned"));
        assert!(content.contains("\"stage\":\"tuning\""));
        assert_eq!(telemetry.events().len(), 1);
    }

    #[test]
    fn journal_is_bounded() {
        let telemetry = LearningTelemetry::builder("learning")
            .journal_capacity(2)
            .build()
            .unwrap();
        for idx in 0..5 {
            telemetry.event("tick", json!({ "idx": idx })).unwrap();
        }
        let events = telemetry.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["idx"], 4);
    }
}
