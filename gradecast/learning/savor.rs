//! Artifact persistence: versioned JSON envelopes published atomically.
//!
//! A save writes to a temporary file beside the target and renames it into
//! place, so readers never observe a partially written artifact.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    combining::StackingRegressor,
    error::{LearningError, Result},
    transform::TransformerState,
};

/// Format tag written into every envelope.
pub const ARTIFACT_FORMAT: &str = "gradecast-artifact";
/// Envelope schema version; loads reject any other value.
pub const ARTIFACT_VERSION: u32 = 1;

/// A value that can be saved as a standalone artifact.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Kind tag checked on load.
    const KIND: &'static str;
}

impl Artifact for TransformerState {
    const KIND: &'static str = "transformer_state";
}

impl Artifact for StackingRegressor {
    const KIND: &'static str = "stacking_regressor";
}

/// Metadata common to every artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Always [`ARTIFACT_FORMAT`].
    pub format: String,
    /// Envelope schema version.
    pub version: u32,
    /// [`Artifact::KIND`] of the payload.
    pub kind: String,
    /// Save time.
    pub saved_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    format: &'static str,
    version: u32,
    kind: &'static str,
    saved_at: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    kind: String,
    saved_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl Envelope {
    fn header(&self) -> ArtifactHeader {
        ArtifactHeader {
            format: self.format.clone(),
            version: self.version,
            kind: self.kind.clone(),
            saved_at: self.saved_at,
        }
    }
}

fn persistence_err<'a, E>(path: &'a Path, message: &str) -> impl FnOnce(E) -> LearningError + 'a
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = message.to_string();
    move |err| LearningError::persistence(path, message, Some(Box::new(err)))
}

/// Serializes `artifact` to `path`, creating parent directories.
pub fn save_artifact<T: Artifact>(artifact: &T, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(persistence_err(path, "creating artifact directory"))?;

    let envelope = EnvelopeRef {
        format: ARTIFACT_FORMAT,
        version: ARTIFACT_VERSION,
        kind: T::KIND,
        saved_at: Utc::now(),
        payload: artifact,
    };
    let bytes = serde_json::to_vec(&envelope).map_err(persistence_err(path, "serializing"))?;

    let mut tmp =
        NamedTempFile::new_in(&parent).map_err(persistence_err(path, "creating temporary file"))?;
    tmp.write_all(&bytes)
        .map_err(persistence_err(path, "writing temporary file"))?;
    tmp.as_file()
        .sync_all()
        .map_err(persistence_err(path, "syncing temporary file"))?;
    tmp.persist(path).map_err(|err| {
        LearningError::persistence(path, "publishing artifact", Some(Box::new(err.error)))
    })?;
    Ok(path.to_path_buf())
}

/// Reads only the envelope header of an artifact file.
pub fn read_header(path: impl AsRef<Path>) -> Result<ArtifactHeader> {
    read_envelope(path.as_ref()).map(|envelope| envelope.header())
}

fn read_envelope(path: &Path) -> Result<Envelope> {
    if !path.exists() {
        return Err(LearningError::persistence(path, "artifact not found", None));
    }
    let bytes = fs::read(path).map_err(persistence_err(path, "reading artifact"))?;
    let envelope: Envelope =
        serde_json::from_slice(&bytes).map_err(persistence_err(path, "unreadable artifact"))?;
    if envelope.format != ARTIFACT_FORMAT {
        return Err(LearningError::persistence(
            path,
            format!("unknown artifact format '{}'", envelope.format),
            None,
        ));
    }
    if envelope.version != ARTIFACT_VERSION {
        return Err(LearningError::persistence(
            path,
            format!(
                "artifact version {} is incompatible with {ARTIFACT_VERSION}",
                envelope.version
            ),
            None,
        ));
    }
    Ok(envelope)
}

/// Loads an artifact saved by [`save_artifact`].
pub fn load_artifact<T: Artifact>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let envelope = read_envelope(path)?;
    if envelope.kind != T::KIND {
        return Err(LearningError::persistence(
            path,
            format!("expected a {} artifact, found {}", T::KIND, envelope.kind),
            None,
        ));
    }
    serde_json::from_value(envelope.payload)
        .map_err(persistence_err(path, "artifact payload does not match the current schema"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{synthetic::student_frame, transform::FeatureTransformer};
    use tempfile::tempdir;

    fn state() -> TransformerState {
        FeatureTransformer::default()
            .fit(&student_frame(50, 3))
            .unwrap()
    }

    #[test]
    fn round_trip_creates_directories_and_leaves_no_temp_files() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/preprocess_obj.json");
        let original = state();
        save_artifact(&original, &path).unwrap();
        let loaded: TransformerState = load_artifact(&path).unwrap();
        assert_eq!(loaded, original);
        let header = read_header(&path).unwrap();
        assert_eq!(header.kind, "transformer_state");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn overwrite_replaces_previous_artifact() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        save_artifact(&state(), &path).unwrap();
        let second = FeatureTransformer::default()
            .fit(&student_frame(80, 9))
            .unwrap();
        save_artifact(&second, &path).unwrap();
        let loaded: TransformerState = load_artifact(&path).unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn missing_garbage_and_mismatched_files_are_persistence_errors() {
        let tmp = tempdir().unwrap();
        let missing = load_artifact::<TransformerState>(tmp.path().join("absent.json"));
        assert!(matches!(missing, Err(LearningError::Persistence { .. })));

        let garbage = tmp.path().join("garbage.json");
        fs::write(&garbage, b"not json").unwrap();
        assert!(matches!(
            load_artifact::<TransformerState>(&garbage),
            Err(LearningError::Persistence { .. })
        ));

        let path = tmp.path().join("state.json");
        save_artifact(&state(), &path).unwrap();
        assert!(matches!(
            load_artifact::<StackingRegressor>(&path),
            Err(LearningError::Persistence { .. })
        ));

        let old = tmp.path().join("old.json");
        fs::write(
            &old,
            br#"{"format":"gradecast-artifact","version":0,"kind":"transformer_state","saved_at":"2024-01-01T00:00:00Z","payload":{}}"#,
        )
        .unwrap();
        let err = load_artifact::<TransformerState>(&old).unwrap_err();
        assert!(err.to_string().contains("incompatible"));
    }
}
