use crate::align::ModelFeatureSchema;
use crate::config::ArtifactSettings;
use crate::download::{ArtifactFetcher, DownloadError, FetchOutcome, ensure_present};
use crate::forest::{RandomSurvivalForest, SurvivalModel};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const MODEL_ARTIFACT: &str = "survival model";
pub const FEATURES_ARTIFACT: &str = "feature list";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("The {name} is unavailable: {source}")]
    Unavailable {
        name: &'static str,
        #[source]
        source: DownloadError,
    },
    #[error("The {name} at '{path}' is corrupt or incompatible: {reason}")]
    Corrupt {
        name: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// On-disk layout of the feature list: `features = ["Age", ...]`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureListFile {
    features: Vec<String>,
}

/// Both artifacts, deserialized and checked against each other.
#[derive(Clone)]
pub struct LoadedArtifacts {
    pub model: Arc<dyn SurvivalModel>,
    pub schema: ModelFeatureSchema,
}

impl std::fmt::Debug for LoadedArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifacts")
            .field("n_features", &self.model.n_features())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Paths of the two local artifact files and how each was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifacts {
    pub model_path: PathBuf,
    pub model: FetchOutcome,
    pub features_path: PathBuf,
    pub features: FetchOutcome,
}

/// Downloads whichever artifacts are missing locally. Present files are never
/// fetched again.
pub fn ensure_local(
    settings: &ArtifactSettings,
    fetcher: &dyn ArtifactFetcher,
) -> Result<LocalArtifacts, ArtifactError> {
    let model_path = settings.model_path();
    let model = ensure_present(fetcher, settings.model_url.as_deref(), &model_path).map_err(
        |source| ArtifactError::Unavailable {
            name: MODEL_ARTIFACT,
            source,
        },
    )?;

    let features_path = settings.features_path();
    let features = ensure_present(fetcher, settings.features_url.as_deref(), &features_path)
        .map_err(|source| ArtifactError::Unavailable {
            name: FEATURES_ARTIFACT,
            source,
        })?;

    Ok(LocalArtifacts {
        model_path,
        model,
        features_path,
        features,
    })
}

/// Fetch-if-absent followed by deserialization of both artifacts.
pub fn ensure_and_load(
    settings: &ArtifactSettings,
    fetcher: &dyn ArtifactFetcher,
) -> Result<LoadedArtifacts, ArtifactError> {
    let local = ensure_local(settings, fetcher)?;
    let forest = load_model(&local.model_path)?;
    let schema = load_schema(&local.features_path)?;

    if schema.len() != forest.n_features {
        return Err(ArtifactError::Corrupt {
            name: FEATURES_ARTIFACT,
            path: local.features_path,
            reason: format!(
                "lists {} features, but the model was trained on {}",
                schema.len(),
                forest.n_features
            ),
        });
    }

    log::info!(
        "Loaded survival forest with {} trees over {} time points and {} features",
        forest.trees.len(),
        forest.unique_times.len(),
        forest.n_features
    );

    Ok(LoadedArtifacts {
        model: Arc::new(forest),
        schema,
    })
}

/// Reads and validates a random survival forest file.
pub fn load_model(path: &Path) -> Result<RandomSurvivalForest, ArtifactError> {
    let corrupt = |reason: String| ArtifactError::Corrupt {
        name: MODEL_ARTIFACT,
        path: path.to_path_buf(),
        reason,
    };
    let text = read_artifact(path, MODEL_ARTIFACT)?;
    let forest: RandomSurvivalForest =
        toml::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
    forest.validate().map_err(corrupt)?;
    Ok(forest)
}

/// Reads and validates the ordered feature list.
pub fn load_schema(path: &Path) -> Result<ModelFeatureSchema, ArtifactError> {
    let corrupt = |reason: String| ArtifactError::Corrupt {
        name: FEATURES_ARTIFACT,
        path: path.to_path_buf(),
        reason,
    };
    let text = read_artifact(path, FEATURES_ARTIFACT)?;
    let file: FeatureListFile = toml::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
    ModelFeatureSchema::new(file.features).map_err(corrupt)
}

fn read_artifact(path: &Path, name: &'static str) -> Result<String, ArtifactError> {
    let bytes = fs::read(path).map_err(|e| ArtifactError::Unavailable {
        name,
        source: DownloadError::Io(e, path.to_path_buf()),
    })?;
    // Binary or non-UTF-8 content usually means a serialization format we cannot read.
    String::from_utf8(bytes).map_err(|_| ArtifactError::Corrupt {
        name,
        path: path.to_path_buf(),
        reason: "file is not UTF-8 text; expected a TOML export".to_string(),
    })
}
