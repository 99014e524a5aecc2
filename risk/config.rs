use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file picked up from the working directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "cardiorisk.toml";

pub const ENV_ARTIFACT_DIR: &str = "CARDIORISK_ARTIFACT_DIR";
pub const ENV_MODEL_URL: &str = "CARDIORISK_MODEL_URL";
pub const ENV_FEATURES_URL: &str = "CARDIORISK_FEATURES_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where the two artifacts live locally and where to fetch them from when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
    pub model_file: String,
    pub features_file: String,
    pub model_url: Option<String>,
    pub features_url: Option<String>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            model_file: "rsf_model.toml".to_string(),
            features_file: "model_features.toml".to_string(),
            model_url: None,
            features_url: None,
        }
    }
}

impl ArtifactSettings {
    pub fn model_path(&self) -> PathBuf {
        self.directory.join(&self.model_file)
    }

    pub fn features_path(&self) -> PathBuf {
        self.directory.join(&self.features_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionSettings {
    /// Time point, in years, at which the event risk is reported.
    pub horizon_years: f64,
    /// Number of zero-filled schema columns at which encoding drift is reported.
    pub fill_warning_threshold: usize,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            horizon_years: 5.0,
            fill_warning_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub artifacts: ArtifactSettings,
    pub prediction: PredictionSettings,
}

impl Settings {
    /// Reads a settings file. Missing sections and keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolves settings the way the binary does: an explicit file must exist,
    /// the default file is optional, and the process environment is applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let fallback = Path::new(DEFAULT_SETTINGS_FILE);
                if fallback.is_file() {
                    log::debug!("Using settings from {}", fallback.display());
                    Self::load(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Applies the artifact-location overrides. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_blank(ENV_ARTIFACT_DIR) {
            self.artifacts.directory = PathBuf::from(dir);
        }
        if let Some(url) = non_blank(ENV_MODEL_URL) {
            self.artifacts.model_url = Some(url);
        }
        if let Some(url) = non_blank(ENV_FEATURES_URL) {
            self.artifacts.features_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let horizon = self.prediction.horizon_years;
        if !horizon.is_finite() || horizon < 0.0 {
            return Err(ConfigError::Invalid {
                key: "prediction.horizon_years",
                reason: format!("expected a non-negative number of years, found {horizon}"),
            });
        }
        if self.artifacts.model_file.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "artifacts.model_file",
                reason: "file name is empty".to_string(),
            });
        }
        if self.artifacts.features_file.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "artifacts.features_file",
                reason: "file name is empty".to_string(),
            });
        }
        if self.artifacts.model_file == self.artifacts.features_file {
            return Err(ConfigError::Invalid {
                key: "artifacts.features_file",
                reason: "model and feature list cannot share a file".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "[artifacts]\ndirectory = \"models\"\nmodel_url = \"https://example.org/m.toml\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.artifacts.directory, PathBuf::from("models"));
        assert_eq!(settings.artifacts.model_file, "rsf_model.toml");
        assert_eq!(
            settings.artifacts.model_url.as_deref(),
            Some("https://example.org/m.toml")
        );
        assert_eq!(settings.artifacts.features_url, None);
        assert_eq!(settings.prediction.horizon_years, 5.0);
        assert_eq!(settings.prediction.fill_warning_threshold, 1);
        assert_eq!(
            settings.artifacts.model_path(),
            PathBuf::from("models").join("rsf_model.toml")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[prediction]\nhorizon = 5.0\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn negative_horizon_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[prediction]\nhorizon_years = -1.0\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Invalid {
                key: "prediction.horizon_years",
                ..
            })
        ));
    }

    #[test]
    fn overrides_replace_artifact_locations() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_ARTIFACT_DIR, "/srv/artifacts"),
            (ENV_MODEL_URL, "https://example.org/model.toml"),
            (ENV_FEATURES_URL, "   "),
        ]);
        let mut settings = Settings::default();
        settings.artifacts.features_url = Some("https://example.org/keep.toml".to_string());

        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.artifacts.directory, PathBuf::from("/srv/artifacts"));
        assert_eq!(
            settings.artifacts.model_url.as_deref(),
            Some("https://example.org/model.toml")
        );
        assert_eq!(
            settings.artifacts.features_url.as_deref(),
            Some("https://example.org/keep.toml")
        );
    }
}
