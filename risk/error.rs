// ========================================================================================
//                              Application-Level Errors
// ========================================================================================

use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::form::FormError;
use crate::render::RenderError;
use crate::survival::PredictionError;
use thiserror::Error;

/// Every way a risk assessment can fail, from startup to the rendered plot.
///
/// Artifact failures are fatal for the whole process: there is no degraded mode
/// without a model. Input and prediction failures abort only the current
/// submission and never produce a substitute risk value.
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Failed to load settings: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Artifact(#[from] ArtifactError),
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] FormError),
    #[error("Risk computation failed: {0}")]
    PredictionFailure(#[from] PredictionError),
    #[error("Failed to render result: {0}")]
    Render(#[from] RenderError),
}
