use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds raised by the data module and its storage collaborators.
///
/// Functions return `anyhow::Result`; callers that need to branch on the
/// kind use `err.downcast_ref::<DataModuleError>()`.
#[derive(Debug, Error)]
pub enum DataModuleError {
    #[error("missing configuration key '{key}'")]
    MissingConfigKey { key: String },

    #[error("validation split or validation proportion must be provided")]
    MissingValidationSource,

    #[error("validation proportion is required to carve a validation set out of split '{split}'")]
    MissingValProportion { split: String },

    #[error("validation proportion must be within [0, 1], got {0}")]
    InvalidProportion(f64),

    #[error("data root '{0}' is not a directory")]
    InvalidDataRoot(PathBuf),

    #[error("'{key}' not found under data root '{root}'")]
    SplitNotFound { key: String, root: PathBuf },

    #[error("{split} data is not available; call setup() first")]
    NotSetUp { split: &'static str },

    #[error("map type '{0}' is not supported")]
    UnsupportedMapType(String),

    #[error("index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}
