use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("malformed input in {source_name}: {reason}")]
    MalformedInput { source_name: String, reason: String },

    #[error("annotated store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("geocoder unusable: {0}")]
    BackendUnusable(String),

    #[error("annotated store uses geocoder '{store}', cannot switch to '{requested}'")]
    GeocoderMismatch { store: String, requested: String },

    #[error(
        "annotated store disagrees with raw data: {} missing, {} changed",
        .missing.len(),
        .changed.len()
    )]
    Inconsistent {
        missing: Vec<String>,
        changed: Vec<String>,
    },

    #[error("output file already exists: {}", .0.display())]
    ArchiveExists(PathBuf),

    #[error("invalid archive name '{0}': use lowercase letters, digits and dashes")]
    InvalidName(String),

    #[error("unknown geocoder: {0}")]
    UnknownGeocoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GeoError {
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        GeoError::MalformedInput {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
