use thiserror::Error;

/// Errors raised by the servoing pipeline.
///
/// Per-tick failures (`InputShapeMismatch`, `InsufficientCorrespondences`,
/// `DegenerateGeometry`) are always distinct from a valid zero velocity.
/// `InvalidConfiguration` is only raised while building components.
#[derive(Debug, Error)]
pub enum ServoError {
    #[error("input shape mismatch: {0}")]
    InputShapeMismatch(String),
    #[error("too few matches: {found} (need at least {required})")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServoError>;
