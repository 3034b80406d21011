use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
