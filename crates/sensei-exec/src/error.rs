use thiserror::Error;

/// Errors surfaced by the execution pipeline.
///
/// A non-zero exit code is *not* an error: it is data carried by
/// [`crate::ExecutionResult`]. Policy outcomes (blocked, awaiting
/// confirmation) are turn data too, reported through
/// [`crate::TurnProgress`]; only launch failures, cancellation, and bad
/// config patterns travel through this type.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to launch shell process: {0}")]
    LaunchFailure(#[from] std::io::Error),

    #[error("execution cancelled")]
    Cancelled,

    #[error("invalid risk pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}
