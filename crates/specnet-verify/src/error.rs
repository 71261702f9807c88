#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("target backend error: {0}")]
    Backend(String),

    #[error("malformed target output: {0}")]
    MalformedTarget(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, VerifyError>;
