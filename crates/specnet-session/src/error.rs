use specnet_verify::VerifyError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("draft backend error: {0}")]
    Draft(String),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("invalid state transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SessionError>;
