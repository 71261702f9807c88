/// Errors raised by the router's wire codec.
///
/// Registry operations themselves never fail: unknown heartbeats and empty
/// candidate pools are ordinary return values, not errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RegistryError>;
