// Global error type. Crate-local errors live next to the code that raises them.

#[derive(Debug, thiserror::Error)]
pub enum SpecNetError {
    #[error("configuration error: {0}")]
    Config(String),
}
