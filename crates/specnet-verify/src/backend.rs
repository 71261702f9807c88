//! Boundary to the target model.

use async_trait::async_trait;

use crate::error::Result;
use crate::round::TargetGeneration;

/// Produces the authoritative continuation a draft is checked against.
///
/// Implementations wrap whatever actually runs the target model; this crate
/// only needs `n` tokens continuing `prefix`.
#[async_trait]
pub trait TargetBackend: Send + Sync {
    async fn generate(&self, prefix: &[u32], n: usize) -> Result<TargetGeneration>;
}
