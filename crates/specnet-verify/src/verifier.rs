//! Target-side verifier: backend call plus reconciliation, timed.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::backend::TargetBackend;
use crate::error::Result;
use crate::round::{reconcile, VerificationRound};

/// One request in a batch verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub request_id: String,
    pub prefix: Vec<u32>,
    pub draft: Vec<u32>,
}

/// Per-request outcome of a batch verification.
#[derive(Debug)]
pub struct BatchItem {
    pub request_id: String,
    pub result: Result<VerificationRound>,
}

#[derive(Debug)]
pub struct BatchVerification {
    /// In request order.
    pub results: Vec<BatchItem>,
    pub total_batch_time_ms: f64,
}

#[derive(Clone)]
pub struct Verifier {
    backend: Arc<dyn TargetBackend>,
}

impl Verifier {
    pub fn new(backend: Arc<dyn TargetBackend>) -> Self {
        Self { backend }
    }

    /// Verify one draft proposal continuing `prefix`.
    ///
    /// Asks the backend for `draft.len() + 1` tokens. An empty draft skips
    /// the backend entirely.
    pub async fn verify(&self, prefix: &[u32], draft: &[u32]) -> Result<VerificationRound> {
        let start = Instant::now();

        let mut round = if draft.is_empty() {
            VerificationRound::default()
        } else {
            let generation = self.backend.generate(prefix, draft.len() + 1).await?;
            reconcile(prefix, draft, &generation)?
        };
        round.verification_time_ms = elapsed_ms(start);

        debug!(
            drafted = draft.len(),
            accepted = round.num_accepted,
            ms = round.verification_time_ms,
            "draft verified"
        );
        Ok(round)
    }

    /// Verify independent requests concurrently.
    ///
    /// A failing request does not affect the others.
    pub async fn verify_batch(&self, requests: &[VerifyRequest]) -> BatchVerification {
        let start = Instant::now();

        let outcomes = join_all(
            requests
                .iter()
                .map(|req| self.verify(&req.prefix, &req.draft)),
        )
        .await;

        let results: Vec<BatchItem> = requests
            .iter()
            .zip(outcomes)
            .map(|(req, result)| {
                if let Err(ref e) = result {
                    warn!(request_id = %req.request_id, error = %e, "batch item failed");
                }
                BatchItem {
                    request_id: req.request_id.clone(),
                    result,
                }
            })
            .collect();

        BatchVerification {
            results,
            total_batch_time_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
