//! One draft-then-verify round and the reconciliation that produces it.
//!
//! Given the draft's proposal and the target's own continuation of the same
//! prefix, [`reconcile`] walks both sequences in lockstep:
//!
//! ```text
//!   draft   [ 5 ][ 7 ][ 9 ]
//!   target  [ 5 ][ 7 ][ 2 ][ X ]
//!   mask      T    T    F           accepted = 2, corrected = 2
//!
//!   draft   [ 5 ][ 7 ]
//!   target  [ 5 ][ 7 ][ 4 ]
//!   mask      T    T                accepted = 2, next = 4
//! ```
//!
//! The target must supply at least one token more than the draft, so the
//! position right after the last inspected draft token always exists.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VerifyError};

/// A token id with the target's log-probability for it, if reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredToken {
    pub token_id: u32,
    pub logprob: Option<f32>,
}

/// The target model's continuation of a prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetGeneration {
    pub token_ids: Vec<u32>,
    /// One entry per token when present.
    pub logprobs: Option<Vec<f32>>,
}

impl TargetGeneration {
    pub fn new(token_ids: Vec<u32>) -> Self {
        Self {
            token_ids,
            logprobs: None,
        }
    }

    pub fn with_logprobs(mut self, logprobs: Vec<f32>) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    fn scored(&self, index: usize) -> Option<ScoredToken> {
        let token_id = *self.token_ids.get(index)?;
        let logprob = self.logprobs.as_ref().and_then(|lp| lp.get(index).copied());
        Some(ScoredToken { token_id, logprob })
    }
}

/// Outcome of one verification round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationRound {
    pub num_drafted: usize,
    pub num_accepted: usize,
    /// One entry per inspected draft token, ending at the first mismatch.
    pub acceptance_mask: Vec<bool>,
    /// Target's token at the first disagreement.
    pub corrected: Option<ScoredToken>,
    /// Target's token after a fully accepted draft.
    pub next: Option<ScoredToken>,
    pub verification_time_ms: f64,
    pub acceptance_rate: f64,
}

impl VerificationRound {
    /// True when every drafted token was accepted.
    pub fn fully_accepted(&self) -> bool {
        self.corrected.is_none()
    }
}

/// Reconcile a draft proposal against the target's continuation.
///
/// An empty draft yields an empty round. Otherwise the target must hold at
/// least `draft.len() + 1` tokens and, if it carries logprobs, exactly one
/// per token.
pub fn reconcile(
    prefix: &[u32],
    draft: &[u32],
    target: &TargetGeneration,
) -> Result<VerificationRound> {
    if draft.is_empty() {
        return Ok(VerificationRound::default());
    }

    if target.token_ids.len() < draft.len() + 1 {
        return Err(VerifyError::MalformedTarget(format!(
            "expected at least {} target tokens for {} drafted, got {}",
            draft.len() + 1,
            draft.len(),
            target.token_ids.len()
        )));
    }
    if let Some(logprobs) = &target.logprobs {
        if logprobs.len() != target.token_ids.len() {
            return Err(VerifyError::MalformedTarget(format!(
                "{} logprobs for {} target tokens",
                logprobs.len(),
                target.token_ids.len()
            )));
        }
    }

    let mut mask = Vec::with_capacity(draft.len());
    let mut corrected = None;
    for (i, &drafted) in draft.iter().enumerate() {
        if drafted == target.token_ids[i] {
            mask.push(true);
        } else {
            mask.push(false);
            corrected = target.scored(i);
            break;
        }
    }

    let num_accepted = mask.iter().filter(|&&ok| ok).count();
    let next = if corrected.is_none() {
        target.scored(num_accepted)
    } else {
        None
    };

    debug!(
        prefix_len = prefix.len(),
        drafted = draft.len(),
        accepted = num_accepted,
        corrected = corrected.is_some(),
        "round reconciled"
    );

    Ok(VerificationRound {
        num_drafted: draft.len(),
        num_accepted,
        acceptance_mask: mask,
        corrected,
        next,
        verification_time_ms: 0.0,
        acceptance_rate: num_accepted as f64 / draft.len() as f64,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
