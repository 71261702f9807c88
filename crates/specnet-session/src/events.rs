//! Streaming events and the final summary of a session.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Drafted and confirmed by the target.
    Accepted,
    /// Drafted, then replaced by the target's choice. Not part of the output.
    Rejected,
    /// Target's replacement for a rejected token.
    Corrected,
    /// Target's extra token after a fully accepted draft.
    Bonus,
}

impl TokenKind {
    /// Whether tokens of this kind end up in the output.
    pub fn is_emitted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub round: u32,
    pub token_id: u32,
    pub kind: TokenKind,
    pub logprob: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEvent {
    pub round: u32,
    pub drafted: usize,
    pub accepted: usize,
    pub corrected: usize,
    pub verification_time_ms: f64,
    pub acceptance_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxTokens,
    EndOfSequence,
    DraftExhausted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSummary {
    pub request_id: String,
    pub output_tokens: Vec<u32>,
    /// Every token event in generation order, rejected ones included.
    pub token_events: Vec<TokenEvent>,
    pub total_tokens: usize,
    pub draft_tokens_generated: u64,
    pub draft_tokens_accepted: u64,
    pub speculation_rounds: u32,
    pub generation_time_ms: f64,
    pub acceptance_rate: f64,
    pub state: SessionState,
    pub failure_reason: Option<String>,
    pub stop_reason: StopReason,
}

/// Message sent on a session's event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Token(TokenEvent),
    Round(RoundEvent),
    Done(InferenceSummary),
}
