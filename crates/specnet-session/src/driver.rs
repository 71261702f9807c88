//! Sequential draft/verify round loop for one request.
//!
//! Each round:
//! 1. the draft backend proposes up to `n` tokens continuing the context,
//! 2. the verifier checks them against the target,
//! 3. accepted tokens are appended, then the correction, then (after a fully
//!    accepted draft, budget permitting) the target's bonus token.
//!
//! End-of-sequence is looked for in that same order and the EOS token is
//! kept in the output. The session ends on EOS, on the token budget, or when
//! the draft backend returns nothing. Any backend error fails the session
//! but keeps the tokens already emitted.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use specnet_types::config::SessionConfig;
use specnet_verify::{AcceptanceStats, Verifier};

use crate::error::{Result, SessionError};
use crate::events::{
    InferenceSummary, RoundEvent, SessionEvent, StopReason, TokenEvent, TokenKind,
};
use crate::session::InferenceSession;

/// Produces cheap speculative continuations.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Propose at most `n` tokens continuing `context`. An empty proposal
    /// means the draft model has nothing more to say.
    async fn propose(&self, context: &[u32], n: usize) -> Result<Vec<u32>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Generated when empty.
    pub request_id: String,
    pub model_id: String,
    pub prompt_token_ids: Vec<u32>,
    /// Falls back to the configured default.
    pub max_tokens: Option<usize>,
    /// Per-round draft length, capped by the configured maximum.
    pub draft_tokens: Option<usize>,
}

pub struct SessionDriver {
    config: SessionConfig,
    draft: Arc<dyn DraftBackend>,
    verifier: Verifier,
}

impl SessionDriver {
    pub fn new(config: SessionConfig, draft: Arc<dyn DraftBackend>, verifier: Verifier) -> Self {
        Self {
            config,
            draft,
            verifier,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run a request to completion.
    ///
    /// Only an invalid request is an `Err`; a backend failure produces a
    /// summary in the `Failed` state.
    pub async fn run(&self, request: InferenceRequest) -> Result<InferenceSummary> {
        self.drive(request, None).await
    }

    /// Like [`run`](Self::run), streaming token, round and done events.
    /// The session keeps going if the receiver is dropped.
    pub async fn run_with_events(
        &self,
        request: InferenceRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<InferenceSummary> {
        self.drive(request, Some(events)).await
    }

    /// Resolve `(max_tokens, per-round draft length)` for a request.
    fn limits(&self, request: &InferenceRequest) -> Result<(usize, usize)> {
        let max_tokens = request.max_tokens.unwrap_or(self.config.default_max_tokens);
        if max_tokens == 0 || max_tokens > self.config.max_session_tokens {
            return Err(SessionError::InvalidRequest(format!(
                "max_tokens must be in 1..={}, got {}",
                self.config.max_session_tokens, max_tokens
            )));
        }

        if request.draft_tokens == Some(0) {
            return Err(SessionError::InvalidRequest(
                "draft_tokens must be at least 1".into(),
            ));
        }
        let draft_len = request
            .draft_tokens
            .unwrap_or(self.config.max_draft_tokens)
            .min(self.config.max_draft_tokens);
        if draft_len == 0 {
            return Err(SessionError::InvalidRequest(
                "max_draft_tokens is configured as 0".into(),
            ));
        }

        Ok((max_tokens, draft_len))
    }

    async fn drive(
        &self,
        request: InferenceRequest,
        events: Option<mpsc::Sender<SessionEvent>>,
    ) -> Result<InferenceSummary> {
        let (max_tokens, draft_len) = self.limits(&request)?;

        let request_id = if request.request_id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.request_id
        };
        info!(
            request_id = %request_id,
            model = %request.model_id,
            prompt_len = request.prompt_token_ids.len(),
            max_tokens,
            draft_len,
            "session started"
        );

        let start = Instant::now();
        let mut session = InferenceSession::new(request_id, request.prompt_token_ids);
        let mut run = RunState::new(events);

        let stop = loop {
            if session.output_len() >= max_tokens {
                break StopReason::MaxTokens;
            }
            match self.round(&mut session, &mut run, max_tokens, draft_len).await {
                Ok(None) => {}
                Ok(Some(reason)) => break reason,
                Err(e) => {
                    warn!(request_id = %session.request_id, round = session.rounds, error = %e, "session failed");
                    session.fail(&e.to_string())?;
                    break StopReason::Failed;
                }
            }
        };
        if stop != StopReason::Failed {
            session.complete()?;
        }

        let summary = InferenceSummary {
            request_id: session.request_id.clone(),
            output_tokens: session.output().to_vec(),
            total_tokens: session.output_len(),
            draft_tokens_generated: run.stats.drafted,
            draft_tokens_accepted: run.stats.accepted,
            speculation_rounds: session.rounds,
            generation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            acceptance_rate: run.stats.acceptance_rate(),
            state: session.state,
            failure_reason: session.failure_reason.clone(),
            stop_reason: stop,
            token_events: std::mem::take(&mut run.token_events),
        };

        info!(
            request_id = %summary.request_id,
            tokens = summary.total_tokens,
            rounds = summary.speculation_rounds,
            acceptance = summary.acceptance_rate,
            stop = ?summary.stop_reason,
            "session finished"
        );
        run.emit(SessionEvent::Done(summary.clone())).await;
        Ok(summary)
    }

    /// One draft/verify round. `Some` ends the session.
    async fn round(
        &self,
        session: &mut InferenceSession,
        run: &mut RunState,
        max_tokens: usize,
        draft_len: usize,
    ) -> Result<Option<StopReason>> {
        let n = draft_len.min(max_tokens - session.output_len());

        let mut proposal = self.draft.propose(&session.context, n).await?;
        if proposal.len() > n {
            warn!(request_id = %session.request_id, proposed = proposal.len(), limit = n, "draft over-produced, truncating");
            proposal.truncate(n);
        }
        if proposal.is_empty() {
            debug!(request_id = %session.request_id, "draft exhausted");
            return Ok(Some(StopReason::DraftExhausted));
        }

        session.rounds += 1;
        let round_no = session.rounds;
        let verdict = self.verifier.verify(&session.context, &proposal).await?;

        let mut eos = false;
        let mut bonus_used = false;

        for &token_id in &proposal[..verdict.num_accepted] {
            session.push(token_id)?;
            run.token(round_no, token_id, TokenKind::Accepted, None).await;
            if self.is_eos(token_id) {
                eos = true;
                break;
            }
        }

        if !eos {
            if let Some(corrected) = verdict.corrected {
                run.token(round_no, proposal[verdict.num_accepted], TokenKind::Rejected, None)
                    .await;
                session.push(corrected.token_id)?;
                run.token(round_no, corrected.token_id, TokenKind::Corrected, corrected.logprob)
                    .await;
                eos = self.is_eos(corrected.token_id);
            } else if let Some(next) = verdict.next {
                if session.output_len() < max_tokens {
                    session.push(next.token_id)?;
                    run.token(round_no, next.token_id, TokenKind::Bonus, next.logprob).await;
                    bonus_used = true;
                }
                // Past the budget the bonus token is never generated.
                eos = bonus_used && self.is_eos(next.token_id);
            }
        }

        run.stats.record(&verdict, bonus_used);
        run.emit(SessionEvent::Round(RoundEvent {
            round: round_no,
            drafted: verdict.num_drafted,
            accepted: verdict.num_accepted,
            corrected: usize::from(verdict.corrected.is_some()),
            verification_time_ms: verdict.verification_time_ms,
            acceptance_rate: verdict.acceptance_rate,
        }))
        .await;

        debug!(
            request_id = %session.request_id,
            round = round_no,
            drafted = verdict.num_drafted,
            accepted = verdict.num_accepted,
            output_len = session.output_len(),
            "round complete"
        );

        Ok(eos.then_some(StopReason::EndOfSequence))
    }

    fn is_eos(&self, token_id: u32) -> bool {
        self.config.eos_token_ids.contains(&token_id)
    }
}

// ── Per-run bookkeeping ──────────────────────────────────────────────────────

struct RunState {
    stats: AcceptanceStats,
    token_events: Vec<TokenEvent>,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl RunState {
    fn new(events: Option<mpsc::Sender<SessionEvent>>) -> Self {
        Self {
            stats: AcceptanceStats::default(),
            token_events: Vec::new(),
            events,
        }
    }

    async fn token(&mut self, round: u32, token_id: u32, kind: TokenKind, logprob: Option<f32>) {
        let event = TokenEvent {
            round,
            token_id,
            kind,
            logprob,
        };
        self.token_events.push(event.clone());
        self.emit(SessionEvent::Token(event)).await;
    }

    async fn emit(&mut self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).await.is_err() {
                debug!("event receiver closed, continuing without events");
                self.events = None;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use specnet_verify::{TargetBackend, TargetGeneration, VerifyError};

    use super::*;
    use crate::session::SessionState;

    /// Token at context position `p` is `p + 100`.
    fn truth(position: usize) -> u32 {
        position as u32 + 100
    }

    struct Target;

    #[async_trait]
    impl TargetBackend for Target {
        async fn generate(
            &self,
            prefix: &[u32],
            n: usize,
        ) -> specnet_verify::Result<TargetGeneration> {
            Ok(TargetGeneration::new(
                (0..n).map(|i| truth(prefix.len() + i)).collect(),
            ))
        }
    }

    /// Succeeds `ok_calls` times, then fails.
    struct FlakyTarget {
        ok_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TargetBackend for FlakyTarget {
        async fn generate(
            &self,
            prefix: &[u32],
            n: usize,
        ) -> specnet_verify::Result<TargetGeneration> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
                return Err(VerifyError::Backend("target offline".into()));
            }
            Target.generate(prefix, n).await
        }
    }

    /// Returns exactly as many tokens as drafted, one short.
    struct ShortTarget;

    #[async_trait]
    impl TargetBackend for ShortTarget {
        async fn generate(
            &self,
            prefix: &[u32],
            n: usize,
        ) -> specnet_verify::Result<TargetGeneration> {
            Target.generate(prefix, n - 1).await
        }
    }

    /// Agrees with [`truth`] except at the listed positions.
    #[derive(Default)]
    struct Draft {
        wrong_at: HashSet<usize>,
        extra: usize,
        requested: Mutex<Vec<usize>>,
    }

    impl Draft {
        fn wrong_at(positions: &[usize]) -> Self {
            Self {
                wrong_at: positions.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DraftBackend for Draft {
        async fn propose(&self, context: &[u32], n: usize) -> Result<Vec<u32>> {
            self.requested.lock().unwrap().push(n);
            Ok((0..n + self.extra)
                .map(|i| {
                    let p = context.len() + i;
                    if self.wrong_at.contains(&p) {
                        0
                    } else {
                        truth(p)
                    }
                })
                .collect())
        }
    }

    struct Silent;

    #[async_trait]
    impl DraftBackend for Silent {
        async fn propose(&self, _context: &[u32], _n: usize) -> Result<Vec<u32>> {
            Ok(Vec::new())
        }
    }

    struct BrokenDraft;

    #[async_trait]
    impl DraftBackend for BrokenDraft {
        async fn propose(&self, _context: &[u32], _n: usize) -> Result<Vec<u32>> {
            Err(SessionError::Draft("draft node unreachable".into()))
        }
    }

    fn driver_with(
        config: SessionConfig,
        draft: Arc<dyn DraftBackend>,
        target: Arc<dyn TargetBackend>,
    ) -> SessionDriver {
        SessionDriver::new(config, draft, Verifier::new(target))
    }

    fn driver(draft: Arc<dyn DraftBackend>) -> SessionDriver {
        driver_with(SessionConfig::default(), draft, Arc::new(Target))
    }

    fn eos_config(eos: u32) -> SessionConfig {
        SessionConfig {
            eos_token_ids: vec![eos],
            ..Default::default()
        }
    }

    fn request(max_tokens: usize) -> InferenceRequest {
        InferenceRequest {
            request_id: "req-1".into(),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }

    fn expected(range: std::ops::Range<usize>) -> Vec<u32> {
        range.map(truth).collect()
    }

    #[tokio::test]
    async fn perfect_draft_earns_bonus_tokens() {
        let draft = Arc::new(Draft::default());
        let summary = driver(draft.clone()).run(request(12)).await.unwrap();

        assert_eq!(summary.output_tokens, expected(0..12));
        assert_eq!(summary.speculation_rounds, 2);
        assert_eq!(summary.draft_tokens_generated, 10);
        assert_eq!(summary.draft_tokens_accepted, 10);
        assert_eq!(summary.acceptance_rate, 1.0);
        assert_eq!(summary.stop_reason, StopReason::MaxTokens);
        assert_eq!(summary.state, SessionState::Completed);

        let bonus = summary
            .token_events
            .iter()
            .filter(|e| e.kind == TokenKind::Bonus)
            .count();
        assert_eq!(bonus, 2);
    }

    #[tokio::test]
    async fn bonus_token_needs_budget() {
        let summary = driver(Arc::new(Draft::default())).run(request(5)).await.unwrap();
        assert_eq!(summary.output_tokens, expected(0..5));
        assert_eq!(summary.speculation_rounds, 1);
        assert!(summary.token_events.iter().all(|e| e.kind == TokenKind::Accepted));
    }

    #[tokio::test]
    async fn mismatch_emits_rejection_then_correction() {
        let draft = Arc::new(Draft::wrong_at(&[2]));
        let mut req = request(4);
        req.draft_tokens = Some(3);

        let summary = driver(draft.clone()).run(req).await.unwrap();

        assert_eq!(summary.output_tokens, expected(0..4));
        assert_eq!(summary.total_tokens, 4);
        let kinds: Vec<(u32, TokenKind)> =
            summary.token_events.iter().map(|e| (e.token_id, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (100, TokenKind::Accepted),
                (101, TokenKind::Accepted),
                (0, TokenKind::Rejected),
                (102, TokenKind::Corrected),
                (103, TokenKind::Accepted),
            ]
        );
        // Second round only had budget for one token.
        assert_eq!(draft.requested(), vec![3, 1]);
        assert_eq!(summary.draft_tokens_generated, 4);
        assert_eq!(summary.draft_tokens_accepted, 3);
    }

    #[tokio::test]
    async fn prompt_is_context_not_output() {
        let draft = Arc::new(Draft::default());
        let req = InferenceRequest {
            prompt_token_ids: vec![7, 7],
            ..request(3)
        };
        let summary = driver(draft).run(req).await.unwrap();
        assert_eq!(summary.output_tokens, expected(2..5));
    }

    #[tokio::test]
    async fn eos_among_accepted_tokens() {
        let d = driver_with(eos_config(102), Arc::new(Draft::default()), Arc::new(Target));
        let summary = d.run(request(20)).await.unwrap();

        assert_eq!(summary.output_tokens, vec![100, 101, 102]);
        assert_eq!(summary.stop_reason, StopReason::EndOfSequence);
        assert_eq!(summary.state, SessionState::Completed);
        // Accepted count still reflects the verifier's verdict.
        assert_eq!(summary.draft_tokens_accepted, 5);
    }

    #[tokio::test]
    async fn eos_as_correction() {
        let d = driver_with(eos_config(101), Arc::new(Draft::wrong_at(&[1])), Arc::new(Target));
        let summary = d.run(request(20)).await.unwrap();
        assert_eq!(summary.output_tokens, vec![100, 101]);
        assert_eq!(summary.stop_reason, StopReason::EndOfSequence);
    }

    #[tokio::test]
    async fn eos_as_bonus_token() {
        let d = driver_with(eos_config(105), Arc::new(Draft::default()), Arc::new(Target));
        let summary = d.run(request(20)).await.unwrap();
        assert_eq!(summary.output_tokens, expected(0..6));
        assert_eq!(summary.token_events.last().map(|e| e.kind), Some(TokenKind::Bonus));
        assert_eq!(summary.stop_reason, StopReason::EndOfSequence);
    }

    #[tokio::test]
    async fn eos_beyond_budget_is_not_generated() {
        let d = driver_with(eos_config(105), Arc::new(Draft::default()), Arc::new(Target));
        let summary = d.run(request(5)).await.unwrap();
        assert_eq!(summary.output_tokens, expected(0..5));
        assert!(summary.token_events.iter().all(|e| e.kind == TokenKind::Accepted));
        assert_eq!(summary.stop_reason, StopReason::MaxTokens);
        assert_eq!(summary.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn empty_draft_completes_session() {
        let summary = driver(Arc::new(Silent)).run(request(8)).await.unwrap();
        assert!(summary.output_tokens.is_empty());
        assert_eq!(summary.speculation_rounds, 0);
        assert_eq!(summary.stop_reason, StopReason::DraftExhausted);
        assert_eq!(summary.state, SessionState::Completed);
        assert_eq!(summary.acceptance_rate, 0.0);
    }

    #[tokio::test]
    async fn target_failure_keeps_accepted_tokens() {
        let target = Arc::new(FlakyTarget {
            ok_calls: 1,
            calls: AtomicUsize::new(0),
        });
        let d = driver_with(SessionConfig::default(), Arc::new(Draft::default()), target);
        let summary = d.run(request(20)).await.unwrap();

        assert_eq!(summary.state, SessionState::Failed);
        assert_eq!(summary.stop_reason, StopReason::Failed);
        assert_eq!(summary.output_tokens, expected(0..6));
        assert!(summary
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("target offline")));
    }

    #[tokio::test]
    async fn malformed_target_fails_session() {
        let d = driver_with(SessionConfig::default(), Arc::new(Draft::default()), Arc::new(ShortTarget));
        let summary = d.run(request(20)).await.unwrap();
        assert_eq!(summary.state, SessionState::Failed);
        assert!(summary.output_tokens.is_empty());
        assert!(summary
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("malformed")));
    }

    #[tokio::test]
    async fn draft_failure_fails_session() {
        let summary = driver(Arc::new(BrokenDraft)).run(request(4)).await.unwrap();
        assert_eq!(summary.state, SessionState::Failed);
        assert_eq!(summary.speculation_rounds, 0);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let d = driver(Arc::new(Draft::default()));

        for max in [0, 513] {
            let err = d.run(request(max)).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidRequest(_)));
        }

        let mut req = request(4);
        req.draft_tokens = Some(0);
        assert!(matches!(d.run(req).await, Err(SessionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn default_budget_applies() {
        let d = driver(Arc::new(Draft::default()));
        let req = InferenceRequest {
            max_tokens: None,
            ..Default::default()
        };
        let summary = d.run(req).await.unwrap();
        assert_eq!(summary.total_tokens, 64);
        assert!(!summary.request_id.is_empty());
    }

    #[tokio::test]
    async fn draft_length_is_capped() {
        let draft = Arc::new(Draft::default());
        let mut req = request(12);
        req.draft_tokens = Some(9);
        driver(draft.clone()).run(req).await.unwrap();
        assert_eq!(draft.requested(), vec![5, 5]);

        let draft = Arc::new(Draft::default());
        let mut req = request(7);
        req.draft_tokens = Some(2);
        driver(draft.clone()).run(req).await.unwrap();
        // 2 + bonus, 2 + bonus, then one left.
        assert_eq!(draft.requested(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn over_producing_draft_is_truncated() {
        let draft = Arc::new(Draft {
            extra: 3,
            ..Default::default()
        });
        let summary = driver(draft).run(request(5)).await.unwrap();
        assert_eq!(summary.draft_tokens_generated, 5);
        assert_eq!(summary.output_tokens, expected(0..5));
    }

    #[tokio::test]
    async fn events_stream_in_order() {
        let (tx, mut rx) = mpsc::channel(256);
        let d = driver(Arc::new(Draft::wrong_at(&[3])));
        let summary = d.run_with_events(request(10), tx).await.unwrap();

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }

        let tokens = received
            .iter()
            .filter(|e| matches!(e, SessionEvent::Token(_)))
            .count();
        let rounds = received
            .iter()
            .filter(|e| matches!(e, SessionEvent::Round(_)))
            .count();
        assert_eq!(tokens, summary.token_events.len());
        assert_eq!(rounds, summary.speculation_rounds as usize);
        assert_eq!(received.last(), Some(&SessionEvent::Done(summary)));

        match &received[0] {
            SessionEvent::Token(t) => assert_eq!(t.round, 1),
            other => panic!("unexpected first event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_receiver_does_not_abort() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let d = driver(Arc::new(Draft::default()));
        let summary = d.run_with_events(request(10), tx).await.unwrap();
        assert_eq!(summary.total_tokens, 10);
        assert_eq!(summary.state, SessionState::Completed);
    }
}
