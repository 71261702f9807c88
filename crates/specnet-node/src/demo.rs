//! In-process demo: a router with a few registered nodes places one request,
//! then a session runs against deterministic draft/target models.
//!
//! Every router call goes through the bincode codec, as it would on the wire.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use specnet_registry::{decode_response, encode_request, NodeRegistry, RouterService};
use specnet_session::{
    DraftBackend, InferenceRequest, InferenceSummary, SessionDriver, SessionEvent, TokenKind,
};
use specnet_types::config::NodeConfig;
use specnet_types::node::{
    DraftHeartbeat, DraftRegistration, ModelInfo, ResourceStats, TargetHeartbeat,
    TargetRegistration, WorkerRole,
};
use specnet_types::protocol::{RouterRequest, RouterResponse};
use specnet_verify::{TargetBackend, TargetGeneration, Verifier};

const VOCAB: u32 = 32_000;

pub struct DemoOptions {
    pub model: String,
    pub prompt: Vec<u32>,
    pub max_tokens: Option<usize>,
    pub draft_tokens: Option<usize>,
    /// Every n-th drafted position is wrong; 0 = never.
    pub draft_error_every: usize,
}

// ── Deterministic models ─────────────────────────────────────────────────────

/// The token the reference model emits after `context`.
fn reference_next(context: &[u32]) -> u32 {
    let last = context.last().copied().unwrap_or(1);
    let mixed = last
        .wrapping_mul(1_103_515_245)
        .wrapping_add(12_345)
        .wrapping_add(context.len() as u32);
    (mixed >> 8) % VOCAB
}

/// Continue `context` by `n` tokens with the reference model.
fn continue_reference(context: &[u32], n: usize, mut wrong: impl FnMut(usize) -> bool) -> Vec<u32> {
    let mut ctx = context.to_vec();
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let mut token = reference_next(&ctx);
        if wrong(ctx.len()) {
            token = (token + 1) % VOCAB;
        }
        ctx.push(token);
        out.push(token);
    }
    out
}

struct ReferenceTarget;

#[async_trait]
impl TargetBackend for ReferenceTarget {
    async fn generate(&self, prefix: &[u32], n: usize) -> specnet_verify::Result<TargetGeneration> {
        let tokens = continue_reference(prefix, n, |_| false);
        let logprobs = vec![-0.05; tokens.len()];
        Ok(TargetGeneration::new(tokens).with_logprobs(logprobs))
    }
}

struct NoisyDraft {
    error_every: usize,
}

#[async_trait]
impl DraftBackend for NoisyDraft {
    async fn propose(&self, context: &[u32], n: usize) -> specnet_session::Result<Vec<u32>> {
        let every = self.error_every;
        Ok(continue_reference(context, n, |pos| every != 0 && (pos + 1) % every == 0))
    }
}

// ── Router plumbing ──────────────────────────────────────────────────────────

fn call(router: &RouterService, request: RouterRequest) -> Result<RouterResponse> {
    let frame = encode_request(&request)?;
    let reply = router.handle_bytes(&frame)?;
    Ok(decode_response(&reply)?)
}

fn assigned_id(response: RouterResponse) -> Result<String> {
    match response {
        RouterResponse::Registered(ack) if ack.accepted => Ok(ack.assigned_id),
        other => Err(anyhow!("unexpected registration reply: {other:?}")),
    }
}

fn populate(router: &RouterService, model: &str) -> Result<()> {
    for port in [50061, 50062] {
        let reg = DraftRegistration::new(format!("127.0.0.1:{port}"), ModelInfo::new(model));
        let id = assigned_id(call(router, RouterRequest::RegisterDraft(reg))?)?;
        call(
            router,
            RouterRequest::DraftHeartbeat(DraftHeartbeat {
                node_id: id,
                stats: ResourceStats::default(),
                available_capacity: 1,
            }),
        )?;
    }

    // Registered as a worker but in the draft role: never picked as verifier.
    let helper = TargetRegistration::new("127.0.0.1:50070", ModelInfo::new(model))
        .with_role(WorkerRole::Draft);
    assigned_id(call(router, RouterRequest::RegisterTarget(helper))?)?;

    let target = TargetRegistration::new("127.0.0.1:50051", ModelInfo::new(model));
    let id = assigned_id(call(router, RouterRequest::RegisterTarget(target))?)?;
    if let RouterResponse::Heartbeat(ack) = call(
        router,
        RouterRequest::TargetHeartbeat(TargetHeartbeat {
            node_id: id,
            stats: ResourceStats::default(),
        }),
    )? {
        info!(
            acknowledged = ack.acknowledged,
            next_ms = ack.next_heartbeat_interval_ms,
            "target heartbeat"
        );
    }

    if let RouterResponse::Health(health) = call(router, RouterRequest::Health)? {
        info!(
            drafts = health.draft_nodes,
            targets = health.target_nodes,
            "router {}",
            health.status
        );
    }
    Ok(())
}

// ── Entry ────────────────────────────────────────────────────────────────────

pub async fn run(config: NodeConfig, opts: DemoOptions) -> Result<InferenceSummary> {
    let registry = Arc::new(NodeRegistry::new(config.router.clone()));
    let router = RouterService::new(registry);
    populate(&router, &opts.model)?;

    let placement = router
        .place(&opts.model)
        .map_err(|class| anyhow!("no active {class} nodes available"))?;
    info!(
        draft = %placement.draft.id,
        draft_addr = %placement.draft.address,
        target = %placement.target.id,
        target_addr = %placement.target.address,
        "request placed"
    );

    let driver = SessionDriver::new(
        config.session,
        Arc::new(NoisyDraft {
            error_every: opts.draft_error_every,
        }),
        Verifier::new(Arc::new(ReferenceTarget)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Token(t) if t.kind == TokenKind::Rejected => {
                    info!(round = t.round, token = t.token_id, "  rejected")
                }
                SessionEvent::Token(t) => {
                    info!(round = t.round, token = t.token_id, kind = ?t.kind, "  token")
                }
                SessionEvent::Round(r) => info!(
                    round = r.round,
                    drafted = r.drafted,
                    accepted = r.accepted,
                    corrected = r.corrected,
                    ms = r.verification_time_ms,
                    "ROUND"
                ),
                SessionEvent::Done(_) => {}
            }
        }
    });

    let request = InferenceRequest {
        request_id: String::new(),
        model_id: opts.model,
        prompt_token_ids: opts.prompt,
        max_tokens: opts.max_tokens,
        draft_tokens: opts.draft_tokens,
    };
    let summary = driver.run_with_events(request, tx).await?;
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer stopped");
    }
    Ok(summary)
}
