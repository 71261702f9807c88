//! In-memory registry of draft and target nodes.
//!
//! All state (both pools and their cursors) sits behind one mutex, so a
//! selection's purge, filter and cursor advance happen as a single critical
//! section. Registries are small (tens to low hundreds of nodes), which keeps
//! every operation short enough for a coarse lock.
//!
//! Nothing here is persisted: a restarted router starts empty and refills as
//! nodes re-register.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use specnet_types::config::RouterConfig;
use specnet_types::node::{
    DraftHeartbeat, DraftRegistration, ModelInfo, ResourceStats, TargetHeartbeat,
    TargetRegistration, WorkerRole,
};

use crate::liveness::{Clock, SystemClock};
use crate::selection::{NodePool, PoolMember};

// ── Node class ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Draft,
    Target,
}

impl NodeClass {
    /// Prefix of router-assigned ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DraftNode {
    pub id: String,
    pub address: String,
    pub model_info: ModelInfo,
    pub gpu_model: String,
    pub gpu_memory_bytes: u64,
    pub max_draft_tokens: u32,
    /// Zero excludes the node from selection.
    pub available_capacity: u32,
    pub stats: ResourceStats,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: Instant,
}

impl PoolMember for DraftNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    fn is_selectable(&self) -> bool {
        self.available_capacity != 0
    }
}

#[derive(Debug, Clone)]
pub struct TargetNode {
    pub id: String,
    pub address: String,
    pub role: WorkerRole,
    pub model_info: ModelInfo,
    pub gpu_model: String,
    pub gpu_memory_bytes: u64,
    pub gpu_count: u32,
    /// Advertised only. No admission control is applied.
    pub max_concurrent_requests: u32,
    pub max_batch_size: u32,
    pub stats: ResourceStats,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: Instant,
}

impl PoolMember for TargetNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    fn is_selectable(&self) -> bool {
        self.role == WorkerRole::Target
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct RegistryState {
    drafts: NodePool<DraftNode>,
    targets: NodePool<TargetNode>,
}

impl RegistryState {
    fn purge_stale(&mut self, now: Instant, config: &RouterConfig) {
        let timeout = config.heartbeat_timeout();
        for id in self.drafts.purge_stale(now, timeout) {
            info!(node_id = %id, class = %NodeClass::Draft, "purged stale node");
        }
        for id in self.targets.purge_stale(now, timeout) {
            info!(node_id = %id, class = %NodeClass::Target, "purged stale node");
        }
    }
}

/// Shared registry of live draft and target nodes.
///
/// Construct one per router process and share it behind an [`Arc`].
pub struct NodeRegistry {
    config: RouterConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
}

impl NodeRegistry {
    pub fn new(config: RouterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RouterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(RegistryState {
                drafts: NodePool::new(),
                targets: NodePool::new(),
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Register (or re-register) a draft node. Returns the id it is known by.
    ///
    /// A blank id gets a fresh `draft-xxxxxxxx` id. A supplied id replaces
    /// any existing record wholesale: last writer wins.
    pub fn register_draft(&self, reg: DraftRegistration) -> String {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let id = resolve_id(&reg.node_id, NodeClass::Draft, |id| state.drafts.contains(id));
        let replaced = state.drafts.insert(DraftNode {
            id: id.clone(),
            address: reg.address,
            model_info: reg.model_info,
            gpu_model: reg.gpu_model,
            gpu_memory_bytes: reg.gpu_memory_bytes,
            max_draft_tokens: reg.max_draft_tokens,
            available_capacity: 1,
            stats: ResourceStats::default(),
            registered_at: Utc::now(),
            last_heartbeat_at: now,
        });

        if let Some(node) = state.drafts.get(&id) {
            info!(
                node_id = %id,
                address = %node.address,
                model = %node.model_info.label(),
                replaced = replaced.is_some(),
                "registered draft node"
            );
        }
        id
    }

    /// Register (or re-register) a target worker. Same id rules as
    /// [`Self::register_draft`], with a `target-` prefix.
    pub fn register_target(&self, reg: TargetRegistration) -> String {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let id = resolve_id(&reg.node_id, NodeClass::Target, |id| state.targets.contains(id));
        let replaced = state.targets.insert(TargetNode {
            id: id.clone(),
            address: reg.address,
            role: reg.role,
            model_info: reg.model_info,
            gpu_model: reg.gpu_model,
            gpu_memory_bytes: reg.gpu_memory_bytes,
            gpu_count: reg.gpu_count,
            max_concurrent_requests: reg.max_concurrent_requests,
            max_batch_size: reg.max_batch_size,
            stats: ResourceStats::default(),
            registered_at: Utc::now(),
            last_heartbeat_at: now,
        });

        if let Some(node) = state.targets.get(&id) {
            info!(
                node_id = %id,
                address = %node.address,
                role = ?node.role,
                model = %node.model_info.label(),
                replaced = replaced.is_some(),
                "registered target worker"
            );
        }
        id
    }

    // ── Heartbeats ───────────────────────────────────────────────────────

    /// Refresh a draft node's stats, capacity and liveness.
    ///
    /// Returns `false` without touching anything if the id is unknown; the
    /// node must re-register. Heartbeats are not ordered: a delayed one still
    /// refreshes `last_heartbeat_at`.
    pub fn draft_heartbeat(&self, hb: DraftHeartbeat) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.drafts.get_mut(&hb.node_id) {
            Some(node) => {
                node.stats = hb.stats;
                node.available_capacity = hb.available_capacity;
                node.last_heartbeat_at = now;
                debug!(node_id = %hb.node_id, capacity = hb.available_capacity, "draft heartbeat");
                true
            }
            None => {
                warn!(node_id = %hb.node_id, "heartbeat from unknown draft node");
                false
            }
        }
    }

    /// Refresh a target worker's stats and liveness. See
    /// [`Self::draft_heartbeat`].
    pub fn target_heartbeat(&self, hb: TargetHeartbeat) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.targets.get_mut(&hb.node_id) {
            Some(node) => {
                node.stats = hb.stats;
                node.last_heartbeat_at = now;
                debug!(node_id = %hb.node_id, "target heartbeat");
                true
            }
            None => {
                warn!(node_id = %hb.node_id, "heartbeat from unknown target worker");
                false
            }
        }
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Purge stale nodes, then pick a draft node with spare capacity for
    /// `model_id` (empty = any). `None` means no draft node is available.
    pub fn select_draft(&self, model_id: &str) -> Option<DraftNode> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.purge_stale(now, &self.config);

        let selected = state.drafts.select(model_id);
        if let Some(ref node) = selected {
            debug!(node_id = %node.id, model = %model_id, "selected draft node");
        }
        selected
    }

    /// Purge stale nodes, then pick a target-role worker for `model_id`.
    pub fn select_target(&self, model_id: &str) -> Option<TargetNode> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.purge_stale(now, &self.config);

        let selected = state.targets.select(model_id);
        if let Some(ref node) = selected {
            debug!(node_id = %node.id, model = %model_id, "selected target worker");
        }
        selected
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Snapshot of a draft record. Does not purge.
    pub fn draft(&self, id: &str) -> Option<DraftNode> {
        self.state.lock().drafts.get(id).cloned()
    }

    /// Snapshot of a target record. Does not purge.
    pub fn target(&self, id: &str) -> Option<TargetNode> {
        self.state.lock().targets.get(id).cloned()
    }

    /// Number of draft records, stale ones included until the next purge.
    pub fn draft_count(&self) -> usize {
        self.state.lock().drafts.len()
    }

    pub fn target_count(&self) -> usize {
        self.state.lock().targets.len()
    }
}

/// Use the caller's id if it has any non-whitespace content, otherwise draw
/// `<class>-<8 hex>` ids until one is free.
fn resolve_id(requested: &str, class: NodeClass, mut taken: impl FnMut(&str) -> bool) -> String {
    let trimmed = requested.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    loop {
        let hex = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", class.id_prefix(), &hex[..8]);
        if !taken(&id) {
            return id;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::liveness::ManualClock;

    fn registry() -> (NodeRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let reg = NodeRegistry::with_clock(RouterConfig::default(), clock.clone());
        (reg, clock)
    }

    fn draft(id: &str, model: &str) -> DraftRegistration {
        DraftRegistration::new(format!("{id}.local:50052"), ModelInfo::new(model)).with_id(id)
    }

    fn target(id: &str, model: &str) -> TargetRegistration {
        TargetRegistration::new(format!("{id}.local:50051"), ModelInfo::new(model)).with_id(id)
    }

    fn draft_hb(id: &str, capacity: u32) -> DraftHeartbeat {
        DraftHeartbeat {
            node_id: id.into(),
            stats: ResourceStats::default(),
            available_capacity: capacity,
        }
    }

    fn target_hb(id: &str) -> TargetHeartbeat {
        TargetHeartbeat {
            node_id: id.into(),
            stats: ResourceStats::default(),
        }
    }

    #[test]
    fn generated_ids_carry_class_prefix() {
        let (reg, _) = registry();
        let d = reg.register_draft(draft("  ", "m"));
        let t = reg.register_target(target("", "m"));

        assert!(d.starts_with("draft-"));
        assert_eq!(d.len(), "draft-".len() + 8);
        assert!(t.starts_with("target-"));
        assert_ne!(reg.register_draft(draft("", "m")), d);
        assert_eq!(reg.draft_count(), 2);
    }

    #[test]
    fn supplied_id_is_trimmed() {
        let (reg, _) = registry();
        let id = reg.register_draft(draft(" d1 ", "m"));
        assert_eq!(id, "d1");
        assert!(reg.draft("d1").is_some());
    }

    #[test]
    fn resolve_id_skips_taken() {
        let mut calls = 0;
        let id = resolve_id("", NodeClass::Draft, |_| {
            calls += 1;
            calls < 3
        });
        assert!(id.starts_with("draft-"));
    }

    #[test]
    fn reregistration_overwrites_record() {
        let (reg, _) = registry();
        reg.register_draft(draft("d1", "old-model"));

        let mut hb = draft_hb("d1", 0);
        hb.stats.active_requests = 7;
        assert!(reg.draft_heartbeat(hb));

        reg.register_draft(draft("d1", "new-model"));
        let node = reg.draft("d1").unwrap();
        assert_eq!(node.model_info.model_id, "new-model");
        // Old stats and capacity do not survive the overwrite.
        assert_eq!(node.stats.active_requests, 0);
        assert_eq!(node.available_capacity, 1);
        assert_eq!(reg.draft_count(), 1);
    }

    #[test]
    fn heartbeat_unknown_id_is_rejected() {
        let (reg, _) = registry();
        reg.register_draft(draft("d1", "m"));

        assert!(!reg.draft_heartbeat(draft_hb("nope", 1)));
        assert!(!reg.target_heartbeat(target_hb("nope")));
        assert_eq!(reg.draft_count(), 1);
        assert_eq!(reg.target_count(), 0);
    }

    #[test]
    fn heartbeat_refreshes_liveness_and_stats() {
        let (reg, clock) = registry();
        reg.register_draft(draft("d1", "m"));
        let before = reg.draft("d1").unwrap().last_heartbeat_at;

        clock.advance(Duration::from_secs(2));
        let mut hb = draft_hb("d1", 4);
        hb.stats.tokens_per_second = 120.0;
        assert!(reg.draft_heartbeat(hb));

        let node = reg.draft("d1").unwrap();
        assert!(node.last_heartbeat_at > before);
        assert_eq!(node.available_capacity, 4);
        assert_eq!(node.stats.tokens_per_second, 120.0);
    }

    #[test]
    fn target_heartbeat_refreshes_liveness() {
        let (reg, clock) = registry();
        reg.register_target(target("t1", "m"));
        let before = reg.target("t1").unwrap().last_heartbeat_at;

        clock.advance(Duration::from_secs(1));
        assert!(reg.target_heartbeat(target_hb("t1")));
        assert!(reg.target("t1").unwrap().last_heartbeat_at > before);
    }

    #[test]
    fn heartbeat_after_purge_is_rejected() {
        let (reg, clock) = registry();
        reg.register_draft(draft("d1", "m"));

        clock.advance(Duration::from_secs(31));
        assert!(reg.select_draft("m").is_none());
        assert!(!reg.draft_heartbeat(draft_hb("d1", 1)));
    }

    #[test]
    fn zero_capacity_excludes_draft() {
        let (reg, _) = registry();
        reg.register_draft(draft("d1", "m"));
        reg.register_draft(draft("d2", "m"));
        reg.draft_heartbeat(draft_hb("d1", 0));

        assert_eq!(reg.select_draft("m").unwrap().id, "d2");
        assert_eq!(reg.select_draft("m").unwrap().id, "d2");

        reg.draft_heartbeat(draft_hb("d2", 0));
        assert!(reg.select_draft("m").is_none());
    }

    #[test]
    fn target_pool_ignores_draft_role_workers() {
        let (reg, _) = registry();
        reg.register_target(target("t-draft", "m").with_role(WorkerRole::Draft));
        assert!(reg.select_target("m").is_none());

        reg.register_target(target("t1", "m"));
        assert_eq!(reg.select_target("m").unwrap().id, "t1");
        assert_eq!(reg.select_target("").unwrap().id, "t1");
    }

    #[test]
    fn stale_node_never_selected_after_purge() {
        let (reg, clock) = registry();
        reg.register_draft(draft("a", "m"));
        reg.register_draft(draft("b", "m"));

        clock.advance(Duration::from_secs(20));
        reg.draft_heartbeat(draft_hb("b", 1));
        clock.advance(Duration::from_secs(15));

        // "a" is 35 s silent, "b" 15 s.
        for _ in 0..4 {
            assert_eq!(reg.select_draft("m").unwrap().id, "b");
        }
        assert!(reg.draft("a").is_none());

        // Only re-registration brings it back.
        reg.register_draft(draft("a", "m"));
        assert!(reg.draft("a").is_some());
    }

    #[test]
    fn selection_purges_both_pools() {
        let (reg, clock) = registry();
        reg.register_draft(draft("d1", "m"));
        reg.register_target(target("t1", "m"));

        clock.advance(Duration::from_secs(31));
        assert!(reg.select_draft("").is_none());
        assert_eq!(reg.target_count(), 0);
    }

    #[test]
    fn single_node_then_timeout_scenario() {
        let (reg, clock) = registry();
        reg.register_draft(draft("d1", "m"));

        assert_eq!(reg.select_draft("m").unwrap().id, "d1");
        assert_eq!(reg.select_draft("m").unwrap().id, "d1");

        clock.advance(Duration::from_secs(31));
        assert!(reg.select_draft("m").is_none());
    }

    #[test]
    fn round_robin_fair_across_stable_pool() {
        let (reg, _) = registry();
        for id in ["t3", "t1", "t2"] {
            reg.register_target(target(id, "big"));
        }
        let picks: Vec<String> = (0..3).map(|_| reg.select_target("big").unwrap().id).collect();
        assert_eq!(picks, ["t1", "t2", "t3"]);
    }

    #[test]
    fn affinity_falls_back_when_model_missing() {
        let (reg, _) = registry();
        reg.register_target(target("t1", "other"));
        assert_eq!(reg.select_target("wanted").unwrap().id, "t1");
    }

    #[test]
    fn concurrent_selection_is_linearized() {
        let (reg, _) = registry();
        for id in ["a", "b", "c", "d"] {
            reg.register_draft(draft(id, "m"));
        }
        let reg = Arc::new(reg);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| reg.select_draft("m").unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for h in handles {
            for id in h.join().unwrap() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        // 200 selections over 4 nodes with a shared cursor: exactly 50 each.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 50));
    }
}
