//! Per-pool node selection: staleness purge, model affinity, round-robin.
//!
//! Algorithm for one `select(model_id)` call:
//! 1. Keep nodes that are currently selectable (capacity / role filter).
//! 2. If a model was requested, narrow to nodes serving it. If none do, fall
//!    back to the unnarrowed set: availability beats exact model match.
//! 3. Sort by node id so the order never depends on map iteration.
//! 4. Pick `candidates[cursor % len]` using the cursor for this model key,
//!    then advance the cursor even if there is a single candidate.
//!
//! Cursors survive purges. When the pool shrinks the rotation may skip or
//! repeat a node once; fairness only holds within a stable topology.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use specnet_types::node::ModelInfo;

use crate::liveness;

/// Cursor key used when no model was requested.
pub const ANY_MODEL_KEY: &str = "__all__";

/// A record that can live in a [`NodePool`].
pub trait PoolMember: Clone {
    fn id(&self) -> &str;
    fn model_info(&self) -> &ModelInfo;
    fn last_heartbeat_at(&self) -> Instant;
    /// Whether the node may be handed out at all, before model affinity.
    fn is_selectable(&self) -> bool;
}

/// Nodes of one class plus their round-robin cursors.
#[derive(Debug)]
pub struct NodePool<N> {
    nodes: HashMap<String, N>,
    cursors: HashMap<String, usize>,
}

impl<N: PoolMember> NodePool<N> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Insert or overwrite the record for `node.id()`. Returns the previous
    /// record, if any.
    pub fn insert(&mut self, node: N) -> Option<N> {
        self.nodes.insert(node.id().to_string(), node)
    }

    pub fn get(&self, id: &str) -> Option<&N> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut N> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove every node silent for longer than `timeout`. Returns the
    /// removed ids, sorted.
    pub fn purge_stale(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .nodes
            .values()
            .filter(|n| liveness::is_stale(n.last_heartbeat_at(), now, timeout))
            .map(|n| n.id().to_string())
            .collect();
        stale.sort();

        for id in &stale {
            self.nodes.remove(id);
        }
        stale
    }

    /// Pick the next node for `model_id` (empty = any model).
    ///
    /// Returns `None` only when no node is selectable at all; a model with
    /// no matching node falls back to the whole pool.
    pub fn select(&mut self, model_id: &str) -> Option<N> {
        let mut candidates: Vec<&N> = self.nodes.values().filter(|n| n.is_selectable()).collect();
        if candidates.is_empty() {
            return None;
        }

        if !model_id.is_empty() {
            let matching: Vec<&N> = candidates
                .iter()
                .copied()
                .filter(|n| n.model_info().matches(model_id))
                .collect();
            if !matching.is_empty() {
                candidates = matching;
            }
        }

        candidates.sort_by(|a, b| a.id().cmp(b.id()));

        let cursor = self.cursors.entry(cursor_key(model_id).to_string()).or_insert(0);
        let selected = candidates[*cursor % candidates.len()].clone();
        *cursor = cursor.wrapping_add(1);

        Some(selected)
    }

    /// Current cursor for `model_id` (0 if never used).
    pub fn cursor(&self, model_id: &str) -> usize {
        self.cursors.get(cursor_key(model_id)).copied().unwrap_or(0)
    }
}

impl<N: PoolMember> Default for NodePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn cursor_key(model_id: &str) -> &str {
    if model_id.is_empty() {
        ANY_MODEL_KEY
    } else {
        model_id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
