// Node descriptors exchanged between draft/target nodes and the router.
//
// Consumed by `specnet-registry` (storage, selection) and `specnet-node`.

use serde::{Deserialize, Serialize};

// ── Model Info ────────────────────────────────────────────────────────────────

/// Model a node serves. Used only for affinity matching during selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInfo {
    pub model_id: String,
    pub model_name: String,
    pub version: String,
}

impl ModelInfo {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// True if `requested` names this model by id or by name.
    pub fn matches(&self, requested: &str) -> bool {
        self.model_id == requested || self.model_name == requested
    }

    /// Id if set, otherwise the name. For log lines.
    pub fn label(&self) -> &str {
        if self.model_id.is_empty() {
            &self.model_name
        } else {
            &self.model_id
        }
    }
}

// ── Resource Stats ────────────────────────────────────────────────────────────

/// Last resource snapshot reported by a node. Stored, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceStats {
    pub gpu_utilization: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub active_requests: u32,
    pub tokens_per_second: f32,
}

// ── Worker Role ───────────────────────────────────────────────────────────────

/// Declared role of a worker registering through the target endpoint.
/// Only `Target` workers are eligible for verification assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    #[default]
    Target,
    Draft,
}

// ── Registrations ─────────────────────────────────────────────────────────────

/// Registration sent by a draft node. An empty `node_id` asks the router to
/// assign one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRegistration {
    #[serde(default)]
    pub node_id: String,
    pub address: String,
    #[serde(default)]
    pub model_info: ModelInfo,
    #[serde(default)]
    pub gpu_model: String,
    #[serde(default)]
    pub gpu_memory_bytes: u64,
    #[serde(default = "default_max_draft_tokens")]
    pub max_draft_tokens: u32,
}

impl DraftRegistration {
    pub fn new(address: impl Into<String>, model_info: ModelInfo) -> Self {
        Self {
            node_id: String::new(),
            address: address.into(),
            model_info,
            gpu_model: String::new(),
            gpu_memory_bytes: 0,
            max_draft_tokens: default_max_draft_tokens(),
        }
    }

    pub fn with_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }
}

/// Registration sent by a target (verification) worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegistration {
    #[serde(default)]
    pub node_id: String,
    pub address: String,
    #[serde(default)]
    pub role: WorkerRole,
    #[serde(default)]
    pub model_info: ModelInfo,
    #[serde(default)]
    pub gpu_model: String,
    #[serde(default)]
    pub gpu_memory_bytes: u64,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default = "default_one")]
    pub max_concurrent_requests: u32,
    #[serde(default = "default_one")]
    pub max_batch_size: u32,
}

impl TargetRegistration {
    pub fn new(address: impl Into<String>, model_info: ModelInfo) -> Self {
        Self {
            node_id: String::new(),
            address: address.into(),
            role: WorkerRole::Target,
            model_info,
            gpu_model: String::new(),
            gpu_memory_bytes: 0,
            gpu_count: 0,
            max_concurrent_requests: 1,
            max_batch_size: 1,
        }
    }

    pub fn with_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_role(mut self, role: WorkerRole) -> Self {
        self.role = role;
        self
    }
}

// ── Heartbeats ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftHeartbeat {
    pub node_id: String,
    #[serde(default)]
    pub stats: ResourceStats,
    /// Remaining request slots. Zero removes the node from selection until a
    /// later heartbeat raises it again.
    #[serde(default = "default_one")]
    pub available_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetHeartbeat {
    pub node_id: String,
    #[serde(default)]
    pub stats: ResourceStats,
}

fn default_max_draft_tokens() -> u32 {
    5
}

fn default_one() -> u32 {
    1
}

// ── Tests ─────────────────────────────────────────────────────────────────────
