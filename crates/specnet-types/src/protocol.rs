// Router request/response messages.
//
// These are the shapes the (external) transport layer exchanges with the
// router. `specnet-registry::transport` frames them with bincode.

use serde::{Deserialize, Serialize};

use crate::node::{
    DraftHeartbeat, DraftRegistration, ModelInfo, TargetHeartbeat, TargetRegistration,
};

// ── Route status ──────────────────────────────────────────────────────────────

/// Outcome of a placement request. `ResourceExhausted` is a normal answer,
/// not an error: the transport maps it to its own "no nodes available" status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Success,
    ResourceExhausted,
}

// ── Acks ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAck {
    pub accepted: bool,
    pub message: String,
    pub assigned_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    /// False when the node id is unknown (never registered, or purged).
    /// The node must re-register.
    pub acknowledged: bool,
    pub next_heartbeat_interval_ms: u64,
}

// ── Placement ─────────────────────────────────────────────────────────────────

/// Ask the router for a draft node to serve a client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub request_id: String,
    /// Preferred model (id or name). Empty means any model.
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub request_id: String,
    pub status: RouteStatus,
    pub message: String,
    pub draft_node_id: String,
    pub draft_node_address: String,
    pub estimated_queue_time_ms: u64,
}

/// Ask the router for a target worker to verify a draft node's proposals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAssignmentRequest {
    pub request_id: String,
    #[serde(default)]
    pub draft_node_id: String,
    #[serde(default)]
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAssignmentResponse {
    pub request_id: String,
    pub status: RouteStatus,
    pub message: String,
    pub worker_id: String,
    pub worker_address: String,
    pub model_info: ModelInfo,
}

// ── Health ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// Registered draft nodes, stale ones included until the next purge.
    pub draft_nodes: usize,
    pub target_nodes: usize,
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Every request the router understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouterRequest {
    RegisterDraft(DraftRegistration),
    RegisterTarget(TargetRegistration),
    DraftHeartbeat(DraftHeartbeat),
    TargetHeartbeat(TargetHeartbeat),
    Route(RouteRequest),
    AssignTarget(TargetAssignmentRequest),
    Health,
}

/// Reply to a [`RouterRequest`], one variant per request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterResponse {
    Registered(RegistrationAck),
    Heartbeat(HeartbeatAck),
    Route(RouteResponse),
    AssignTarget(TargetAssignmentResponse),
    Health(HealthReport),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
