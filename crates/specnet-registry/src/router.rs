//! Router service: the registry's operations as request/response messages.
//!
//! The router does NOT perform network I/O. The transport layer decodes a
//! [`RouterRequest`], calls [`RouterService::handle`] (or
//! [`RouterService::handle_bytes`] for bincode frames) and writes back the
//! [`RouterResponse`].
//!
//! An empty pool is answered with [`RouteStatus::ResourceExhausted`], never
//! with an error, so callers can tell "no nodes" apart from a failure.

use std::sync::Arc;

use tracing::{info, warn};

use specnet_types::node::{
    DraftHeartbeat, DraftRegistration, ModelInfo, TargetHeartbeat, TargetRegistration,
};
use specnet_types::protocol::{
    HealthReport, HeartbeatAck, RegistrationAck, RouteRequest, RouteResponse, RouteStatus,
    RouterRequest, RouterResponse, TargetAssignmentRequest, TargetAssignmentResponse,
};

use crate::error::Result;
use crate::registry::{DraftNode, NodeClass, NodeRegistry, TargetNode};
use crate::transport;

// ── Placement ────────────────────────────────────────────────────────────────

/// A draft node and a target worker chosen for one client request.
#[derive(Debug, Clone)]
pub struct Placement {
    pub draft: DraftNode,
    pub target: TargetNode,
}

// ── Router ───────────────────────────────────────────────────────────────────

pub struct RouterService {
    registry: Arc<NodeRegistry>,
}

impl RouterService {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Dispatch one request.
    pub fn handle(&self, request: RouterRequest) -> RouterResponse {
        match request {
            RouterRequest::RegisterDraft(reg) => RouterResponse::Registered(self.register_draft(reg)),
            RouterRequest::RegisterTarget(reg) => {
                RouterResponse::Registered(self.register_target(reg))
            }
            RouterRequest::DraftHeartbeat(hb) => RouterResponse::Heartbeat(self.draft_heartbeat(hb)),
            RouterRequest::TargetHeartbeat(hb) => {
                RouterResponse::Heartbeat(self.target_heartbeat(hb))
            }
            RouterRequest::Route(req) => RouterResponse::Route(self.route(&req)),
            RouterRequest::AssignTarget(req) => RouterResponse::AssignTarget(self.assign_target(&req)),
            RouterRequest::Health => RouterResponse::Health(self.health()),
        }
    }

    /// Decode a bincode-framed request, dispatch it, encode the response.
    pub fn handle_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let request = transport::decode_request(data)?;
        transport::encode_response(&self.handle(request))
    }

    // ── Registration ─────────────────────────────────────────────────────

    pub fn register_draft(&self, reg: DraftRegistration) -> RegistrationAck {
        let assigned_id = self.registry.register_draft(reg);
        RegistrationAck {
            accepted: true,
            message: "draft node registered".into(),
            assigned_id,
        }
    }

    pub fn register_target(&self, reg: TargetRegistration) -> RegistrationAck {
        let assigned_id = self.registry.register_target(reg);
        RegistrationAck {
            accepted: true,
            message: "worker registered".into(),
            assigned_id,
        }
    }

    // ── Heartbeats ───────────────────────────────────────────────────────

    pub fn draft_heartbeat(&self, hb: DraftHeartbeat) -> HeartbeatAck {
        self.ack(self.registry.draft_heartbeat(hb))
    }

    pub fn target_heartbeat(&self, hb: TargetHeartbeat) -> HeartbeatAck {
        self.ack(self.registry.target_heartbeat(hb))
    }

    fn ack(&self, acknowledged: bool) -> HeartbeatAck {
        HeartbeatAck {
            acknowledged,
            next_heartbeat_interval_ms: self.registry.config().heartbeat_interval_ms,
        }
    }

    // ── Placement ────────────────────────────────────────────────────────

    /// Pick a draft node for a client request.
    pub fn route(&self, req: &RouteRequest) -> RouteResponse {
        match self.registry.select_draft(&req.model_id) {
            Some(node) => {
                info!(request_id = %req.request_id, node_id = %node.id, "request routed");
                RouteResponse {
                    request_id: req.request_id.clone(),
                    status: RouteStatus::Success,
                    message: "request routed".into(),
                    draft_node_id: node.id,
                    draft_node_address: node.address,
                    estimated_queue_time_ms: 0,
                }
            }
            None => {
                warn!(request_id = %req.request_id, model = %req.model_id, "no active draft nodes");
                RouteResponse {
                    request_id: req.request_id.clone(),
                    status: RouteStatus::ResourceExhausted,
                    message: "no active draft nodes available".into(),
                    draft_node_id: String::new(),
                    draft_node_address: String::new(),
                    estimated_queue_time_ms: 0,
                }
            }
        }
    }

    /// Pick a target worker to verify a request's drafts.
    pub fn assign_target(&self, req: &TargetAssignmentRequest) -> TargetAssignmentResponse {
        match self.registry.select_target(&req.model_id) {
            Some(node) => {
                info!(
                    request_id = %req.request_id,
                    draft_node_id = %req.draft_node_id,
                    worker_id = %node.id,
                    "worker assigned"
                );
                TargetAssignmentResponse {
                    request_id: req.request_id.clone(),
                    status: RouteStatus::Success,
                    message: "worker assigned".into(),
                    worker_id: node.id,
                    worker_address: node.address,
                    model_info: node.model_info,
                }
            }
            None => {
                warn!(request_id = %req.request_id, model = %req.model_id, "no active target workers");
                TargetAssignmentResponse {
                    request_id: req.request_id.clone(),
                    status: RouteStatus::ResourceExhausted,
                    message: "no active target workers available".into(),
                    worker_id: String::new(),
                    worker_address: String::new(),
                    model_info: ModelInfo::default(),
                }
            }
        }
    }

    /// Route a request and assign its verifier in one step.
    ///
    /// On exhaustion returns the class that had no node. A draft node picked
    /// before the target pool turned out empty still advanced its cursor.
    pub fn place(&self, model_id: &str) -> std::result::Result<Placement, NodeClass> {
        let draft = self.registry.select_draft(model_id).ok_or(NodeClass::Draft)?;
        let target = self.registry.select_target(model_id).ok_or(NodeClass::Target)?;
        Ok(Placement { draft, target })
    }

    // ── Health ───────────────────────────────────────────────────────────

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".into(),
            draft_nodes: self.registry.draft_count(),
            target_nodes: self.registry.target_count(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
