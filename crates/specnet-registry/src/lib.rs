//! `specnet-registry`: Draft/target node registry and assignment.
//!
//! Nodes register, heartbeat, and get handed out to requests. Liveness is
//! checked lazily: every selection call first purges nodes whose heartbeat
//! has expired, then filters by capacity/role and model affinity, then
//! rotates through the survivors in id order.
//!
//! ```text
//!   register / heartbeat ──▶ ┌──────────────────────────────┐
//!                            │ NodeRegistry (one mutex)     │
//!   select_draft(model) ───▶ │  drafts:  NodePool + cursors │ ──▶ DraftNode | None
//!   select_target(model) ──▶ │  targets: NodePool + cursors │ ──▶ TargetNode | None
//!                            └──────────────────────────────┘
//! ```

pub mod error;
pub mod liveness;
pub mod registry;
pub mod router;
pub mod selection;
pub mod transport;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use error::{RegistryError, Result};
pub use liveness::{Clock, ManualClock, SystemClock};
pub use registry::{DraftNode, NodeClass, NodeRegistry, TargetNode};
pub use router::{Placement, RouterService};
pub use selection::{NodePool, PoolMember, ANY_MODEL_KEY};
pub use transport::{decode_request, decode_response, encode_request, encode_response};
