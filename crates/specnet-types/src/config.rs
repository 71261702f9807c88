// Global configuration structs. Every field has a default so a partial JSON
// file (or none at all) yields a runnable node.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpecNetError;

// ── Router ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Seconds of heartbeat silence after which a node is purged on the next
    /// selection call. Default: 30.
    pub heartbeat_timeout_secs: u64,

    /// Heartbeat interval advertised to nodes in every heartbeat ack.
    /// Default: 5000 ms.
    pub heartbeat_interval_ms: u64,
}

impl RouterConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 30,
            heartbeat_interval_ms: 5000,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on draft tokens proposed per round. Default: 5.
    pub max_draft_tokens: usize,

    /// Upper bound on `max_tokens` a single request may ask for. Default: 512.
    pub max_session_tokens: usize,

    /// Token budget used when a request does not specify one. Default: 64.
    pub default_max_tokens: usize,

    /// End-of-sequence token ids of the model family being served.
    /// Empty means generation only stops on the token budget.
    pub eos_token_ids: Vec<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_draft_tokens: 5,
            max_session_tokens: 512,
            default_max_tokens: 64,
            eos_token_ids: Vec::new(),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// Top-level configuration for a SpecNet node process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub router: RouterConfig,
    pub session: SessionConfig,
}

impl NodeConfig {
    /// Load a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self, SpecNetError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SpecNetError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| SpecNetError::Config(format!("{}: {e}", path.display())))
    }
}
