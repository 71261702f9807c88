//! `specnet-verify`: Speculative decoding reconciliation.
//!
//! A draft node proposes a few tokens; the target node independently
//! continues the same prefix; [`reconcile`] decides how many drafted tokens
//! survive and which target token replaces the first wrong one.
//!
//! ```text
//!   prefix ─┬─▶ draft node    ──▶ draft  ──┐
//!           └─▶ TargetBackend ──▶ target ──┴──▶ reconcile ──▶ VerificationRound
//! ```
//!
//! The [`Verifier`] owns the target side of a round: it calls the backend,
//! reconciles and times the whole step. [`AcceptanceStats`] aggregates
//! rounds for a session or a node.

pub mod backend;
pub mod error;
pub mod round;
pub mod stats;
pub mod verifier;

pub use backend::TargetBackend;
pub use error::{Result, VerifyError};
pub use round::{reconcile, ScoredToken, TargetGeneration, VerificationRound};
pub use stats::AcceptanceStats;
pub use verifier::{BatchItem, BatchVerification, Verifier, VerifyRequest};
