//! `specnet-session`: Request driver for speculative decoding.
//!
//! A session owns one request's token context and runs draft/verify rounds
//! strictly one after another until the budget is spent, an end-of-sequence
//! token shows up, or the draft model runs dry.
//!
//! ```text
//!   InferenceRequest ──▶ SessionDriver::run
//!                          │  loop: DraftBackend::propose ─▶ Verifier::verify
//!                          │        append accepted / corrected / bonus
//!                          ▼
//!                        InferenceSummary   (+ SessionEvent stream)
//! ```

pub mod driver;
pub mod error;
pub mod events;
pub mod session;

pub use driver::{DraftBackend, InferenceRequest, SessionDriver};
pub use error::{Result, SessionError};
pub use events::{InferenceSummary, RoundEvent, SessionEvent, StopReason, TokenEvent, TokenKind};
pub use session::{InferenceSession, SessionState};
