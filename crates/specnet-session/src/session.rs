use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

// ── Session State Machine ────────────────────────────────────────────────────

/// Running → Completed | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Draft/verify rounds are in progress.
    Running,
    /// Budget reached, end-of-sequence seen, or the draft ran dry.
    Completed,
    /// A backend failed or returned unusable output.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running   => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed    => write!(f, "Failed"),
        }
    }
}

// ── Inference Session ────────────────────────────────────────────────────────

/// Per-request state owned by one driver run.
#[derive(Debug)]
pub struct InferenceSession {
    pub request_id: String,
    pub state: SessionState,
    /// Prompt followed by every token emitted so far.
    pub context: Vec<u32>,
    pub prompt_len: usize,
    pub rounds: u32,
    pub failure_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl InferenceSession {
    pub fn new(request_id: String, prompt: Vec<u32>) -> Self {
        Self {
            request_id,
            state: SessionState::Running,
            prompt_len: prompt.len(),
            context: prompt,
            rounds: 0,
            failure_reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Tokens generated after the prompt.
    pub fn output(&self) -> &[u32] {
        &self.context[self.prompt_len..]
    }

    pub fn output_len(&self) -> usize {
        self.context.len() - self.prompt_len
    }

    /// Append one generated token. Only valid while `Running`.
    pub fn push(&mut self, token_id: u32) -> Result<()> {
        self.ensure_running("appending tokens")?;
        self.context.push(token_id);
        Ok(())
    }

    /// Transition `Running → Completed`.
    pub fn complete(&mut self) -> Result<()> {
        self.ensure_running(&SessionState::Completed.to_string())?;
        self.state = SessionState::Completed;
        Ok(())
    }

    /// Transition `Running → Failed` with a reason.
    pub fn fail(&mut self, reason: &str) -> Result<()> {
        self.ensure_running(&SessionState::Failed.to_string())?;
        self.state = SessionState::Failed;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.state != SessionState::Running
    }

    fn ensure_running(&self, to: &str) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidTransition {
                from: self.state.to_string(),
                to: to.into(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
