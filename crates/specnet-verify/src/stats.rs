use serde::{Deserialize, Serialize};

use crate::round::VerificationRound;

/// Running totals across verification rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceStats {
    pub rounds: u64,
    pub drafted: u64,
    pub accepted: u64,
    pub corrected: u64,
    pub bonus: u64,
    pub verification_time_ms: f64,
}

impl AcceptanceStats {
    /// Fold one round in. `bonus_used` says whether the caller kept the
    /// round's next token.
    pub fn record(&mut self, round: &VerificationRound, bonus_used: bool) {
        self.rounds += 1;
        self.drafted += round.num_drafted as u64;
        self.accepted += round.num_accepted as u64;
        if round.corrected.is_some() {
            self.corrected += 1;
        }
        if bonus_used {
            self.bonus += 1;
        }
        self.verification_time_ms += round.verification_time_ms;
    }

    /// Accepted over drafted, 0 when nothing was drafted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.drafted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.drafted as f64
        }
    }

    /// Tokens emitted per round: accepted plus corrections plus bonus tokens.
    pub fn mean_tokens_per_round(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            (self.accepted + self.corrected + self.bonus) as f64 / self.rounds as f64
        }
    }
}
