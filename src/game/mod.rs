//! Naval combat domain: boards, battles and outcome reporting

pub mod battle;
pub mod board;
pub mod outcome;

pub use battle::{Battle, BattlePhase, BattleTable, ReadyOutcome, ShotOutcome};
pub use board::Board;
pub use outcome::OutcomeReporter;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated user identity, issued by the auth service
pub type UserId = i64;

/// Match identifier, unique for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
