use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::truncation::truncate_evidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    True,
    False,
    Inconclusive,
}

impl Outcome {
    pub fn from_bool(value: bool) -> Self {
        if value { Outcome::True } else { Outcome::False }
    }

    /// `Some(bool)` for a decisive answer.
    pub fn decisive(&self) -> Option<bool> {
        match self {
            Outcome::True => Some(true),
            Outcome::False => Some(false),
            Outcome::Inconclusive => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Outcome::True => "TRUE",
            Outcome::False => "FALSE",
            Outcome::Inconclusive => "INCONCLUSIVE",
        })
    }
}

/// Answer to a single oracle question.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleVerdict {
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub evidence: String,
}

impl OracleVerdict {
    pub fn new(outcome: Outcome, elapsed: Duration, evidence: impl AsRef<str>) -> Self {
        Self {
            outcome,
            elapsed,
            evidence: truncate_evidence(evidence.as_ref()),
        }
    }

    pub fn inconclusive(reason: impl AsRef<str>) -> Self {
        Self::new(Outcome::Inconclusive, Duration::ZERO, reason)
    }

    pub fn is_inconclusive(&self) -> bool {
        self.outcome == Outcome::Inconclusive
    }
}
