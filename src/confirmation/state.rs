use std::fmt;

use crate::errors::BlindsightError;
use crate::models::{Technique, Vector};

/// Progress of confirmation for one injection point.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfirmationState {
    #[default]
    Untested,
    Probing(Technique),
    Confirmed(Vector),
    Exhausted,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed(_) | ConfirmationState::Exhausted)
    }

    pub fn vector(&self) -> Option<&Vector> {
        match self {
            ConfirmationState::Confirmed(vector) => Some(vector),
            _ => None,
        }
    }

    pub fn begin(&mut self, technique: Technique) -> Result<(), BlindsightError> {
        match self {
            ConfirmationState::Untested | ConfirmationState::Probing(_) => {
                *self = ConfirmationState::Probing(technique);
                Ok(())
            }
            other => Err(invalid(other, "PROBING")),
        }
    }

    pub fn confirm(&mut self, vector: Vector) -> Result<(), BlindsightError> {
        match self {
            ConfirmationState::Probing(_) => {
                *self = ConfirmationState::Confirmed(vector);
                Ok(())
            }
            other => Err(invalid(other, "CONFIRMED")),
        }
    }

    pub fn exhaust(&mut self) -> Result<(), BlindsightError> {
        match self {
            ConfirmationState::Untested | ConfirmationState::Probing(_) => {
                *self = ConfirmationState::Exhausted;
                Ok(())
            }
            other => Err(invalid(other, "EXHAUSTED")),
        }
    }
}

fn invalid(from: &ConfirmationState, to: &str) -> BlindsightError {
    BlindsightError::Internal(format!("invalid confirmation transition {} -> {}", from, to))
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationState::Untested => write!(f, "UNTESTED"),
            ConfirmationState::Probing(t) => write!(f, "PROBING({})", t),
            ConfirmationState::Confirmed(v) => write!(f, "CONFIRMED({})", v.technique),
            ConfirmationState::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}
