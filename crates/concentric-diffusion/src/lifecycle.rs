//! Session lifecycle
//!
//! Initializing → Active ⇄ Paused → Ended. `Ended` is terminal and reachable
//! from every other state.

use concentric_core::{Timestamp, ValidationError};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Participants may join and leave; no content yet
    #[default]
    Initializing,
    /// Accepting everything, clock running
    Active,
    /// Content accepted, clock stopped
    Paused { since: Timestamp },
    /// No further mutation
    Ended { at: Timestamp },
}

impl Lifecycle {
    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Initializing => "initializing",
            Lifecycle::Active => "active",
            Lifecycle::Paused { .. } => "paused",
            Lifecycle::Ended { .. } => "ended",
        }
    }

    fn invalid(&self, to: &'static str) -> ValidationError {
        match self {
            Lifecycle::Ended { .. } => ValidationError::SessionEnded,
            _ => ValidationError::InvalidTransition {
                from: self.name(),
                to,
            },
        }
    }

    pub fn start(self) -> Result<Lifecycle, ValidationError> {
        match self {
            Lifecycle::Initializing => Ok(Lifecycle::Active),
            other => Err(other.invalid("active")),
        }
    }

    pub fn pause(self, at: Timestamp) -> Result<Lifecycle, ValidationError> {
        match self {
            Lifecycle::Active => Ok(Lifecycle::Paused { since: at }),
            other => Err(other.invalid("paused")),
        }
    }

    /// Leave the paused state; also returns when the pause began
    pub fn resume(self) -> Result<(Lifecycle, Timestamp), ValidationError> {
        match self {
            Lifecycle::Paused { since } => Ok((Lifecycle::Active, since)),
            other => Err(other.invalid("active")),
        }
    }

    pub fn end(self, at: Timestamp) -> Result<Lifecycle, ValidationError> {
        match self {
            Lifecycle::Ended { .. } => Err(ValidationError::SessionEnded),
            _ => Ok(Lifecycle::Ended { at }),
        }
    }

    /// Messages and votes are accepted
    pub fn check_content(&self) -> Result<(), ValidationError> {
        match self {
            Lifecycle::Active | Lifecycle::Paused { .. } => Ok(()),
            Lifecycle::Initializing => Err(ValidationError::SessionNotStarted),
            Lifecycle::Ended { .. } => Err(ValidationError::SessionEnded),
        }
    }

    /// Joins and leaves are accepted
    pub fn check_membership(&self) -> Result<(), ValidationError> {
        match self {
            Lifecycle::Ended { .. } => Err(ValidationError::SessionEnded),
            _ => Ok(()),
        }
    }

    /// The propagation clock runs
    #[inline]
    pub fn is_ticking(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        matches!(self, Lifecycle::Ended { .. })
    }
}
