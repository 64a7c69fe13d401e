//! Error types for the propagation engine

use thiserror::Error;

use crate::{MessageId, ParticipantId, SessionId};

/// Session setup errors - fatal, the session cannot start
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("total_rings must be between 1 and {max}, got {got}")]
    InvalidTotalRings { got: u16, max: u16 },

    #[error("ring_size must be at least 1")]
    InvalidRingSize,

    #[error("base_speed must be finite and positive, got {0}")]
    InvalidBaseSpeed(f64),

    #[error("viral_threshold must be in [0, 1), got {0}")]
    InvalidViralThreshold(f64),

    #[error("decay_factor must be in (0, 1], got {0}")]
    InvalidDecayFactor(f64),

    #[error("decay_floor must be in (0, 1], got {0}")]
    InvalidDecayFloor(f64),

    #[error("placement_window must be at least 1")]
    InvalidPlacementWindow,

    #[error("{field} is fixed for the lifetime of the session")]
    Immutable { field: &'static str },
}

/// Per-event rejections - the event is dropped, existing state is untouched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("vote intensity {0} outside [-1, 1]")]
    IntensityOutOfRange(f64),

    #[error("unknown message {0:?}")]
    UnknownMessage(MessageId),

    #[error("unknown participant {0:?}")]
    UnknownParticipant(ParticipantId),

    #[error("message {0:?} already exists")]
    DuplicateMessage(MessageId),

    #[error("participant {0:?} already joined")]
    DuplicateParticipant(ParticipantId),

    #[error("ring {ring} outside session with {total_rings} rings")]
    RingOutOfRange { ring: u16, total_rings: u16 },

    #[error("session has ended")]
    SessionEnded,

    #[error("session has not started")]
    SessionNotStarted,

    #[error("event for {got:?} routed to {expected:?}")]
    SessionMismatch { expected: SessionId, got: SessionId },

    #[error("unknown session {0:?}")]
    UnknownSession(SessionId),

    #[error("session {0:?} already exists")]
    DuplicateSession(SessionId),

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reach update raced with another update of the same message
    #[error("concurrent reach update on {message:?} (expected revision {expected}, found {found})")]
    ConcurrencyConflict {
        message: MessageId,
        expected: u64,
        found: u64,
    },

    /// Retryable failure - the caller may re-submit
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("session worker has shut down")]
    SessionClosed,
}

impl EngineError {
    /// Whether re-submitting the same event may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_) | EngineError::ConcurrencyConflict { .. })
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
