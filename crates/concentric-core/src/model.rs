//! Domain model: participants, messages, votes

use crate::{MessageId, ParticipantId, Ring, Timestamp, ValidationError};

/// Message kind - decides how a message is seeded and whether it spreads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MessageKind {
    /// Seeded at the author's ring, spreads with the clock
    #[default]
    Normal,
    /// Broadcast to every ring at creation
    Prober,
    /// Seeded at a random ring, then spreads with the clock
    Super,
    /// Stays in the ring it was posted to
    Moderator,
}

impl MessageKind {
    /// Whether the propagation clock ever runs for this kind
    #[inline]
    pub fn propagates(self) -> bool {
        matches!(self, MessageKind::Normal | MessageKind::Super)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Normal => "normal",
            MessageKind::Prober => "prober",
            MessageKind::Super => "super",
            MessageKind::Moderator => "moderator",
        }
    }
}

/// A session participant
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Participant {
    pub id: ParticipantId,
    /// Current ring (changed only by rebalancing)
    pub ring: Ring,
    pub joined_at: Timestamp,
    /// Pinned participants are never moved by rebalancing
    pub pinned: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, ring: Ring, joined_at: Timestamp) -> Self {
        Participant {
            id,
            ring,
            joined_at,
            pinned: false,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// A message as seen by the engine (content stays with the caller)
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub id: MessageId,
    pub author: ParticipantId,
    /// Author's ring at creation time
    pub origin_ring: Ring,
    pub kind: MessageKind,
    pub created_at: Timestamp,
}

/// A single vote
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vote {
    pub message: MessageId,
    pub participant: ParticipantId,
    /// Direction and conviction in [-1, 1]
    pub intensity: f64,
    pub voted_at: Timestamp,
}

impl Vote {
    /// Build a vote, rejecting intensities outside [-1, 1]
    pub fn new(
        message: MessageId,
        participant: ParticipantId,
        intensity: f64,
        voted_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        check_intensity(intensity)?;
        Ok(Vote {
            message,
            participant,
            intensity,
            voted_at,
        })
    }
}

/// Intensities must be finite and within [-1, 1]
#[inline]
pub fn check_intensity(intensity: f64) -> Result<(), ValidationError> {
    if (-1.0..=1.0).contains(&intensity) {
        Ok(())
    } else {
        Err(ValidationError::IntensityOutOfRange(intensity))
    }
}
