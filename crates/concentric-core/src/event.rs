//! Inbound events and outbound notifications
//!
//! Events arrive from the trigger plumbing (message store, vote capture,
//! presence, session control). Notifications leave for real-time delivery.

use crate::{MessageId, MessageKind, ParticipantId, Ring, RingSet, SessionId, Timestamp};

/// Event consumed by a session's propagation engine
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum SessionEvent {
    MessageCreated {
        session: SessionId,
        message: MessageId,
        author: ParticipantId,
        kind: MessageKind,
        created_at: Timestamp,
    },
    VoteSubmitted {
        session: SessionId,
        message: MessageId,
        participant: ParticipantId,
        intensity: f64,
        voted_at: Timestamp,
    },
    ParticipantJoined {
        session: SessionId,
        participant: ParticipantId,
        joined_at: Timestamp,
        /// Fixed ring for participants that must not be rebalanced
        pinned_ring: Option<Ring>,
    },
    ParticipantLeft {
        session: SessionId,
        participant: ParticipantId,
        left_at: Timestamp,
    },
    Started {
        session: SessionId,
        at: Timestamp,
    },
    Paused {
        session: SessionId,
        at: Timestamp,
    },
    Resumed {
        session: SessionId,
        at: Timestamp,
    },
    Ended {
        session: SessionId,
        at: Timestamp,
    },
}

impl SessionEvent {
    /// Session this event belongs to
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::MessageCreated { session, .. }
            | SessionEvent::VoteSubmitted { session, .. }
            | SessionEvent::ParticipantJoined { session, .. }
            | SessionEvent::ParticipantLeft { session, .. }
            | SessionEvent::Started { session, .. }
            | SessionEvent::Paused { session, .. }
            | SessionEvent::Resumed { session, .. }
            | SessionEvent::Ended { session, .. } => *session,
        }
    }

    /// Timestamp carried by the event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SessionEvent::MessageCreated { created_at, .. } => *created_at,
            SessionEvent::VoteSubmitted { voted_at, .. } => *voted_at,
            SessionEvent::ParticipantJoined { joined_at, .. } => *joined_at,
            SessionEvent::ParticipantLeft { left_at, .. } => *left_at,
            SessionEvent::Started { at, .. }
            | SessionEvent::Paused { at, .. }
            | SessionEvent::Resumed { at, .. }
            | SessionEvent::Ended { at, .. } => *at,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::MessageCreated { .. } => "message_created",
            SessionEvent::VoteSubmitted { .. } => "vote_submitted",
            SessionEvent::ParticipantJoined { .. } => "participant_joined",
            SessionEvent::ParticipantLeft { .. } => "participant_left",
            SessionEvent::Started { .. } => "started",
            SessionEvent::Paused { .. } => "paused",
            SessionEvent::Resumed { .. } => "resumed",
            SessionEvent::Ended { .. } => "ended",
        }
    }
}

/// Why a propagation notification was emitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChangeCause {
    /// Initial reach established at creation
    Seeded,
    /// Message moved outward by at least one ring
    Advanced,
    /// Aggregate score crossed the viral threshold
    ViralCrossing,
}

/// Propagation-changed notification
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropagationChanged {
    pub session: SessionId,
    pub message: MessageId,
    pub current_ring: Ring,
    pub reach: RingSet,
    pub viral_score: f64,
    pub cause: ChangeCause,
    pub at: Timestamp,
}
