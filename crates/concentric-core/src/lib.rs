//! Concentric Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every part of the propagation
//! engine:
//! - Identifiers (SessionId, ParticipantId, MessageId)
//! - Session time (Timestamp)
//! - Ring numbers and reach sets (Ring, RingSet)
//! - Domain model (Participant, Message, Vote)
//! - Propagation configuration
//! - Inbound events and outbound notifications
//! - Error types

pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod model;
pub mod ring;
pub mod time;

pub use config::*;
pub use error::*;
pub use event::*;
pub use id::*;
pub use model::*;
pub use ring::*;
pub use time::*;
