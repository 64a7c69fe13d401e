//! Concentric Diffusion
//!
//! Message propagation through concentric rings of participants.
//!
//! # Flow
//!
//! Events → Scheduler → {VoteAggregator, PropagationClock} → VisibilityIndex
//! → notifications
//!
//! Key pieces:
//! - Assignment: which ring each participant sits in, kept balanced
//! - Votes: running score per message, last write wins per participant
//! - Reach: per-message propagation state with revisioned commits
//! - Visibility: what each participant may currently see
//! - Scheduler: the per-session orchestrator and lifecycle state machine
//!
//! Visibility only ever grows. Nothing here retracts a message once a ring
//! has received it.

pub mod assignment;
pub mod lifecycle;
pub mod reach;
pub mod scheduler;
pub mod stats;
pub mod visibility;
pub mod votes;

pub use assignment::*;
pub use lifecycle::*;
pub use reach::*;
pub use scheduler::*;
pub use stats::*;
pub use visibility::*;
pub use votes::*;
