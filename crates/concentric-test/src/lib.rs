//! Concentric Test Harness
//!
//! This crate provides:
//! - A seeded workload simulator that drives a session with random joins,
//!   leaves, messages, votes, pauses and ticks
//! - An invariant checker run after every simulated step
//! - A driver that replays generated workloads through the async runtime

pub mod driver;
pub mod invariants;
pub mod simulator;

pub use driver::*;
pub use invariants::*;
pub use simulator::*;
