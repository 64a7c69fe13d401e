//! Concentric Time - Propagation clock
//!
//! This crate implements the per-message propagation clock:
//! - Effective speed from base speed, viral boost and decay
//! - Exact accumulation of ring progress between ticks
//! - Ring advancement with fractional carry-over
//! - Terminal detection at the outermost ring

pub mod clock;
pub mod speed;

pub use clock::*;
pub use speed::*;
