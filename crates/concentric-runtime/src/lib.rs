//! Concentric Runtime
//!
//! Hosts propagation sessions on tokio. Each session is owned by a single
//! worker task fed through a bounded command queue; visibility reads go
//! straight to the shared index without queueing.

pub mod config;
pub mod error;
pub mod registry;
pub mod telemetry;
pub mod time_source;
pub mod worker;

pub use config::*;
pub use error::*;
pub use registry::*;
pub use telemetry::init_tracing;
pub use time_source::*;
pub use worker::*;
