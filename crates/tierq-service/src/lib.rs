//! TierQ service facade.
//!
//! [`TieredQueryService`] wires the registry, the usage tracker, the router and the
//! promotion manager together from a [`TierqConfig`](tierq_core::TierqConfig).

pub mod service;
pub mod telemetry;

pub use service::{Collaborators, TieredQueryService};
pub use telemetry::init_tracing;
