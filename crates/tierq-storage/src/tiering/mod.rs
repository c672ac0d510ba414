//! Remote → local tiering of warehouse tables
//!
//! Tables live either in the remote warehouse or as parquet directories under the local
//! storage root. Queries touch the [`UsageTracker`]; its membership is the hot set, and
//! the [`TierPromotionManager`] copies every non-local member of the hot set to the local
//! tier before flipping its registry location.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        QueryRouter                           │
//! │   route_and_execute() → TierContext.record_usage(tables)     │
//! │                            ↓                                 │
//! │          ┌─────────────────┴─────────────────┐               │
//! │   MetadataRegistry                     UsageTracker          │
//! │   (name → location, usage)             (LRU, capacity C)     │
//! │          ↑                                   │ hot_set()     │
//! │          │ set_location(LOCAL)               ↓               │
//! │          └──────────── TierPromotionManager ─┘               │
//! │                 export → download → commit → load            │
//! │                            ↑                                 │
//! │                   Background Worker (optional)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod promotion;
mod tracker;

pub use promotion::{PromotionFailure, PromotionOutcome, RebalanceReport, TierPromotionManager};
pub use tracker::UsageTracker;

use crate::registry::MetadataRegistry;
use tierq_core::CoreResult;

/// Shared tiering state: one registry and one usage tracker.
///
/// Wrapped in an `Arc` and handed to both the router and the promotion manager.
pub struct TierContext {
    pub registry: MetadataRegistry,
    pub tracker: UsageTracker,
}

impl TierContext {
    pub fn new(tracker_capacity: usize) -> CoreResult<Self> {
        Ok(Self {
            registry: MetadataRegistry::new(),
            tracker: UsageTracker::new(tracker_capacity)?,
        })
    }

    /// Increments usage and touches the tracker for each name, in order.
    ///
    /// Failures are logged and skipped; bookkeeping never fails the caller.
    pub fn record_usage(&self, tables: &[String]) {
        for table in tables {
            if let Err(e) = self.registry.increment_usage(table) {
                tracing::warn!(table = %table, error = %e, "Failed to increment usage");
            }
            self.tracker.touch(table);
        }
    }
}
