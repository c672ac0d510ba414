//! Tier state and data movement for TierQ.
//!
//! Holds the metadata registry, the usage tracker, the local parquet table store and
//! the promotion machinery that moves hot tables from the warehouse to local disk.

pub mod discovery;
pub mod local_store;
pub mod registry;
pub mod tiering;
pub mod transfer;

pub use discovery::{populate_registry, DiscoveryReport, LoadFailure};
pub use local_store::LocalTableStore;
pub use registry::MetadataRegistry;
pub use tiering::{
    PromotionFailure, PromotionOutcome, RebalanceReport, TierContext, TierPromotionManager,
    UsageTracker,
};
pub use transfer::ObjectStoreTransfer;
