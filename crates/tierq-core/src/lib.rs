//! Core domain types and collaborator traits for TierQ.

pub mod config;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod table;
pub mod traits;

pub use config::{
    DiscoveryConfig, DiscoveryPrecedence, LocalConfig, PromotionConfig, QueryConfig,
    RemoteConfig, TierqConfig, TrackerConfig,
};
pub use error::{CoreError, CoreResult};
pub use table::{Location, QueryOutcome, SqlDialect, TableEntry};
pub use traits::{
    ExportHandle, LocalEngine, RemoteCatalog, RemoteEngine, SqlTranslator, TransferService,
};
