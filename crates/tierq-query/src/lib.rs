//! Query routing for TierQ.
//!
//! [`QueryRouter`] picks the tier for each query from the metadata registry; the
//! local tier runs on [`DataFusionEngine`] and table references are handled by
//! [`SqlParserTranslator`].

pub mod datafusion_engine;
pub mod router;
pub mod translator;

pub use datafusion_engine::DataFusionEngine;
pub use router::{QueryRouter, RoutingDecision};
pub use translator::SqlParserTranslator;
