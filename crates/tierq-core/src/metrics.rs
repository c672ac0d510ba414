//! Central metrics registry and metric definitions
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

// ===== Routing Metrics =====

/// Total number of executed queries by tier and status
pub static QUERIES_ROUTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tierq_queries_routed_total",
        "Total number of routed queries",
        &["tier", "status"]
    )
    .expect("Failed to register routed queries counter")
});

/// Query execution duration histogram
pub static QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tierq_query_duration_seconds",
        "Query execution duration in seconds",
        &["tier"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register query duration histogram")
});

/// Queries rejected because they referenced an unregistered table
pub static UNKNOWN_TABLE_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tierq_unknown_table_rejections_total",
        "Queries rejected for referencing unregistered tables"
    )
    .expect("Failed to register unknown table counter")
});

// ===== Tiering Metrics =====

/// Promotion attempts by outcome
pub static PROMOTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tierq_promotions_total",
        "Total number of table promotion attempts",
        &["status"]
    )
    .expect("Failed to register promotions counter")
});

/// Promotion duration histogram
pub static PROMOTION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tierq_promotion_duration_seconds",
        "Table promotion duration in seconds",
        &["status"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]
    )
    .expect("Failed to register promotion duration histogram")
});

/// Names evicted from the usage tracker
pub static TRACKER_EVICTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tierq_tracker_evictions_total",
        "Tables evicted from the usage tracker"
    )
    .expect("Failed to register tracker evictions counter")
});

/// Registered tables by location
pub static REGISTERED_TABLES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tierq_registered_tables",
        "Number of registered tables",
        &["location"]
    )
    .expect("Failed to register table gauge")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let _ = &*QUERIES_ROUTED;
        let _ = &*QUERY_DURATION;
        let _ = &*UNKNOWN_TABLE_REJECTIONS;
        let _ = &*PROMOTIONS;
        let _ = &*PROMOTION_DURATION;
        let _ = &*TRACKER_EVICTIONS;
        let _ = &*REGISTERED_TABLES;
    }

    #[test]
    fn test_routing_metrics_increment() {
        QUERIES_ROUTED.with_label_values(&["local", "ok"]).inc();

        let metrics = prometheus::gather();
        assert!(metrics
            .iter()
            .any(|m| m.get_name() == "tierq_queries_routed_total"));
    }
}
