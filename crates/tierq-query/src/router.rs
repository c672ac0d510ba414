//! Per-query tier selection.
//!
//! A query runs locally only when every table it reads is local. Routing reads the
//! registry without holding any lock across engine calls, so a promotion that completes
//! mid-query affects only later queries.

use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use std::time::Instant;
use tierq_core::metrics::{QUERIES_ROUTED, QUERY_DURATION, UNKNOWN_TABLE_REJECTIONS};
use tierq_core::{
    CoreError, CoreResult, LocalEngine, Location, QueryConfig, QueryOutcome, RemoteEngine,
    SqlDialect, SqlTranslator,
};
use tierq_storage::TierContext;

/// Where a query would run and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub tier: Location,
    /// Referenced tables in order of first appearance.
    pub tables: Vec<String>,
    /// Referenced tables that are still remote.
    pub remote_tables: Vec<String>,
}

impl RoutingDecision {
    /// Bookkeeping order: local tables first, then remote ones, each in query order.
    pub fn touch_order(&self) -> Vec<String> {
        let (remote, local): (Vec<&String>, Vec<&String>) = self
            .tables
            .iter()
            .partition(|table| self.remote_tables.contains(table));
        local.into_iter().chain(remote).cloned().collect()
    }
}

/// Routes queries to the local or remote engine and records table usage.
pub struct QueryRouter {
    ctx: Arc<TierContext>,
    translator: Arc<dyn SqlTranslator>,
    local: Arc<dyn LocalEngine>,
    remote: Arc<dyn RemoteEngine>,
    namespace: String,
    source_dialect: SqlDialect,
    local_dialect: SqlDialect,
}

impl QueryRouter {
    pub fn new(
        ctx: Arc<TierContext>,
        translator: Arc<dyn SqlTranslator>,
        local: Arc<dyn LocalEngine>,
        remote: Arc<dyn RemoteEngine>,
        namespace: impl Into<String>,
    ) -> Self {
        let defaults = QueryConfig::default();
        Self {
            ctx,
            translator,
            local,
            remote,
            namespace: namespace.into(),
            source_dialect: defaults.source_dialect,
            local_dialect: defaults.local_dialect,
        }
    }

    pub fn with_dialects(mut self, config: &QueryConfig) -> Self {
        self.source_dialect = config.source_dialect;
        self.local_dialect = config.local_dialect;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Decides the tier for `sql` without executing it or recording usage.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownTable` for the first unregistered table (including any
    /// table of a dataset other than the namespace), or the translator's error if the
    /// query cannot be parsed.
    pub fn plan(&self, sql: &str) -> CoreResult<RoutingDecision> {
        let tables = self.translator.extract_table_names(sql, &self.namespace)?;

        let mut remote_tables = Vec::new();
        for table in &tables {
            if self.ctx.registry.location_of(table)? == Location::Remote {
                remote_tables.push(table.clone());
            }
        }

        let tier = if remote_tables.is_empty() {
            Location::Local
        } else {
            Location::Remote
        };

        Ok(RoutingDecision {
            tier,
            tables,
            remote_tables,
        })
    }

    /// Runs `sql` on the chosen tier, then records usage of every referenced table.
    pub async fn route_and_execute(&self, sql: &str) -> CoreResult<QueryOutcome> {
        let decision = match self.plan(sql) {
            Ok(decision) => decision,
            Err(e @ CoreError::UnknownTable { .. }) => {
                UNKNOWN_TABLE_REJECTIONS.inc();
                tracing::warn!(error = %e, "Rejected query referencing unknown table");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let tier = decision.tier;
        tracing::debug!(
            tier = %tier,
            tables = ?decision.tables,
            remote_tables = ?decision.remote_tables,
            "Routing query"
        );

        let start = Instant::now();
        let result = match tier {
            Location::Local => self.execute_local(sql).await,
            Location::Remote => self.execute_remote(sql).await,
        };
        let elapsed = start.elapsed();
        QUERY_DURATION
            .with_label_values(&[tier.as_str()])
            .observe(elapsed.as_secs_f64());

        match result {
            Ok(batches) => {
                QUERIES_ROUTED.with_label_values(&[tier.as_str(), "ok"]).inc();
                self.ctx.record_usage(&decision.touch_order());

                let outcome = QueryOutcome {
                    tier,
                    tables: decision.tables,
                    batches,
                };
                tracing::info!(
                    tier = %tier,
                    tables = ?outcome.tables,
                    rows = outcome.row_count(),
                    duration_ms = elapsed.as_millis(),
                    "Query executed"
                );
                Ok(outcome)
            }
            Err(e) => {
                QUERIES_ROUTED.with_label_values(&[tier.as_str(), "error"]).inc();
                tracing::warn!(tier = %tier, error = %e, "Query execution failed");
                Err(e)
            }
        }
    }

    async fn execute_local(&self, sql: &str) -> CoreResult<Vec<RecordBatch>> {
        // Local tables are registered under their bare names
        let sql = self.translator.unqualify_tables(sql, &self.namespace)?;
        let sql = if self.source_dialect == self.local_dialect {
            sql
        } else {
            self.translator
                .translate(&sql, self.source_dialect, self.local_dialect)?
        };
        self.local.execute(&sql).await
    }

    async fn execute_remote(&self, sql: &str) -> CoreResult<Vec<RecordBatch>> {
        let sql = self.translator.qualify_tables(sql, &self.namespace)?;
        self.remote.execute(&sql, &self.namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqlParserTranslator;
    use tierq_core::mock::{sample_batch, MockFailure, MockLocalEngine, MockWarehouse};

    struct Harness {
        ctx: Arc<TierContext>,
        local: Arc<MockLocalEngine>,
        remote: Arc<MockWarehouse>,
        router: QueryRouter,
    }

    fn harness() -> Harness {
        let ctx = Arc::new(TierContext::new(3).unwrap());
        ctx.registry.register("t1", Location::Remote);
        ctx.registry.register("t2", Location::Local);
        ctx.registry.register("t3", Location::Remote);

        let local = Arc::new(MockLocalEngine::new());
        local.set_result(vec![sample_batch(2)]);
        let remote = Arc::new(MockWarehouse::new("tpcds", ["t1", "t3"]));
        let router = QueryRouter::new(
            ctx.clone(),
            Arc::new(SqlParserTranslator::new(SqlDialect::BigQuery)),
            local.clone(),
            remote.clone(),
            "tpcds",
        );
        Harness {
            ctx,
            local,
            remote,
            router,
        }
    }

    #[test]
    fn test_touch_order_puts_remote_last() {
        let decision = RoutingDecision {
            tier: Location::Remote,
            tables: vec!["t1".into(), "t2".into(), "t3".into()],
            remote_tables: vec!["t1".into(), "t3".into()],
        };
        assert_eq!(decision.touch_order(), vec!["t2", "t1", "t3"]);
    }

    #[test]
    fn test_plan_has_no_side_effects() {
        let h = harness();
        let decision = h.router.plan("SELECT * FROM t2").unwrap();
        assert_eq!(decision.tier, Location::Local);
        assert!(h.ctx.tracker.is_empty());
        assert_eq!(h.ctx.registry.get("t2").unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn test_all_local_routes_local() {
        let h = harness();
        let outcome = h.router.route_and_execute("select * from t2").await.unwrap();

        assert_eq!(outcome.tier, Location::Local);
        assert_eq!(outcome.row_count(), 2);
        assert_eq!(h.local.executed_queries(), vec!["SELECT * FROM t2"]);
        assert!(h.remote.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn test_any_remote_routes_remote_qualified() {
        let h = harness();
        let outcome = h
            .router
            .route_and_execute("select * from t1 join t2 on t1.id = t2.id")
            .await
            .unwrap();

        assert_eq!(outcome.tier, Location::Remote);
        assert_eq!(outcome.tables, vec!["t1", "t2"]);
        assert_eq!(
            h.remote.executed_queries(),
            vec!["SELECT * FROM tpcds.t1 JOIN tpcds.t2 ON t1.id = t2.id"]
        );
        assert_eq!(h.ctx.tracker.hot_set(), vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn test_unknown_table_rejected_before_dispatch() {
        let h = harness();
        let err = h
            .router
            .route_and_execute("select * from t2 join ghost using (id)")
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::UnknownTable { ref name } if name == "ghost"));
        assert!(h.local.executed_queries().is_empty());
        assert!(h.remote.executed_queries().is_empty());
        assert_eq!(h.ctx.registry.get("t2").unwrap().usage_count, 0);
        assert!(h.ctx.tracker.is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_skips_bookkeeping() {
        let h = harness();
        h.remote.push_failure(MockFailure::Transient("503 Service Unavailable"));

        assert!(h.router.route_and_execute("select * from t1").await.is_err());
        assert_eq!(h.ctx.registry.get("t1").unwrap().usage_count, 0);
        assert!(h.ctx.tracker.is_empty());
    }

    #[tokio::test]
    async fn test_query_without_tables_routes_local() {
        let h = harness();
        let outcome = h.router.route_and_execute("SELECT 1").await.unwrap();
        assert_eq!(outcome.tier, Location::Local);
        assert!(outcome.tables.is_empty());
    }

    #[tokio::test]
    async fn test_usage_counts_once_per_query() {
        let h = harness();
        h.router
            .route_and_execute("select * from t2 a join t2 b on a.id = b.id")
            .await
            .unwrap();
        h.router.route_and_execute("select * from t2").await.unwrap();

        let entry = h.ctx.registry.get("t2").unwrap();
        assert_eq!(entry.usage_count, 2);
        assert!(entry.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_same_dialect_skips_translation() {
        let h = harness();
        let router = QueryRouter::new(
            h.ctx.clone(),
            Arc::new(SqlParserTranslator::new(SqlDialect::Generic)),
            h.local.clone(),
            h.remote.clone(),
            "tpcds",
        )
        .with_dialects(&QueryConfig {
            source_dialect: SqlDialect::Generic,
            local_dialect: SqlDialect::Generic,
        });

        router.route_and_execute("select  *  from t2").await.unwrap();
        assert_eq!(h.local.executed_queries(), vec!["select  *  from t2"]);
    }

    #[tokio::test]
    async fn test_namespace_qualified_local_table_runs_unqualified() {
        let h = harness();
        let outcome = h
            .router
            .route_and_execute("select * from tpcds.t2 where tpcds.t2.id > 0")
            .await
            .unwrap();

        assert_eq!(outcome.tier, Location::Local);
        assert_eq!(outcome.tables, vec!["t2"]);
        assert_eq!(
            h.local.executed_queries(),
            vec!["SELECT * FROM t2 WHERE t2.id > 0"]
        );
        assert_eq!(h.ctx.registry.get("t2").unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn test_other_dataset_is_unknown_table() {
        let h = harness();
        let err = h
            .router
            .route_and_execute("select * from otherds.t2")
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::UnknownTable { ref name } if name == "otherds.t2"));
        assert!(h.local.executed_queries().is_empty());
        assert!(h.remote.executed_queries().is_empty());
        assert_eq!(h.ctx.registry.get("t2").unwrap().usage_count, 0);
        assert!(h.ctx.tracker.is_empty());
    }
}
