//! Local tier engine on DataFusion.
//!
//! Each local table is a parquet listing table registered under the session's default
//! catalog and schema; re-registering a name replaces the previous provider.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::{ParquetReadOptions, SessionConfig};
use std::path::Path;
use tierq_core::{CoreError, CoreResult, LocalConfig, LocalEngine};

const SERVICE: &str = "datafusion";

/// [`LocalEngine`] backed by an in-process DataFusion session.
pub struct DataFusionEngine {
    ctx: SessionContext,
    catalog: String,
    schema: String,
}

impl DataFusionEngine {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        let catalog = catalog.into();
        let schema = schema.into();
        let config = SessionConfig::new()
            .with_information_schema(true)
            .with_default_catalog_and_schema(catalog.as_str(), schema.as_str());

        Self {
            ctx: SessionContext::new_with_config(config),
            catalog,
            schema,
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(config.catalog.clone(), config.schema.clone())
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }
}

#[async_trait]
impl LocalEngine for DataFusionEngine {
    async fn execute(&self, sql: &str) -> CoreResult<Vec<RecordBatch>> {
        let frame = self
            .ctx
            .sql(sql)
            .await
            .map_err(|e| CoreError::external(SERVICE, e))?;
        frame
            .collect()
            .await
            .map_err(|e| CoreError::external(SERVICE, e))
    }

    async fn load_table(&self, name: &str, path: &Path) -> CoreResult<()> {
        if self
            .ctx
            .table_exist(name)
            .map_err(|e| CoreError::external(SERVICE, e))?
        {
            self.ctx
                .deregister_table(name)
                .map_err(|e| CoreError::external(SERVICE, e))?;
        }

        // Trailing separator makes DataFusion list the directory instead of a single file.
        let location = format!("{}/", path.display().to_string().trim_end_matches('/'));
        self.ctx
            .register_parquet(name, &location, ParquetReadOptions::default())
            .await
            .map_err(|e| CoreError::external(SERVICE, e))?;

        tracing::debug!(table = %name, location = %location, "Registered parquet table");
        Ok(())
    }

    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        let schema = self
            .ctx
            .catalog(&self.catalog)
            .and_then(|catalog| catalog.schema(&self.schema))
            .ok_or_else(|| {
                CoreError::internal(format!(
                    "schema {}.{} is not registered",
                    self.catalog, self.schema
                ))
            })?;

        let mut tables = schema.table_names();
        tables.sort();
        Ok(tables)
    }
}
