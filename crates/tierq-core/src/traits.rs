use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CoreResult;
use crate::table::SqlDialect;

/// Listing interface of the remote warehouse catalog.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Returns the names of all tables in `namespace`.
    async fn list_tables(&self, namespace: &str) -> CoreResult<Vec<String>>;
}

/// Query and export interface of the remote warehouse.
#[async_trait]
pub trait RemoteEngine: Send + Sync {
    /// Executes a query whose table references are already qualified with `namespace`.
    async fn execute(&self, sql: &str, namespace: &str) -> CoreResult<Vec<RecordBatch>>;

    /// Runs a server-side export job writing `table` as parquet files under `destination_uri`.
    ///
    /// Returns once the job has completed.
    async fn extract_table(
        &self,
        namespace: &str,
        table: &str,
        destination_uri: &str,
    ) -> CoreResult<()>;
}

/// Local in-process execution engine.
#[async_trait]
pub trait LocalEngine: Send + Sync {
    /// Executes a query in the local dialect.
    async fn execute(&self, sql: &str) -> CoreResult<Vec<RecordBatch>>;

    /// Registers (or re-registers) `name` backed by the parquet directory at `path`.
    async fn load_table(&self, name: &str, path: &Path) -> CoreResult<()>;

    /// Names of tables the engine can currently serve.
    async fn list_tables(&self) -> CoreResult<Vec<String>>;
}

/// Parsing and dialect translation service.
pub trait SqlTranslator: Send + Sync {
    /// Returns referenced table names in order of first appearance, without duplicates.
    ///
    /// References qualified with `namespace` are reported by their bare name; references
    /// into any other dataset keep their full dotted name.
    fn extract_table_names(&self, sql: &str, namespace: &str) -> CoreResult<Vec<String>>;

    /// Rewrites `sql` from one dialect to another.
    fn translate(&self, sql: &str, from: SqlDialect, to: SqlDialect) -> CoreResult<String>;

    /// Prefixes every bare table reference with `namespace`.
    fn qualify_tables(&self, sql: &str, namespace: &str) -> CoreResult<String>;

    /// Removes the `namespace` qualifier from table references.
    ///
    /// Returns `sql` unchanged when nothing is qualified with `namespace`.
    fn unqualify_tables(&self, sql: &str, namespace: &str) -> CoreResult<String>;
}

/// Reference to data staged by an export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportHandle {
    /// Exported table.
    pub table: String,
    /// URI prefix that holds the exported files.
    pub destination: String,
}

/// Bulk transfer of table data from the remote tier to local disk.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Exports `name` from `namespace` to the staging location.
    async fn export_table(&self, name: &str, namespace: &str) -> CoreResult<ExportHandle>;

    /// Copies every staged file of `handle` into `local_dir`, returning the number of files.
    async fn download(&self, handle: &ExportHandle, local_dir: &Path) -> CoreResult<usize>;
}
