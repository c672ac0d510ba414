//! Mock collaborators for testing
//!
//! In-memory stand-ins for the remote warehouse, the local engine and the transfer
//! service, with configurable failure patterns and call history so routing and
//! promotion logic can be exercised without real infrastructure.
//!
//! # Examples
//!
//! ```rust
//! use tierq_core::mock::{MockFailure, MockWarehouse};
//! use tierq_core::{RemoteCatalog, RemoteEngine};
//!
//! # async fn example() -> tierq_core::CoreResult<()> {
//! let warehouse = MockWarehouse::new("tpcds", ["web_page", "warehouse"]);
//! warehouse.push_failure(MockFailure::Transient("503 Service Unavailable"));
//!
//! assert!(warehouse.execute("SELECT * FROM tpcds.web_page", "tpcds").await.is_err());
//! assert!(warehouse.execute("SELECT * FROM tpcds.web_page", "tpcds").await.is_ok());
//! assert_eq!(warehouse.list_tables("tpcds").await?.len(), 2);
//! # Ok(())
//! # }
//! ```

use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::traits::{ExportHandle, LocalEngine, RemoteCatalog, RemoteEngine, TransferService};

/// Mock failure pattern.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Transient error. Examples: 500, 503, timeout.
    Transient(&'static str),

    /// Permanent error. Examples: 403, 404.
    Permanent(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self, service: &'static str) -> Option<CoreError> {
        match self {
            MockFailure::Transient(msg) => {
                Some(CoreError::external(service, format!("Transient: {}", msg)))
            }
            MockFailure::Permanent(msg) => {
                Some(CoreError::external(service, format!("Permanent: {}", msg)))
            }
            MockFailure::Ok => None,
        }
    }
}

/// Builds a single-column (`id: Int64`) batch with ids `0..rows`.
pub fn sample_batch(rows: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let ids = Int64Array::from_iter_values(0..rows);
    RecordBatch::try_new(schema, vec![Arc::new(ids)]).expect("static schema matches column")
}

/// Mock remote warehouse implementing both catalog and engine interfaces.
pub struct MockWarehouse {
    namespace: String,
    tables: RwLock<Vec<String>>,
    failure_queue: RwLock<VecDeque<MockFailure>>,
    failing_extracts: RwLock<HashSet<String>>,
    extract_latency: RwLock<Option<Duration>>,
    result: RwLock<Vec<RecordBatch>>,
    executed: RwLock<Vec<String>>,
    extracted: RwLock<Vec<(String, String)>>,
}

impl MockWarehouse {
    /// Create a warehouse whose `namespace` holds `tables`.
    pub fn new<I, S>(namespace: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            tables: RwLock::new(tables.into_iter().map(Into::into).collect()),
            failure_queue: RwLock::new(VecDeque::new()),
            failing_extracts: RwLock::new(HashSet::new()),
            extract_latency: RwLock::new(None),
            result: RwLock::new(vec![sample_batch(3)]),
            executed: RwLock::new(Vec::new()),
            extracted: RwLock::new(Vec::new()),
        }
    }

    /// Queue a failure for the next `execute` call.
    pub fn push_failure(&self, failure: MockFailure) {
        self.failure_queue.write().push_back(failure);
    }

    /// Make every export job for `table` fail.
    pub fn fail_extract(&self, table: impl Into<String>) {
        self.failing_extracts.write().insert(table.into());
    }

    /// Delay every export job.
    pub fn set_extract_latency(&self, latency: Duration) {
        *self.extract_latency.write() = Some(latency);
    }

    /// Batches returned by `execute`.
    pub fn set_result(&self, batches: Vec<RecordBatch>) {
        *self.result.write() = batches;
    }

    /// Add a table to the catalog listing.
    pub fn add_table(&self, table: impl Into<String>) {
        self.tables.write().push(table.into());
    }

    /// Queries received by `execute`, in call order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.read().clone()
    }

    /// `(table, destination)` pairs of completed export jobs.
    pub fn extracted_tables(&self) -> Vec<(String, String)> {
        self.extracted.read().clone()
    }

    fn check_namespace(&self, namespace: &str) -> CoreResult<()> {
        if namespace == self.namespace {
            Ok(())
        } else {
            Err(CoreError::external(
                "remote-catalog",
                format!("dataset `{}` not found", namespace),
            ))
        }
    }
}

#[async_trait]
impl RemoteCatalog for MockWarehouse {
    async fn list_tables(&self, namespace: &str) -> CoreResult<Vec<String>> {
        self.check_namespace(namespace)?;
        Ok(self.tables.read().clone())
    }
}

#[async_trait]
impl RemoteEngine for MockWarehouse {
    async fn execute(&self, sql: &str, namespace: &str) -> CoreResult<Vec<RecordBatch>> {
        self.check_namespace(namespace)?;
        let failure = self.failure_queue.write().pop_front();
        if let Some(err) = failure.and_then(|f| f.to_error("remote-engine")) {
            return Err(err);
        }

        self.executed.write().push(sql.to_string());
        Ok(self.result.read().clone())
    }

    async fn extract_table(
        &self,
        namespace: &str,
        table: &str,
        destination_uri: &str,
    ) -> CoreResult<()> {
        self.check_namespace(namespace)?;
        let latency = *self.extract_latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing_extracts.read().contains(table) {
            return Err(CoreError::external(
                "remote-engine",
                format!("export job for `{}` failed", table),
            ));
        }

        if !self.tables.read().iter().any(|t| t == table) {
            return Err(CoreError::external(
                "remote-engine",
                format!("table `{}` not found", table),
            ));
        }

        self.extracted
            .write()
            .push((table.to_string(), destination_uri.to_string()));
        Ok(())
    }
}

/// Mock local engine that records registrations and queries.
pub struct MockLocalEngine {
    tables: RwLock<BTreeMap<String, PathBuf>>,
    failure_queue: RwLock<VecDeque<MockFailure>>,
    failing_loads: RwLock<HashSet<String>>,
    load_latency: RwLock<Option<Duration>>,
    result: RwLock<Vec<RecordBatch>>,
    executed: RwLock<Vec<String>>,
    loads: RwLock<Vec<String>>,
}

impl MockLocalEngine {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            failure_queue: RwLock::new(VecDeque::new()),
            failing_loads: RwLock::new(HashSet::new()),
            load_latency: RwLock::new(None),
            result: RwLock::new(vec![sample_batch(1)]),
            executed: RwLock::new(Vec::new()),
            loads: RwLock::new(Vec::new()),
        }
    }

    /// Pretend `name` is already registered (e.g. persisted from a previous run).
    pub fn preregister(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.tables.write().insert(name.into(), path.into());
    }

    /// Queue a failure for the next `execute` call.
    pub fn push_failure(&self, failure: MockFailure) {
        self.failure_queue.write().push_back(failure);
    }

    /// Make every `load_table` call for `name` fail.
    pub fn fail_load(&self, name: impl Into<String>) {
        self.failing_loads.write().insert(name.into());
    }

    /// Delay every `load_table` call by `latency`.
    pub fn set_load_latency(&self, latency: Duration) {
        *self.load_latency.write() = Some(latency);
    }

    pub fn set_result(&self, batches: Vec<RecordBatch>) {
        *self.result.write() = batches;
    }

    /// Queries received by `execute`, in call order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.read().clone()
    }

    /// Table names passed to `load_table`, in call order.
    pub fn loaded_tables(&self) -> Vec<String> {
        self.loads.read().clone()
    }

    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.tables.read().get(name).cloned()
    }
}

impl Default for MockLocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalEngine for MockLocalEngine {
    async fn execute(&self, sql: &str) -> CoreResult<Vec<RecordBatch>> {
        let failure = self.failure_queue.write().pop_front();
        if let Some(err) = failure.and_then(|f| f.to_error("local-engine")) {
            return Err(err);
        }

        self.executed.write().push(sql.to_string());
        Ok(self.result.read().clone())
    }

    async fn load_table(&self, name: &str, path: &Path) -> CoreResult<()> {
        self.loads.write().push(name.to_string());
        let latency = *self.load_latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_loads.read().contains(name) {
            return Err(CoreError::external(
                "local-engine",
                format!("cannot register `{}`", name),
            ));
        }

        self.tables
            .write()
            .insert(name.to_string(), path.to_path_buf());
        Ok(())
    }

    async fn list_tables(&self) -> CoreResult<Vec<String>> {
        Ok(self.tables.read().keys().cloned().collect())
    }
}

/// Mock transfer service that writes a fixed payload per downloaded table.
pub struct MockTransfer {
    staging_uri: String,
    payload: Vec<u8>,
    failing_exports: RwLock<HashSet<String>>,
    failing_downloads: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    exports: RwLock<Vec<String>>,
    downloads: RwLock<Vec<String>>,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self {
            staging_uri: "mock://staging".to_string(),
            payload: b"PAR1-mock".to_vec(),
            failing_exports: RwLock::new(HashSet::new()),
            failing_downloads: RwLock::new(HashSet::new()),
            latency: RwLock::new(None),
            exports: RwLock::new(Vec::new()),
            downloads: RwLock::new(Vec::new()),
        }
    }

    /// Bytes written as `part-00000.parquet` by `download`.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn fail_export(&self, table: impl Into<String>) {
        self.failing_exports.write().insert(table.into());
    }

    pub fn fail_download(&self, table: impl Into<String>) {
        self.failing_downloads.write().insert(table.into());
    }

    /// Delay every export.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    pub fn exported_tables(&self) -> Vec<String> {
        self.exports.read().clone()
    }

    pub fn downloaded_tables(&self) -> Vec<String> {
        self.downloads.read().clone()
    }
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferService for MockTransfer {
    async fn export_table(&self, name: &str, _namespace: &str) -> CoreResult<ExportHandle> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.exports.write().push(name.to_string());
        if self.failing_exports.read().contains(name) {
            return Err(CoreError::external(
                "transfer",
                format!("export of `{}` failed", name),
            ));
        }

        Ok(ExportHandle {
            table: name.to_string(),
            destination: format!("{}/{}", self.staging_uri, name),
        })
    }

    async fn download(&self, handle: &ExportHandle, local_dir: &Path) -> CoreResult<usize> {
        self.downloads.write().push(handle.table.clone());
        if self.failing_downloads.read().contains(&handle.table) {
            return Err(CoreError::external(
                "transfer",
                format!("download of `{}` failed", handle.table),
            ));
        }

        tokio::fs::create_dir_all(local_dir).await?;
        tokio::fs::write(local_dir.join("part-00000.parquet"), &self.payload).await?;
        Ok(1)
    }
}
