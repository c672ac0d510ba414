//! Full stack: DataFusion local tier, sqlparser, file:// export staging
//!
//! The only stand-in is the warehouse itself; its export jobs write real parquet shards
//! to the staging directory, which the production transfer then downloads.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tierq_core::mock::sample_batch;
use tierq_core::{
    CoreError, CoreResult, LocalConfig, Location, RemoteCatalog, RemoteConfig, RemoteEngine,
    TierqConfig, TrackerConfig,
};
use tierq_service::TieredQueryService;
use url::Url;

fn write_parquet(path: &Path, rows: i64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let batch = sample_batch(rows);
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

struct FileExportWarehouse {
    tables: Vec<String>,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteCatalog for FileExportWarehouse {
    async fn list_tables(&self, _namespace: &str) -> CoreResult<Vec<String>> {
        Ok(self.tables.clone())
    }
}

#[async_trait]
impl RemoteEngine for FileExportWarehouse {
    async fn execute(&self, sql: &str, _namespace: &str) -> CoreResult<Vec<RecordBatch>> {
        self.queries.lock().push(sql.to_string());
        Ok(vec![sample_batch(3)])
    }

    async fn extract_table(
        &self,
        _namespace: &str,
        table: &str,
        destination_uri: &str,
    ) -> CoreResult<()> {
        if !self.tables.iter().any(|t| t == table) {
            return Err(CoreError::external("warehouse", "no such table"));
        }
        for shard in 0..2 {
            let uri = destination_uri.replace('*', &format!("{:012}", shard));
            let path = Url::parse(&uri).unwrap().to_file_path().unwrap();
            write_parquet(&path, 5);
        }
        Ok(())
    }
}

fn config(dir: &Path) -> TierqConfig {
    let staging = dir.join("staging");
    std::fs::create_dir_all(&staging).unwrap();

    TierqConfig {
        remote: RemoteConfig {
            project: "analytics".to_string(),
            namespace: "tpcds".to_string(),
            credentials_path: None,
            export_staging_uri: Url::from_directory_path(&staging).unwrap().to_string(),
            location: "US".to_string(),
        },
        local: LocalConfig {
            storage_root: dir.join("datasets"),
            ..LocalConfig::default()
        },
        tracker: TrackerConfig { capacity: 4 },
        ..TierqConfig::default()
    }
}

#[tokio::test]
async fn test_promoted_table_is_served_by_datafusion() {
    let dir = tempfile::Builder::new().prefix("tierq").tempdir().unwrap();
    write_parquet(&dir.path().join("datasets/item/part-00000.parquet"), 4);

    let warehouse = Arc::new(FileExportWarehouse {
        tables: vec!["store_sales".to_string()],
        queries: Mutex::new(Vec::new()),
    });
    let service = TieredQueryService::connect(config(dir.path()), warehouse.clone())
        .await
        .unwrap();

    let outcome = service.exec_query("SELECT id FROM item").await.unwrap();
    assert_eq!(outcome.tier, Location::Local);
    assert_eq!(outcome.row_count(), 4);

    let outcome = service
        .exec_query("SELECT * FROM store_sales JOIN item USING (id)")
        .await
        .unwrap();
    assert_eq!(outcome.tier, Location::Remote);
    assert_eq!(warehouse.queries.lock().len(), 1);

    let report = service.rebalance().await;
    assert_eq!(report.promoted, vec!["store_sales"]);

    let outcome = service
        .exec_query("SELECT s.id FROM store_sales s JOIN item i ON s.id = i.id")
        .await
        .unwrap();
    assert_eq!(outcome.tier, Location::Local);
    // Two shards of ids 0..5 joined with ids 0..4
    assert_eq!(outcome.row_count(), 8);
    assert_eq!(warehouse.queries.lock().len(), 1);
}
