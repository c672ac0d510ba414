//! Export staging through an object store.
//!
//! The remote engine runs a server-side export job that writes parquet shards under
//! `<staging_uri>/<table>/`; the shards are then copied from the staging bucket to a
//! local directory. Any backend supported by the `object_store` crate works as staging
//! (`gs://`, `s3://`, `file://`, `memory://`).

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tierq_core::{CoreError, CoreResult, ExportHandle, RemoteConfig, RemoteEngine, TransferService};
use url::Url;

const SERVICE: &str = "object-store";

/// [`TransferService`] backed by a remote export job and an object store.
pub struct ObjectStoreTransfer {
    remote: Arc<dyn RemoteEngine>,
    staging: Arc<dyn ObjectStore>,
    staging_uri: String,
}

impl ObjectStoreTransfer {
    /// Use an existing object store as the staging area at `staging_uri`.
    pub fn new(
        remote: Arc<dyn RemoteEngine>,
        staging: Arc<dyn ObjectStore>,
        staging_uri: impl Into<String>,
    ) -> CoreResult<Self> {
        let staging_uri = staging_uri.into().trim_end_matches('/').to_string();
        object_path(&staging_uri).map_err(|e| CoreError::Configuration(e.to_string()))?;

        Ok(Self {
            remote,
            staging,
            staging_uri,
        })
    }

    /// Build the staging store from `remote.export_staging_uri`.
    ///
    /// For `gs://` staging the configured credentials file is used as the service account.
    pub fn from_config(remote: Arc<dyn RemoteEngine>, config: &RemoteConfig) -> CoreResult<Self> {
        let url = Url::parse(&config.export_staging_uri).map_err(|e| {
            CoreError::Configuration(format!(
                "invalid export staging uri `{}`: {}",
                config.export_staging_uri, e
            ))
        })?;

        let mut options: Vec<(&str, String)> = Vec::new();
        if url.scheme() == "gs" {
            if let Some(credentials) = &config.credentials_path {
                options.push(("google_service_account", credentials.display().to_string()));
            }
        }

        let (store, _) = object_store::parse_url_opts(&url, options)
            .map_err(|e| CoreError::Configuration(format!("export staging store: {}", e)))?;

        tracing::info!(staging_uri = %config.export_staging_uri, "Configured export staging store");
        Self::new(remote, Arc::from(store), config.export_staging_uri.clone())
    }

    fn table_prefix(&self, table: &str) -> String {
        format!("{}/{}", self.staging_uri, table)
    }

    async fn clear_prefix(&self, prefix: &ObjectPath) -> CoreResult<usize> {
        let stale: Vec<ObjectPath> = self
            .staging
            .list(Some(prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| CoreError::external(SERVICE, e))?;

        for location in &stale {
            self.staging
                .delete(location)
                .await
                .map_err(|e| CoreError::external(SERVICE, e))?;
        }
        Ok(stale.len())
    }
}

#[async_trait]
impl TransferService for ObjectStoreTransfer {
    async fn export_table(&self, name: &str, namespace: &str) -> CoreResult<ExportHandle> {
        let destination = self.table_prefix(name);
        let prefix = object_path(&destination)?;

        let removed = self.clear_prefix(&prefix).await?;
        if removed > 0 {
            tracing::debug!(table = %name, removed, "Removed stale staged files");
        }

        let shard_uri = format!("{}/{}-*.parquet", destination, name);
        self.remote.extract_table(namespace, name, &shard_uri).await?;

        tracing::info!(table = %name, destination = %destination, "Table exported to staging");
        Ok(ExportHandle {
            table: name.to_string(),
            destination,
        })
    }

    async fn download(&self, handle: &ExportHandle, local_dir: &Path) -> CoreResult<usize> {
        let prefix = object_path(&handle.destination)?;
        let mut objects: Vec<ObjectPath> = self
            .staging
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| CoreError::external(SERVICE, e))?;
        objects.sort();

        tokio::fs::create_dir_all(local_dir).await?;

        let mut written = 0;
        for location in objects {
            let Some(file_name) = location.filename() else {
                continue;
            };
            let file_name = if file_name.ends_with(".parquet") {
                file_name.to_string()
            } else {
                format!("{}.parquet", file_name)
            };

            let bytes = self
                .staging
                .get(&location)
                .await
                .map_err(|e| CoreError::external(SERVICE, e))?
                .bytes()
                .await
                .map_err(|e| CoreError::external(SERVICE, e))?;

            tokio::fs::write(local_dir.join(&file_name), &bytes).await?;
            written += 1;
        }

        tracing::debug!(table = %handle.table, files = written, "Downloaded staged files");
        Ok(written)
    }
}

/// Object store path of a staging URI (bucket or host stripped).
fn object_path(uri: &str) -> CoreResult<ObjectPath> {
    let url = Url::parse(uri)
        .map_err(|e| CoreError::external(SERVICE, format!("invalid uri `{}`: {}", uri, e)))?;
    ObjectPath::from_url_path(url.path())
        .map_err(|e| CoreError::external(SERVICE, format!("invalid path in `{}`: {}", uri, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use object_store::PutPayload;
    use tempfile::TempDir;
    use tierq_core::mock::MockWarehouse;

    fn setup() -> (ObjectStoreTransfer, Arc<MockWarehouse>, Arc<InMemory>) {
        let warehouse = Arc::new(MockWarehouse::new("tpcds", ["item", "web_page"]));
        let staging = Arc::new(InMemory::new());
        let transfer = ObjectStoreTransfer::new(
            warehouse.clone(),
            staging.clone(),
            "memory:///exports/",
        )
        .unwrap();
        (transfer, warehouse, staging)
    }

    async fn stage(staging: &InMemory, path: &str, data: &'static [u8]) {
        staging
            .put(&ObjectPath::from(path), PutPayload::from(Bytes::from_static(data)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_export_runs_extract_job() {
        let (transfer, warehouse, _staging) = setup();

        let handle = transfer.export_table("item", "tpcds").await.unwrap();

        assert_eq!(handle.table, "item");
        assert_eq!(handle.destination, "memory:///exports/item");
        assert_eq!(
            warehouse.extracted_tables(),
            vec![(
                "item".to_string(),
                "memory:///exports/item/item-*.parquet".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_export_clears_stale_shards() {
        let (transfer, _warehouse, staging) = setup();
        stage(&staging, "exports/item/item-000.parquet", b"old").await;
        stage(&staging, "exports/item_other/x.parquet", b"keep").await;

        transfer.export_table("item", "tpcds").await.unwrap();

        assert!(staging.get(&ObjectPath::from("exports/item/item-000.parquet")).await.is_err());
        assert!(staging.get(&ObjectPath::from("exports/item_other/x.parquet")).await.is_ok());
    }

    #[tokio::test]
    async fn test_export_failure_propagates() {
        let (transfer, warehouse, _staging) = setup();
        warehouse.fail_extract("item");

        let err = transfer.export_table("item", "tpcds").await.unwrap_err();
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn test_download_copies_every_shard() {
        let (transfer, _warehouse, staging) = setup();
        stage(&staging, "exports/item/item-000.parquet", b"PAR1a").await;
        stage(&staging, "exports/item/item-001", b"PAR1b").await;
        stage(&staging, "exports/web_page/web_page-000.parquet", b"PAR1c").await;

        let dir = TempDir::new().unwrap();
        let handle = ExportHandle {
            table: "item".to_string(),
            destination: "memory:///exports/item".to_string(),
        };
        let written = transfer.download(&handle, dir.path()).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read(dir.path().join("item-000.parquet")).unwrap(), b"PAR1a");
        assert_eq!(std::fs::read(dir.path().join("item-001.parquet")).unwrap(), b"PAR1b");
        assert!(!dir.path().join("web_page-000.parquet").exists());
    }

    #[tokio::test]
    async fn test_download_empty_prefix() {
        let (transfer, _warehouse, _staging) = setup();
        let dir = TempDir::new().unwrap();
        let handle = ExportHandle {
            table: "item".to_string(),
            destination: "memory:///exports/item".to_string(),
        };
        assert_eq!(transfer.download(&handle, dir.path()).await.unwrap(), 0);
    }

    #[test]
    fn test_rejects_invalid_staging_uri() {
        let warehouse = Arc::new(MockWarehouse::new("tpcds", ["item"]));
        let result = ObjectStoreTransfer::new(warehouse, Arc::new(InMemory::new()), "not a uri");
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_from_config_file_staging() {
        let dir = TempDir::new().unwrap();
        let config = RemoteConfig {
            project: "p".to_string(),
            namespace: "tpcds".to_string(),
            credentials_path: None,
            export_staging_uri: format!("file://{}", dir.path().display()),
            location: "US".to_string(),
        };
        let warehouse = Arc::new(MockWarehouse::new("tpcds", ["item"]));
        assert!(ObjectStoreTransfer::from_config(warehouse, &config).is_ok());
    }
}
