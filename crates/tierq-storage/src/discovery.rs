//! Startup population of the metadata registry.

use crate::local_store::LocalTableStore;
use crate::registry::MetadataRegistry;
use std::collections::HashSet;
use tierq_core::{CoreResult, DiscoveryPrecedence, LocalEngine, Location, RemoteCatalog};

/// A local table the engine refused to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub table: String,
    pub error: String,
}

/// What a discovery pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub remote_tables: Vec<String>,
    pub local_tables: Vec<String>,
    /// Local tables that had to be registered with the local engine.
    pub loaded: Vec<String>,
    /// Local tables left out of the local tier because loading them failed.
    pub failed: Vec<LoadFailure>,
}

/// Registers every remote catalog table and every loadable local table directory.
///
/// Remote tables are registered REMOTE first. A local directory is then registered
/// LOCAL once the local engine can serve it, unless `precedence` keeps a remotely listed
/// name REMOTE. A directory the engine fails to load is skipped: the name stays REMOTE
/// when the catalog lists it and is not registered otherwise.
///
/// # Errors
///
/// Returns the error of the catalog listing, the storage listing or the engine's table
/// listing. Per-table load failures are reported in [`DiscoveryReport::failed`].
pub async fn populate_registry(
    registry: &MetadataRegistry,
    catalog: &dyn RemoteCatalog,
    namespace: &str,
    store: &LocalTableStore,
    engine: &dyn LocalEngine,
    precedence: DiscoveryPrecedence,
) -> CoreResult<DiscoveryReport> {
    let remote_tables = catalog.list_tables(namespace).await?;
    let local_tables = store.list_tables().await?;

    tracing::info!(
        namespace = %namespace,
        remote = remote_tables.len(),
        local = local_tables.len(),
        "Discovered tables"
    );

    for table in &remote_tables {
        registry.merge_discovered(table, Location::Remote);
    }

    let listed: HashSet<&str> = remote_tables.iter().map(String::as_str).collect();
    let known: HashSet<String> = engine.list_tables().await?.into_iter().collect();
    let mut loaded = Vec::new();
    let mut failed = Vec::new();

    for table in &local_tables {
        if precedence == DiscoveryPrecedence::PreferRemote && listed.contains(table.as_str()) {
            continue;
        }

        if !known.contains(table) {
            let load = match store.table_path(table) {
                Ok(path) => engine.load_table(table, &path).await.map(|()| path),
                Err(e) => Err(e),
            };
            match load {
                Ok(path) => {
                    tracing::debug!(
                        table = %table,
                        path = %path.display(),
                        "Loaded local table into engine"
                    );
                    loaded.push(table.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        table = %table,
                        error = %e,
                        remote = listed.contains(table.as_str()),
                        "Failed to load local table; not serving it locally"
                    );
                    failed.push(LoadFailure {
                        table: table.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }
        }

        registry.merge_discovered(table, Location::Local);
    }

    Ok(DiscoveryReport {
        remote_tables,
        local_tables,
        loaded,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tierq_core::mock::{MockLocalEngine, MockWarehouse};

    async fn store_with(tables: &[&str]) -> (LocalTableStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalTableStore::open(dir.path()).await.unwrap();
        for table in tables {
            let path = store.root().join(table);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("part-0.parquet"), b"PAR1").unwrap();
        }
        (store, dir)
    }

    #[tokio::test]
    async fn test_disjoint_sources() {
        let (store, _dir) = store_with(&["l1", "l2"]).await;
        let warehouse = MockWarehouse::new("ds", ["r1", "r2", "r3"]);
        let engine = MockLocalEngine::new();
        let registry = MetadataRegistry::new();

        let report = populate_registry(
            &registry,
            &warehouse,
            "ds",
            &store,
            &engine,
            DiscoveryPrecedence::PreferLocal,
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 5);
        assert_eq!(registry.count_by_location(), (2, 3));
        assert_eq!(registry.location_of("r2").unwrap(), Location::Remote);
        assert_eq!(registry.location_of("l1").unwrap(), Location::Local);
        assert_eq!(report.loaded, vec!["l1", "l2"]);
        assert_eq!(engine.loaded_tables(), vec!["l1", "l2"]);
    }

    #[tokio::test]
    async fn test_overlap_follows_precedence() {
        let (store, _dir) = store_with(&["shared"]).await;
        let warehouse = MockWarehouse::new("ds", ["shared"]);

        let registry = MetadataRegistry::new();
        let engine = MockLocalEngine::new();
        populate_registry(
            &registry,
            &warehouse,
            "ds",
            &store,
            &engine,
            DiscoveryPrecedence::PreferLocal,
        )
        .await
        .unwrap();
        assert_eq!(registry.location_of("shared").unwrap(), Location::Local);
        assert_eq!(engine.loaded_tables(), vec!["shared"]);

        let registry = MetadataRegistry::new();
        let engine = MockLocalEngine::new();
        populate_registry(
            &registry,
            &warehouse,
            "ds",
            &store,
            &engine,
            DiscoveryPrecedence::PreferRemote,
        )
        .await
        .unwrap();
        assert_eq!(registry.location_of("shared").unwrap(), Location::Remote);
        assert!(engine.loaded_tables().is_empty());
    }

    #[tokio::test]
    async fn test_skips_tables_known_to_engine() {
        let (store, _dir) = store_with(&["l1", "l2"]).await;
        let warehouse = MockWarehouse::new("ds", Vec::<String>::new());
        let engine = MockLocalEngine::new();
        engine.preregister("l1", store.root().join("l1"));

        let registry = MetadataRegistry::new();
        let report = populate_registry(
            &registry,
            &warehouse,
            "ds",
            &store,
            &engine,
            DiscoveryPrecedence::PreferLocal,
        )
        .await
        .unwrap();

        assert_eq!(report.loaded, vec!["l2"]);
        assert_eq!(engine.loaded_tables(), vec!["l2"]);
    }

    #[tokio::test]
    async fn test_catalog_failure_propagates() {
        let (store, _dir) = store_with(&[]).await;
        let warehouse = MockWarehouse::new("ds", ["r1"]);
        let engine = MockLocalEngine::new();
        let registry = MetadataRegistry::new();

        let result = populate_registry(
            &registry,
            &warehouse,
            "other",
            &store,
            &engine,
            DiscoveryPrecedence::PreferLocal,
        )
        .await;

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_is_isolated() {
        let (store, _dir) = store_with(&["broken", "item", "orphan", "zeta"]).await;
        let warehouse = MockWarehouse::new("ds", ["broken", "store_sales"]);
        let engine = MockLocalEngine::new();
        engine.fail_load("broken");
        engine.fail_load("orphan");
        let registry = MetadataRegistry::new();

        let report = populate_registry(
            &registry,
            &warehouse,
            "ds",
            &store,
            &engine,
            DiscoveryPrecedence::PreferLocal,
        )
        .await
        .unwrap();

        assert_eq!(registry.location_of("broken").unwrap(), Location::Remote);
        assert!(!registry.exists("orphan"));
        assert_eq!(registry.location_of("item").unwrap(), Location::Local);
        assert_eq!(registry.location_of("zeta").unwrap(), Location::Local);
        assert_eq!(report.loaded, vec!["item", "zeta"]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.table.as_str()).collect();
        assert_eq!(failed, vec!["broken", "orphan"]);
        assert_eq!(engine.list_tables().await.unwrap(), vec!["item", "zeta"]);
    }
}
