use parking_lot::Mutex;
use std::sync::Arc;
use tierq_core::{
    CoreResult, LocalEngine, QueryOutcome, RemoteCatalog, RemoteEngine, SqlTranslator,
    TableEntry, TierqConfig, TransferService,
};
use tierq_query::{DataFusionEngine, QueryRouter, RoutingDecision, SqlParserTranslator};
use tierq_storage::{
    populate_registry, LocalTableStore, ObjectStoreTransfer, PromotionOutcome, RebalanceReport,
    TierContext, TierPromotionManager,
};
use tokio::task::JoinHandle;

/// External systems the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn RemoteCatalog>,
    pub remote: Arc<dyn RemoteEngine>,
    pub local: Arc<dyn LocalEngine>,
    pub transfer: Arc<dyn TransferService>,
    pub translator: Arc<dyn SqlTranslator>,
}

impl Collaborators {
    /// Production wiring around a warehouse client.
    ///
    /// DataFusion serves the local tier, `sqlparser` handles SQL, and exports are staged
    /// through the object store named by `remote.export_staging_uri`.
    pub fn for_warehouse<W>(config: &TierqConfig, warehouse: Arc<W>) -> CoreResult<Self>
    where
        W: RemoteCatalog + RemoteEngine + 'static,
    {
        let remote: Arc<dyn RemoteEngine> = warehouse.clone();
        let transfer = ObjectStoreTransfer::from_config(remote.clone(), &config.remote)?;

        Ok(Self {
            catalog: warehouse,
            remote,
            local: Arc::new(DataFusionEngine::from_config(&config.local)),
            transfer: Arc::new(transfer),
            translator: Arc::new(
                SqlParserTranslator::new(config.query.source_dialect)
                    .with_project(config.remote.project.clone()),
            ),
        })
    }
}

/// Tiered query service: routing, usage tracking and promotion behind one handle.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tierq_core::mock::MockWarehouse;
/// use tierq_core::TierqConfig;
/// use tierq_service::TieredQueryService;
///
/// # async fn example() -> tierq_core::CoreResult<()> {
/// let config = TierqConfig::load()?;
/// let warehouse = Arc::new(MockWarehouse::new("tpcds", ["web_page"]));
/// let service = TieredQueryService::connect(config, warehouse).await?;
///
/// let outcome = service.exec_query("SELECT * FROM web_page").await?;
/// println!("{} rows from {}", outcome.row_count(), outcome.tier);
///
/// let report = service.rebalance().await;
/// println!("promoted {:?}", report.promoted);
/// # Ok(())
/// # }
/// ```
pub struct TieredQueryService {
    config: TierqConfig,
    ctx: Arc<TierContext>,
    router: QueryRouter,
    promotion: Arc<TierPromotionManager>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TieredQueryService {
    /// Validates `config`, populates the registry and starts the optional worker.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for invalid settings, or the error of the
    /// storage root creation or a catalog listing. Local tables the engine cannot load
    /// are left out of the local tier and do not fail construction.
    pub async fn construct(config: TierqConfig, collaborators: Collaborators) -> CoreResult<Self> {
        config.validate()?;

        let store = LocalTableStore::open(&config.local.storage_root).await?;
        let ctx = Arc::new(TierContext::new(config.tracker.capacity)?);
        let namespace = config.remote.namespace.clone();

        let report = populate_registry(
            &ctx.registry,
            collaborators.catalog.as_ref(),
            &namespace,
            &store,
            collaborators.local.as_ref(),
            config.discovery.precedence,
        )
        .await?;

        let router = QueryRouter::new(
            Arc::clone(&ctx),
            collaborators.translator,
            Arc::clone(&collaborators.local),
            collaborators.remote,
            namespace.clone(),
        )
        .with_dialects(&config.query);

        let promotion = Arc::new(TierPromotionManager::new(
            Arc::clone(&ctx),
            collaborators.transfer,
            store,
            collaborators.local,
            namespace.clone(),
            config.promotion.timeout(),
        ));

        let worker = config
            .promotion
            .worker_interval()
            .map(|interval| promotion.spawn_worker(interval));

        let (local, remote) = ctx.registry.count_by_location();
        tracing::info!(
            namespace = %namespace,
            local,
            remote,
            loaded = report.loaded.len(),
            load_failures = report.failed.len(),
            tracker_capacity = config.tracker.capacity,
            worker = worker.is_some(),
            "Tiered query service started"
        );

        Ok(Self {
            config,
            ctx,
            router,
            promotion,
            worker: Mutex::new(worker),
        })
    }

    /// [`construct`](Self::construct) with production collaborators around `warehouse`.
    pub async fn connect<W>(config: TierqConfig, warehouse: Arc<W>) -> CoreResult<Self>
    where
        W: RemoteCatalog + RemoteEngine + 'static,
    {
        let collaborators = Collaborators::for_warehouse(&config, warehouse)?;
        Self::construct(config, collaborators).await
    }

    /// Executes `sql` on the tier chosen from current metadata.
    pub async fn exec_query(&self, sql: &str) -> CoreResult<QueryOutcome> {
        self.router.route_and_execute(sql).await
    }

    /// Tier `sql` would run on, without running it.
    pub fn plan(&self, sql: &str) -> CoreResult<RoutingDecision> {
        self.router.plan(sql)
    }

    /// Every registered table, sorted by name.
    pub fn metadata_snapshot(&self) -> Vec<TableEntry> {
        self.ctx.registry.snapshot()
    }

    /// Hot set, least recently used first.
    pub fn cache_snapshot(&self) -> Vec<String> {
        self.ctx.tracker.hot_set()
    }

    /// Promotes every remote table in the hot set.
    pub async fn rebalance(&self) -> RebalanceReport {
        self.promotion.rebalance().await
    }

    /// Promotes a single table regardless of hotness.
    pub async fn promote(&self, name: &str) -> CoreResult<PromotionOutcome> {
        self.promotion.promote(name).await
    }

    /// Bytes stored under the local storage root.
    pub async fn local_disk_usage(&self) -> CoreResult<u64> {
        self.promotion.store().disk_usage().await
    }

    pub fn config(&self) -> &TierqConfig {
        &self.config
    }

    pub fn worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the background worker. In-flight promotions are cancelled with it.
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            tracing::info!("Promotion worker shut down");
        }
    }
}

impl Drop for TieredQueryService {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}
