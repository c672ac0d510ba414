use super::TierContext;
use crate::local_store::LocalTableStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tierq_core::metrics::{PROMOTIONS, PROMOTION_DURATION};
use tierq_core::{CoreError, CoreResult, LocalEngine, Location, TransferService};
use tokio::task::JoinHandle;

/// Result of a single [`TierPromotionManager::promote`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// The table was already on the local tier; nothing was done.
    AlreadyLocal,
    /// Data was copied and the registry now reports the table as local.
    Promoted,
    /// Another promotion of the same table is running.
    InFlight,
}

impl PromotionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PromotionOutcome::AlreadyLocal => "already_local",
            PromotionOutcome::Promoted => "success",
            PromotionOutcome::InFlight => "in_flight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionFailure {
    pub table: String,
    pub error: String,
}

/// Per-table results of one rebalance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    pub promoted: Vec<String>,
    pub already_local: Vec<String>,
    pub in_flight: Vec<String>,
    pub failed: Vec<PromotionFailure>,
}

impl RebalanceReport {
    /// Number of tables a promotion was attempted for.
    pub fn attempted(&self) -> usize {
        self.promoted.len() + self.already_local.len() + self.in_flight.len() + self.failed.len()
    }
}

/// Releases the in-flight claim on drop, including when a promotion is cancelled.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    table: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.table);
    }
}

/// Promotes hot tables from the remote tier to the local tier.
///
/// A promotion exports the table to staging, downloads it into `.incoming/<name>`,
/// renames it into place, registers it with the local engine and only then flips the
/// registry location. Until that last step the table keeps routing remotely, so a
/// LOCAL entry always has data behind it.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tierq_core::mock::{MockLocalEngine, MockTransfer};
/// use tierq_storage::{LocalTableStore, TierContext, TierPromotionManager};
///
/// # async fn example() -> tierq_core::CoreResult<()> {
/// let ctx = Arc::new(TierContext::new(10)?);
/// let store = LocalTableStore::open("./datasets/tierq").await?;
/// let manager = Arc::new(TierPromotionManager::new(
///     ctx,
///     Arc::new(MockTransfer::new()),
///     store,
///     Arc::new(MockLocalEngine::new()),
///     "tpcds",
///     Duration::from_secs(3600),
/// ));
///
/// let report = manager.rebalance().await;
/// println!("promoted {:?}", report.promoted);
/// # Ok(())
/// # }
/// ```
pub struct TierPromotionManager {
    ctx: Arc<TierContext>,
    transfer: Arc<dyn TransferService>,
    store: LocalTableStore,
    local: Arc<dyn LocalEngine>,
    namespace: String,
    timeout: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl TierPromotionManager {
    pub fn new(
        ctx: Arc<TierContext>,
        transfer: Arc<dyn TransferService>,
        store: LocalTableStore,
        local: Arc<dyn LocalEngine>,
        namespace: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            transfer,
            store,
            local,
            namespace: namespace.into(),
            timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &LocalTableStore {
        &self.store
    }

    /// Whether a promotion of `name` is currently running.
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.lock().contains(name)
    }

    fn claim(&self, name: &str) -> Option<InFlightGuard> {
        if !self.in_flight.lock().insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            table: name.to_string(),
        })
    }

    /// Moves `name` to the local tier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownTable` for unregistered tables, or the error of the
    /// failed step. On error the table stays REMOTE and no staged data is left behind.
    pub async fn promote(&self, name: &str) -> CoreResult<PromotionOutcome> {
        if self.ctx.registry.location_of(name)? == Location::Local {
            return Ok(self.finish_noop(name, PromotionOutcome::AlreadyLocal));
        }

        let Some(_guard) = self.claim(name) else {
            return Ok(self.finish_noop(name, PromotionOutcome::InFlight));
        };

        // A concurrent promotion may have completed between the check and the claim.
        if self.ctx.registry.location_of(name)? == Location::Local {
            return Ok(self.finish_noop(name, PromotionOutcome::AlreadyLocal));
        }

        tracing::info!(table = %name, namespace = %self.namespace, "Promoting table to local tier");
        let start = Instant::now();
        let committed = AtomicBool::new(false);

        let copy = self.copy_to_local(name, &committed);
        let result = match tokio::time::timeout(self.timeout, copy).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::external(
                "promotion",
                format!("promotion of `{}` timed out after {:?}", name, self.timeout),
            )),
        };

        let elapsed = start.elapsed();
        match result.and_then(|files| {
            self.ctx.registry.set_location(name, Location::Local)?;
            Ok(files)
        }) {
            Ok(files) => {
                PROMOTIONS.with_label_values(&["success"]).inc();
                PROMOTION_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed.as_secs_f64());
                tracing::info!(
                    table = %name,
                    files,
                    duration_ms = elapsed.as_millis(),
                    "Table promoted to local tier"
                );
                Ok(PromotionOutcome::Promoted)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.discard_incoming(name).await {
                    tracing::warn!(table = %name, error = %cleanup, "Failed to remove staged data");
                }
                // A REMOTE table must not leave a live directory behind
                if committed.load(Ordering::Acquire) {
                    if let Err(cleanup) = self.store.remove_table(name).await {
                        tracing::warn!(
                            table = %name,
                            error = %cleanup,
                            "Failed to remove committed data"
                        );
                    }
                }
                PROMOTIONS.with_label_values(&["failure"]).inc();
                PROMOTION_DURATION
                    .with_label_values(&["failure"])
                    .observe(elapsed.as_secs_f64());
                tracing::warn!(table = %name, error = %e, "Promotion failed; table stays remote");
                Err(e)
            }
        }
    }

    fn finish_noop(&self, name: &str, outcome: PromotionOutcome) -> PromotionOutcome {
        PROMOTIONS.with_label_values(&[outcome.as_str()]).inc();
        tracing::debug!(table = %name, outcome = outcome.as_str(), "Promotion skipped");
        outcome
    }

    /// Export, download, commit and load. Returns the number of files copied.
    ///
    /// `committed` is set once the live directory has been replaced.
    async fn copy_to_local(&self, name: &str, committed: &AtomicBool) -> CoreResult<usize> {
        let handle = self.transfer.export_table(name, &self.namespace).await?;
        let incoming = self.store.prepare_incoming(name).await?;

        let files = self.transfer.download(&handle, &incoming).await?;
        if files == 0 {
            return Err(CoreError::invalid_state(format!(
                "export of `{}` produced no files",
                name
            )));
        }

        let live = self.store.commit_incoming(name).await?;
        committed.store(true, Ordering::Release);
        self.local.load_table(name, &live).await?;
        Ok(files)
    }

    /// Promotes every non-local member of the hot set.
    ///
    /// Tables are processed one at a time, least recently used first. A failure is
    /// recorded in the report and does not stop the pass.
    pub async fn rebalance(&self) -> RebalanceReport {
        let candidates = self.ctx.tracker.hot_set();
        let mut report = RebalanceReport::default();

        tracing::debug!(candidates = candidates.len(), "Starting rebalance");
        let start = Instant::now();

        for table in candidates {
            match self.ctx.registry.location_of(&table) {
                Ok(Location::Local) => continue,
                Ok(Location::Remote) => {}
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "Hot table is not registered");
                    report.failed.push(PromotionFailure {
                        table,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            match self.promote(&table).await {
                Ok(PromotionOutcome::Promoted) => report.promoted.push(table),
                Ok(PromotionOutcome::AlreadyLocal) => report.already_local.push(table),
                Ok(PromotionOutcome::InFlight) => report.in_flight.push(table),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Failed to promote table");
                    report.failed.push(PromotionFailure {
                        table,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.attempted() > 0 {
            tracing::info!(
                promoted = report.promoted.len(),
                failed = report.failed.len(),
                duration_ms = start.elapsed().as_millis(),
                "Rebalance complete"
            );
        }
        report
    }

    /// Runs [`rebalance`](Self::rebalance) every `interval` until the handle is aborted.
    pub fn spawn_worker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                let report = manager.rebalance().await;
                if !report.failed.is_empty() {
                    tracing::warn!(failed = report.failed.len(), "Rebalance cycle had failures");
                }
            }
        });

        tracing::info!("Promotion worker started (interval: {:?})", interval);
        handle
    }
}
