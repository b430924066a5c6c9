//! Marks queue entries complete once the marketplace reports them shipped or
//! cancelled.
use super::PollingWorker;
use crate::db::{self, ListFilter, Pool};
use crate::marketplace::{ContainerSource, PageCursor, StatusListing, StatusLookup};
use crate::model::Marketplace;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upper bound on container pages walked in one cycle.
const MAX_CONTAINER_PAGES: usize = 1000;

/// A source of order ids that should no longer be produced.
#[async_trait]
pub trait CompletionSignal: Send + Sync {
    fn name(&self) -> &'static str;

    async fn completed_order_ids(&self, pool: &Pool, marketplace: Marketplace)
        -> Result<Vec<String>>;
}

/// Orders that sit in a closed (not yet done) shipment container have left
/// production.
pub struct ContainerClosure {
    source: Arc<dyn ContainerSource>,
    concurrency: usize,
}

impl ContainerClosure {
    pub fn new(source: Arc<dyn ContainerSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    async fn open_container_ids(&self) -> Result<Vec<String>> {
        let mut open = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<PageCursor> = None;
        for _ in 0..MAX_CONTAINER_PAGES {
            let page = self
                .source
                .list_open_containers(cursor.as_ref())
                .await
                .context("failed to list containers")?;
            open.extend(page.containers.into_iter().filter(|c| !c.done).map(|c| c.id));
            match page.next {
                None => return Ok(open),
                Some(next) if !seen.insert(next.clone()) => {
                    warn!(cursor = next.as_str(), "container cursor repeated; stopping pagination");
                    return Ok(open);
                }
                Some(next) => cursor = Some(next),
            }
        }
        warn!(pages = MAX_CONTAINER_PAGES, "container pagination hit the page limit");
        Ok(open)
    }
}

#[async_trait]
impl CompletionSignal for ContainerClosure {
    fn name(&self) -> &'static str {
        "container-closure"
    }

    #[instrument(skip_all)]
    async fn completed_order_ids(&self, _pool: &Pool, _marketplace: Marketplace) -> Result<Vec<String>> {
        let containers = self.open_container_ids().await?;
        let source = &self.source;
        let fetched: Vec<_> = stream::iter(containers)
            .map(|id| async move {
                let res = source.orders_in_container(&id).await;
                (id, res)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut ids = BTreeSet::new();
        for (container, res) in fetched {
            match res {
                Ok(orders) => ids.extend(orders),
                Err(err) => warn!(%container, ?err, "failed to fetch container orders; skipping"),
            }
        }
        Ok(ids.into_iter().collect())
    }
}

/// Open entries the marketplace reports with a cancellation status.
pub struct ExplicitCancellation {
    lookup: Arc<dyn StatusLookup>,
    cancel_status: String,
}

impl ExplicitCancellation {
    pub fn new(lookup: Arc<dyn StatusLookup>, cancel_status: impl Into<String>) -> Self {
        Self {
            lookup,
            cancel_status: cancel_status.into(),
        }
    }
}

#[async_trait]
impl CompletionSignal for ExplicitCancellation {
    fn name(&self) -> &'static str {
        "explicit-cancellation"
    }

    #[instrument(skip_all, fields(%marketplace))]
    async fn completed_order_ids(&self, pool: &Pool, marketplace: Marketplace) -> Result<Vec<String>> {
        let open = db::get_orders(pool, &ListFilter::open(marketplace))
            .await
            .context("failed to read open queue entries")?;
        if open.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = open
            .into_iter()
            .map(|e| e.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let statuses = self
            .lookup
            .order_statuses(&ids)
            .await
            .context("failed to look up order statuses")?;
        Ok(statuses
            .into_iter()
            .filter(|s| s.status == self.cancel_status)
            .map(|s| s.id)
            .collect())
    }
}

/// Every order the marketplace lists under a terminal status.
pub struct TerminalStatusListing {
    listing: Arc<dyn StatusListing>,
    status: String,
}

impl TerminalStatusListing {
    pub fn new(listing: Arc<dyn StatusListing>, status: impl Into<String>) -> Self {
        Self {
            listing,
            status: status.into(),
        }
    }
}

#[async_trait]
impl CompletionSignal for TerminalStatusListing {
    fn name(&self) -> &'static str {
        "terminal-status"
    }

    #[instrument(skip_all, fields(status = %self.status))]
    async fn completed_order_ids(&self, _pool: &Pool, _marketplace: Marketplace) -> Result<Vec<String>> {
        let orders = self
            .listing
            .list_orders_by_status(&self.status)
            .await
            .with_context(|| format!("failed to list {} orders", self.status))?;
        Ok(orders
            .into_iter()
            .map(|o| o.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub signals: usize,
    pub failed: usize,
    pub completed: u64,
}

pub struct ReconcileWorker {
    pool: Pool,
    marketplace: Marketplace,
    signals: Vec<Arc<dyn CompletionSignal>>,
}

impl ReconcileWorker {
    pub fn new(pool: Pool, marketplace: Marketplace, signals: Vec<Arc<dyn CompletionSignal>>) -> Self {
        Self {
            pool,
            marketplace,
            signals,
        }
    }

    async fn apply(&self, signal: &dyn CompletionSignal) -> Result<u64> {
        let ids = signal.completed_order_ids(&self.pool, self.marketplace).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let completed = db::set_complete_by_order_ids(&self.pool, self.marketplace, &ids)
            .await
            .context("failed to mark entries complete")?;
        Ok(completed)
    }

    /// Run every signal once. A failing signal does not stop the rest; the
    /// first failure is returned after all of them ran.
    #[instrument(skip_all, fields(marketplace = %self.marketplace))]
    pub async fn run_cycle(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            signals: self.signals.len(),
            ..Default::default()
        };
        let mut first_err = None;
        for signal in &self.signals {
            match self.apply(signal.as_ref()).await {
                Ok(completed) => {
                    if completed > 0 {
                        debug!(signal = signal.name(), completed, "entries completed");
                    }
                    report.completed += completed;
                }
                Err(err) => {
                    warn!(signal = signal.name(), ?err, "completion signal failed");
                    report.failed += 1;
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err.context(format!(
                "{} of {} completion signals failed",
                report.failed, report.signals
            ))),
            None => Ok(report),
        }
    }
}

#[async_trait]
impl PollingWorker for ReconcileWorker {
    fn name(&self) -> String {
        format!("{}-reconcile", self.marketplace)
    }

    async fn tick(&self) -> Result<()> {
        let report = self.run_cycle().await?;
        debug!(completed = report.completed, "reconcile cycle finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::marketplace::{ClientError, Container, ContainerPage};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Pages keyed by the cursor that requests them ("" for the first page).
    #[derive(Default)]
    struct FakeContainers {
        pages: HashMap<String, ContainerPage>,
        orders: HashMap<String, Vec<String>>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerSource for FakeContainers {
        async fn list_open_containers(
            &self,
            cursor: Option<&PageCursor>,
        ) -> Result<ContainerPage, ClientError> {
            let key = cursor.map(|c| c.as_str().to_string()).unwrap_or_default();
            self.requested.lock().await.push(key.clone());
            Ok(self.pages.get(&key).cloned().unwrap_or_default())
        }

        async fn orders_in_container(&self, container_id: &str) -> Result<Vec<String>, ClientError> {
            self.orders
                .get(container_id)
                .cloned()
                .ok_or_else(|| ClientError::Status {
                    status: 500,
                    body: "boom".into(),
                })
        }
    }

    fn page(containers: &[(&str, bool)], next: Option<&str>) -> ContainerPage {
        ContainerPage {
            containers: containers
                .iter()
                .map(|(id, done)| Container {
                    id: id.to_string(),
                    done: *done,
                })
                .collect(),
            next: next.map(PageCursor::new),
        }
    }

    #[tokio::test]
    async fn container_closure_walks_pages_and_skips_failures() {
        let mut fake = FakeContainers::default();
        fake.pages.insert("".into(), page(&[("s1", false), ("s2", true)], Some("p2")));
        fake.pages.insert("p2".into(), page(&[("s3", false), ("s4", false)], None));
        fake.orders.insert("s1".into(), vec!["10".into(), "11".into()]);
        fake.orders.insert("s2".into(), vec!["99".into()]);
        fake.orders.insert("s3".into(), vec!["11".into(), "12".into()]);
        // s4 has no entry and fails

        let fake = Arc::new(fake);
        let signal = ContainerClosure::new(fake.clone(), 2);
        let ids = signal
            .completed_order_ids(&test_pool().await, Marketplace::Wb)
            .await
            .unwrap();
        assert_eq!(ids, vec!["10", "11", "12"]);
        assert_eq!(*fake.requested.lock().await, vec!["", "p2"]);
    }

    #[tokio::test]
    async fn container_closure_stops_on_repeated_cursor() {
        let mut fake = FakeContainers::default();
        fake.pages.insert("".into(), page(&[("s1", false)], Some("loop")));
        fake.pages.insert("loop".into(), page(&[("s1", false)], Some("loop")));
        fake.orders.insert("s1".into(), vec!["1".into()]);

        let fake = Arc::new(fake);
        let ids = ContainerClosure::new(fake.clone(), 1)
            .completed_order_ids(&test_pool().await, Marketplace::Wb)
            .await
            .unwrap();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(fake.requested.lock().await.len(), 2);
    }

    struct Failing;

    #[async_trait]
    impl CompletionSignal for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn completed_order_ids(&self, _: &Pool, _: Marketplace) -> Result<Vec<String>> {
            anyhow::bail!("upstream down")
        }
    }

    struct Fixed(Vec<String>);

    #[async_trait]
    impl CompletionSignal for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn completed_order_ids(&self, _: &Pool, _: Marketplace) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn failing_signal_does_not_block_the_others() {
        let pool = test_pool().await;
        let entry = crate::model::NewQueueEntry {
            id: "1".into(),
            article: "a".into(),
            marketplace: Marketplace::Wb,
            items: vec![],
            order_created_at: chrono::Utc::now(),
            info: Default::default(),
        };
        db::add_orders(&pool, &[entry]).await.unwrap();

        let worker = ReconcileWorker::new(
            pool.clone(),
            Marketplace::Wb,
            vec![Arc::new(Failing), Arc::new(Fixed(vec!["1".into()]))],
        );
        let err = worker.run_cycle().await.unwrap_err();
        assert!(format!("{err:#}").contains("1 of 2 completion signals failed"));
        assert!(format!("{err:#}").contains("upstream down"));

        let open = db::get_orders(&pool, &ListFilter::open(Marketplace::Wb)).await.unwrap();
        assert!(open.is_empty());
    }
}
