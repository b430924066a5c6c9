//! Wires workers for every configured marketplace.
use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Pool;
use crate::marketplace::{ozon, wb, OzonClient, WbClient, YandexClient};
use crate::model::Marketplace;
use crate::worker::{
    CompletionSignal, ContainerClosure, ExplicitCancellation, IngestWorker, PollingWorker,
    ReconcileWorker, TerminalStatusListing,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// A worker with the interval it should be polled at.
pub struct Scheduled {
    pub worker: Arc<dyn PollingWorker>,
    pub interval: Duration,
}

impl Scheduled {
    fn new(worker: Arc<dyn PollingWorker>, interval: Duration) -> Self {
        Self { worker, interval }
    }
}

pub fn build_workers(cfg: &Config, pool: &Pool, catalog: Arc<dyn Catalog>) -> Result<Vec<Scheduled>> {
    let timeouts = cfg.workers.request_timeout();
    let ingest = cfg.workers.ingest_interval();
    let reconcile = cfg.workers.reconcile_interval();
    let mut workers = Vec::new();

    if let Some(wb_cfg) = &cfg.marketplaces.wb {
        let client = Arc::new(WbClient::new(&wb_cfg.token, timeouts).context("failed to build WB client")?);
        workers.push(Scheduled::new(
            Arc::new(IngestWorker::new(pool.clone(), catalog.clone(), client.clone())),
            ingest,
        ));
        let signals: Vec<Arc<dyn CompletionSignal>> = vec![
            Arc::new(ContainerClosure::new(
                client.clone(),
                cfg.workers.container_fetch_concurrency,
            )),
            Arc::new(ExplicitCancellation::new(client, wb::STATUS_DECLINED_BY_CLIENT)),
        ];
        workers.push(Scheduled::new(
            Arc::new(ReconcileWorker::new(pool.clone(), Marketplace::Wb, signals)),
            reconcile,
        ));
    }

    if let Some(ozon_cfg) = &cfg.marketplaces.ozon {
        let client = Arc::new(
            OzonClient::new(&ozon_cfg.client_id, &ozon_cfg.api_key, timeouts)
                .context("failed to build Ozon client")?,
        );
        workers.push(Scheduled::new(
            Arc::new(IngestWorker::new(pool.clone(), catalog.clone(), client.clone())),
            ingest,
        ));
        let signals: Vec<Arc<dyn CompletionSignal>> = vec![Arc::new(TerminalStatusListing::new(
            client,
            ozon::STATUS_DELIVERING,
        ))];
        workers.push(Scheduled::new(
            Arc::new(ReconcileWorker::new(pool.clone(), Marketplace::Ozon, signals)),
            reconcile,
        ));
    }

    // Yandex has no completion signal; finished orders simply stop being listed.
    if let Some(yandex_cfg) = &cfg.marketplaces.yandex {
        let client = Arc::new(
            YandexClient::new(&yandex_cfg.token, &yandex_cfg.campaign_id, timeouts)
                .context("failed to build Yandex client")?,
        );
        workers.push(Scheduled::new(
            Arc::new(IngestWorker::new(pool.clone(), catalog.clone(), client)),
            ingest,
        ));
    }

    Ok(workers)
}
