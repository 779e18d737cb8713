//! Periodic maintenance: reconciliation and idempotency purge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::application::ports::{
    BrokerClient, CacheStore, IdempotencyStore, InstrumentCatalog, LedgerStore,
};

use super::ledger_service::LedgerService;

/// Run [`LedgerService::run_maintenance`] every `interval` until `shutdown` fires.
///
/// The first tick runs immediately.
pub fn spawn_maintenance<S, I, K, C, N>(
    service: Arc<LedgerService<S, I, K, C, N>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    S: LedgerStore + 'static,
    I: IdempotencyStore + 'static,
    K: CacheStore + 'static,
    C: BrokerClient + 'static,
    N: InstrumentCatalog + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Maintenance scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Maintenance scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    service.run_maintenance().await;
                }
            }
        }
    })
}
