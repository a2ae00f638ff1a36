use super::ZoneFetcher;
use crate::error::{FetchError, FetchFault, RefreshError};
use crate::provider::ZoneProvider;
use crate::shutdown::ShutdownListener;
use crate::zone::{ZoneName, ZoneSnapshotStore};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically re-fetches every configured zone into the store
pub struct RefreshScheduler {
    zones: Vec<ZoneName>,
    fetcher: ZoneFetcher,
    store: Arc<ZoneSnapshotStore>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(
        zones: Vec<ZoneName>,
        provider: Arc<dyn ZoneProvider>,
        store: Arc<ZoneSnapshotStore>,
        interval: Duration,
    ) -> Self {
        Self {
            zones,
            fetcher: ZoneFetcher::new(provider),
            store,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn zones(&self) -> &[ZoneName] {
        &self.zones
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle: fetch every zone concurrently, install the successes.
    ///
    /// Returns the number of zones refreshed, or every failure of the cycle.
    /// Zones that failed keep whatever snapshot they had.
    pub async fn refresh_all(&self, shutdown: &ShutdownListener) -> Result<usize, RefreshError> {
        let handles: Vec<_> = self
            .zones
            .iter()
            .map(|zone| {
                let fetcher = self.fetcher.clone();
                let mut shutdown = shutdown.clone();
                let zone = zone.clone();
                tokio::spawn(async move { fetcher.fetch(&mut shutdown, &zone).await })
            })
            .collect();

        let results = join_all(handles).await;

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for (zone, joined) in self.zones.iter().zip(results) {
            match joined {
                Ok(Ok(compiled)) => {
                    self.store.put(zone.clone(), compiled);
                    succeeded += 1;
                }
                Ok(Err(e)) => {
                    if !e.is_cancelled() {
                        error!("Failed to refresh zone {}: {}", zone, e.fault);
                    }
                    failures.push(e);
                }
                Err(e) => {
                    error!("Refresh task for zone {} failed: {}", zone, e);
                    failures.push(FetchError::new(zone.clone(), FetchFault::Task(e.to_string())));
                }
            }
        }

        if failures.is_empty() {
            debug!("Zone refresh complete: {} successful", succeeded);
            Ok(succeeded)
        } else {
            if !shutdown.is_cancelled() {
                warn!(
                    "Zone refresh complete: {} successful, {} failed",
                    succeeded,
                    failures.len()
                );
            }
            Err(RefreshError {
                succeeded,
                failures,
            })
        }
    }

    /// Refresh on a fixed period until shutdown. Failed zones are simply
    /// retried on the next tick.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting zone refresh loop for {} zones every {:?} via {}",
            self.zones.len(),
            self.interval,
            self.fetcher.provider_name()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_all(&shutdown).await {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        debug!("Refresh cycle incomplete: {}", e);
                    }
                }
            }
        }

        info!("Zone refresh loop stopped");
    }
}
