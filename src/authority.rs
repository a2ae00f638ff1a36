use crate::dns::DNSPacket;
use crate::error::RefreshError;
use crate::fallthrough::FallthroughPolicy;
use crate::handler::{Handler, next_or_failure};
use crate::provider::ZoneProvider;
use crate::refresh::{DEFAULT_REFRESH_INTERVAL, RefreshScheduler};
use crate::resolver::{QueryResolver, Resolution};
use crate::shutdown::Shutdown;
use crate::zone::{ZoneName, ZoneSnapshotStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Plain settings the authority is built from
#[derive(Debug, Clone)]
pub struct AuthoritySettings {
    pub zones: Vec<ZoneName>,
    pub fallthrough: FallthroughPolicy,
    pub refresh_interval: Duration,
}

impl AuthoritySettings {
    pub fn new(zones: Vec<ZoneName>) -> Self {
        Self {
            zones,
            fallthrough: FallthroughPolicy::Disabled,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Serves the configured Scaleway zones and keeps them fresh
pub struct ScalewayAuthority {
    settings: AuthoritySettings,
    provider: Arc<dyn ZoneProvider>,
    store: Arc<ZoneSnapshotStore>,
    resolver: QueryResolver,
    next: Option<Arc<dyn Handler>>,
    shutdown: Shutdown,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScalewayAuthority {
    pub fn new(settings: AuthoritySettings, provider: Arc<dyn ZoneProvider>) -> Self {
        let store = Arc::new(ZoneSnapshotStore::new());
        let resolver = QueryResolver::new(
            settings.zones.clone(),
            Arc::clone(&store),
            settings.fallthrough.clone(),
        );
        Self {
            settings,
            provider,
            store,
            resolver,
            next: None,
            shutdown: Shutdown::new(),
            refresh_task: Mutex::new(None),
        }
    }

    /// Handler that receives queries this authority does not answer
    pub fn with_next(mut self, next: Arc<dyn Handler>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn store(&self) -> &Arc<ZoneSnapshotStore> {
        &self.store
    }

    pub fn zones(&self) -> &[ZoneName] {
        &self.settings.zones
    }

    /// Load every zone once, then keep refreshing in the background.
    ///
    /// Fails if any zone could not be loaded; the background loop is only
    /// started after a fully successful first refresh. Concurrent callers
    /// wait for the first one and never spawn a second loop.
    pub async fn start(&self) -> Result<(), RefreshError> {
        let mut refresh_task = self.refresh_task.lock().await;
        if refresh_task.is_some() {
            return Ok(());
        }

        let scheduler = RefreshScheduler::new(
            self.settings.zones.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.settings.refresh_interval,
        );

        info!(
            "Loading {} zones from {}",
            self.settings.zones.len(),
            self.provider.name()
        );
        let listener = self.shutdown.subscribe();
        let loaded = scheduler.refresh_all(&listener).await?;

        for zone in self.store.zone_names() {
            if let Some(compiled) = self.store.get(&zone) {
                info!(
                    "Zone {} loaded: serial {}, {} records",
                    zone,
                    compiled.serial(),
                    compiled.record_count()
                );
            }
        }
        info!("Loaded {} zones", loaded);

        *refresh_task = Some(tokio::spawn(scheduler.run(listener)));
        Ok(())
    }

    /// Stop the refresh loop and wait for it to exit
    pub async fn stop(&self) {
        self.shutdown.trigger();
        let handle = self.refresh_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Zone refresh task ended abnormally: {}", e);
            }
        }
    }

    pub fn resolve(&self, query: &DNSPacket) -> Resolution {
        self.resolver.resolve(query)
    }
}

#[async_trait]
impl Handler for ScalewayAuthority {
    fn name(&self) -> &str {
        "scaleway"
    }

    async fn serve(&self, query: &DNSPacket) -> DNSPacket {
        match self.resolver.resolve(query) {
            Resolution::Local(response) => response,
            Resolution::Forward => next_or_failure(self.name(), self.next.as_ref(), query).await,
        }
    }
}
