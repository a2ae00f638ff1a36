use crate::error::{FetchError, FetchFault};
use crate::provider::ZoneProvider;
use crate::shutdown::ShutdownListener;
use crate::zone::{Zone, ZoneName, ZoneParser};
use std::sync::Arc;
use tracing::{debug, trace};

/// One fetch-and-compile attempt for a single zone
#[derive(Clone)]
pub struct ZoneFetcher {
    provider: Arc<dyn ZoneProvider>,
}

impl ZoneFetcher {
    pub fn new(provider: Arc<dyn ZoneProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Download and parse `zone`. Never retries; never touches the store.
    pub async fn fetch(
        &self,
        shutdown: &mut ShutdownListener,
        zone: &ZoneName,
    ) -> Result<Zone, FetchError> {
        if shutdown.is_cancelled() {
            return Err(FetchError::new(zone.clone(), FetchFault::Cancelled));
        }

        trace!("Fetching zone {} from {}", zone, self.provider.name());
        let document = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                return Err(FetchError::new(zone.clone(), FetchFault::Cancelled));
            }
            exported = self.provider.export_zone(zone) => {
                exported.map_err(|e| FetchError::new(zone.clone(), e))?
            }
        };
        debug!("Fetched zone {} ({} bytes)", zone, document.len());

        // Large zones take a while to compile; keep it off the reactor
        let origin = zone.clone();
        let compiled = tokio::task::spawn_blocking(move || {
            ZoneParser::new(&origin).parse_bytes(&document)
        })
        .await
        .map_err(|e| FetchError::new(zone.clone(), FetchFault::Task(e.to_string())))?
        .map_err(|e| FetchError::new(zone.clone(), e))?;

        if shutdown.is_cancelled() {
            return Err(FetchError::new(zone.clone(), FetchFault::Cancelled));
        }

        Ok(compiled)
    }
}
