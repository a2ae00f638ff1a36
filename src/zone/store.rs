use super::Zone;
use super::name::ZoneName;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A compiled zone together with the time it went live
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub zone: Arc<Zone>,
    pub installed_at: DateTime<Utc>,
}

/// Currently active compiled zones, keyed by zone name.
///
/// A single reader/writer lock covers the whole map. Writers only swap an
/// `Arc`, so zones must be fully compiled before [`ZoneSnapshotStore::put`].
#[derive(Debug, Default)]
pub struct ZoneSnapshotStore {
    zones: RwLock<HashMap<ZoneName, ZoneSnapshot>>,
}

impl ZoneSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of `zone`, if it has ever been fetched
    pub fn get(&self, zone: &ZoneName) -> Option<Arc<Zone>> {
        self.zones.read().get(zone).map(|s| Arc::clone(&s.zone))
    }

    /// Replace the snapshot of `zone` wholesale
    pub fn put(&self, zone: ZoneName, compiled: Zone) {
        let snapshot = ZoneSnapshot {
            zone: Arc::new(compiled),
            installed_at: Utc::now(),
        };
        let serial = snapshot.zone.serial();
        let previous = self.zones.write().insert(zone.clone(), snapshot);
        debug!(
            "Installed zone {} serial {} (previous serial: {:?})",
            zone,
            serial,
            previous.map(|s| s.zone.serial())
        );
    }

    /// Run `f` against the current snapshot while holding the read lock
    pub fn with_zone<R>(&self, zone: &ZoneName, f: impl FnOnce(&Zone) -> R) -> Option<R> {
        let zones = self.zones.read();
        zones.get(zone).map(|s| f(&s.zone))
    }

    pub fn zone_names(&self) -> Vec<ZoneName> {
        let mut names: Vec<ZoneName> = self.zones.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }

    pub fn installed_at(&self, zone: &ZoneName) -> Option<DateTime<Utc>> {
        self.zones.read().get(zone).map(|s| s.installed_at)
    }
}
