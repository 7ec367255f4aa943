use crate::device::imei::DeviceId;
use crate::device::query::QueryEndpoint;
use crate::device::report::{DeviceStatus, StatusReport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Devices with a live session, keyed by identifier.
///
/// At most one entry exists per identifier. The lock is held for a single map
/// operation only and never across an await point.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    devices: Arc<Mutex<HashMap<DeviceId, QueryEndpoint>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `endpoint` if no session holds `imei` yet. Returns false for a duplicate.
    pub fn register_if_absent(&self, imei: DeviceId, endpoint: QueryEndpoint) -> bool {
        let mut devices = self.lock();
        if devices.contains_key(&imei) {
            return false;
        }
        devices.insert(imei, endpoint);
        true
    }

    pub fn unregister(&self, imei: &DeviceId) {
        self.lock().remove(imei);
    }

    pub fn lookup(&self, imei: &DeviceId) -> Option<QueryEndpoint> {
        self.lock().get(imei).cloned()
    }

    pub fn status(&self, imei: &DeviceId) -> StatusReport {
        let status = if self.lock().contains_key(imei) {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        };
        StatusReport::new(imei, status)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // No map operation can panic halfway, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceId, QueryEndpoint>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry slot held by a logged-in session. Dropping it unregisters the
/// device, including when the session task unwinds.
#[derive(Debug)]
pub struct Registration {
    registry: Registry,
    imei: DeviceId,
}

impl Registration {
    /// Atomic test-and-insert; `None` when another session holds `imei`.
    pub fn acquire(registry: &Registry, imei: DeviceId, endpoint: QueryEndpoint) -> Option<Self> {
        registry
            .register_if_absent(imei.clone(), endpoint)
            .then(|| Self {
                registry: registry.clone(),
                imei,
            })
    }

    pub fn imei(&self) -> &DeviceId {
        &self.imei
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.imei);
    }
}
