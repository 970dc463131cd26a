//! Backend registry and device snapshots.
//!
//! The registry is the live, thread-safe table of backends a process can
//! use. The optimizer never reads it directly: it works from a
//! [`DeviceSpec`], an immutable snapshot taken when optimization starts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tessera_core::BackendId;
use tracing::{info, warn};

use crate::accelerated::CpuAccBackend;
use crate::backend::{Backend, BackendCapabilities};
use crate::error::{BackendError, Result};
use crate::reference::CpuRefBackend;

/// Thread-safe table of registered backends.
pub struct BackendRegistry {
    backends: DashMap<BackendId, Arc<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
        }
    }

    /// Register a backend under its own id.
    pub fn register(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let id = backend.id();
        if self.backends.contains_key(&id) {
            return Err(BackendError::DuplicateBackend(id));
        }
        let capabilities = backend.capabilities();
        self.backends.insert(id.clone(), backend);

        info!(
            "Registered backend {} ({} layer kinds, {} data types)",
            id,
            capabilities.layer_kinds.len(),
            capabilities.data_types.len()
        );
        Ok(())
    }

    /// Remove a backend, returning it.
    pub fn unregister(&self, id: &BackendId) -> Result<Arc<dyn Backend>> {
        let (_, backend) = self
            .backends
            .remove(id)
            .ok_or_else(|| BackendError::UnknownBackend(id.clone()))?;
        info!("Unregistered backend {}", id);
        Ok(backend)
    }

    /// Backend registered under `id`.
    pub fn get(&self, id: &BackendId) -> Option<Arc<dyn Backend>> {
        self.backends.get(id).map(|b| Arc::clone(b.value()))
    }

    /// True when `id` is registered.
    pub fn contains(&self, id: &BackendId) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self.backends.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Capabilities of a registered backend.
    pub fn capabilities(&self, id: &BackendId) -> Option<BackendCapabilities> {
        self.backends.get(id).map(|b| b.capabilities())
    }

    /// Snapshot of the registered backends.
    pub fn device_spec(&self) -> DeviceSpec {
        DeviceSpec::new(self.backends.iter().map(|e| Arc::clone(e.value())))
    }
}

/// Immutable snapshot of the backends available to the optimizer.
#[derive(Clone, Default)]
pub struct DeviceSpec {
    backends: BTreeMap<BackendId, Arc<dyn Backend>>,
}

impl fmt::Debug for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSpec")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DeviceSpec {
    /// Snapshot the given backends. A later backend with an id already
    /// present is ignored.
    pub fn new(backends: impl IntoIterator<Item = Arc<dyn Backend>>) -> Self {
        let mut map = BTreeMap::new();
        for backend in backends {
            let id = backend.id();
            if map.contains_key(&id) {
                warn!("Ignoring duplicate backend {} in device spec", id);
                continue;
            }
            map.insert(id, backend);
        }
        Self { backends: map }
    }

    /// Backend with this id, if available.
    pub fn get(&self, id: &BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.get(id)
    }

    /// True when a backend with this id is available.
    pub fn contains(&self, id: &BackendId) -> bool {
        self.backends.contains_key(id)
    }

    /// Available ids, sorted.
    pub fn ids(&self) -> Vec<BackendId> {
        self.backends.keys().cloned().collect()
    }

    /// Number of available backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when no backend is available.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Registry holding the `CpuRef` and `CpuAcc` backends.
pub fn create_default_registry() -> Result<BackendRegistry> {
    let registry = BackendRegistry::new();
    registry.register(Arc::new(CpuRefBackend::new()))?;
    registry.register(Arc::new(CpuAccBackend::new()?))?;
    Ok(registry)
}
