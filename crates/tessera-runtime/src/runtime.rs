//! The process-wide table of loaded networks.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tessera_backends::BackendRegistry;
use tessera_core::{BindingId, InputTensors, OutputTensors, TensorInfo};
use tessera_graph::OptimizedNetwork;
use tracing::{info, warn};

use crate::error::{Result, RuntimeError};
use crate::plan::{build_plan, BindingTable, ExecutionPlan};
use crate::statistics::NetworkStatistics;

static NEXT_NETWORK_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a loaded network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(u64);

impl NetworkId {
    fn next() -> Self {
        Self(NEXT_NETWORK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network-{}", self.0)
    }
}

/// Outcome of [`Runtime::enqueue_workload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Every output was written.
    Success,
    /// The call failed; see [`Runtime::last_error`].
    Failure,
}

impl Status {
    /// True for [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Upper bound on simultaneously loaded networks.
    pub max_loaded_networks: Option<usize>,
    /// Record per-network timing.
    pub enable_statistics: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_loaded_networks: None,
            enable_statistics: true,
        }
    }
}

impl RuntimeOptions {
    /// Limit how many networks may be loaded at once.
    #[must_use]
    pub fn with_max_loaded_networks(mut self, limit: usize) -> Self {
        self.max_loaded_networks = Some(limit);
        self
    }

    /// Enable or disable timing statistics.
    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.enable_statistics = enabled;
        self
    }
}

#[derive(Debug)]
struct NetworkState {
    plan: ExecutionPlan,
    statistics: NetworkStatistics,
}

#[derive(Debug)]
struct LoadedNetwork {
    bindings: BindingTable,
    state: Mutex<NetworkState>,
}

/// Loads optimized networks and runs inference on them.
///
/// Calls on different networks run concurrently. A second call on a network
/// that is already executing fails with [`RuntimeError::NetworkBusy`].
#[derive(Debug)]
pub struct Runtime {
    registry: Arc<BackendRegistry>,
    networks: DashMap<NetworkId, Arc<LoadedNetwork>>,
    diagnostics: DashMap<NetworkId, RuntimeError>,
    // Loaded networks plus loads still building their plan.
    reserved: AtomicUsize,
    options: RuntimeOptions,
}

impl Runtime {
    /// Create a runtime that builds workloads from `registry`.
    pub fn new(registry: Arc<BackendRegistry>, options: RuntimeOptions) -> Self {
        Self {
            registry,
            networks: DashMap::new(),
            diagnostics: DashMap::new(),
            reserved: AtomicUsize::new(0),
            options,
        }
    }

    /// Backends this runtime loads against.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Options in effect.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Build the execution plan for `network` and register it.
    ///
    /// Nothing is registered if any workload fails to build. The network
    /// limit counts loads in progress, so concurrent loads cannot exceed it.
    pub fn load_network(&self, network: OptimizedNetwork) -> Result<NetworkId> {
        self.reserve_slot()?;
        let (plan, bindings) = match build_plan(&network, &self.registry) {
            Ok(built) => built,
            Err(err) => {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                return Err(err);
            }
        };
        let id = NetworkId::next();
        info!(
            "Loaded {} with {} workloads ({} workspace regions, {} bytes)",
            id,
            plan.entries.len(),
            plan.workspace.len(),
            plan.workspace.total_bytes()
        );

        self.networks.insert(
            id,
            Arc::new(LoadedNetwork {
                bindings,
                state: Mutex::new(NetworkState {
                    plan,
                    statistics: NetworkStatistics::default(),
                }),
            }),
        );
        Ok(id)
    }

    /// Remove a network and release its workspace. A call already running
    /// on it finishes first; later calls fail with
    /// [`RuntimeError::UnknownNetwork`].
    pub fn unload_network(&self, id: NetworkId) -> Result<()> {
        self.networks
            .remove(&id)
            .ok_or(RuntimeError::UnknownNetwork(id))?;
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        self.diagnostics.remove(&id);
        info!("Unloaded {}", id);
        Ok(())
    }

    /// True while `id` is loaded.
    pub fn is_network_loaded(&self, id: NetworkId) -> bool {
        self.networks.contains_key(&id)
    }

    /// Number of loaded networks.
    pub fn loaded_network_count(&self) -> usize {
        self.networks.len()
    }

    /// Descriptor of the Input layer bound to `binding`.
    pub fn input_tensor_info(&self, id: NetworkId, binding: BindingId) -> Result<TensorInfo> {
        let network = self.network(id)?;
        network
            .bindings
            .inputs
            .get(&binding)
            .map(|b| b.info.clone())
            .ok_or(RuntimeError::UnknownBinding {
                direction: "input",
                binding,
            })
    }

    /// Descriptor of the tensor feeding the Output layer bound to `binding`.
    pub fn output_tensor_info(&self, id: NetworkId, binding: BindingId) -> Result<TensorInfo> {
        let network = self.network(id)?;
        network
            .bindings
            .outputs
            .get(&binding)
            .map(|b| b.info.clone())
            .ok_or(RuntimeError::UnknownBinding {
                direction: "output",
                binding,
            })
    }

    /// Run one inference, reporting only success or failure.
    ///
    /// The error of a failed call is kept until the next call on the same
    /// network and can be read with [`Self::last_error`].
    pub fn enqueue_workload(
        &self,
        id: NetworkId,
        inputs: &InputTensors<'_>,
        outputs: &mut OutputTensors<'_>,
    ) -> Status {
        match self.try_enqueue_workload(id, inputs, outputs) {
            Ok(()) => {
                self.diagnostics.remove(&id);
                Status::Success
            }
            Err(err) => {
                warn!("Inference on {} failed: {}", id, err);
                if self.is_network_loaded(id) {
                    self.diagnostics.insert(id, err);
                }
                Status::Failure
            }
        }
    }

    /// Run one inference, returning the error directly.
    ///
    /// Every binding is checked before any data is written. Workloads then
    /// run in topological order; the first failure aborts the call and
    /// leaves the network usable.
    pub fn try_enqueue_workload(
        &self,
        id: NetworkId,
        inputs: &InputTensors<'_>,
        outputs: &mut OutputTensors<'_>,
    ) -> Result<()> {
        let network = self.network(id)?;
        let mut state = match network.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return Err(RuntimeError::NetworkBusy(id)),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let start = Instant::now();
        let result = network
            .bindings
            .check(inputs, outputs)
            .and_then(|()| state.plan.run(&network.bindings, inputs, outputs));
        if self.options.enable_statistics {
            state.statistics.record(start.elapsed(), result.is_ok());
        }
        result
    }

    /// Error of the most recent failed [`Self::enqueue_workload`] on `id`,
    /// cleared by the next successful call.
    pub fn last_error(&self, id: NetworkId) -> Option<RuntimeError> {
        self.diagnostics.get(&id).map(|e| e.value().clone())
    }

    /// Statistics for a loaded network.
    pub fn network_statistics(&self, id: NetworkId) -> Result<NetworkStatistics> {
        let network = self.network(id)?;
        let state = network
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(state.statistics.clone())
    }

    fn reserve_slot(&self) -> Result<()> {
        match self.options.max_loaded_networks {
            Some(limit) => self
                .reserved
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < limit).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|_| RuntimeError::NetworkLimitReached { limit }),
            None => {
                self.reserved.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    fn network(&self, id: NetworkId) -> Result<Arc<LoadedNetwork>> {
        self.networks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RuntimeError::UnknownNetwork(id))
    }
}
