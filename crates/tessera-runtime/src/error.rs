//! Error types for loading and executing networks.

use tessera_core::{BindingId, GraphError};
use thiserror::Error;

use crate::runtime::NetworkId;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by the [`crate::Runtime`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A layer's backend is missing or refused to build its workload.
    #[error("Failed to load layer '{layer}' on {backend}: {reason}")]
    Load {
        /// Layer name.
        layer: String,
        /// Backend the layer was assigned to.
        backend: String,
        /// Why loading failed.
        reason: String,
    },

    /// The optimized graph could not be ordered.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No network is loaded under this id.
    #[error("Unknown network: {0}")]
    UnknownNetwork(NetworkId),

    /// A binding id that no Input or Output layer carries.
    #[error("Unknown {direction} binding {binding}")]
    UnknownBinding {
        /// `"input"` or `"output"`.
        direction: &'static str,
        /// The offending binding id.
        binding: BindingId,
    },

    /// Caller tensors do not match the network's bindings.
    #[error("Binding error: {0}")]
    Binding(String),

    /// A workload failed; the rest of the call was abandoned.
    #[error("Execution failed in layer '{layer}': {reason}")]
    Execution {
        /// Layer name.
        layer: String,
        /// Workload error.
        reason: String,
    },

    /// Another call is already running on this network.
    #[error("Network {0} is busy")]
    NetworkBusy(NetworkId),

    /// The runtime already holds its maximum number of networks.
    #[error("Loaded network limit reached: {limit}")]
    NetworkLimitReached {
        /// Configured maximum.
        limit: usize,
    },
}
