//! Error types for backends and workloads.

use thiserror::Error;
use tessera_core::{BackendId, TensorError};

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised by backends and the backend registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The backend cannot run this layer.
    #[error("Backend {backend} does not support {kind} layer '{layer}': {reason}")]
    UnsupportedLayer {
        /// Backend asked.
        backend: BackendId,
        /// Layer kind name.
        kind: &'static str,
        /// Layer name.
        layer: String,
        /// Why it was refused.
        reason: String,
    },

    /// The workload descriptor is inconsistent.
    #[error("Invalid workload descriptor: {0}")]
    InvalidDescriptor(String),

    /// A worker thread pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A backend with this id is already registered.
    #[error("Backend {0} is already registered")]
    DuplicateBackend(BackendId),

    /// No backend with this id is registered.
    #[error("Backend {0} is not registered")]
    UnknownBackend(BackendId),
}

/// Errors raised while executing a workload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkloadError {
    /// A buffer does not match the descriptor it was created for.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// The wrong number of buffers was passed.
    #[error("Expected {expected} {direction} buffers, got {actual}")]
    Arity {
        /// "input" or "output".
        direction: &'static str,
        /// Buffers the workload was built for.
        expected: usize,
        /// Buffers passed.
        actual: usize,
    },

    /// A buffer holds an element type the kernel does not handle.
    #[error("Unsupported data type in kernel: {0}")]
    UnsupportedDataType(String),
}
