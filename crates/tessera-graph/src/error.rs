//! Error types for graph optimization.

use tessera_core::{BackendId, GraphError};
use thiserror::Error;

/// Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizeError>;

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while optimizing a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// The input graph failed validation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No preferred backend accepts a layer.
    #[error(
        "No backend supports {kind} layer '{layer}' (tried: [{}]): {}",
        join(.attempted),
        .reasons.join("; ")
    )]
    UnsupportedLayer {
        /// Layer name.
        layer: String,
        /// Layer kind name.
        kind: &'static str,
        /// Backends asked, in preference order.
        attempted: Vec<BackendId>,
        /// Each backend's refusal.
        reasons: Vec<String>,
    },

    /// None of the preferred backends is present on the device.
    #[error("None of the preferred backends [{}] is available", join(.requested))]
    NoAvailableBackends {
        /// The preference list as given.
        requested: Vec<BackendId>,
    },
}
