//! Error types for graph construction, validation and tensor bindings.

use std::fmt;

use thiserror::Error;

use crate::types::{BindingId, DataType, LayerId};

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// One problem found while validating a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Offending layer, `None` for graph-wide problems.
    pub layer: Option<LayerId>,
    /// Name of the offending layer (empty for graph-wide problems).
    pub layer_name: String,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layer {
            Some(id) => write!(f, "layer '{}' ({id}): {}", self.layer_name, self.message),
            None => write!(f, "graph: {}", self.message),
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while building or validating a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A connection request was rejected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A tensor descriptor was written twice.
    #[error("Tensor info of output slot {slot} on layer '{layer_name}' is already set")]
    Immutability {
        /// Layer owning the slot.
        layer_name: String,
        /// Output slot index.
        slot: usize,
    },

    /// The graph is not a DAG or is otherwise malformed.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Shape/type inference or connectivity checks failed.
    #[error("Validation failed: {}", format_issues(.issues))]
    Validation {
        /// Every problem found.
        issues: Vec<ValidationIssue>,
    },

    /// Two Input (or two Output) layers share a binding id.
    #[error("Duplicate {direction} binding id {binding_id}")]
    DuplicateBinding {
        /// "input" or "output".
        direction: &'static str,
        /// The conflicting id.
        binding_id: BindingId,
    },

    /// A tensor descriptor violates its own invariants.
    #[error("Invalid tensor info: {0}")]
    InvalidTensorInfo(String),

    /// A handle refers to a layer or slot that does not exist.
    #[error("Invalid layer or slot reference: {0}")]
    InvalidLayer(String),

    /// The layer kind may only be created by the optimizer.
    #[error("Layer kind {0} is reserved for the optimizer")]
    ReservedLayerKind(&'static str),

    /// A slot handle from another graph was used.
    #[error("Slot belongs to a different graph")]
    ForeignSlot,
}

/// Errors raised when typed buffers disagree with their descriptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Element count or type of a buffer does not match.
    #[error("Tensor buffer mismatch: expected {expected_len} x {expected_type}, got {actual_len} x {actual_type}")]
    Mismatch {
        /// Expected element count.
        expected_len: usize,
        /// Expected element type.
        expected_type: DataType,
        /// Actual element count.
        actual_len: usize,
        /// Actual element type.
        actual_type: DataType,
    },
}
