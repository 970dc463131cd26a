//! Graph transformation passes run by the optimizer.

mod assignment;
mod conversion;

pub use assignment::BackendAssignmentPass;
pub use conversion::ConversionInsertionPass;

use tessera_core::Graph;

use crate::error::Result;

/// Statistics from a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Existing layers the pass changed.
    pub layers_modified: usize,
    /// Layers the pass added.
    pub layers_inserted: usize,
}

/// A transformation over a validated graph.
pub trait OptimizationPass {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run the pass over `graph` in place.
    fn run(&self, graph: &mut Graph) -> Result<PassStats>;
}
