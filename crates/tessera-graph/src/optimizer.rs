//! Turns a validated graph into an [`OptimizedNetwork`].

use std::collections::BTreeMap;
use std::time::Instant;

use tessera_backends::DeviceSpec;
use tessera_core::{BackendId, Graph};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::network::{OptimizationStats, OptimizedNetwork};
use crate::options::OptimizerOptions;
use crate::partition::partition;
use crate::passes::{
    BackendAssignmentPass, ConversionInsertionPass, OptimizationPass, PassStats,
};

/// Graph optimizer.
///
/// The input graph is never modified; every run works on a copy.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    options: OptimizerOptions,
}

impl Optimizer {
    /// Create an optimizer.
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Validate `graph`, assign every compute layer to the first backend in
    /// `preferences` that supports it, and insert conversions at backend
    /// boundaries.
    ///
    /// # Errors
    ///
    /// Validation issues, a preference list with no backend present in
    /// `device_spec`, or a layer no preferred backend supports.
    pub fn optimize(
        &self,
        graph: &Graph,
        preferences: &[BackendId],
        device_spec: &DeviceSpec,
    ) -> Result<OptimizedNetwork> {
        let start = Instant::now();
        let mut graph = graph.clone();

        let summary = graph.validate()?;
        debug!(
            "Validated {} layers ({} descriptors inferred)",
            summary.layers_checked, summary.inferred_descriptors
        );

        let assignment = BackendAssignmentPass::new(preferences, device_spec)?;
        run_pass(&assignment, &mut graph)?;

        let regions = partition(&graph);
        debug!(
            "{} backend regions before conversion insertion",
            regions.len()
        );

        let conversion = ConversionInsertionPass::new(self.options.conversion_placement, device_spec);
        let converted = run_pass(&conversion, &mut graph)?;

        if let Err(err) = graph.validate() {
            error!("Optimized graph failed validation: {}", err);
            panic!("optimizer produced an invalid graph: {err}");
        }

        let subgraphs = partition(&graph);
        let mut layers_per_backend = BTreeMap::new();
        for layer in graph.layers() {
            if let Some(backend) = layer.backend() {
                *layers_per_backend.entry(backend.clone()).or_insert(0) += 1;
            }
        }
        let stats = OptimizationStats {
            layers_per_backend,
            conversions_inserted: converted.layers_inserted,
            subgraph_count: subgraphs.len(),
            elapsed: start.elapsed(),
        };

        info!(
            "Optimized graph: {} layers, {} subgraphs, {} conversions in {:?}",
            graph.num_layers(),
            stats.subgraph_count,
            stats.conversions_inserted,
            stats.elapsed
        );

        Ok(OptimizedNetwork::new(graph, subgraphs, stats))
    }
}

fn run_pass(pass: &dyn OptimizationPass, graph: &mut Graph) -> Result<PassStats> {
    debug!("Running optimization pass: {}", pass.name());
    let stats = pass.run(graph)?;
    debug!(
        "Pass {} completed: {} layers modified, {} layers inserted",
        pass.name(),
        stats.layers_modified,
        stats.layers_inserted
    );
    Ok(stats)
}

/// Optimize `graph` with a one-off [`Optimizer`].
pub fn optimize(
    graph: &Graph,
    preferences: &[BackendId],
    device_spec: &DeviceSpec,
    options: &OptimizerOptions,
) -> Result<OptimizedNetwork> {
    Optimizer::new(options.clone()).optimize(graph, preferences, device_spec)
}
