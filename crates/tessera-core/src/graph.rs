//! Graph construction, connectivity and traversal.
//!
//! A [`Graph`] owns its layers in an arena indexed by [`LayerId`]. Slots
//! record the indices of their peers, so the graph holds no references into
//! itself and can be cloned freely.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::layer::{
    ActivationDescriptor, ConstantDescriptor, Layer, LayerKind, SoftmaxDescriptor,
};
use crate::types::{BackendId, BindingId, LayerId, TensorInfo};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a graph. Clones share the identity of the
/// graph they were cloned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(u64);

impl GraphId {
    fn next() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph-{}", self.0)
    }
}

/// Handle of a layer's output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSlotRef {
    graph: GraphId,
    layer: LayerId,
    index: usize,
}

impl OutputSlotRef {
    /// Owning layer.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Slot index on the owning layer.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Handle of a layer's input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSlotRef {
    graph: GraphId,
    layer: LayerId,
    index: usize,
}

impl InputSlotRef {
    /// Owning layer.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Slot index on the owning layer.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Summary counts over a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    /// Total number of layers.
    pub layer_count: usize,
    /// Total number of connections.
    pub connection_count: usize,
    /// Number of Input layers.
    pub input_count: usize,
    /// Number of Output layers.
    pub output_count: usize,
    /// Layer count per kind name.
    pub layer_type_counts: BTreeMap<String, usize>,
    /// Number of layers on the longest path.
    pub depth: usize,
}

/// A network under construction: layers connected through typed slots.
#[derive(Debug, Clone)]
pub struct Graph {
    id: GraphId,
    layers: Vec<Layer>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: GraphId::next(),
            layers: Vec::new(),
        }
    }

    /// Identity of this graph.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Add a layer of any public kind.
    ///
    /// Fails for duplicate Input/Output binding ids and for
    /// [`LayerKind::MemCopy`], which only the optimizer inserts.
    pub fn add_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> Result<LayerId> {
        if matches!(kind, LayerKind::MemCopy) {
            return Err(GraphError::ReservedLayerKind(kind.type_name()));
        }
        match kind {
            LayerKind::Input { binding_id } => self.check_binding("input", binding_id)?,
            LayerKind::Output { binding_id } => self.check_binding("output", binding_id)?,
            _ => {}
        }
        Ok(self.push_layer(kind, name))
    }

    /// Add an Input layer bound to `binding_id`.
    pub fn add_input_layer(&mut self, binding_id: BindingId, name: impl Into<String>) -> Result<LayerId> {
        self.add_layer(LayerKind::Input { binding_id }, name)
    }

    /// Add an Output layer bound to `binding_id`.
    pub fn add_output_layer(&mut self, binding_id: BindingId, name: impl Into<String>) -> Result<LayerId> {
        self.add_layer(LayerKind::Output { binding_id }, name)
    }

    /// Add an elementwise activation.
    pub fn add_activation_layer(
        &mut self,
        descriptor: ActivationDescriptor,
        name: impl Into<String>,
    ) -> LayerId {
        self.push_layer(LayerKind::Activation(descriptor), name)
    }

    /// Add an elementwise addition of two inputs.
    pub fn add_addition_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.push_layer(LayerKind::Addition, name)
    }

    /// Add an elementwise multiplication of two inputs.
    pub fn add_multiplication_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.push_layer(LayerKind::Multiplication, name)
    }

    /// Add a softmax over the innermost dimension.
    pub fn add_softmax_layer(&mut self, descriptor: SoftmaxDescriptor, name: impl Into<String>) -> LayerId {
        self.push_layer(LayerKind::Softmax(descriptor), name)
    }

    /// Add a layer producing fixed weights. Its output descriptor is set
    /// from the weights and cannot be replaced.
    pub fn add_constant_layer(
        &mut self,
        descriptor: ConstantDescriptor,
        name: impl Into<String>,
    ) -> LayerId {
        let info = descriptor.info().clone();
        let id = self.push_layer(LayerKind::Constant(descriptor), name);
        self.layers[id.0].outputs[0].info = Some(info);
        id
    }

    fn push_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> LayerId {
        let id = LayerId(self.layers.len());
        let layer = Layer::new(id, kind, name);
        debug!("Added {} layer '{}' as {}", layer.kind.type_name(), layer.name, id);
        self.layers.push(layer);
        id
    }

    fn check_binding(&self, direction: &'static str, binding_id: BindingId) -> Result<()> {
        let taken = self.layers.iter().any(|layer| match (&layer.kind, direction) {
            (LayerKind::Input { binding_id: b }, "input")
            | (LayerKind::Output { binding_id: b }, "output") => *b == binding_id,
            _ => false,
        });
        if taken {
            return Err(GraphError::DuplicateBinding {
                direction,
                binding_id,
            });
        }
        Ok(())
    }

    /// Handle of output slot `index` of `layer`. Checked when used.
    pub fn output_slot(&self, layer: LayerId, index: usize) -> OutputSlotRef {
        OutputSlotRef {
            graph: self.id,
            layer,
            index,
        }
    }

    /// Handle of input slot `index` of `layer`. Checked when used.
    pub fn input_slot(&self, layer: LayerId, index: usize) -> InputSlotRef {
        InputSlotRef {
            graph: self.id,
            layer,
            index,
        }
    }

    fn resolve_output(&self, slot: OutputSlotRef) -> Result<()> {
        if slot.graph != self.id {
            return Err(GraphError::ForeignSlot);
        }
        let layer = self.layer_or_err(slot.layer)?;
        if slot.index >= layer.outputs.len() {
            return Err(GraphError::InvalidLayer(format!(
                "layer '{}' has no output slot {}",
                layer.name, slot.index
            )));
        }
        Ok(())
    }

    fn resolve_input(&self, slot: InputSlotRef) -> Result<()> {
        if slot.graph != self.id {
            return Err(GraphError::ForeignSlot);
        }
        let layer = self.layer_or_err(slot.layer)?;
        if slot.index >= layer.inputs.len() {
            return Err(GraphError::InvalidLayer(format!(
                "layer '{}' has no input slot {}",
                layer.name, slot.index
            )));
        }
        Ok(())
    }

    fn layer_or_err(&self, id: LayerId) -> Result<&Layer> {
        self.layers
            .get(id.0)
            .ok_or_else(|| GraphError::InvalidLayer(format!("no layer {id}")))
    }

    /// Connect an output slot to an input slot.
    ///
    /// An input slot accepts exactly one producer; an output slot may feed
    /// any number of consumers. Edges that would close a cycle are refused.
    pub fn connect(&mut self, output: OutputSlotRef, input: InputSlotRef) -> Result<()> {
        self.resolve_output(output)
            .and_then(|()| self.resolve_input(input))
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let consumer = &self.layers[input.layer.0];
        if let Some((producer, index)) = consumer.inputs[input.index].connection {
            return Err(GraphError::Connection(format!(
                "input slot {} of layer '{}' is already connected to output slot {} of layer '{}'",
                input.index, consumer.name, index, self.layers[producer.0].name
            )));
        }
        if output.layer == input.layer || self.reaches(input.layer, output.layer) {
            return Err(GraphError::Connection(format!(
                "connecting '{}' to '{}' would create a cycle",
                self.layers[output.layer.0].name, consumer.name
            )));
        }

        self.layers[output.layer.0].outputs[output.index]
            .connections
            .push((input.layer, input.index));
        self.layers[input.layer.0].inputs[input.index].connection =
            Some((output.layer, output.index));
        Ok(())
    }

    /// Remove the edge between `output` and `input`.
    pub fn disconnect(&mut self, output: OutputSlotRef, input: InputSlotRef) -> Result<()> {
        self.resolve_output(output)?;
        self.resolve_input(input)?;
        let slot = &mut self.layers[input.layer.0].inputs[input.index];
        if slot.connection != Some((output.layer, output.index)) {
            return Err(GraphError::Connection(format!(
                "input slot {} of {} is not connected to output slot {} of {}",
                input.index, input.layer, output.index, output.layer
            )));
        }
        slot.connection = None;
        self.layers[output.layer.0].outputs[output.index]
            .connections
            .retain(|&c| c != (input.layer, input.index));
        Ok(())
    }

    /// True when `to` is reachable from `from` along existing edges.
    fn reaches(&self, from: LayerId, to: LayerId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            for slot in &self.layers[id.0].outputs {
                stack.extend(slot.connections.iter().map(|&(consumer, _)| consumer));
            }
        }
        false
    }

    /// Set the descriptor of an output slot. Descriptors are write-once.
    pub fn set_tensor_info(&mut self, output: OutputSlotRef, info: TensorInfo) -> Result<()> {
        self.resolve_output(output)?;
        info.check()?;
        let layer = &mut self.layers[output.layer.0];
        let slot = &mut layer.outputs[output.index];
        if slot.info.is_some() {
            return Err(GraphError::Immutability {
                layer_name: layer.name.clone(),
                slot: output.index,
            });
        }
        slot.info = Some(info);
        Ok(())
    }

    /// Descriptor of an output slot, once set or inferred.
    pub fn tensor_info(&self, output: OutputSlotRef) -> Option<&TensorInfo> {
        if output.graph != self.id {
            return None;
        }
        self.layers
            .get(output.layer.0)
            .and_then(|layer| layer.output_info(output.index))
    }

    /// Layer by id.
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    /// All layers in id order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Ids of all Input layers.
    pub fn input_layers(&self) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|l| matches!(l.kind, LayerKind::Input { .. }))
            .map(|l| l.id)
            .collect()
    }

    /// Ids of all Output layers.
    pub fn output_layers(&self) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|l| matches!(l.kind, LayerKind::Output { .. }))
            .map(|l| l.id)
            .collect()
    }

    /// Resolved descriptors of a layer's inputs and outputs, in slot order.
    ///
    /// `None` when the layer does not exist or any slot is still unresolved.
    pub fn resolved_descriptors(&self, id: LayerId) -> Option<(Vec<TensorInfo>, Vec<TensorInfo>)> {
        let layer = self.layers.get(id.0)?;
        let inputs = (0..layer.num_input_slots())
            .map(|i| {
                let (producer, slot) = layer.input_connection(i)?;
                self.layers[producer.0].output_info(slot).cloned()
            })
            .collect::<Option<Vec<_>>>()?;
        let outputs = (0..layer.num_output_slots())
            .map(|i| layer.output_info(i).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some((inputs, outputs))
    }

    /// Input slots fed by `output`.
    pub fn connections_of(&self, output: OutputSlotRef) -> Vec<InputSlotRef> {
        if self.resolve_output(output).is_err() {
            return Vec::new();
        }
        self.layers[output.layer.0].outputs[output.index]
            .connections
            .iter()
            .map(|&(layer, index)| self.input_slot(layer, index))
            .collect()
    }

    /// Output slot feeding `input`, if connected.
    pub fn connection_of(&self, input: InputSlotRef) -> Option<OutputSlotRef> {
        self.resolve_input(input).ok()?;
        self.layers[input.layer.0].inputs[input.index]
            .connection
            .map(|(layer, index)| self.output_slot(layer, index))
    }

    /// Deterministic topological order.
    ///
    /// Among layers whose producers are all placed, the smallest id goes
    /// first, so equal graphs always order the same way.
    pub fn topological_order(&self) -> Result<Vec<LayerId>> {
        let mut in_degree: Vec<usize> = self
            .layers
            .iter()
            .map(|l| l.inputs.iter().filter(|s| s.connection.is_some()).count())
            .collect();

        let mut ready: BTreeSet<LayerId> = self
            .layers
            .iter()
            .filter(|l| in_degree[l.id.0] == 0)
            .map(|l| l.id)
            .collect();

        let mut order = Vec::with_capacity(self.layers.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for slot in &self.layers[id.0].outputs {
                for &(consumer, _) in &slot.connections {
                    in_degree[consumer.0] -= 1;
                    if in_degree[consumer.0] == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        if order.len() != self.layers.len() {
            return Err(GraphError::Structural(format!(
                "graph contains a cycle ({} of {} layers ordered)",
                order.len(),
                self.layers.len()
            )));
        }
        Ok(order)
    }

    /// Counts over layers and connections, plus the graph depth.
    pub fn statistics(&self) -> GraphStatistics {
        let mut layer_type_counts = BTreeMap::new();
        for layer in &self.layers {
            *layer_type_counts
                .entry(layer.kind.type_name().to_string())
                .or_insert(0) += 1;
        }

        let connection_count = self
            .layers
            .iter()
            .flat_map(|l| l.outputs.iter())
            .map(|s| s.connections.len())
            .sum();

        GraphStatistics {
            layer_count: self.layers.len(),
            connection_count,
            input_count: layer_type_counts.get("Input").copied().unwrap_or(0),
            output_count: layer_type_counts.get("Output").copied().unwrap_or(0),
            layer_type_counts,
            depth: self.depth(),
        }
    }

    fn depth(&self) -> usize {
        let Ok(order) = self.topological_order() else {
            return 0;
        };
        let mut depth = vec![0usize; self.layers.len()];
        for id in order {
            let longest = self.layers[id.0]
                .inputs
                .iter()
                .filter_map(|s| s.connection)
                .map(|(producer, _)| depth[producer.0])
                .max()
                .unwrap_or(0);
            depth[id.0] = longest + 1;
        }
        depth.into_iter().max().unwrap_or(0)
    }

    /// Splice a single-input, single-output layer into the edge feeding
    /// `input`. Used by the optimizer; may insert reserved kinds.
    ///
    /// A spliced [`LayerKind::MemCopy`] takes the producer's descriptor.
    pub fn insert_layer_on_connection(
        &mut self,
        input: InputSlotRef,
        kind: LayerKind,
        name: impl Into<String>,
    ) -> Result<LayerId> {
        self.resolve_input(input)?;
        if kind.num_inputs() != 1 || kind.num_outputs() != 1 {
            return Err(GraphError::InvalidLayer(format!(
                "{} layers cannot be inserted on a connection",
                kind.type_name()
            )));
        }
        let Some((producer, index)) = self.layers[input.layer.0].inputs[input.index].connection
        else {
            return Err(GraphError::Connection(format!(
                "input slot {} of {} is not connected",
                input.index, input.layer
            )));
        };

        let copies_descriptor = matches!(kind, LayerKind::MemCopy);
        let id = self.push_layer(kind, name);

        let producer_slot = &mut self.layers[producer.0].outputs[index];
        for connection in &mut producer_slot.connections {
            if *connection == (input.layer, input.index) {
                *connection = (id, 0);
            }
        }
        let producer_info = producer_slot.info.clone();

        let inserted = &mut self.layers[id.0];
        inserted.inputs[0].connection = Some((producer, index));
        inserted.outputs[0].connections.push((input.layer, input.index));
        if copies_descriptor {
            inserted.outputs[0].info = producer_info;
        }
        self.layers[input.layer.0].inputs[input.index].connection = Some((id, 0));
        Ok(id)
    }

    /// Record the backend a layer runs on. Used by the optimizer.
    pub fn set_backend(&mut self, layer: LayerId, backend: BackendId) -> Result<()> {
        self.layers
            .get_mut(layer.0)
            .ok_or_else(|| GraphError::InvalidLayer(format!("no layer {layer}")))?
            .backend = Some(backend);
        Ok(())
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
}
