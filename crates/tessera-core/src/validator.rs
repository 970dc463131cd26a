//! Tensor descriptor propagation and consistency checks.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{GraphError, Result, ValidationIssue};
use crate::graph::Graph;
use crate::layer::LayerKind;
use crate::types::{LayerId, TensorInfo};

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Layers visited.
    pub layers_checked: usize,
    /// Output slots whose descriptor was inferred rather than set by the caller.
    pub inferred_descriptors: usize,
}

impl Graph {
    /// Propagate descriptors through the graph and check every layer.
    ///
    /// Layers are visited in topological order. Output slots the caller left
    /// unset receive the inferred descriptor; slots the caller set must agree
    /// with it in shape and data type. Every problem found is reported in a
    /// single [`GraphError::Validation`]. Layers downstream of a failed layer
    /// are skipped rather than reported again.
    ///
    /// Inferred descriptors are written back only when validation succeeds;
    /// a failed call leaves the graph as it was.
    pub fn validate(&mut self) -> Result<ValidationSummary> {
        let order = self.topological_order()?;
        let mut issues = Vec::new();
        let mut failed: HashSet<LayerId> = HashSet::new();
        let mut inferred: HashMap<(LayerId, usize), TensorInfo> = HashMap::new();

        for &id in &order {
            match self.validate_layer(id, &failed, &mut inferred) {
                Ok(LayerOutcome::Resolved) => {}
                Ok(LayerOutcome::Skipped) => {
                    failed.insert(id);
                }
                Err(message) => {
                    let layer = &self.layers()[id.index()];
                    issues.push(ValidationIssue {
                        layer: Some(id),
                        layer_name: layer.name().to_string(),
                        message,
                    });
                    failed.insert(id);
                }
            }
        }

        if self.output_layers().is_empty() {
            issues.push(ValidationIssue {
                layer: None,
                layer_name: String::new(),
                message: "graph has no output layers".to_string(),
            });
        }

        if !issues.is_empty() {
            warn!("Validation found {} issue(s)", issues.len());
            return Err(GraphError::Validation { issues });
        }

        let inferred_descriptors = inferred.len();
        let layers = self.layers_mut();
        for ((id, index), info) in inferred {
            layers[id.index()].outputs[index].info = Some(info);
        }

        debug!(
            "Validated {} layers, inferred {} descriptors",
            order.len(),
            inferred_descriptors
        );
        Ok(ValidationSummary {
            layers_checked: order.len(),
            inferred_descriptors,
        })
    }

    fn validate_layer(
        &self,
        id: LayerId,
        failed: &HashSet<LayerId>,
        inferred: &mut HashMap<(LayerId, usize), TensorInfo>,
    ) -> std::result::Result<LayerOutcome, String> {
        let layer = &self.layers()[id.index()];

        let mut inputs = Vec::with_capacity(layer.num_input_slots());
        for index in 0..layer.num_input_slots() {
            let Some((producer, slot)) = layer.input_connection(index) else {
                return Err(format!("input slot {index} is not connected"));
            };
            if failed.contains(&producer) {
                return Ok(LayerOutcome::Skipped);
            }
            let info = self.layers()[producer.index()]
                .output_info(slot)
                .or_else(|| inferred.get(&(producer, slot)));
            match info {
                Some(info) => inputs.push(info.clone()),
                None => {
                    return Err(format!(
                        "descriptor of input slot {index} could not be resolved"
                    ))
                }
            }
        }

        if let LayerKind::Input { binding_id } = layer.kind() {
            let info = layer
                .output_info(0)
                .ok_or_else(|| format!("descriptor of input binding {binding_id} is not set"))?;
            check_fully_specified(info)?;
            return Ok(LayerOutcome::Resolved);
        }

        layer.kind().validate_inputs(&inputs)?;
        let expected = layer.kind().default_output_info(&inputs);
        if expected.len() != layer.num_output_slots() {
            return Err(format!(
                "{} layer produced {} descriptors for {} output slots",
                layer.kind().type_name(),
                expected.len(),
                layer.num_output_slots()
            ));
        }

        for (index, info) in expected.iter().enumerate() {
            if let Some(existing) = layer.output_info(index) {
                if !existing.is_shape_and_type_equal(info) {
                    return Err(format!(
                        "output slot {index} is set to {existing}, inferred {info}"
                    ));
                }
                check_fully_specified(existing)?;
            } else {
                check_fully_specified(info)?;
            }
        }

        for (index, info) in expected.into_iter().enumerate() {
            if layer.output_info(index).is_none() {
                inferred.insert((id, index), info);
            }
        }
        Ok(LayerOutcome::Resolved)
    }
}

enum LayerOutcome {
    Resolved,
    Skipped,
}

fn check_fully_specified(info: &TensorInfo) -> std::result::Result<(), String> {
    if info.shape().is_fully_specified() {
        Ok(())
    } else {
        Err(format!("descriptor {info} is not fully specified"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ActivationDescriptor, ConstantDescriptor, SoftmaxDescriptor};
    use crate::types::DataType;

    #[test]
    fn test_shape_propagation() -> Result<()> {
        let mut graph = Graph::new();
        let a = graph.add_input_layer(0, "a")?;
        let b = graph.add_input_layer(1, "b")?;
        let add = graph.add_addition_layer("add");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(a, 0), graph.input_slot(add, 0))?;
        graph.connect(graph.output_slot(b, 0), graph.input_slot(add, 1))?;
        graph.connect(graph.output_slot(add, 0), graph.input_slot(out, 0))?;

        let info = TensorInfo::new([3, 4], DataType::Float32);
        graph.set_tensor_info(graph.output_slot(a, 0), info.clone())?;
        graph.set_tensor_info(graph.output_slot(b, 0), info.clone())?;

        let summary = graph.validate()?;
        assert_eq!(summary.layers_checked, 4);
        assert_eq!(summary.inferred_descriptors, 1);
        assert_eq!(graph.tensor_info(graph.output_slot(add, 0)), Some(&info));

        // Validation is repeatable once descriptors are resolved.
        assert_eq!(graph.validate()?.inferred_descriptors, 0);
        Ok(())
    }

    #[test]
    fn test_reports_every_issue() -> Result<()> {
        let mut graph = Graph::new();
        let a = graph.add_input_layer(0, "a")?;
        let add = graph.add_addition_layer("add");
        let act = graph.add_activation_layer(ActivationDescriptor::default(), "act");
        graph.add_input_layer(1, "lone")?;
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(a, 0), graph.input_slot(add, 0))?;
        graph.connect(graph.output_slot(add, 0), graph.input_slot(act, 0))?;
        graph.connect(graph.output_slot(act, 0), graph.input_slot(out, 0))?;
        graph.set_tensor_info(graph.output_slot(a, 0), TensorInfo::new([4], DataType::Float32))?;

        let Err(GraphError::Validation { issues }) = graph.validate() else {
            panic!("expected validation failure");
        };
        let names: Vec<&str> = issues.iter().map(|i| i.layer_name.as_str()).collect();
        // `add` has an open input; `act` and `out` sit downstream of it and
        // are not reported again. `lone` never had its descriptor set.
        assert_eq!(names, vec!["add", "lone"]);
        assert!(issues[0].message.contains("input slot 1 is not connected"));
        Ok(())
    }

    #[test]
    fn test_failed_validation_leaves_graph_unchanged() -> Result<()> {
        let mut graph = Graph::new();
        let a = graph.add_input_layer(0, "a")?;
        let act = graph.add_activation_layer(ActivationDescriptor::default(), "act");
        let add = graph.add_addition_layer("add");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(a, 0), graph.input_slot(act, 0))?;
        graph.connect(graph.output_slot(act, 0), graph.input_slot(add, 0))?;
        graph.connect(graph.output_slot(add, 0), graph.input_slot(out, 0))?;
        let info = TensorInfo::new([4], DataType::Float32);
        graph.set_tensor_info(graph.output_slot(a, 0), info.clone())?;

        assert!(graph.validate().is_err());
        assert_eq!(graph.tensor_info(graph.output_slot(act, 0)), None);

        // The caller can still set the descriptor, fix the graph and retry.
        graph.set_tensor_info(graph.output_slot(act, 0), info.clone())?;
        graph.connect(graph.output_slot(a, 0), graph.input_slot(add, 1))?;
        assert_eq!(graph.validate()?.inferred_descriptors, 1);
        assert_eq!(graph.tensor_info(graph.output_slot(add, 0)), Some(&info));
        Ok(())
    }

    #[test]
    fn test_caller_descriptor_must_match() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        let act = graph.add_activation_layer(ActivationDescriptor::default(), "act");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(input, 0), graph.input_slot(act, 0))?;
        graph.connect(graph.output_slot(act, 0), graph.input_slot(out, 0))?;
        graph.set_tensor_info(graph.output_slot(input, 0), TensorInfo::new([10], DataType::Float32))?;
        graph.set_tensor_info(graph.output_slot(act, 0), TensorInfo::new([5], DataType::Float32))?;

        assert!(matches!(graph.validate(), Err(GraphError::Validation { .. })));
        Ok(())
    }

    #[test]
    fn test_quantization_may_differ_from_inferred() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        let softmax = graph.add_softmax_layer(SoftmaxDescriptor::default(), "softmax");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(input, 0), graph.input_slot(softmax, 0))?;
        graph.connect(graph.output_slot(softmax, 0), graph.input_slot(out, 0))?;

        let info = TensorInfo::new_quantized([1, 5], DataType::QAsymmU8, 10000.0, 100);
        graph.set_tensor_info(graph.output_slot(input, 0), info)?;
        let custom = TensorInfo::new_quantized([1, 5], DataType::QAsymmU8, 1.0 / 255.0, 0);
        graph.set_tensor_info(graph.output_slot(softmax, 0), custom.clone())?;

        graph.validate()?;
        assert_eq!(graph.tensor_info(graph.output_slot(softmax, 0)), Some(&custom));
        Ok(())
    }

    #[test]
    fn test_missing_output_layer() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        graph.set_tensor_info(graph.output_slot(input, 0), TensorInfo::new([2], DataType::Float32))?;

        let Err(GraphError::Validation { issues }) = graph.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].layer, None);
        Ok(())
    }

    #[test]
    fn test_unknown_dimension_rejected() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(input, 0), graph.input_slot(out, 0))?;
        graph.set_tensor_info(graph.output_slot(input, 0), TensorInfo::new([0, 4], DataType::Float32))?;

        assert!(graph.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_constant_feeds_addition() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        let info = TensorInfo::new([1, 6], DataType::Float32);
        let weights = ConstantDescriptor::new(info.clone(), vec![1.0f32; 6])?;
        let constant = graph.add_constant_layer(weights, "weights");
        let add = graph.add_addition_layer("add");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(input, 0), graph.input_slot(add, 0))?;
        graph.connect(graph.output_slot(constant, 0), graph.input_slot(add, 1))?;
        graph.connect(graph.output_slot(add, 0), graph.input_slot(out, 0))?;
        graph.set_tensor_info(graph.output_slot(input, 0), info.clone())?;

        graph.validate()?;
        assert_eq!(graph.tensor_info(graph.output_slot(add, 0)), Some(&info));
        Ok(())
    }

    #[test]
    fn test_integer_activation_rejected() -> Result<()> {
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in")?;
        let act = graph.add_activation_layer(ActivationDescriptor::relu6(), "act");
        let out = graph.add_output_layer(0, "out")?;
        graph.connect(graph.output_slot(input, 0), graph.input_slot(act, 0))?;
        graph.connect(graph.output_slot(act, 0), graph.input_slot(out, 0))?;
        graph.set_tensor_info(graph.output_slot(input, 0), TensorInfo::new([3], DataType::Signed32))?;

        assert!(graph.validate().is_err());
        Ok(())
    }
}
