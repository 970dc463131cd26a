//! Loading and execution through the public runtime API.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::Result;
use tessera_backends::{
    create_default_registry, Backend, BackendCapabilities, BackendError, BackendRegistry,
    DeviceSpec, Workload, WorkloadDescriptor, WorkloadError,
};
use tessera_core::{
    ActivationDescriptor, BackendId, Compute, ConstTensor, DataType, Graph, LayerKind, Tensor,
    TensorBuffer, TensorInfo,
};
use tessera_graph::{OptimizedNetwork, Optimizer};
use tessera_runtime::{Runtime, RuntimeError, RuntimeOptions, Status};

fn info() -> TensorInfo {
    TensorInfo::new([4], DataType::Float32)
}

fn relu_graph() -> Result<Graph> {
    let mut graph = Graph::new();
    let input = graph.add_input_layer(0, "input")?;
    let relu = graph.add_activation_layer(ActivationDescriptor::relu6(), "relu");
    let output = graph.add_output_layer(0, "output")?;
    graph.connect(graph.output_slot(input, 0), graph.input_slot(relu, 0))?;
    graph.connect(graph.output_slot(relu, 0), graph.input_slot(output, 0))?;
    graph.set_tensor_info(graph.output_slot(input, 0), info())?;
    Ok(graph)
}

fn optimize_for(graph: &Graph, backend: BackendId, spec: &DeviceSpec) -> Result<OptimizedNetwork> {
    Ok(Optimizer::default().optimize(graph, &[backend], spec)?)
}

fn default_runtime() -> Result<Runtime> {
    Ok(Runtime::new(
        Arc::new(create_default_registry()?),
        RuntimeOptions::default(),
    ))
}

fn run(runtime: &Runtime, id: tessera_runtime::NetworkId, src: &[f32]) -> Result<Vec<f32>> {
    let mut dst = vec![0.0f32; src.len()];
    let inputs = vec![(0, ConstTensor::new(info(), src)?)];
    let mut outputs = vec![(0, Tensor::new(info(), &mut dst[..])?)];
    runtime.try_enqueue_workload(id, &inputs, &mut outputs)?;
    drop(outputs);
    Ok(dst)
}

/// A backend whose activation workload can be made to block, fail or panic.
#[derive(Default)]
struct ControlledBackend {
    gate: Option<Arc<Barrier>>,
    fail_next: Arc<AtomicBool>,
    panic_next: Arc<AtomicBool>,
}

#[derive(Debug)]
struct ControlledWorkload {
    gate: Option<Arc<Barrier>>,
    fail_next: Arc<AtomicBool>,
    panic_next: Arc<AtomicBool>,
}

impl Workload for ControlledWorkload {
    fn name(&self) -> &str {
        "controlled"
    }

    fn execute(
        &self,
        inputs: &[&TensorBuffer],
        outputs: &mut [TensorBuffer],
    ) -> std::result::Result<(), WorkloadError> {
        if let Some(gate) = &self.gate {
            gate.wait();
            gate.wait();
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(WorkloadError::UnsupportedDataType("injected failure".into()));
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("workload panicked");
        }
        outputs[0].copy_from(inputs[0])?;
        Ok(())
    }
}

impl Backend for ControlledBackend {
    fn id(&self) -> BackendId {
        BackendId::new("Controlled")
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            data_types: vec![DataType::Float32],
            layer_kinds: vec!["Activation".into()],
            parallel: false,
        }
    }

    fn is_layer_supported(
        &self,
        kind: &LayerKind,
        _inputs: &[TensorInfo],
        _outputs: &[TensorInfo],
    ) -> std::result::Result<(), String> {
        match kind {
            LayerKind::Activation(_) => Ok(()),
            other => Err(format!("cannot run {}", other.type_name())),
        }
    }

    fn create_workload(
        &self,
        _descriptor: &WorkloadDescriptor,
    ) -> std::result::Result<Box<dyn Workload>, BackendError> {
        Ok(Box::new(ControlledWorkload {
            gate: self.gate.clone(),
            fail_next: Arc::clone(&self.fail_next),
            panic_next: Arc::clone(&self.panic_next),
        }))
    }
}

fn controlled_runtime(backend: ControlledBackend) -> Result<(Runtime, DeviceSpec)> {
    let registry = BackendRegistry::new();
    registry.register(Arc::new(backend))?;
    let spec = registry.device_spec();
    Ok((
        Runtime::new(Arc::new(registry), RuntimeOptions::default()),
        spec,
    ))
}

#[test]
fn test_load_run_unload() -> Result<()> {
    let runtime = default_runtime()?;
    let spec = runtime.registry().device_spec();
    let network = optimize_for(&relu_graph()?, Compute::CpuAcc.into(), &spec)?;
    let id = runtime.load_network(network)?;

    assert!(runtime.is_network_loaded(id));
    assert_eq!(runtime.input_tensor_info(id, 0)?, info());
    assert_eq!(runtime.output_tensor_info(id, 0)?, info());
    assert!(matches!(
        runtime.input_tensor_info(id, 3),
        Err(RuntimeError::UnknownBinding {
            direction: "input",
            binding: 3
        })
    ));

    assert_eq!(run(&runtime, id, &[-3.0, 1.0, 6.5, 4.0])?, vec![0.0, 1.0, 6.0, 4.0]);
    // Workspaces are reused across calls.
    assert_eq!(run(&runtime, id, &[9.0, -1.0, 0.0, 2.0])?, vec![6.0, 0.0, 0.0, 2.0]);

    let stats = runtime.network_statistics(id)?;
    assert_eq!(stats.inference_count, 2);
    assert_eq!(stats.failure_count, 0);

    runtime.unload_network(id)?;
    assert!(!runtime.is_network_loaded(id));
    assert!(matches!(
        run(&runtime, id, &[0.0; 4]).unwrap_err().downcast::<RuntimeError>()?,
        RuntimeError::UnknownNetwork(unknown) if unknown == id
    ));
    assert!(matches!(
        runtime.unload_network(id),
        Err(RuntimeError::UnknownNetwork(_))
    ));
    Ok(())
}

#[test]
fn test_binding_mismatch_writes_nothing() -> Result<()> {
    let runtime = default_runtime()?;
    let spec = runtime.registry().device_spec();
    let id = runtime.load_network(optimize_for(&relu_graph()?, Compute::CpuRef.into(), &spec)?)?;

    let src = [1.0f32; 4];
    let mut dst = vec![-7.0f32; 5];
    let wrong = TensorInfo::new([5], DataType::Float32);
    let inputs = vec![(0, ConstTensor::new(info(), &src[..])?)];
    let mut outputs = vec![(0, Tensor::new(wrong, &mut dst[..])?)];

    assert_eq!(runtime.enqueue_workload(id, &inputs, &mut outputs), Status::Failure);
    assert!(matches!(runtime.last_error(id), Some(RuntimeError::Binding(_))));
    drop(outputs);
    assert_eq!(dst, vec![-7.0; 5]);

    // Unknown and missing bindings.
    let mut dst = vec![0.0f32; 4];
    let mut outputs = vec![(0, Tensor::new(info(), &mut dst[..])?)];
    let unknown = vec![(9, ConstTensor::new(info(), &src[..])?)];
    assert!(matches!(
        runtime.try_enqueue_workload(id, &unknown, &mut outputs),
        Err(RuntimeError::UnknownBinding {
            direction: "input",
            binding: 9
        })
    ));
    assert!(matches!(
        runtime.try_enqueue_workload(id, &Vec::new(), &mut outputs),
        Err(RuntimeError::Binding(_))
    ));

    let duplicate = vec![
        (0, ConstTensor::new(info(), &src[..])?),
        (0, ConstTensor::new(info(), &src[..])?),
    ];
    assert!(matches!(
        runtime.try_enqueue_workload(id, &duplicate, &mut outputs),
        Err(RuntimeError::Binding(_))
    ));

    // A good call clears the stored error.
    assert_eq!(runtime.enqueue_workload(id, &inputs, &mut outputs), Status::Success);
    assert_eq!(runtime.last_error(id), None);
    Ok(())
}

#[test]
fn test_load_fails_for_unregistered_backend() -> Result<()> {
    // Optimize against a device the runtime does not have.
    let full = create_default_registry()?;
    let network = optimize_for(&relu_graph()?, Compute::CpuAcc.into(), &full.device_spec())?;

    let registry = BackendRegistry::new();
    registry.register(Arc::new(tessera_backends::CpuRefBackend::new()))?;
    let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::default());

    match runtime.load_network(network) {
        Err(RuntimeError::Load { layer, backend, .. }) => {
            assert_eq!(layer, "relu");
            assert_eq!(backend, "CpuAcc");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(runtime.loaded_network_count(), 0);
    Ok(())
}

#[test]
fn test_network_limit() -> Result<()> {
    let runtime = Runtime::new(
        Arc::new(create_default_registry()?),
        RuntimeOptions::default().with_max_loaded_networks(1),
    );
    let spec = runtime.registry().device_spec();
    let network = optimize_for(&relu_graph()?, Compute::CpuRef.into(), &spec)?;

    let first = runtime.load_network(network.clone())?;
    assert_eq!(
        runtime.load_network(network.clone()),
        Err(RuntimeError::NetworkLimitReached { limit: 1 })
    );
    runtime.unload_network(first)?;
    runtime.load_network(network)?;
    Ok(())
}

#[test]
fn test_network_limit_holds_under_concurrent_loads() -> Result<()> {
    const THREADS: usize = 8;
    let runtime = Arc::new(Runtime::new(
        Arc::new(create_default_registry()?),
        RuntimeOptions::default().with_max_loaded_networks(1),
    ));
    let spec = runtime.registry().device_spec();
    let network = optimize_for(&relu_graph()?, Compute::CpuRef.into(), &spec)?;

    for _ in 0..10 {
        let start = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                let start = Arc::clone(&start);
                let network = network.clone();
                thread::spawn(move || {
                    start.wait();
                    runtime.load_network(network)
                })
            })
            .collect();

        let mut loaded = Vec::new();
        for handle in handles {
            match handle.join().expect("loader thread") {
                Ok(id) => loaded.push(id),
                Err(err) => assert_eq!(err, RuntimeError::NetworkLimitReached { limit: 1 }),
            }
        }
        assert_eq!(loaded.len(), 1);
        assert_eq!(runtime.loaded_network_count(), 1);
        for id in loaded {
            runtime.unload_network(id)?;
        }
    }
    Ok(())
}

#[test]
fn test_failed_workload_leaves_network_usable() -> Result<()> {
    let fail_next = Arc::new(AtomicBool::new(true));
    let (runtime, spec) = controlled_runtime(ControlledBackend {
        fail_next: Arc::clone(&fail_next),
        ..ControlledBackend::default()
    })?;
    let id = runtime.load_network(optimize_for(
        &relu_graph()?,
        BackendId::new("Controlled"),
        &spec,
    )?)?;

    let err = run(&runtime, id, &[1.0, 2.0, 3.0, 4.0])
        .unwrap_err()
        .downcast::<RuntimeError>()?;
    assert!(matches!(err, RuntimeError::Execution { ref layer, .. } if layer == "relu"));

    assert_eq!(run(&runtime, id, &[1.0, 2.0, 3.0, 4.0])?, vec![1.0, 2.0, 3.0, 4.0]);
    let stats = runtime.network_statistics(id)?;
    assert_eq!((stats.inference_count, stats.failure_count), (1, 1));
    Ok(())
}

#[test]
fn test_panicking_workload_leaves_network_usable() -> Result<()> {
    let (runtime, spec) = controlled_runtime(ControlledBackend {
        panic_next: Arc::new(AtomicBool::new(true)),
        ..ControlledBackend::default()
    })?;
    let id = runtime.load_network(optimize_for(
        &relu_graph()?,
        BackendId::new("Controlled"),
        &spec,
    )?)?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&runtime, id, &[1.0; 4])));
    assert!(outcome.is_err());

    // The workspace got its buffers back, so the next call runs normally.
    assert_eq!(run(&runtime, id, &[1.0, 2.0, 3.0, 4.0])?, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(run(&runtime, id, &[5.0, 6.0, 7.0, 8.0])?, vec![5.0, 6.0, 7.0, 8.0]);
    Ok(())
}

#[test]
fn test_concurrent_call_on_same_network_is_busy() -> Result<()> {
    let gate = Arc::new(Barrier::new(2));
    let (runtime, spec) = controlled_runtime(ControlledBackend {
        gate: Some(Arc::clone(&gate)),
        ..ControlledBackend::default()
    })?;
    let runtime = Arc::new(runtime);
    let id = runtime.load_network(optimize_for(
        &relu_graph()?,
        BackendId::new("Controlled"),
        &spec,
    )?)?;

    let worker = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || run(&runtime, id, &[1.0; 4]).map_err(|e| e.to_string()))
    };

    // Wait until the worker is inside its workload.
    gate.wait();
    let mut dst = vec![0.0f32; 4];
    let src = [0.0f32; 4];
    let inputs = vec![(0, ConstTensor::new(info(), &src[..])?)];
    let mut outputs = vec![(0, Tensor::new(info(), &mut dst[..])?)];
    assert_eq!(
        runtime.try_enqueue_workload(id, &inputs, &mut outputs),
        Err(RuntimeError::NetworkBusy(id))
    );
    gate.wait();

    let result = worker.join().expect("worker thread");
    assert_eq!(result, Ok(vec![1.0; 4]));
    Ok(())
}

#[test]
fn test_independent_networks_run_in_parallel() -> Result<()> {
    let runtime = Arc::new(default_runtime()?);
    let spec = runtime.registry().device_spec();
    let graph = relu_graph()?;
    let ids = (0..4)
        .map(|_| -> Result<_> {
            Ok(runtime.load_network(optimize_for(&graph, Compute::CpuAcc.into(), &spec)?)?)
        })
        .collect::<Result<Vec<_>>>()?;

    let handles: Vec<_> = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                #[allow(clippy::cast_precision_loss)]
                let base = i as f32;
                for _ in 0..50 {
                    let out = run(&runtime, id, &[base, -base, 10.0, 0.5]).expect("inference");
                    assert_eq!(out, vec![base.min(6.0), 0.0, 6.0, 0.5]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }
    Ok(())
}
