//! End-to-end benchmarks for Tessera
//!
//! Covers the full pipeline:
//! - Graph optimization over mixed backends
//! - Network loading
//! - Inference latency per backend and tensor size
//!
//! Run with: cargo bench --bench end_to_end

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera::logging::{try_init_logging, LogLevel, LoggingConfig};
use tessera::prelude::*;

/// input -> relu -> add(self) -> relu -> output, Float32 [1, len].
fn build_chain(len: usize) -> Graph {
    let info = TensorInfo::new([1, len], DataType::Float32);
    let mut graph = Graph::new();
    let input = graph.add_input_layer(0, "input").unwrap();
    let first = graph.add_activation_layer(ActivationDescriptor::relu6(), "relu");
    let add = graph.add_addition_layer("double");
    let last = graph.add_activation_layer(
        ActivationDescriptor::new(ActivationFunction::TanH, 1.0, 1.0),
        "tanh",
    );
    let output = graph.add_output_layer(0, "output").unwrap();
    graph
        .connect(graph.output_slot(input, 0), graph.input_slot(first, 0))
        .unwrap();
    graph
        .connect(graph.output_slot(first, 0), graph.input_slot(add, 0))
        .unwrap();
    graph
        .connect(graph.output_slot(first, 0), graph.input_slot(add, 1))
        .unwrap();
    graph
        .connect(graph.output_slot(add, 0), graph.input_slot(last, 0))
        .unwrap();
    graph
        .connect(graph.output_slot(last, 0), graph.input_slot(output, 0))
        .unwrap();
    graph
        .set_tensor_info(graph.output_slot(input, 0), info)
        .unwrap();
    graph
}

fn preference_sets() -> [(&'static str, Vec<BackendId>); 2] {
    [
        ("CpuRef", vec![Compute::CpuRef.into()]),
        ("CpuAcc", vec![Compute::CpuAcc.into(), Compute::CpuRef.into()]),
    ]
}

/// Benchmark optimization of a graph
fn bench_optimize(c: &mut Criterion) {
    // Keep per-inference traces out of the measurements.
    try_init_logging(&LoggingConfig::new().with_level(LogLevel::Warn)).ok();
    let mut group = c.benchmark_group("optimize");
    let spec = create_default_registry().unwrap().device_spec();
    let graph = build_chain(1024);

    for (name, preferences) in preference_sets() {
        group.bench_function(name, |b| {
            b.iter(|| {
                Optimizer::default()
                    .optimize(black_box(&graph), &preferences, &spec)
                    .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark loading an optimized network
fn bench_load(c: &mut Criterion) {
    let registry = Arc::new(create_default_registry().unwrap());
    let runtime = Runtime::new(Arc::clone(&registry), RuntimeOptions::default());
    let network = Optimizer::default()
        .optimize(
            &build_chain(1 << 16),
            &[Compute::CpuAcc.into()],
            &registry.device_spec(),
        )
        .unwrap();

    c.bench_function("load_unload", |b| {
        b.iter(|| {
            let id = runtime.load_network(black_box(network.clone())).unwrap();
            runtime.unload_network(id).unwrap();
        });
    });
}

/// Benchmark inference latency with different tensor sizes
fn bench_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("inference");
    let registry = Arc::new(create_default_registry().unwrap());
    let runtime = Runtime::new(
        Arc::clone(&registry),
        RuntimeOptions::default().with_statistics(false),
    );
    let spec = registry.device_spec();

    for len in [256usize, 4096, 65_536, 1 << 20] {
        group.throughput(Throughput::Elements(len as u64));
        let graph = build_chain(len);
        let info = TensorInfo::new([1, len], DataType::Float32);
        #[allow(clippy::cast_precision_loss)]
        let src: Vec<f32> = (0..len).map(|i| (i % 17) as f32 - 8.0).collect();

        for (name, preferences) in preference_sets() {
            let network = Optimizer::default()
                .optimize(&graph, &preferences, &spec)
                .unwrap();
            let id = runtime.load_network(network).unwrap();
            let mut dst = vec![0.0f32; len];

            group.bench_with_input(BenchmarkId::new(name, len), &len, |b, _| {
                let inputs = vec![(0, ConstTensor::new(info.clone(), &src).unwrap())];
                let mut outputs = vec![(0, Tensor::new(info.clone(), &mut dst).unwrap())];
                b.iter(|| {
                    runtime
                        .try_enqueue_workload(id, black_box(&inputs), &mut outputs)
                        .unwrap();
                });
            });

            runtime.unload_network(id).unwrap();
        }
    }

    group.finish();
}

criterion_group!(end_to_end_benches, bench_optimize, bench_load, bench_inference);

criterion_main!(end_to_end_benches);
