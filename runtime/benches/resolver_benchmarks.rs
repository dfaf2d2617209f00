//! Performance benchmarks for dependency resolution and plugin calls
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;

use hotswap_runtime::version::{Constraint, Version, satisfies};
use hotswap_runtime::{PluginDescriptor, PluginManager, Resolver, RuntimeConfig};

/// Layered graph: every plugin depends on three plugins of the layer below
fn layered(layers: usize, width: usize) -> Vec<PluginDescriptor> {
    let mut descriptors = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for i in 0..width {
            let mut descriptor =
                PluginDescriptor::new(format!("p{layer:03}-{i:03}"), Version::new(1, layer as u64, 0));
            if layer > 0 {
                for j in 0..3 {
                    descriptor = descriptor.depends_on(
                        format!("p{:03}-{:03}", layer - 1, (i + j) % width),
                        Constraint::parse(">=1.0.0").unwrap(),
                    );
                }
            }
            descriptors.push(descriptor);
        }
    }
    descriptors
}

/// Benchmark version parsing and constraint checks
fn bench_versions(c: &mut Criterion) {
    let mut group = c.benchmark_group("version");

    group.bench_function("parse_release", |b| {
        b.iter(|| Version::parse(black_box("12.4.31")))
    });
    group.bench_function("parse_prerelease", |b| {
        b.iter(|| Version::parse(black_box("3.0.0-rc.1")))
    });

    let constraint = Constraint::parse("~1.2.3").unwrap();
    let version = Version::new(1, 2, 9);
    group.bench_function("satisfies_tilde", |b| {
        b.iter(|| satisfies(black_box(&version), black_box(&constraint)))
    });

    group.finish();
}

/// Benchmark global load-order resolution on growing graphs
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_load_order");
    group.measurement_time(Duration::from_secs(5));

    for &(layers, width) in &[(5usize, 10usize), (10, 50), (20, 100)] {
        let descriptors = layered(layers, width);
        group.throughput(Throughput::Elements(descriptors.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(descriptors.len()),
            &descriptors,
            |b, descriptors| b.iter(|| Resolver::new(descriptors).resolve_load_order()),
        );
    }

    group.finish();
}

/// Benchmark resolution of one plugin's closure in a large installed set
fn bench_resolve_closure(c: &mut Criterion) {
    let descriptors = layered(20, 100);
    let resolver = Resolver::new(&descriptors);

    c.bench_function("resolve_load_order_for/top", |b| {
        b.iter(|| resolver.resolve_load_order_for(black_box("p019-050")))
    });
    c.bench_function("dependency_tree/top", |b| {
        b.iter(|| resolver.dependency_tree(black_box("p019-050")))
    });
}

/// Benchmark the lock-free invocation path
fn bench_invoke(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let manager = Arc::new(PluginManager::with_builtins(RuntimeConfig::default()));
    runtime
        .block_on(manager.load_plugin("echo"))
        .expect("Failed to load echo");

    c.bench_function("invoke/echo", |b| {
        b.to_async(&runtime).iter(|| {
            let manager = Arc::clone(&manager);
            async move { manager.invoke("echo", serde_json::Value::Null).await }
        })
    });
}

criterion_group!(
    benches,
    bench_versions,
    bench_resolve,
    bench_resolve_closure,
    bench_invoke
);
criterion_main!(benches);
