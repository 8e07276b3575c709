//! GC Performance Benchmarks
//!
//! Measures collection pauses and allocation throughput.
//!
//! Run with: `cargo bench -p keel-core gc`

use std::hint::black_box;
use std::rc::Rc;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keel_core::builtins::{Builtins, array_push};
use keel_core::{Runtime, TypeBehavior, TypeRef, Value};

struct Node;

impl TypeBehavior for Node {}

fn create_runtime() -> (Runtime, TypeRef) {
    let mut rt = Runtime::new();
    let node = rt
        .register_type("Node", None, 16, Rc::new(Node))
        .expect("register Node");
    (rt, node)
}

/// Collection pause with half the heap live
fn gc_pause_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_pause");

    for num_objects in [100, 1000, 5000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("objects", num_objects),
            num_objects,
            |b, &n| {
                b.iter_custom(|iters| {
                    let mut total_duration = Duration::ZERO;

                    for _ in 0..iters {
                        let (mut rt, node) = create_runtime();
                        let root = rt.allocate_with(node, &[]).unwrap();
                        rt.lock(root).unwrap();
                        for i in 0..n {
                            let object = rt.allocate_with(node, &[]).unwrap();
                            rt.store(object, 0, Value::Int32(i as i32)).unwrap();
                            // Even-indexed objects stay reachable from the root
                            if i % 2 == 0 {
                                rt.store(root, i / 2, Value::Object(object)).unwrap();
                            }
                        }

                        let start = Instant::now();
                        rt.collect().unwrap();
                        total_duration += start.elapsed();

                        black_box(rt.live_objects());
                    }

                    total_duration
                });
            },
        );
    }

    group.finish();
}

fn allocation_throughput_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_throughput");

    group.bench_function("plain_objects_1000", |b| {
        b.iter(|| {
            let (mut rt, node) = create_runtime();
            for _ in 0..1000 {
                black_box(rt.allocate_with(node, &[]).unwrap());
            }
        });
    });

    group.bench_function("array_elements_1000", |b| {
        b.iter(|| {
            let mut rt = Runtime::new();
            let builtins = Builtins::install(&mut rt).unwrap();
            let array = builtins.new_array(&mut rt).unwrap();
            for i in 0..1000 {
                array_push(&mut rt, array, Value::Int64(i)).unwrap();
            }
            black_box(array);
        });
    });

    group.finish();
}

fn gc_circular_refs_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_circular");

    group.bench_function("cycles_100", |b| {
        b.iter_custom(|iters| {
            let mut total_duration = Duration::ZERO;

            for _ in 0..iters {
                let (mut rt, node) = create_runtime();
                for _ in 0..100 {
                    let first = rt.allocate_with(node, &[]).unwrap();
                    let second = rt.allocate_with(node, &[]).unwrap();
                    rt.store(first, 0, Value::Object(second)).unwrap();
                    rt.store(second, 0, Value::Object(first)).unwrap();
                }

                let start = Instant::now();
                rt.collect().unwrap();
                total_duration += start.elapsed();
            }

            total_duration
        });
    });

    group.bench_function("self_refs_100", |b| {
        b.iter_custom(|iters| {
            let mut total_duration = Duration::ZERO;

            for _ in 0..iters {
                let (mut rt, node) = create_runtime();
                for _ in 0..100 {
                    let object = rt.allocate_with(node, &[]).unwrap();
                    rt.store(object, 0, Value::Object(object)).unwrap();
                }

                let start = Instant::now();
                rt.collect().unwrap();
                total_duration += start.elapsed();
            }

            total_duration
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    gc_pause_benchmark,
    allocation_throughput_benchmark,
    gc_circular_refs_benchmark
);
criterion_main!(benches);
