//! Criterion benchmarks for the phalanx index service.
//!
//! Covers the shared-reader search path, concurrent searches against one
//! cached reader, and batched update application.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use phalanx::config::ServiceConfig;
use phalanx::engine::memory::MemoryEngine;
use phalanx::engine::query::Query;
use phalanx::plugin::IndexPlugin;
use phalanx::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
use phalanx::search::SearchMode;
use phalanx::service::IndexService;
use serde_json::{Value, json};
use tempfile::TempDir;

const WORDS: &[&str] = &[
    "search", "engine", "index", "query", "document", "field", "term", "reader", "writer",
    "optimize", "buffer", "queue", "thread", "lock", "segment", "merge",
];

/// Generate test objects for benchmarking.
fn generate_objects(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let length = 20 + (i % 30);
            let body: Vec<&str> = (0..length)
                .map(|j| WORDS[(i * 7 + j * 13) % WORDS.len()])
                .collect();
            json!({"id": i, "body": body.join(" ")})
        })
        .collect()
}

fn start_service(config: ServiceConfig, objects: &[Value]) -> IndexService {
    let store = Arc::new(JsonObjectStore::new());
    for object in objects {
        if let Some(id) = object.get("id").and_then(Value::as_u64) {
            store.put(id, object.clone());
        }
    }
    let plugin: Arc<dyn IndexPlugin> = Arc::new(JsonDocumentPlugin::new("bench", store));
    IndexService::initialize(
        config.with_callback_threads(2),
        Arc::new(MemoryEngine::new()),
        vec![plugin],
    )
    .unwrap()
}

/// Benchmark searches through the cached reader.
fn bench_shared_reader_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_reader_search");
    let dir = TempDir::new().unwrap();
    let service = start_service(ServiceConfig::new(dir.path()), &generate_objects(2000));
    let query = Query::term("Gtext", "optimize");

    group.bench_function("count_asynchronous", |b| {
        b.iter(|| black_box(service.count("bench", black_box(&query)).unwrap()))
    });

    group.bench_function("page_of_rows", |b| {
        b.iter(|| black_box(service.search("bench", "reader writer", 0, 20, 3).unwrap()))
    });

    group.throughput(Throughput::Elements(8));
    group.bench_function("concurrent_counts", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| black_box(service.count("bench", &query).unwrap()));
                }
            })
        })
    });

    group.finish();
}

/// Benchmark synchronous searches that queue behind writes.
fn bench_synchronous_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("synchronous_search");
    let dir = TempDir::new().unwrap();
    let config = ServiceConfig::new(dir.path()).with_update_buffer(50, Default::default());
    let service = start_service(config, &generate_objects(500));

    group.bench_function("through_update_queue", |b| {
        b.iter(|| {
            service
                .do_index_query_op(
                    "bench",
                    Query::term("Gtext", "queue"),
                    SearchMode::Synchronous,
                    |_, _, _, hits| Ok(hits.len()),
                )
                .unwrap()
        })
    });

    group.finish();
}

/// Benchmark applying a buffer of updates as one batch.
fn bench_batched_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_updates");
    group.sample_size(20);
    let objects = generate_objects(100);

    group.throughput(Throughput::Elements(objects.len() as u64));
    group.bench_function("buffer_of_100", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let config = ServiceConfig::new(dir.path()).with_update_buffer(1000, Default::default());
                let service = start_service(config, &[]);
                (dir, service)
            },
            |(dir, service)| {
                for object in &objects {
                    service.index_object("bench", object.clone()).unwrap();
                }
                service.finish();
                drop(dir);
            },
            BatchSize::PerIteration,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_shared_reader_search,
    bench_synchronous_search,
    bench_batched_updates
);

criterion_main!(benches);
