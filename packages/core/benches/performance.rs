//! Performance benchmarks for Inkdesk catalog operations
//!
//! Run with: `cargo bench -p inkdesk-core`
//!
//! These benchmarks measure critical path performance:
//! - Projection of large catalogs (pure, in memory)
//! - In-memory move throughput on a `CatalogGraph`
//! - Transactional `move_after` round trips through libsql

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inkdesk_core::db::{DatabaseService, TursoStore};
use inkdesk_core::models::{NodeType, TreeNode};
use inkdesk_core::services::CatalogService;
use inkdesk_core::tree::{project, CatalogGraph};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Build a graph of `folders` root folders with `per_folder` documents each
fn build_graph(folders: usize, per_folder: usize) -> (CatalogGraph, Vec<String>) {
    let mut graph = CatalogGraph::new();
    let mut ids = Vec::with_capacity(folders * (per_folder + 1));
    for f in 0..folders {
        let folder = TreeNode::new("bench", NodeType::Folder, format!("Folder {}", f));
        let folder_id = folder.id.clone();
        graph.insert_front(folder, None).unwrap();
        ids.push(folder_id.clone());
        for d in 0..per_folder {
            let doc = TreeNode::new("bench", NodeType::Document, format!("Doc {}.{}", f, d));
            ids.push(doc.id.clone());
            graph.insert_front(doc, Some(&folder_id)).unwrap();
        }
    }
    graph.take_changes();
    (graph, ids)
}

/// Setup a catalog service with a fresh database
async fn setup_test_service() -> (CatalogService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bench.db");

    let db = DatabaseService::new(db_path).await.unwrap();
    let service = CatalogService::new(Arc::new(TursoStore::new(Arc::new(db))));
    (service, temp_dir)
}

/// Benchmark projection of catalogs of increasing size
///
/// Target: 10k rows flattened in well under 10ms
fn bench_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection");
    for (folders, per_folder) in [(10, 10), (100, 10), (100, 100)] {
        let (graph, _) = build_graph(folders, per_folder);
        let nodes = graph.into_nodes();
        group.bench_with_input(
            BenchmarkId::from_parameter(nodes.len()),
            &nodes,
            |b, nodes| b.iter(|| black_box(project(nodes).unwrap())),
        );
    }
    group.finish();
}

/// Benchmark in-memory moves
///
/// A move is a constant number of pointer rewrites, so cost should not grow
/// with the size of the sibling list.
fn bench_graph_moves(c: &mut Criterion) {
    let (mut graph, ids) = build_graph(100, 100);
    let mut i = 0usize;

    c.bench_function("graph_move_after", |b| {
        b.iter(|| {
            let node = &ids[(i * 7919) % ids.len()];
            let after = &ids[(i * 104729 + 1) % ids.len()];
            i += 1;
            let _ = black_box(graph.move_after(node, after));
            graph.take_changes();
        })
    });
}

/// Benchmark transactional moves through the service
///
/// Measures the full load-edit-write-project cycle for one `move_after`.
fn bench_service_moves(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("service");
    group.sample_size(10);

    group.bench_function("move_after_200_nodes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (service, _temp) = setup_test_service().await;
                let book = service.create_book("Bench").await.unwrap();
                let mut ids = Vec::new();
                for _ in 0..200 {
                    let node = service
                        .create_node(&book.id, NodeType::Document, None)
                        .await
                        .unwrap();
                    ids.push(node.id);
                }

                let start = std::time::Instant::now();
                for i in 0..iters as usize {
                    let node = &ids[i % ids.len()];
                    let after = &ids[(i + 100) % ids.len()];
                    black_box(service.move_after(&book.id, node, after).await.unwrap());
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_projection,
    bench_graph_moves,
    bench_service_moves
);
criterion_main!(benches);
