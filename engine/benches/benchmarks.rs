//! Performance benchmarks for pakhuis-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pakhuis_engine::{
    mutation, patch, Document, IndexedField, JsonPointer, Query, Reconciler, SearchIndex,
    SyncPoint,
};
use serde_json::{json, Value};

fn ptr(s: &str) -> JsonPointer {
    JsonPointer::parse(s).unwrap()
}

fn sample_body(i: usize) -> Value {
    json!({
        "title": format!("Task {}", i),
        "status": if i % 3 == 0 { "done" } else { "open" },
        "owner": format!("user_{}", i % 10),
        "tags": ["work", format!("t{}", i % 5)],
        "meta": {"priority": i % 4, "estimate": i}
    })
}

fn sample_index(count: usize) -> SearchIndex {
    let mut index = SearchIndex::new(vec![
        IndexedField::eq(ptr("/status")),
        IndexedField::eq(ptr("/owner")),
        IndexedField::in_list(ptr("/tags")),
    ]);
    for i in 0..count {
        index.update(&Document::new(format!("doc_{}", i), sample_body(i), 1000));
    }
    index
}

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutations");

    group.bench_function("plan_create", |b| {
        b.iter(|| mutation::plan_create(None, black_box("doc_1"), sample_body(1), 1000))
    });

    let doc = Document::new("doc_1", sample_body(1), 1000);
    group.bench_function("plan_put", |b| {
        b.iter(|| mutation::plan_put(Some(&doc), "doc_1", black_box(sample_body(2)), None, 2000))
    });

    group.finish();
}

fn bench_patches(c: &mut Criterion) {
    let mut group = c.benchmark_group("patches");

    let old = sample_body(1);
    let new = sample_body(2);
    group.bench_function("diff", |b| b.iter(|| patch::diff(black_box(&old), black_box(&new))));

    let diff = patch::diff(&old, &new);
    group.bench_function("apply", |b| b.iter(|| diff.apply(black_box(&old))));

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [100, 1000, 10000].iter() {
        let index = sample_index(*size);
        let query = Query::new()
            .equals(ptr("/status"), json!("open"))
            .equals(ptr("/owner"), json!("user_3"));
        group.bench_with_input(BenchmarkId::new("search", size), size, |b, _| {
            b.iter(|| index.search(black_box(&query)))
        });
    }

    for size in [100, 1000].iter() {
        let docs: Vec<Document> = (0..*size)
            .map(|i| Document::new(format!("doc_{}", i), sample_body(i), 1000))
            .collect();
        group.bench_with_input(BenchmarkId::new("rebuild", size), size, |b, _| {
            b.iter(|| {
                let mut index = sample_index(0);
                index.rebuild(black_box(&docs));
                index
            })
        });
    }

    let mut index = sample_index(1000);
    let mut doc = Document::new("doc_5", sample_body(5), 1000);
    group.bench_function("update", |b| {
        b.iter(|| {
            doc.update_body(sample_body(doc.revision as usize), 2000);
            index.update(black_box(&doc));
        })
    });

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    let base = Document {
        sync: Some(SyncPoint {
            peer: "node2".into(),
            peer_revision: 1,
            local_revision: 1,
        }),
        ..Document::new("doc_1", sample_body(1), 1000)
    };
    let local = mutation::plan_put(Some(&base), "doc_1", sample_body(2), None, 2000)
        .unwrap()
        .document;
    let entry = mutation::plan_put(Some(&base), "doc_1", sample_body(3), None, 3000)
        .unwrap()
        .change
        .into_entry(1);
    let reconciler = Reconciler::new("node1", "node2");

    group.bench_function("apply_clean", |b| {
        b.iter(|| reconciler.reconcile(Some(black_box(&base)), &entry, 4000))
    });
    group.bench_function("resolve_conflict", |b| {
        b.iter(|| reconciler.reconcile(Some(black_box(&local)), &entry, 4000))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_mutations,
    bench_patches,
    bench_index,
    bench_reconciliation
);
criterion_main!(benches);
