use bson::doc;
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use fauxdb_bson::Collation;
use fauxdb_query::parse_filter;
use fauxdb_store::CollectionStore;

fn seeded_docs(n: usize) -> Vec<bson::Document> {
    (0..n)
        .map(|i| doc! { "seq": i as i64, "tag": if i % 2 == 0 { "even" } else { "odd" } })
        .collect()
}

fn seeded_store(n: usize) -> CollectionStore {
    let mut store = CollectionStore::new();
    store.insert_many(seeded_docs(n)).unwrap();
    store
}

fn bench_insert_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection/insert_many");
    for n in [100, 1_000] {
        let docs = seeded_docs(n);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter_batched(
                || (CollectionStore::new(), docs.clone()),
                |(mut store, docs)| {
                    store.insert_many(docs).unwrap();
                },
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection/find");
    for n in [100, 1_000] {
        let store = seeded_store(n);
        let filter = parse_filter(&doc! { "tag": "even" }).unwrap();
        let collation = Collation::simple();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| store.find(&filter, &collation).len())
        });
    }
    group.finish();
}

fn bench_update_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection/update_many");
    for n in [100, 1_000] {
        let filter = parse_filter(&doc! { "tag": "even" }).unwrap();
        let mutation = fauxdb_query::parse_update(&doc! { "$inc": { "seq": 1 } }).unwrap();
        let collation = Collation::simple();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter_batched(
                || seeded_store(n),
                |mut store| {
                    store
                        .update(&filter, &mutation, &[], &collation, true, false)
                        .unwrap();
                },
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert_many, bench_find, bench_update_many);
criterion_main!(benches);
