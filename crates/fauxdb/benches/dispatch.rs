use bson::doc;
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use fauxdb::Dispatcher;

fn seed(dispatcher: &Dispatcher, n: usize) {
    let documents: Vec<bson::Bson> = (0..n)
        .map(|i| bson::Bson::Document(doc! { "_id": i as i64, "tag": if i % 2 == 0 { "even" } else { "odd" } }))
        .collect();
    dispatcher.dispatch(&doc! {
        "insert": "widgets",
        "documents": documents,
        "$db": "bench",
    });
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/insert");
    for n in [100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                Dispatcher::new,
                |dispatcher| seed(&dispatcher, n),
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/find");
    for n in [100, 1_000] {
        let dispatcher = Dispatcher::new();
        seed(&dispatcher, n);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                dispatcher.dispatch(&doc! {
                    "find": "widgets",
                    "filter": { "tag": "even" },
                    "$db": "bench",
                })
            })
        });
    }
    group.finish();
}

fn bench_aggregate_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/aggregate_group");
    for n in [100, 1_000] {
        let dispatcher = Dispatcher::new();
        seed(&dispatcher, n);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                dispatcher.dispatch(&doc! {
                    "aggregate": "widgets",
                    "pipeline": [
                        { "$group": { "_id": "$tag", "count": { "$sum": 1 } } },
                    ],
                    "cursor": {},
                    "$db": "bench",
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_find, bench_aggregate_group);
criterion_main!(benches);
