//! Query merge and read throughput.
//!
//! Run with:
//! ```sh
//! cargo bench --bench query
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use taglog_core::{
    Criterion as QueryCriterion, Event, EventData, EventId, EventStore, EventType, EventTypes,
    InMemoryEventStore, Query, ReadOptions, Tags,
};

const LOG_SIZES: &[usize] = &[1_000, 10_000, 100_000];

fn criterion_for(i: usize) -> QueryCriterion {
    let types = EventTypes::try_from_strings([format!("Type{}", i % 7)]).expect("types");
    let tags = Tags::try_from_strings([format!("entity:{}", i % 13)]).expect("tags");
    QueryCriterion::new(Some(types), Some(tags), false).expect("criterion")
}

fn query_of(width: usize, offset: usize) -> Query {
    Query::from_criteria((0..width).map(|i| criterion_for(i + offset)).collect())
}

fn populated_store(len: usize) -> InMemoryEventStore {
    let mut store = InMemoryEventStore::new();
    for i in 0..len {
        let event = Event::new(
            EventId::new(format!("evt-{i}")).expect("id"),
            EventType::new(format!("Type{}", i % 7)).expect("type"),
            EventData::new(r#"{"n":1}"#),
        )
        .with_tags(Tags::try_from_strings([format!("entity:{}", i % 101)]).expect("tags"));
        store.append(event.into(), None).expect("append");
    }
    store
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("query.merge");

    for width in [1_usize, 8, 64] {
        let left = query_of(width, 0);
        let right = query_of(width, width / 2);
        group.throughput(Throughput::Elements(width as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| black_box(left.merge(&right)));
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("store.read");
    let query = Query::for_tags(Tags::try_from_strings(["entity:7"]).expect("tags")).expect("query");
    let last = Query::from(
        QueryCriterion::of_types(EventTypes::try_from_strings(["Type3"]).expect("types"))
            .expect("criterion")
            .only_last_event(),
    );

    for &len in LOG_SIZES {
        let store = populated_store(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("forwards", len), &store, |b, store| {
            b.iter(|| black_box(store.read(&query, ReadOptions::forwards()).count()));
        });
        group.bench_with_input(BenchmarkId::new("highest_matching", len), &store, |b, store| {
            b.iter(|| black_box(store.highest_matching(&query)));
        });
        group.bench_with_input(BenchmarkId::new("only_last_event", len), &store, |b, store| {
            b.iter(|| black_box(store.read(&last, ReadOptions::forwards()).count()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge, bench_read);
criterion_main!(benches);
