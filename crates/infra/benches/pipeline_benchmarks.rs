use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use ratingflow_core::EntityId;
use ratingflow_events::{EnrichedRecord, MetadataRecord, RatingEvent};
use ratingflow_infra::config::{FanoutConfig, OverflowPolicy, TopologyConfig};
use ratingflow_infra::fanout::FanoutPublisher;
use ratingflow_infra::pipeline::RatingPipeline;
use ratingflow_infra::projections::RatedMoviesView;
use ratingflow_infra::read_model::EnrichedTable;
use ratingflow_ratings::KeyedAggregator;

const KEYS: i64 = 1_000;

fn catalogued_pipeline() -> RatingPipeline {
    let view = Arc::new(RatedMoviesView::new("bench-store", Arc::new(EnrichedTable::new())));
    let pipeline = RatingPipeline::new(TopologyConfig::default()).with_enriched_sink(view);
    for id in 0..KEYS {
        pipeline
            .ingest_metadata(MetadataRecord::new(id, 2000, format!("movie-{id}")))
            .unwrap();
    }
    pipeline
}

/// Aggregation alone: one map update per rating.
fn bench_aggregator_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator_apply");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hot_key", |b| {
        let agg = KeyedAggregator::new();
        b.iter(|| agg.apply(&RatingEvent::new(1, black_box(4.0))).unwrap());
    });

    group.bench_function("spread_keys", |b| {
        let agg = KeyedAggregator::new();
        let mut n = 0i64;
        b.iter(|| {
            n = (n + 1) % KEYS;
            agg.apply(&RatingEvent::new(n, black_box(3.5))).unwrap()
        });
    });

    group.finish();
}

/// Full per-rating path: aggregate, upsert, join, emit to the view.
fn bench_ingest_rating(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_rating");
    group.throughput(Throughput::Elements(1));

    group.bench_function("with_metadata", |b| {
        let pipeline = catalogued_pipeline();
        let mut n = 0i64;
        b.iter(|| {
            n = (n + 1) % KEYS;
            pipeline.ingest_rating(RatingEvent::new(n, black_box(2.0))).unwrap()
        });
    });

    group.bench_function("without_metadata", |b| {
        let pipeline = RatingPipeline::new(TopologyConfig::default());
        let mut n = 0i64;
        b.iter(|| {
            n = (n + 1) % KEYS;
            pipeline.ingest_rating(RatingEvent::new(n, black_box(2.0))).unwrap()
        });
    });

    group.finish();
}

/// Parallel producers over disjoint and shared keys.
fn bench_concurrent_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_ingest");
    let per_thread = 2_000u64;

    for threads in [1usize, 2, 4, 8] {
        group.throughput(Throughput::Elements(per_thread * threads as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pipeline = Arc::new(catalogued_pipeline());
            b.iter(|| {
                std::thread::scope(|s| {
                    for t in 0..threads {
                        let pipeline = &pipeline;
                        s.spawn(move || {
                            for i in 0..per_thread as i64 {
                                let key = (i * threads as i64 + t as i64) % KEYS;
                                pipeline.ingest_rating(RatingEvent::new(key, 3.0)).unwrap();
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

/// Publish cost against a growing number of idle subscribers.
fn bench_fanout_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout_publish");
    let record = EnrichedRecord {
        entity_id: EntityId::new(1),
        release_year: 1999,
        title: "movie-1".to_string(),
        average: 4.0,
    };

    for subscribers in [1usize, 16, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let publisher = FanoutPublisher::new(FanoutConfig {
                    capacity: 64,
                    overflow: OverflowPolicy::DropOldest,
                });
                let _subs: Vec<_> = (0..subscribers).map(|_| publisher.subscribe()).collect();
                b.iter(|| publisher.publish(black_box(&record)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_aggregator_apply,
    bench_ingest_rating,
    bench_concurrent_ingest,
    bench_fanout_publish
);
criterion_main!(benches);
