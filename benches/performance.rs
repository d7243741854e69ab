//! Performance benchmarks for the tracking engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use topic_tracker::{
    CategoryInfo, ChannelDescriptor, ChannelMessage, NotificationLevel, Scope, TopicId, TopicState,
    TopicTracker, TrackerConfig, UserId,
};

fn create_tracker(topics: u64) -> TopicTracker {
    let tracker = TopicTracker::new(TrackerConfig {
        categories: (1..=10)
            .map(CategoryInfo::root)
            .chain((11..=40).map(|id| CategoryInfo::child(id, id % 10 + 1)))
            .collect(),
        ..TrackerConfig::for_viewer(1)
    })
    .unwrap();

    let records = (1..=topics)
        .map(|id| {
            let state = TopicState::new(TopicId(id), 20)
                .with_category(topic_tracker::CategoryId(id % 40 + 1))
                .with_tags([format!("tag-{}", id % 25)]);
            match id % 3 {
                0 => state.with_last_read(10).with_level(NotificationLevel::Tracking),
                1 => state.created_in_new_period(true),
                _ => state.with_last_read(20),
            }
        })
        .collect();
    tracker.load_states(records);
    tracker
}

/// Benchmark counting a scope over stores of varying size
fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for topics in [100, 1_000, 10_000] {
        let tracker = create_tracker(topics);
        group.bench_with_input(BenchmarkId::new("category_tree", topics), &tracker, |b, tracker| {
            let scope = Scope::category(3);
            b.iter(|| black_box(tracker.count(&scope)));
        });
        group.bench_with_input(BenchmarkId::new("tag", topics), &tracker, |b, tracker| {
            let scope = Scope::tag("tag-7");
            b.iter(|| black_box(tracker.count(&scope)));
        });
    }

    group.finish();
}

/// Benchmark event ingest with a realistic number of registered scopes
fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for callbacks in [0, 10, 100] {
        group.bench_with_input(BenchmarkId::new("callbacks", callbacks), &callbacks, |b, &callbacks| {
            let tracker = create_tracker(5_000);
            let _handles: Vec<_> = (0..callbacks)
                .map(|i| tracker.register(Scope::category(i % 40 + 1), |_, counts| {
                    black_box(counts);
                }))
                .collect();

            let channel = ChannelDescriptor::PerUser(UserId(1));
            let mut message_id = 0i64;
            b.iter(|| {
                message_id += 1;
                let topic = message_id as u64 % 5_000 + 1;
                let message = ChannelMessage::new(
                    &channel,
                    message_id,
                    json!({
                        "message_type": "unread",
                        "topic_id": topic,
                        "payload": {
                            "highest_post_number": 20 + message_id,
                            "last_read_post_number": 10,
                            "notification_level": 2
                        }
                    }),
                );
                black_box(tracker.deliver(&message));
            });
        });
    }

    group.finish();
}

/// Benchmark a full dismiss of a large scope
fn bench_dismiss(c: &mut Criterion) {
    c.bench_function("dismiss_everything_5000", |b| {
        b.iter_with_setup(
            || create_tracker(5_000),
            |tracker| black_box(tracker.dismiss(&Scope::Everything)),
        );
    });
}

criterion_group!(benches, bench_aggregation, bench_ingest, bench_dismiss);
criterion_main!(benches);
