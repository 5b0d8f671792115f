//! Criterion benchmarks for learning blocks.
//!
//! Run with: cargo bench -p smdp-learn

use criterion::{criterion_group, criterion_main, Criterion};
use smdp_learn::{Coordinator, LearnConfig, PolicyUpdate, RewardAttribution};
use smdp_model::models::{MutexModel, RandomWalkModel};
use smdp_model::{BoundedReachability, BoundedSafety};

fn bench_mutex(c: &mut Criterion, name: &str, config: LearnConfig) {
    c.bench_function(name, |b| {
        b.iter(|| {
            let model = MutexModel::new(4, 1);
            let property =
                BoundedReachability::new(30, |s| MutexModel::critical_count(s) > 0);
            let mut coordinator = Coordinator::new(model, property, config.clone()).unwrap();
            coordinator.start().unwrap();
            coordinator
                .learn(config.traces_per_block, config.num_blocks)
                .unwrap();
            coordinator.stop();
        })
    });
}

fn benchmarks(c: &mut Criterion) {
    let single = LearnConfig {
        num_threads: 1,
        traces_per_block: 500,
        num_blocks: 4,
        seed: Some(1),
        ..Default::default()
    };
    let parallel = LearnConfig {
        num_threads: 4,
        ..single.clone()
    };

    bench_mutex(c, "mutex4_count_1t", single.clone());
    bench_mutex(c, "mutex4_count_4t", parallel.clone());
    bench_mutex(
        c,
        "mutex4_epcount_decay_4t",
        LearnConfig {
            policy_update: PolicyUpdate::EpsilonCount,
            reward: RewardAttribution::DEFAULT_DECAY,
            ..parallel
        },
    );

    c.bench_function("random_walk_learn_and_test", |b| {
        b.iter(|| {
            let model = RandomWalkModel::new(3, 8, 6, 3).unwrap();
            let property = BoundedSafety::new(40, |s| s.vars.iter().all(|&x| x < 8));
            let config = LearnConfig {
                min_traces: 100,
                ..single.clone()
            };
            let mut coordinator = Coordinator::new(model, property, config).unwrap();
            coordinator.run().unwrap();
        })
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
