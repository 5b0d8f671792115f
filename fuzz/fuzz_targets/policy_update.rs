#![no_main]
use libfuzzer_sys::fuzz_target;
use smdp_learn::{PolicyUpdate, StateReward, UpdateParams};

const METHODS: [PolicyUpdate; 5] = [
    PolicyUpdate::Count,
    PolicyUpdate::CompleteCount,
    PolicyUpdate::Success,
    PolicyUpdate::Epsilon,
    PolicyUpdate::EpsilonCount,
];

// Layout: history, epsilon, then (weight, sat, nsat) per choice.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 + 2 * 3 {
        return;
    }
    let params = UpdateParams {
        history: data[0] as f64 / 255.0,
        epsilon: data[1] as f64 / 255.0,
    };
    let choices: Vec<&[u8]> = data[2..].chunks_exact(3).take(16).collect();
    let weights: Vec<f64> = choices.iter().map(|c| c[0] as f64 + 1.0).collect();
    let total: f64 = weights.iter().sum();
    let old: Vec<f64> = weights.iter().map(|w| w / total).collect();

    let rewards = StateReward::new(choices.len());
    for (i, c) in choices.iter().enumerate() {
        if let Some(r) = rewards.get(i) {
            r.add(true, c[1] as u64);
            r.add(false, c[2] as u64);
        }
    }

    for method in METHODS {
        if let Some(next) = method.update_state(&old, &rewards, &params) {
            assert_eq!(next.len(), old.len());
            let sum: f64 = next.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{} sums to {}", method, sum);
            assert!(next.iter().all(|p| (0.0..=1.0 + 1e-12).contains(p)));
        }
    }
});
