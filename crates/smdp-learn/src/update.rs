//! Policy update strategies applied at the end of a learning block.

use crate::config::ConfigError;
use crate::policy::{Policy, StatePolicy};
use crate::reward::{RewardStore, StateReward};
use rayon::prelude::*;
use smdp_model::ModelState;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Strategy turning a block's rewards into new choice probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyUpdate {
    /// Normalised success rates blended with the old distribution.
    #[default]
    Count,
    /// Normalised `sat - nsat` scores, shifted to be positive.
    CompleteCount,
    /// Normalised success rates blended with the old distribution.
    Success,
    /// Greedy on the best success rate with `epsilon` spread over the rest.
    Epsilon,
    /// Epsilon-greedy target blended with the old distribution. Here the
    /// history weight applies to the target: `(1 - H) * old + H * target`.
    EpsilonCount,
}

/// Weights shared by all update strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    /// Weight of the old distribution (`H`).
    pub history: f64,
    pub epsilon: f64,
}

impl Default for UpdateParams {
    fn default() -> Self {
        Self {
            history: 0.5,
            epsilon: 0.1,
        }
    }
}

/// Success rate of every choice; untried choices keep their old probability.
fn estimates(old: &[f64], rewards: &StateReward) -> Vec<f64> {
    old.iter()
        .zip(rewards.iter())
        .map(|(&p, r)| r.success_rate().unwrap_or(p))
        .collect()
}

/// Lowest index holding the maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn blend(history: f64, old: &[f64], target: impl Iterator<Item = f64>) -> Vec<f64> {
    old.iter()
        .zip(target)
        .map(|(&o, t)| history * o + (1.0 - history) * t)
        .collect()
}

impl PolicyUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CompleteCount => "compcount",
            Self::Success => "success",
            Self::Epsilon => "epsilon",
            Self::EpsilonCount => "epcount",
        }
    }

    /// Update every state that has rewards. Returns how many entries changed.
    ///
    /// Must only run while no worker is simulating.
    pub fn update<S: ModelState>(
        &self,
        policy: &Policy<S>,
        rewards: &RewardStore<S>,
        params: &UpdateParams,
    ) -> usize {
        let changed = rewards
            .states()
            .par_iter()
            .filter(|entry| {
                let reward = entry.value();
                let mut state_policy = policy
                    .states()
                    .entry(entry.key().clone())
                    .or_insert_with(|| StatePolicy::uniform(reward.len()));
                let next = self.update_state(state_policy.probabilities(), reward, params);
                match next {
                    Some(next) => {
                        state_policy.set_probabilities(next);
                        true
                    }
                    None => false,
                }
            })
            .count();
        debug!(
            method = self.name(),
            states = rewards.len(),
            changed,
            "policy updated"
        );
        changed
    }

    /// New distribution for one state, `None` if the rewards leave it as is.
    pub fn update_state(
        &self,
        old: &[f64],
        rewards: &StateReward,
        params: &UpdateParams,
    ) -> Option<Vec<f64>> {
        assert_eq!(
            old.len(),
            rewards.len(),
            "policy and rewards disagree on the number of choices"
        );
        if rewards.total_trials() == 0 {
            return None;
        }
        let h = params.history;
        let eps = params.epsilon;

        match self {
            Self::Count => {
                let est = estimates(old, rewards);
                let norm: f64 = est.iter().sum();
                if norm == 0.0 {
                    return None;
                }
                Some(blend(h, old, est.iter().map(|e| e / norm)))
            }
            Self::CompleteCount => {
                let scores: Vec<i64> = rewards
                    .iter()
                    .map(|r| r.sat() as i64 - r.nsat() as i64)
                    .collect();
                let min = scores.iter().copied().min().unwrap_or(0);
                let shift = if min < 0 { 1 - min } else { 0 };
                let total: i64 = scores.iter().map(|s| s + shift).sum();
                if total == 0 {
                    return None;
                }
                Some(blend(
                    h,
                    old,
                    scores.iter().map(|s| (s + shift) as f64 / total as f64),
                ))
            }
            Self::Success => {
                let est = estimates(old, rewards);
                let norm: f64 = est.iter().sum();
                if norm == 0.0 {
                    return None;
                }
                Some(blend(h, old, est.into_iter().map(|e| e / norm)))
            }
            Self::Epsilon => {
                let n = old.len();
                if n < 2 {
                    return None;
                }
                let best = argmax(&estimates(old, rewards));
                let other = eps / (n - 1) as f64;
                Some(
                    (0..n)
                        .map(|i| if i == best { 1.0 - eps } else { other })
                        .collect(),
                )
            }
            Self::EpsilonCount => {
                let est = estimates(old, rewards);
                let norm: f64 = est.iter().sum();
                if norm == 0.0 {
                    return None;
                }
                let best = argmax(&est);
                let target = est.iter().enumerate().map(|(i, e)| {
                    let greedy = if i == best { 1.0 } else { 0.0 };
                    eps * (e / norm) + (1.0 - eps) * greedy
                });
                Some(blend(1.0 - h, old, target))
            }
        }
    }
}

impl fmt::Display for PolicyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyUpdate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "compcount" => Ok(Self::CompleteCount),
            "success" => Ok(Self::Success),
            "epsilon" => Ok(Self::Epsilon),
            "epcount" => Ok(Self::EpsilonCount),
            _ => Err(ConfigError::UnknownPolicyUpdate(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use smdp_model::State;

    const ALL: [PolicyUpdate; 5] = [
        PolicyUpdate::Count,
        PolicyUpdate::CompleteCount,
        PolicyUpdate::Success,
        PolicyUpdate::Epsilon,
        PolicyUpdate::EpsilonCount,
    ];

    fn rewards(counts: &[(u64, u64)]) -> StateReward {
        let r = StateReward::new(counts.len());
        for (i, &(sat, nsat)) in counts.iter().enumerate() {
            let c = r.get(i).unwrap();
            c.add(true, sat);
            c.add(false, nsat);
        }
        r
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_count() {
        let params = UpdateParams::default();
        let next = PolicyUpdate::Count
            .update_state(&[0.5, 0.5], &rewards(&[(3, 1), (1, 3)]), &params)
            .unwrap();
        // estimates 0.75/0.25, already normalised
        assert_close(&next, &[0.625, 0.375]);
    }

    #[test]
    fn test_complete_count_shifts_negative_scores() {
        let params = UpdateParams {
            history: 0.0,
            epsilon: 0.1,
        };
        let next = PolicyUpdate::CompleteCount
            .update_state(&[0.5, 0.5], &rewards(&[(4, 1), (0, 2)]), &params)
            .unwrap();
        // scores 3, -2 shifted by 3 to 6, 1
        assert_close(&next, &[6.0 / 7.0, 1.0 / 7.0]);
    }

    #[test]
    fn test_success_normalises_then_blends() {
        let params = UpdateParams::default();
        let next = PolicyUpdate::Success
            .update_state(&[0.5, 0.5], &rewards(&[(1, 0), (1, 3)]), &params)
            .unwrap();
        // estimates 1.0, 0.25 normalise to 0.8, 0.2
        assert_close(&next, &[0.65, 0.35]);

        let params = UpdateParams {
            history: 0.0,
            epsilon: 0.1,
        };
        let next = PolicyUpdate::Success
            .update_state(&[0.9, 0.1], &rewards(&[(1, 0), (1, 3)]), &params)
            .unwrap();
        assert_close(&next, &[0.8, 0.2]);

        let next = PolicyUpdate::Success
            .update_state(&[0.5, 0.5], &rewards(&[(1, 0), (1, 0)]), &params)
            .unwrap();
        assert_close(&next, &[0.5, 0.5]);
    }

    #[test]
    fn test_epsilon_greedy_ignores_history() {
        let params = UpdateParams {
            history: 0.9,
            epsilon: 0.2,
        };
        let next = PolicyUpdate::Epsilon
            .update_state(
                &[0.6, 0.2, 0.2],
                &rewards(&[(1, 3), (3, 1), (0, 0)]),
                &params,
            )
            .unwrap();
        assert_close(&next, &[0.1, 0.8, 0.1]);
    }

    #[test]
    fn test_epsilon_ties_go_to_lowest_index() {
        let params = UpdateParams::default();
        let next = PolicyUpdate::Epsilon
            .update_state(&[0.5, 0.5], &rewards(&[(1, 1), (2, 2)]), &params)
            .unwrap();
        assert_close(&next, &[0.9, 0.1]);
    }

    #[test]
    fn test_epsilon_count() {
        let params = UpdateParams {
            history: 0.5,
            epsilon: 0.1,
        };
        let next = PolicyUpdate::EpsilonCount
            .update_state(&[0.5, 0.5], &rewards(&[(3, 1), (1, 3)]), &params)
            .unwrap();
        // target 0.1*0.75 + 0.9 = 0.975 and 0.1*0.25 = 0.025
        assert_close(&next, &[0.7375, 0.2625]);
    }

    #[test]
    fn test_epsilon_count_history_weights_the_target() {
        let params = UpdateParams {
            history: 0.2,
            epsilon: 0.1,
        };
        let next = PolicyUpdate::EpsilonCount
            .update_state(&[0.5, 0.5], &rewards(&[(3, 1), (1, 3)]), &params)
            .unwrap();
        // 0.8 * old + 0.2 * target
        assert_close(&next, &[0.595, 0.405]);
    }

    #[test]
    fn test_untried_state_is_unchanged() {
        let params = UpdateParams::default();
        for method in ALL {
            assert_eq!(
                method.update_state(&[0.3, 0.7], &rewards(&[(0, 0), (0, 0)]), &params),
                None,
                "{}",
                method
            );
        }
    }

    #[test]
    fn test_zero_normaliser_is_unchanged() {
        let params = UpdateParams::default();
        let all_failed = rewards(&[(0, 4), (0, 1)]);
        assert_eq!(
            PolicyUpdate::Count.update_state(&[0.5, 0.5], &all_failed, &params),
            None
        );
        assert_eq!(
            PolicyUpdate::EpsilonCount.update_state(&[0.5, 0.5], &all_failed, &params),
            None
        );
        let balanced = rewards(&[(2, 2), (1, 1)]);
        assert_eq!(
            PolicyUpdate::CompleteCount.update_state(&[0.5, 0.5], &balanced, &params),
            None
        );
    }

    #[test]
    #[should_panic(expected = "number of choices")]
    fn test_length_mismatch_panics() {
        let params = UpdateParams::default();
        PolicyUpdate::Count.update_state(&[1.0], &rewards(&[(1, 0), (0, 1)]), &params);
    }

    #[test]
    fn test_update_store() {
        let policy = Policy::new();
        let store = RewardStore::new();
        let a = State::new(vec![0]);
        let b = State::new(vec![1]);
        policy.initialise(&a, 2);
        policy.initialise(&b, 2);
        store.add(&a, 2, 0, true, 1);
        store.add(&a, 2, 1, false, 1);
        store.add(&b, 2, 0, false, 1);
        store.add(&b, 2, 1, false, 1);

        let changed = PolicyUpdate::Count.update(&policy, &store, &UpdateParams::default());
        assert_eq!(changed, 1);
        assert_close(policy.get(&a).unwrap().probabilities(), &[0.75, 0.25]);
        assert_close(policy.get(&b).unwrap().probabilities(), &[0.5, 0.5]);
    }

    #[test]
    fn test_parse_names() {
        for method in ALL {
            assert_eq!(method.name().parse::<PolicyUpdate>().unwrap(), method);
        }
        assert!(matches!(
            "greedy".parse::<PolicyUpdate>(),
            Err(ConfigError::UnknownPolicyUpdate(_))
        ));
    }

    fn distribution() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0.01f64..1.0, 2..6).prop_map(|w| {
            let total: f64 = w.iter().sum();
            w.into_iter().map(|x| x / total).collect()
        })
    }

    proptest! {
        #[test]
        fn prop_updates_preserve_distribution(
            old in distribution(),
            counts in prop::collection::vec((0u64..50, 0u64..50), 6),
            history in 0.0f64..=1.0,
            epsilon in 0.0f64..=1.0,
        ) {
            let params = UpdateParams { history, epsilon };
            let r = rewards(&counts[..old.len()]);
            for method in ALL {
                let next = method
                    .update_state(&old, &r, &params)
                    .unwrap_or_else(|| old.clone());
                prop_assert_eq!(next.len(), old.len());
                let sum: f64 = next.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-9, "{} sums to {}", method, sum);
                prop_assert!(next.iter().all(|p| *p >= 0.0 && *p <= 1.0 + 1e-12));
            }
        }
    }
}
