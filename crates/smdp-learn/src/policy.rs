//! Stochastic scheduler store and its deterministic overlay.

use crate::StateMap;
use smdp_model::ModelState;
use std::collections::HashMap;

/// Probability distribution over the choices of one state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePolicy {
    probabilities: Vec<f64>,
}

impl StatePolicy {
    /// `1/n` for each of `n` choices.
    pub fn uniform(num_choices: usize) -> Self {
        let p = 1.0 / num_choices as f64;
        Self {
            probabilities: vec![p; num_choices],
        }
    }

    pub fn from_probabilities(probabilities: Vec<f64>) -> Self {
        Self { probabilities }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    pub fn probability(&self, choice: usize) -> Option<f64> {
        self.probabilities.get(choice).copied()
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub(crate) fn set_probabilities(&mut self, probabilities: Vec<f64>) {
        assert_eq!(
            probabilities.len(),
            self.probabilities.len(),
            "policy update changed the number of choices"
        );
        self.probabilities = probabilities;
    }

    /// Smallest index whose cumulative probability exceeds `x`.
    ///
    /// When rounding leaves the total at or below `x` the last index is
    /// returned.
    pub fn index_by_probability_sum(&self, x: f64) -> usize {
        let mut acc = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            acc += p;
            if acc > x {
                return i;
            }
        }
        self.probabilities.len().saturating_sub(1)
    }

    /// Index of the most likely choice, lowest index on ties.
    pub fn most_likely(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = i;
            }
        }
        best
    }
}

/// Learned stochastic scheduler, shared by all workers.
///
/// States get a uniform distribution the first time any worker resolves a
/// choice in them. Afterwards entries change only through policy updates,
/// which run while no worker is simulating.
pub struct Policy<S: ModelState> {
    states: StateMap<S, StatePolicy>,
}

impl<S: ModelState> Default for Policy<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelState> Policy<S> {
    pub fn new() -> Self {
        Self {
            states: StateMap::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: StateMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
        }
    }

    /// Give `state` a uniform distribution over `num_choices` unless it
    /// already has one. Returns true if this call created the entry.
    pub fn initialise(&self, state: &S, num_choices: usize) -> bool {
        use dashmap::mapref::entry::Entry;
        if self.states.contains_key(state) {
            return false;
        }
        match self.states.entry(state.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(StatePolicy::uniform(num_choices));
                true
            }
        }
    }

    #[inline]
    pub fn contains(&self, state: &S) -> bool {
        self.states.contains_key(state)
    }

    /// Snapshot of the distribution at `state`.
    pub fn get(&self, state: &S) -> Option<StatePolicy> {
        self.states.get(state).map(|entry| entry.value().clone())
    }

    pub fn probability(&self, state: &S, choice: usize) -> Option<f64> {
        self.states
            .get(state)
            .and_then(|entry| entry.probability(choice))
    }

    /// Sample a choice at `state` by inverse CDF with `x` in `[0, 1)`.
    pub fn index_by_probability_sum(&self, state: &S, x: f64) -> Option<usize> {
        self.states
            .get(state)
            .map(|entry| entry.index_by_probability_sum(x))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Pick the most likely choice of every known state.
    pub fn determinise(&self) -> DeterministicPolicy<S> {
        let mut choices =
            HashMap::with_capacity_and_hasher(self.states.len(), ahash::RandomState::new());
        for entry in self.states.iter() {
            choices.insert(entry.key().clone(), entry.value().most_likely());
        }
        DeterministicPolicy { choices }
    }

    pub(crate) fn states(&self) -> &StateMap<S, StatePolicy> {
        &self.states
    }
}

/// Memoryless deterministic scheduler derived from a [`Policy`].
///
/// Read-only once built; workers share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeterministicPolicy<S: ModelState> {
    choices: HashMap<S, usize, ahash::RandomState>,
}

impl<S: ModelState> DeterministicPolicy<S> {
    pub fn choice(&self, state: &S) -> Option<usize> {
        self.choices.get(state).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

/// What a worker consults to resolve a choice: the deterministic overlay when
/// one is active, falling back to the stochastic policy for unknown states.
pub(crate) struct PolicyView<'a, S: ModelState> {
    pub(crate) base: &'a Policy<S>,
    pub(crate) overlay: Option<&'a DeterministicPolicy<S>>,
}

impl<S: ModelState> PolicyView<'_, S> {
    /// Choice at `state`, given a uniform sample `x` in `[0, 1)`.
    pub(crate) fn choose(&self, state: &S, num_choices: usize, x: f64) -> usize {
        if let Some(choice) = self.overlay.and_then(|o| o.choice(state)) {
            return choice;
        }
        self.base.initialise(state, num_choices);
        self.base.index_by_probability_sum(state, x).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smdp_model::State;
    use std::sync::Arc;

    fn s(v: i64) -> State {
        State::new(vec![v])
    }

    #[test]
    fn test_initialise_is_uniform_and_first_writer_wins() {
        let policy = Policy::new();
        assert!(policy.initialise(&s(0), 4));
        assert!(!policy.initialise(&s(0), 2));
        let entry = policy.get(&s(0)).unwrap();
        assert_eq!(entry.probabilities(), &[0.25; 4]);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn test_index_by_probability_sum() {
        let p = StatePolicy::from_probabilities(vec![0.2, 0.0, 0.5, 0.3]);
        assert_eq!(p.index_by_probability_sum(0.0), 0);
        assert_eq!(p.index_by_probability_sum(0.19), 0);
        assert_eq!(p.index_by_probability_sum(0.2), 2);
        assert_eq!(p.index_by_probability_sum(0.69), 2);
        assert_eq!(p.index_by_probability_sum(0.7), 3);
        // Rounded total below x clamps to the last choice.
        let short = StatePolicy::from_probabilities(vec![0.5, 0.499_999]);
        assert_eq!(short.index_by_probability_sum(0.999_999_9), 1);
    }

    #[test]
    fn test_store_lookup_of_unknown_state() {
        let policy: Policy<State> = Policy::new();
        assert!(policy.get(&s(1)).is_none());
        assert!(policy.probability(&s(1), 0).is_none());
        assert!(policy.index_by_probability_sum(&s(1), 0.5).is_none());
        assert!(!policy.contains(&s(1)));
    }

    #[test]
    fn test_determinise_picks_lowest_index_on_ties() {
        let policy = Policy::new();
        policy.initialise(&s(0), 3);
        policy.initialise(&s(1), 3);
        policy
            .states()
            .get_mut(&s(1))
            .unwrap()
            .set_probabilities(vec![0.2, 0.4, 0.4]);

        for _ in 0..5 {
            let det = policy.determinise();
            assert_eq!(det.len(), 2);
            assert_eq!(det.choice(&s(0)), Some(0));
            assert_eq!(det.choice(&s(1)), Some(1));
        }
    }

    #[test]
    fn test_view_prefers_overlay_and_falls_back_to_base() {
        let policy = Policy::new();
        policy.initialise(&s(0), 2);
        policy
            .states()
            .get_mut(&s(0))
            .unwrap()
            .set_probabilities(vec![0.1, 0.9]);
        let det = policy.determinise();

        let view = PolicyView {
            base: &policy,
            overlay: Some(&det),
        };
        assert_eq!(view.choose(&s(0), 2, 0.0), 1);
        // Unknown to the overlay: lazily initialised in the base.
        assert_eq!(view.choose(&s(7), 2, 0.75), 1);
        assert_eq!(policy.get(&s(7)).unwrap().probabilities(), &[0.5, 0.5]);
    }

    #[test]
    fn test_concurrent_first_visits_create_one_uniform_entry() {
        let policy = Arc::new(Policy::new());
        let created: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let policy = Arc::clone(&policy);
                    scope.spawn(move || policy.initialise(&s(42), 5) as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(created, 1);
        assert_eq!(policy.len(), 1);
        assert_eq!(policy.get(&s(42)).unwrap().probabilities(), &[0.2; 5]);
    }
}
