//! Per-choice satisfy/fail counters collected during one learning block.

use crate::StateMap;
use smdp_model::ModelState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reward mass credited to one choice.
#[derive(Debug, Default)]
pub struct ChoiceReward {
    sat: AtomicU64,
    nsat: AtomicU64,
}

impl ChoiceReward {
    pub fn add(&self, satisfied: bool, amount: u64) {
        let counter = if satisfied { &self.sat } else { &self.nsat };
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    #[inline]
    pub fn sat(&self) -> u64 {
        self.sat.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn nsat(&self) -> u64 {
        self.nsat.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn trials(&self) -> u64 {
        self.sat() + self.nsat()
    }

    /// Fraction of satisfying reward, `None` if the choice was never credited.
    pub fn success_rate(&self) -> Option<f64> {
        let (sat, nsat) = (self.sat(), self.nsat());
        let trials = sat + nsat;
        (trials > 0).then(|| sat as f64 / trials as f64)
    }
}

/// Rewards for every choice of one state.
#[derive(Debug)]
pub struct StateReward {
    choices: Box<[ChoiceReward]>,
}

impl StateReward {
    pub fn new(num_choices: usize) -> Self {
        Self {
            choices: (0..num_choices).map(|_| ChoiceReward::default()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn get(&self, choice: usize) -> Option<&ChoiceReward> {
        self.choices.get(choice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChoiceReward> {
        self.choices.iter()
    }

    pub fn total_trials(&self) -> u64 {
        self.choices.iter().map(ChoiceReward::trials).sum()
    }
}

/// Rewards of the current block, keyed by state.
pub struct RewardStore<S: ModelState> {
    states: StateMap<S, StateReward>,
    capacity: usize,
}

impl<S: ModelState> Default for RewardStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelState> RewardStore<S> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: StateMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            capacity,
        }
    }

    /// Create zeroed counters for `state` unless present. Returns true if this
    /// call created them.
    pub fn initialise(&self, state: &S, num_choices: usize) -> bool {
        use dashmap::mapref::entry::Entry;
        if self.states.contains_key(state) {
            return false;
        }
        match self.states.entry(state.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(StateReward::new(num_choices));
                true
            }
        }
    }

    /// Credit `amount` to `choice` at `state`, creating the state's counters
    /// on first use.
    pub fn add(&self, state: &S, num_choices: usize, choice: usize, satisfied: bool, amount: u64) {
        if let Some(entry) = self.states.get(state) {
            entry.choices[choice].add(satisfied, amount);
            return;
        }
        let entry = self
            .states
            .entry(state.clone())
            .or_insert_with(|| StateReward::new(num_choices));
        entry.choices[choice].add(satisfied, amount);
    }

    /// `(sat, nsat)` of one choice.
    pub fn counts(&self, state: &S, choice: usize) -> Option<(u64, u64)> {
        let entry = self.states.get(state)?;
        entry.get(choice).map(|c| (c.sat(), c.nsat()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop every entry. Called at block boundaries.
    pub fn reset(&self) {
        self.states.clear();
        if self.states.capacity() > self.capacity.max(1) * 4 {
            self.states.shrink_to_fit();
        }
    }

    pub(crate) fn states(&self) -> &StateMap<S, StateReward> {
        &self.states
    }
}
