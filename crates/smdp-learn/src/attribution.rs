//! Spreading a trace's verdict over the choices made along it.

use crate::config::ConfigError;
use crate::reward::RewardStore;
use smdp_model::{ModelState, SatResult, Step};
use std::fmt;
use std::str::FromStr;

/// How much reward each relevant step of a trace receives.
///
/// Only steps up to the one that decided the verdict are credited, and steps
/// in states with a single choice are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardAttribution {
    /// One unit per step.
    Uniform,
    /// The deciding step gets `last_*`, earlier steps `path_*`.
    LastAction {
        path_sat: u64,
        last_sat: u64,
        path_nsat: u64,
        last_nsat: u64,
    },
    /// The deciding step gets `start`, each step further back one less,
    /// never below 1.
    Decay { start: u64 },
}

impl RewardAttribution {
    pub const DEFAULT_LAST_ACTION: Self = Self::LastAction {
        path_sat: 1,
        last_sat: 1,
        path_nsat: 1,
        last_nsat: 5,
    };

    pub const DEFAULT_DECAY: Self = Self::Decay { start: 5 };

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::LastAction { .. } => "lastaction",
            Self::Decay { .. } => "decay",
        }
    }

    /// Credit the verdict of one trace.
    pub fn attribute<S: ModelState>(
        &self,
        store: &RewardStore<S>,
        steps: &[Step<S>],
        verdict: &SatResult,
    ) {
        let relevant = verdict.relevant_steps().min(steps.len());
        let Some(last) = relevant.checked_sub(1) else {
            return;
        };
        let satisfied = verdict.satisfied();
        for (idx, step) in steps[..relevant].iter().enumerate() {
            if step.num_choices < 2 {
                continue;
            }
            let amount = self.magnitude(idx, last, satisfied);
            store.add(&step.state, step.num_choices, step.choice, satisfied, amount);
        }
    }

    fn magnitude(&self, idx: usize, last: usize, satisfied: bool) -> u64 {
        match *self {
            Self::Uniform => 1,
            Self::LastAction {
                path_sat,
                last_sat,
                path_nsat,
                last_nsat,
            } => match (satisfied, idx == last) {
                (true, false) => path_sat,
                (true, true) => last_sat,
                (false, false) => path_nsat,
                (false, true) => last_nsat,
            },
            Self::Decay { start } => start.saturating_sub((last - idx) as u64).max(1),
        }
    }
}

impl fmt::Display for RewardAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a strategy name into its default magnitudes.
impl FromStr for RewardAttribution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "lastaction" => Ok(Self::DEFAULT_LAST_ACTION),
            "decay" => Ok(Self::DEFAULT_DECAY),
            _ => Err(ConfigError::UnknownReward(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smdp_model::{State, Trace};

    fn s(v: i64) -> State {
        State::new(vec![v])
    }

    /// A -> B -> C -> D, two choices everywhere, choice 0 at A and 1 after.
    fn trace() -> Trace<State> {
        let mut t = Trace::new(s(0));
        t.push(0, 2, s(1));
        t.push(1, 2, s(2));
        t.push(1, 2, s(3));
        t
    }

    #[test]
    fn test_uniform_credits_steps_up_to_the_deciding_one() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::Uniform.attribute(&store, t.steps(), &SatResult::at_step(true, 1));
        assert_eq!(store.counts(&s(0), 0), Some((1, 0)));
        assert_eq!(store.counts(&s(1), 1), Some((1, 0)));
        assert_eq!(store.counts(&s(2), 1), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_uniform_includes_the_deciding_step() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::Uniform.attribute(&store, t.steps(), &SatResult::at_step(true, 2));
        assert_eq!(store.counts(&s(0), 0), Some((1, 0)));
        assert_eq!(store.counts(&s(0), 1), Some((0, 0)));
        assert_eq!(store.counts(&s(1), 1), Some((1, 0)));
        assert_eq!(store.counts(&s(1), 0), Some((0, 0)));
        assert_eq!(store.counts(&s(2), 1), Some((1, 0)));
        assert_eq!(store.counts(&s(2), 0), Some((0, 0)));
        assert_eq!(store.counts(&s(3), 0), None);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_last_action_satisfied_path() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::LastAction {
            path_sat: 1,
            last_sat: 4,
            path_nsat: 1,
            last_nsat: 5,
        }
        .attribute(&store, t.steps(), &SatResult::at_step(true, 2));
        assert_eq!(store.counts(&s(0), 0), Some((1, 0)));
        assert_eq!(store.counts(&s(1), 1), Some((1, 0)));
        assert_eq!(store.counts(&s(2), 1), Some((4, 0)));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_initial_verdict_credits_nothing() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::Uniform.attribute(&store, t.steps(), &SatResult::initially(false));
        assert!(store.is_empty());
    }

    #[test]
    fn test_single_choice_steps_are_skipped() {
        let store = RewardStore::new();
        let mut t = Trace::new(s(0));
        t.push(0, 1, s(1));
        t.push(1, 3, s(2));
        RewardAttribution::Uniform.attribute(&store, t.steps(), &SatResult::at_step(false, 1));
        assert_eq!(store.len(), 1);
        assert_eq!(store.counts(&s(1), 1), Some((0, 1)));
    }

    #[test]
    fn test_last_action_magnitudes() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::DEFAULT_LAST_ACTION.attribute(
            &store,
            t.steps(),
            &SatResult::at_step(false, 2),
        );
        assert_eq!(store.counts(&s(0), 0), Some((0, 1)));
        assert_eq!(store.counts(&s(1), 1), Some((0, 1)));
        assert_eq!(store.counts(&s(2), 1), Some((0, 5)));
    }

    #[test]
    fn test_decay_floors_at_one() {
        let store = RewardStore::new();
        let mut t = Trace::new(s(0));
        for v in 1..=8 {
            t.push(0, 2, s(v));
        }
        RewardAttribution::Decay { start: 3 }.attribute(
            &store,
            t.steps(),
            &SatResult::at_step(true, 7),
        );
        let sat: Vec<u64> = (0..8).map(|v| store.counts(&s(v), 0).unwrap().0).collect();
        assert_eq!(sat, vec![1, 1, 1, 1, 1, 1, 2, 3]);
    }

    #[test]
    fn test_verdict_past_trace_end_is_clamped() {
        let store = RewardStore::new();
        let t = trace();
        RewardAttribution::Uniform.attribute(&store, t.steps(), &SatResult::at_step(true, 10));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "uniform".parse::<RewardAttribution>().unwrap(),
            RewardAttribution::Uniform
        );
        assert_eq!(
            "LastAction".parse::<RewardAttribution>().unwrap(),
            RewardAttribution::DEFAULT_LAST_ACTION
        );
        assert_eq!(
            "decay".parse::<RewardAttribution>().unwrap(),
            RewardAttribution::Decay { start: 5 }
        );
        assert!(matches!(
            "geometric".parse::<RewardAttribution>(),
            Err(ConfigError::UnknownReward(name)) if name == "geometric"
        ));
    }
}
