//! Trace generation.
//!
//! [`Model`] is the interface the learning engine drives. Models that can
//! enumerate the choices of a state implement the smaller
//! [`TransitionSystem`] and get trace generation for free.

use crate::state::{ModelState, State};
use crate::trace::Trace;
use crate::{ModelError, ModelResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Resolves the nondeterministic choice at a state.
///
/// Called only for states offering more than one choice. Returns an index in
/// `0..num_choices`.
pub trait ChoiceResolver<S> {
    fn resolve(&mut self, state: &S, num_choices: usize) -> usize;
}

impl<S, F> ChoiceResolver<S> for F
where
    F: FnMut(&S, usize) -> usize,
{
    fn resolve(&mut self, state: &S, num_choices: usize) -> usize {
        self(state, num_choices)
    }
}

/// A probabilistic model the engine can simulate.
pub trait Model {
    type State: ModelState;
    /// Worker-private simulation context.
    type Context: Send;

    /// Fresh context for one worker, seeded for reproducibility.
    fn initial_context(&self, seed: u64) -> Self::Context;

    fn initial_state(&self) -> Self::State;

    /// Simulate at most `max_steps` transitions starting in `initial`.
    ///
    /// Stops early at a state without choices.
    fn generate_trace(
        &self,
        ctx: &mut Self::Context,
        initial: &Self::State,
        max_steps: usize,
        resolver: &mut dyn ChoiceResolver<Self::State>,
    ) -> ModelResult<Trace<Self::State>>;
}

/// Probability distribution over successors for one choice.
pub type Branches = Vec<(f64, State)>;

/// A model given by its initial state and the choices enabled in each state.
pub trait TransitionSystem {
    fn initial(&self) -> State;

    /// Write the choices enabled in `state` into `out` (cleared by the caller).
    /// Writing nothing marks a deadlock.
    fn choices(&self, state: &State, out: &mut Vec<Branches>) -> ModelResult<()>;
}

/// Simulation context for [`TransitionSystem`] models.
pub struct SimContext {
    rng: StdRng,
    choices: Vec<Branches>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            choices: Vec::new(),
        }
    }
}

/// Inverse-CDF pick over the branches of one choice.
fn sample_branch<'a>(branches: &'a Branches, x: f64) -> Option<&'a State> {
    let mut acc = 0.0;
    for (p, succ) in branches {
        acc += p;
        if x < acc {
            return Some(succ);
        }
    }
    // Rounding can leave acc marginally below 1.
    branches.last().map(|(_, s)| s)
}

impl<T: TransitionSystem> Model for T {
    type State = State;
    type Context = SimContext;

    fn initial_context(&self, seed: u64) -> SimContext {
        SimContext::new(seed)
    }

    fn initial_state(&self) -> State {
        self.initial()
    }

    fn generate_trace(
        &self,
        ctx: &mut SimContext,
        initial: &State,
        max_steps: usize,
        resolver: &mut dyn ChoiceResolver<State>,
    ) -> ModelResult<Trace<State>> {
        let mut trace = Trace::with_capacity(initial.clone(), max_steps);
        for _ in 0..max_steps {
            ctx.choices.clear();
            self.choices(trace.last_state(), &mut ctx.choices)?;
            let num_choices = ctx.choices.len();
            if num_choices == 0 {
                break;
            }
            let choice = if num_choices == 1 {
                0
            } else {
                resolver.resolve(trace.last_state(), num_choices)
            };
            if choice >= num_choices {
                return Err(ModelError::InvalidChoice {
                    choice,
                    available: num_choices,
                });
            }
            let x: f64 = ctx.rng.gen();
            let next = sample_branch(&ctx.choices[choice], x)
                .cloned()
                .ok_or_else(|| {
                    ModelError::Internal(format!("choice {} has no branches", choice))
                })?;
            trace.push(choice, num_choices, next);
        }
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x counts up to 3 by +1 or +2, deadlocks at 3.
    struct Counter;

    impl TransitionSystem for Counter {
        fn initial(&self) -> State {
            State::new(vec![0])
        }

        fn choices(&self, state: &State, out: &mut Vec<Branches>) -> ModelResult<()> {
            let x = state.get(0);
            if x < 3 {
                out.push(vec![(1.0, state.with_var(0, x + 1))]);
                out.push(vec![(1.0, state.with_var(0, (x + 2).min(3)))]);
            }
            Ok(())
        }
    }

    #[test]
    fn test_trace_follows_resolver_and_stops_at_deadlock() {
        let model = Counter;
        let mut ctx = model.initial_context(7);
        let mut always_first = |_: &State, _: usize| 0;
        let trace = model
            .generate_trace(&mut ctx, &model.initial_state(), 10, &mut always_first)
            .unwrap();
        assert_eq!(trace.len(), 3);
        assert!(trace.steps().iter().all(|s| s.choice == 0 && s.num_choices == 2));
        assert_eq!(trace.last_state().get(0), 3);
    }

    #[test]
    fn test_max_steps_bounds_trace() {
        let model = Counter;
        let mut ctx = model.initial_context(7);
        let mut second = |_: &State, _: usize| 1;
        let trace = model
            .generate_trace(&mut ctx, &model.initial_state(), 1, &mut second)
            .unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.last_state().get(0), 2);
    }

    #[test]
    fn test_out_of_range_choice_is_an_error() {
        let model = Counter;
        let mut ctx = model.initial_context(7);
        let mut bad = |_: &State, n: usize| n;
        let err = model
            .generate_trace(&mut ctx, &model.initial_state(), 5, &mut bad)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidChoice {
                choice: 2,
                available: 2
            }
        );
    }

    #[test]
    fn test_sample_branch_inverse_cdf() {
        let a = State::new(vec![0]);
        let b = State::new(vec![1]);
        let branches = vec![(0.25, a.clone()), (0.75, b.clone())];
        assert_eq!(sample_branch(&branches, 0.0), Some(&a));
        assert_eq!(sample_branch(&branches, 0.2499), Some(&a));
        assert_eq!(sample_branch(&branches, 0.25), Some(&b));
        assert_eq!(sample_branch(&branches, 0.999_999_999), Some(&b));
    }
}
