//! Bounded temporal properties over traces.

use crate::state::State;
use crate::trace::{SatResult, Trace};
use crate::ModelResult;
use std::fmt;
use std::sync::Arc;

/// A property checked against finished traces.
pub trait Property<S> {
    /// Number of transitions a trace needs for the verdict to be determined.
    fn required_trace_length(&self) -> usize;

    fn evaluate(&self, trace: &Trace<S>) -> ModelResult<SatResult>;
}

/// State predicate shared between threads.
pub type Predicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// Verdict found at trace position `pos` (0 = initial state).
fn decided(satisfied: bool, pos: usize) -> SatResult {
    match pos.checked_sub(1) {
        Some(step) => SatResult::at_step(satisfied, step),
        None => SatResult::initially(satisfied),
    }
}

/// `true U<=bound goal`: some state within `bound` transitions satisfies `goal`.
#[derive(Clone)]
pub struct BoundedReachability {
    goal: Predicate,
    bound: usize,
}

impl BoundedReachability {
    pub fn new(bound: usize, goal: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        Self {
            goal: Arc::new(goal),
            bound,
        }
    }
}

impl fmt::Debug for BoundedReachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedReachability")
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl Property<State> for BoundedReachability {
    fn required_trace_length(&self) -> usize {
        self.bound
    }

    fn evaluate(&self, trace: &Trace<State>) -> ModelResult<SatResult> {
        let horizon = self.bound.min(trace.len());
        for (pos, state) in trace.states().take(horizon + 1).enumerate() {
            if (self.goal)(state) {
                return Ok(decided(true, pos));
            }
        }
        Ok(decided(false, horizon))
    }
}

/// `G<=bound safe`: every state within `bound` transitions satisfies `safe`.
#[derive(Clone)]
pub struct BoundedSafety {
    safe: Predicate,
    bound: usize,
}

impl BoundedSafety {
    pub fn new(bound: usize, safe: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        Self {
            safe: Arc::new(safe),
            bound,
        }
    }
}

impl fmt::Debug for BoundedSafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSafety")
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl Property<State> for BoundedSafety {
    fn required_trace_length(&self) -> usize {
        self.bound
    }

    fn evaluate(&self, trace: &Trace<State>) -> ModelResult<SatResult> {
        let horizon = self.bound.min(trace.len());
        for (pos, state) in trace.states().take(horizon + 1).enumerate() {
            if !(self.safe)(state) {
                return Ok(decided(false, pos));
            }
        }
        Ok(decided(true, horizon))
    }
}
