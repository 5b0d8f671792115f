//! Simulated traces and verdicts.

/// One transition of a trace: the state it left, the choice taken there and
/// how many choices the state offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<S> {
    pub state: S,
    pub choice: usize,
    pub num_choices: usize,
}

/// A finite path through a model.
#[derive(Debug, Clone)]
pub struct Trace<S> {
    steps: Vec<Step<S>>,
    last: S,
}

impl<S: Clone> Trace<S> {
    /// Empty trace sitting in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            steps: Vec::new(),
            last: initial,
        }
    }

    pub fn with_capacity(initial: S, steps: usize) -> Self {
        Self {
            steps: Vec::with_capacity(steps),
            last: initial,
        }
    }

    /// Record a transition out of the current last state into `next`.
    pub fn push(&mut self, choice: usize, num_choices: usize, next: S) {
        let state = std::mem::replace(&mut self.last, next);
        self.steps.push(Step {
            state,
            choice,
            num_choices,
        });
    }

    /// Number of transitions.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step<S>] {
        &self.steps
    }

    /// The state the trace ended in.
    pub fn last_state(&self) -> &S {
        &self.last
    }

    /// State at position `i`, where position 0 is the initial state and
    /// position `len()` the last one.
    pub fn state(&self, i: usize) -> Option<&S> {
        match i.cmp(&self.steps.len()) {
            std::cmp::Ordering::Less => Some(&self.steps[i].state),
            std::cmp::Ordering::Equal => Some(&self.last),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// All visited states in order, `len() + 1` of them.
    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.steps
            .iter()
            .map(|s| &s.state)
            .chain(std::iter::once(&self.last))
    }
}

/// Outcome of checking a trace against a property.
///
/// Besides the verdict it records how much of the trace was needed to reach
/// it. Steps after the deciding one played no part in the outcome and are not
/// rewarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatResult {
    satisfied: bool,
    relevant_steps: usize,
}

impl SatResult {
    /// Verdict fixed by the transition at step `index`.
    pub fn at_step(satisfied: bool, index: usize) -> Self {
        Self {
            satisfied,
            relevant_steps: index + 1,
        }
    }

    /// Verdict fixed by the initial state, before any choice was made.
    pub fn initially(satisfied: bool) -> Self {
        Self {
            satisfied,
            relevant_steps: 0,
        }
    }

    #[inline]
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    /// Index of the deciding step, `None` if decided in the initial state.
    pub fn decided_at(&self) -> Option<usize> {
        self.relevant_steps.checked_sub(1)
    }

    /// Number of leading steps that contributed to the verdict.
    #[inline]
    pub fn relevant_steps(&self) -> usize {
        self.relevant_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_moves_last_state_into_steps() {
        let mut trace = Trace::new('a');
        trace.push(1, 2, 'b');
        trace.push(0, 3, 'c');

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.steps()[0].state, 'a');
        assert_eq!(trace.steps()[1].choice, 0);
        assert_eq!(trace.steps()[1].num_choices, 3);
        assert_eq!(*trace.last_state(), 'c');
        assert_eq!(trace.states().copied().collect::<String>(), "abc");
        assert_eq!(trace.state(2), Some(&'c'));
        assert_eq!(trace.state(3), None);
    }

    #[test]
    fn test_sat_result_positions() {
        let r = SatResult::at_step(true, 2);
        assert_eq!(r.decided_at(), Some(2));
        assert_eq!(r.relevant_steps(), 3);

        let r = SatResult::initially(false);
        assert!(!r.satisfied());
        assert_eq!(r.decided_at(), None);
        assert_eq!(r.relevant_steps(), 0);
    }
}
