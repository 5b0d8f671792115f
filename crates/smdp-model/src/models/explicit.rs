use super::check_distribution;
use crate::sim::{Branches, TransitionSystem};
use crate::state::State;
use crate::{ModelError, ModelResult};

/// Explicit-state MDP over states `0..n`.
///
/// Every state is encoded as a one-variable [`State`] holding its index.
#[derive(Debug, Clone)]
pub struct ExplicitMdp {
    initial: usize,
    choices: Vec<Vec<Branches>>,
}

pub struct ExplicitMdpBuilder {
    initial: usize,
    choices: Vec<Vec<Vec<(f64, usize)>>>,
    error: Option<String>,
}

impl ExplicitMdp {
    pub fn builder(num_states: usize) -> ExplicitMdpBuilder {
        ExplicitMdpBuilder {
            initial: 0,
            choices: vec![Vec::new(); num_states],
            error: None,
        }
    }

    /// The state encoding index `idx`.
    pub fn state(idx: usize) -> State {
        State::new(vec![idx as i64])
    }

    pub fn num_states(&self) -> usize {
        self.choices.len()
    }

    fn index_of(&self, state: &State) -> ModelResult<usize> {
        match state.vars.as_slice() {
            [idx] if *idx >= 0 && (*idx as usize) < self.choices.len() => Ok(*idx as usize),
            _ => Err(ModelError::UnknownState(state.to_string())),
        }
    }
}

impl ExplicitMdpBuilder {
    pub fn initial(mut self, idx: usize) -> Self {
        self.initial = idx;
        self
    }

    /// Add a choice to state `from` with the given `(probability, successor)`
    /// branches.
    pub fn choice(mut self, from: usize, branches: &[(f64, usize)]) -> Self {
        match self.choices.get_mut(from) {
            Some(choices) => choices.push(branches.to_vec()),
            None => {
                self.error
                    .get_or_insert_with(|| format!("choice added to unknown state {}", from));
            }
        }
        self
    }

    pub fn build(self) -> ModelResult<ExplicitMdp> {
        if let Some(msg) = self.error {
            return Err(ModelError::InvalidModel(msg));
        }
        let n = self.choices.len();
        if self.initial >= n {
            return Err(ModelError::InvalidModel(format!(
                "initial state {} out of range for {} states",
                self.initial, n
            )));
        }
        let mut choices = Vec::with_capacity(n);
        for (from, state_choices) in self.choices.into_iter().enumerate() {
            let source = ExplicitMdp::state(from);
            let mut built = Vec::with_capacity(state_choices.len());
            for branches in state_choices {
                let mut out = Vec::with_capacity(branches.len());
                for (p, to) in branches {
                    if to >= n {
                        return Err(ModelError::InvalidModel(format!(
                            "transition from {} to unknown state {}",
                            from, to
                        )));
                    }
                    out.push((p, ExplicitMdp::state(to)));
                }
                check_distribution(&source, &out)?;
                built.push(out);
            }
            choices.push(built);
        }
        Ok(ExplicitMdp {
            initial: self.initial,
            choices,
        })
    }
}

impl TransitionSystem for ExplicitMdp {
    fn initial(&self) -> State {
        ExplicitMdp::state(self.initial)
    }

    fn choices(&self, state: &State, out: &mut Vec<Branches>) -> ModelResult<()> {
        let idx = self.index_of(state)?;
        out.extend(self.choices[idx].iter().cloned());
        Ok(())
    }
}
