use super::check_distribution;
use crate::sim::{Branches, TransitionSystem};
use crate::state::State;
use crate::ModelResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const IDLE: i64 = 0;
const TRYING: i64 = 1;
const CRITICAL: i64 = 2;

/// N processes competing for a critical section.
///
/// Process `i` has a local `x_i in {idle, trying, critical}`:
///
/// - idle: stays idle with probability `0.8 + e_i`, starts trying otherwise
/// - trying: enters the critical section if nobody is in it
/// - critical: stays with probability `0.5 + d_i`, leaves otherwise
///
/// `e_i` and `d_i` are drawn once from `[0, 0.01)`. Every enabled process
/// command is one nondeterministic choice.
#[derive(Debug, Clone)]
pub struct MutexModel {
    /// (e_i, d_i) per process.
    perturbation: Vec<(f64, f64)>,
}

impl MutexModel {
    pub fn new(processes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let perturbation = (0..processes)
            .map(|_| (rng.gen::<f64>() / 100.0, rng.gen::<f64>() / 100.0))
            .collect::<Vec<_>>();
        debug!(processes, "built mutex model");
        Self { perturbation }
    }

    pub fn processes(&self) -> usize {
        self.perturbation.len()
    }

    /// Number of processes currently in the critical section.
    pub fn critical_count(state: &State) -> usize {
        state.vars.iter().filter(|&&x| x == CRITICAL).count()
    }
}

impl TransitionSystem for MutexModel {
    fn initial(&self) -> State {
        State::new(vec![IDLE; self.perturbation.len()])
    }

    fn choices(&self, state: &State, out: &mut Vec<Branches>) -> ModelResult<()> {
        let nobody_critical = state.vars.iter().all(|&x| x != CRITICAL);
        for (i, &(e, d)) in self.perturbation.iter().enumerate() {
            let branches = match state.get(i) {
                IDLE => vec![
                    (0.8 + e, state.clone()),
                    (0.2 - e, state.with_var(i, TRYING)),
                ],
                TRYING if nobody_critical => vec![(1.0, state.with_var(i, CRITICAL))],
                TRYING => continue,
                _ => vec![
                    (0.5 + d, state.clone()),
                    (0.5 - d, state.with_var(i, IDLE)),
                ],
            };
            check_distribution(state, &branches)?;
            out.push(branches);
        }
        Ok(())
    }
}
