use super::check_distribution;
use crate::sim::{Branches, TransitionSystem};
use crate::state::State;
use crate::{ModelError, ModelResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A random guarded command pair: `x_guard > bound` and `x_guard <= bound`,
/// each jumping to one of two assignments.
#[derive(Debug, Clone)]
struct JumpPair {
    guard_var: usize,
    bound: i64,
    p: f64,
    /// (var, value) targets for the `>` and `<=` commands.
    above: [(usize, i64); 2],
    below: [(usize, i64); 2],
}

/// `vars` variables in `[0, max]`, each doing a reflecting random walk, plus
/// `jumps` random guarded commands.
///
/// Every variable contributes one choice; every jump pair contributes one
/// (exactly one of its two guards holds).
#[derive(Debug, Clone)]
pub struct RandomWalkModel {
    vars: usize,
    max: i64,
    jumps: Vec<JumpPair>,
}

impl RandomWalkModel {
    pub fn new(vars: usize, max: i64, jumps: usize, seed: u64) -> ModelResult<Self> {
        if vars == 0 || max < 1 {
            return Err(ModelError::InvalidModel(format!(
                "random walk needs at least one variable and max >= 1 (got {} vars, max {})",
                vars, max
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let target = |rng: &mut StdRng| (rng.gen_range(0..vars), rng.gen_range(1..=max));
        let jumps = (0..jumps)
            .map(|_| JumpPair {
                guard_var: rng.gen_range(0..vars),
                bound: rng.gen_range(1..=max),
                p: rng.gen(),
                above: [target(&mut rng), target(&mut rng)],
                below: [target(&mut rng), target(&mut rng)],
            })
            .collect();
        Ok(Self { vars, max, jumps })
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

impl TransitionSystem for RandomWalkModel {
    fn initial(&self) -> State {
        State::new(vec![0; self.vars])
    }

    fn choices(&self, state: &State, out: &mut Vec<Branches>) -> ModelResult<()> {
        for j in 0..self.vars {
            let x = state.get(j);
            let branches = if x <= 0 {
                vec![(1.0, state.with_var(j, x + 1))]
            } else if x >= self.max {
                vec![(1.0, state.with_var(j, x - 1))]
            } else {
                vec![
                    (0.5, state.with_var(j, x + 1)),
                    (0.5, state.with_var(j, x - 1)),
                ]
            };
            out.push(branches);
        }
        for jump in &self.jumps {
            let [(v1, x1), (v2, x2)] = if state.get(jump.guard_var) > jump.bound {
                jump.above
            } else {
                jump.below
            };
            let branches = vec![
                (jump.p, state.with_var(v1, x1)),
                (1.0 - jump.p, state.with_var(v2, x2)),
            ];
            check_distribution(state, &branches)?;
            out.push(branches);
        }
        Ok(())
    }
}
