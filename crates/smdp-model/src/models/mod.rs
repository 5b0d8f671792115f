//! Reference models.
//!
//! Small in-memory MDPs used by tests, benchmarks and the command line. They
//! follow the classic benchmark shapes (multi-process mutual exclusion, bounded
//! random walks) without any modelling language behind them.

mod explicit;
mod mutex;
mod random_walk;

pub use explicit::{ExplicitMdp, ExplicitMdpBuilder};
pub use mutex::MutexModel;
pub use random_walk::RandomWalkModel;

use crate::sim::Branches;
use crate::state::State;
use crate::{ModelError, ModelResult};

/// Tolerance when checking that branch probabilities sum to one.
const PROBABILITY_TOLERANCE: f64 = 1e-9;

pub(crate) fn check_distribution(state: &State, branches: &Branches) -> ModelResult<()> {
    let sum: f64 = branches.iter().map(|(p, _)| p).sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE || branches.iter().any(|(p, _)| *p < 0.0) {
        return Err(ModelError::InvalidDistribution {
            state: state.to_string(),
            sum,
        });
    }
    Ok(())
}
