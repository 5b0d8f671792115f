//! Sequential Bayesian decision procedures for statistical model checking.
//!
//! Both procedures are incremental: feed verdicts one at a time through
//! `observe` until it returns a result. Where the verdicts come from (a worker
//! queue, a recorded run, a test vector) is up to the caller.

pub mod beta;
pub mod estimation;
pub mod testing;

pub use beta::BetaDist;
pub use estimation::{EstimationResult, IntervalEstimator};
pub use testing::{bayes_factor, prior_odds, Hypothesis, HypothesisTest, TestingResult};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    #[error("Beta distribution parameters must be finite and positive (alpha={alpha}, beta={beta})")]
    InvalidBeta { alpha: f64, beta: f64 },

    #[error("invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

pub type StatsResult<T> = Result<T, StatsError>;
