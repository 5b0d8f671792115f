//! Learning and checking configuration.

use crate::attribution::RewardAttribution;
use crate::update::{PolicyUpdate, UpdateParams};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown policy update '{0}' (expected count, compcount, success, epsilon or epcount)")]
    UnknownPolicyUpdate(String),

    #[error("unknown reward method '{0}' (expected uniform, lastaction or decay)")]
    UnknownReward(String),

    #[error("unknown checking method '{0}' (expected testing or estimation)")]
    UnknownMethod(String),

    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.into(),
    }
}

/// Decision procedure run after learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmcMethod {
    /// Bayesian hypothesis test of `H0: P <= theta` against `H1: P > theta`.
    #[default]
    HypothesisTesting,
    /// Bayesian interval estimation of `P`.
    IntervalEstimation,
}

impl fmt::Display for SmcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HypothesisTesting => f.write_str("testing"),
            Self::IntervalEstimation => f.write_str("estimation"),
        }
    }
}

impl FromStr for SmcMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testing" | "ht" => Ok(Self::HypothesisTesting),
            "estimation" | "ie" => Ok(Self::IntervalEstimation),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

/// Configuration of a learning and checking run.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnConfig {
    /// Number of worker threads (0 = use all available).
    pub num_threads: usize,
    /// Traces simulated per learning block.
    pub traces_per_block: usize,
    /// Number of learning blocks.
    pub num_blocks: usize,
    /// Upper bound on the jobs one worker claims per request.
    pub jobs_per_request: usize,
    /// Jobs issued per batch while checking.
    pub modelcheck_block_size: usize,
    /// Weight of the old distribution in policy updates.
    pub history: f64,
    /// Exploration weight of the epsilon strategies.
    pub epsilon: f64,
    /// Stop learning once the block's Bayes factor exceeds this.
    pub learn_t: f64,
    /// Added to `theta` for the learning heuristic.
    pub iota: f64,
    /// Evaluate the Bayes factor after each mini-batch and stop learning early.
    pub bayes_learning: bool,
    /// Check with the most likely choice of each state instead of sampling.
    pub determinise: bool,
    pub policy_update: PolicyUpdate,
    pub reward: RewardAttribution,
    pub method: SmcMethod,
    /// Beta prior.
    pub alpha: f64,
    pub beta: f64,
    /// Probability threshold of the hypothesis test.
    pub theta: f64,
    /// Bayes factor threshold of the hypothesis test.
    pub t: f64,
    pub min_traces: u64,
    pub max_traces: u64,
    /// Half-width of the estimated interval.
    pub delta: f64,
    /// Posterior mass required inside the interval.
    pub coefficient: f64,
    /// Seed for the worker generators (None = from entropy).
    pub seed: Option<u64>,
    /// Pre-sizing of the policy store.
    pub policy_capacity: usize,
    /// Pre-sizing of the reward store.
    pub reward_capacity: usize,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            traces_per_block: 2000,
            num_blocks: 30,
            jobs_per_request: 50,
            modelcheck_block_size: 100,
            history: 0.5,
            epsilon: 0.1,
            learn_t: 30.0,
            iota: 0.05,
            bayes_learning: false,
            determinise: true,
            policy_update: PolicyUpdate::Count,
            reward: RewardAttribution::Uniform,
            method: SmcMethod::HypothesisTesting,
            alpha: 0.5,
            beta: 0.5,
            theta: 0.5,
            t: 1000.0,
            min_traces: 500,
            max_traces: 100_000,
            delta: 0.01,
            coefficient: 0.95,
            seed: None,
            policy_capacity: 500_000,
            reward_capacity: 1000,
        }
    }
}

impl LearnConfig {
    /// Worker count with 0 resolved to the available parallelism.
    pub fn threads(&self) -> usize {
        match self.num_threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    pub fn update_params(&self) -> UpdateParams {
        UpdateParams {
            history: self.history,
            epsilon: self.epsilon,
        }
    }

    /// Threshold of the early-stop heuristic, `theta + iota` capped at 1.
    pub fn learn_theta(&self) -> f64 {
        (self.theta + self.iota).min(1.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("traces_per_block", self.traces_per_block),
            ("num_blocks", self.num_blocks),
            ("jobs_per_request", self.jobs_per_request),
            ("modelcheck_block_size", self.modelcheck_block_size),
        ] {
            if value == 0 {
                return Err(invalid(name, "must be positive"));
            }
        }
        for (name, value) in [("history", self.history), ("epsilon", self.epsilon)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{} is outside [0, 1]", value)));
            }
        }
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(invalid(name, format!("{} is not a positive number", value)));
            }
        }
        if !(self.theta > 0.0 && self.theta < 1.0) {
            return Err(invalid(
                "theta",
                format!("{} is not strictly between 0 and 1", self.theta),
            ));
        }
        if !(self.t >= 1.0 && self.t.is_finite()) {
            return Err(invalid("T", format!("{} is below 1", self.t)));
        }
        if self.max_traces == 0 {
            return Err(invalid("max_traces", "must be positive"));
        }
        if !(self.delta > 0.0 && self.delta <= 0.5) {
            return Err(invalid("delta", format!("{} is outside (0, 0.5]", self.delta)));
        }
        if !(self.coefficient > 0.0 && self.coefficient < 1.0) {
            return Err(invalid(
                "coefficient",
                format!("{} is not strictly between 0 and 1", self.coefficient),
            ));
        }
        if self.bayes_learning {
            if !(self.iota >= 0.0) {
                return Err(invalid("iota", format!("{} is negative", self.iota)));
            }
            if self.learn_theta() >= 1.0 {
                return Err(invalid(
                    "iota",
                    format!(
                        "theta + iota = {} leaves no room for the learning test",
                        self.theta + self.iota
                    ),
                ));
            }
            if !(self.learn_t >= 1.0 && self.learn_t.is_finite()) {
                return Err(invalid("learn_t", format!("{} is below 1", self.learn_t)));
            }
        }
        Ok(())
    }
}
