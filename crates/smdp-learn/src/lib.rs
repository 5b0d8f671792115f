//! Parallel scheduler learning for statistical model checking of MDPs.
//!
//! A [`Coordinator`] owns a pool of worker threads that simulate a model under
//! the current stochastic [`Policy`]. During learning every trace is checked
//! against a property and its verdict is spread over the choices made along the
//! trace ([`RewardAttribution`]). After each block of traces the policy is
//! updated from the collected rewards ([`PolicyUpdate`]). Once learning ends the
//! coordinator switches the pool into checking mode and feeds verdicts into one
//! of the sequential decision procedures of `smdp-stats`.

pub mod attribution;
pub mod config;
pub mod coordinator;
pub mod jobs;
pub mod policy;
pub mod profile;
pub mod reward;
pub mod update;
mod worker;

pub use attribution::RewardAttribution;
pub use config::{ConfigError, LearnConfig, SmcMethod};
pub use coordinator::{Coordinator, LearnReport, RunSummary, SmcOutcome};
pub use jobs::{Grant, JobQueue, JobState};
pub use policy::{DeterministicPolicy, Policy, StatePolicy};
pub use profile::{RunProfile, WorkerProfile};
pub use reward::{ChoiceReward, RewardStore, StateReward};
pub use update::{PolicyUpdate, UpdateParams};

use smdp_model::ModelError;
use smdp_stats::StatsError;
use thiserror::Error;

/// Concurrent map used for the policy and reward stores.
pub type StateMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

#[derive(Debug, Error)]
pub enum LearnError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("worker failed: {0}")]
    WorkerFailed(ModelError),

    #[error("worker pool is not running")]
    NotRunning,

    #[error("worker pool was stopped")]
    Stopped,

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type LearnResult<T> = Result<T, LearnError>;
