//! The coordinator drives the worker pool through learning and checking.

use crate::config::{LearnConfig, SmcMethod};
use crate::jobs::JobQueue;
use crate::policy::{DeterministicPolicy, Policy};
use crate::profile::{RunProfile, WorkerProfile};
use crate::reward::RewardStore;
use crate::worker::{BatchContext, Shared, Sink, Worker};
use crate::{LearnError, LearnResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smdp_model::{Model, Property};
use smdp_stats::{
    bayes_factor, prior_odds, EstimationResult, HypothesisTest, IntervalEstimator, TestingResult,
};
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Outcome of [`Coordinator::learn`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnReport {
    /// Blocks that ended with a policy update.
    pub blocks: usize,
    /// The learning heuristic ended learning before the last block.
    pub stopped_early: bool,
    /// Time spent updating the policy.
    pub update_time: Duration,
}

/// Result of the decision procedure run after learning.
#[derive(Debug, Clone, PartialEq)]
pub enum SmcOutcome {
    Testing(TestingResult),
    Estimation(EstimationResult),
}

impl SmcOutcome {
    pub fn csv(&self) -> String {
        match self {
            Self::Testing(r) => r.csv(),
            Self::Estimation(r) => r.csv(),
        }
    }
}

impl fmt::Display for SmcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Testing(r) => r.fmt(f),
            Self::Estimation(r) => r.fmt(f),
        }
    }
}

/// Everything [`Coordinator::run`] produces.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: SmcOutcome,
    pub learning: LearnReport,
    pub profile: RunProfile,
    pub workers: Vec<WorkerProfile>,
}

/// Owns the worker pool, the policy and the reward store.
///
/// ```no_run
/// # use smdp_learn::{Coordinator, LearnConfig};
/// # use smdp_model::{models::MutexModel, BoundedReachability};
/// let model = MutexModel::new(3, 1);
/// let property = BoundedReachability::new(20, |s| MutexModel::critical_count(s) > 0);
/// let mut coordinator = Coordinator::new(model, property, LearnConfig::default())?;
/// let summary = coordinator.run()?;
/// println!("{}", summary.outcome);
/// # Ok::<(), smdp_learn::LearnError>(())
/// ```
pub struct Coordinator<M: Model, P> {
    shared: Arc<Shared<M, P>>,
    config: LearnConfig,
    workers: Vec<JoinHandle<WorkerProfile>>,
    overlay: Option<Arc<DeterministicPolicy<M::State>>>,
    deterministic: bool,
    seeds: StdRng,
}

impl<M, P> Coordinator<M, P>
where
    M: Model + Send + Sync + 'static,
    M::Context: 'static,
    P: Property<M::State> + Send + Sync + 'static,
{
    /// Validate `config` and prepare an idle coordinator.
    pub fn new(model: M, property: P, config: LearnConfig) -> LearnResult<Self> {
        config.validate()?;
        let trace_length = property.required_trace_length() + 1;
        let initial = model.initial_state();
        let seeds = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let shared = Arc::new(Shared {
            model,
            property,
            attribution: config.reward,
            jobs: JobQueue::new(BatchContext::learning()),
            policy: Policy::with_capacity(config.policy_capacity),
            rewards: RewardStore::with_capacity(config.reward_capacity),
            initial,
            trace_length,
            jobs_per_request: config.jobs_per_request,
            sat: AtomicU64::new(0),
            fail: AtomicU64::new(0),
        });
        Ok(Self {
            shared,
            config,
            workers: Vec::new(),
            overlay: None,
            deterministic: false,
            seeds,
        })
    }

    /// Spawn the configured number of workers.
    pub fn start(&mut self) -> LearnResult<()> {
        if !self.workers.is_empty() {
            return Err(LearnError::AlreadyRunning);
        }
        if self.shared.jobs.lock().is_shutdown() {
            return Err(LearnError::Stopped);
        }
        let threads = self.config.threads();
        for id in 0..threads {
            let worker = Worker::new(id, Arc::clone(&self.shared), self.seeds.gen());
            let handle = thread::Builder::new()
                .name(format!("smdp-worker-{}", id))
                .spawn(move || worker.run())?;
            self.workers.push(handle);
        }
        info!(threads, trace_length = self.shared.trace_length, "worker pool started");
        Ok(())
    }

    /// Run `num_blocks` learning blocks of `traces_per_block` traces each.
    pub fn learn(&mut self, traces_per_block: usize, num_blocks: usize) -> LearnResult<LearnReport> {
        self.ensure_running()?;
        let shared = Arc::clone(&self.shared);
        let config = &self.config;
        let heuristic = if config.bayes_learning {
            Some(prior_odds(config.alpha, config.beta, config.learn_theta())?)
        } else {
            None
        };
        let mini_batch = (self.workers.len() * config.jobs_per_request).max(1);
        let params = config.update_params();
        let mut report = LearnReport::default();

        let mut state = shared.jobs.lock();
        state.context = BatchContext::learning();
        shared.rewards.reset();
        shared.reset_block_counts();

        for block in 0..num_blocks {
            let mut issued = 0;
            while issued < traces_per_block {
                let batch = mini_batch.min(traces_per_block - issued);
                issued += batch;
                shared.jobs.add_jobs(&mut state, batch);
                state = shared.jobs.wait_idle(state);
                if let Some(err) = state.failure() {
                    return Err(LearnError::WorkerFailed(err.clone()));
                }

                if let Some(prior) = heuristic {
                    let (sat, fail) = shared.block_counts();
                    let factor = bayes_factor(
                        prior,
                        config.alpha,
                        config.beta,
                        config.learn_theta(),
                        sat,
                        fail,
                    )?;
                    if factor > config.learn_t {
                        info!(block, sat, fail, bayes_factor = factor, "learning stopped early");
                        shared.reset_block_counts();
                        shared.rewards.reset();
                        report.stopped_early = true;
                        return Ok(report);
                    }
                }
            }

            let (sat, fail) = shared.block_counts();
            shared.reset_block_counts();
            let start = Instant::now();
            let changed = config
                .policy_update
                .update(&shared.policy, &shared.rewards, &params);
            report.update_time += start.elapsed();
            info!(
                block,
                sat,
                fail,
                rewarded = shared.rewards.len(),
                changed,
                policy_states = shared.policy.len(),
                "block finished"
            );
            shared.rewards.reset();
            report.blocks += 1;
        }
        Ok(report)
    }

    /// Build the deterministic overlay from the current policy. Returns the
    /// number of states it covers.
    pub fn determinise(&mut self) -> usize {
        let overlay = self.shared.policy.determinise();
        let states = overlay.len();
        debug!(states, "policy determinised");
        self.overlay = Some(Arc::new(overlay));
        states
    }

    /// Whether checking follows the deterministic overlay.
    pub fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
    }

    /// Bayesian hypothesis test of `H0: P <= theta` against `H1: P > theta`
    /// under the current policy.
    pub fn hypothesis_testing(
        &mut self,
        theta: f64,
        threshold: f64,
        alpha: f64,
        beta: f64,
    ) -> LearnResult<TestingResult> {
        let mut test = HypothesisTest::new(
            theta,
            threshold,
            alpha,
            beta,
            self.config.min_traces,
            self.config.max_traces,
        )?;
        info!(theta, threshold, "hypothesis testing");
        self.check(|satisfied| test.observe(satisfied))
    }

    /// Bayesian interval estimate of `P` under the current policy.
    pub fn interval_estimation(
        &mut self,
        alpha: f64,
        beta: f64,
        delta: f64,
        coefficient: f64,
    ) -> LearnResult<EstimationResult> {
        let mut estimator = IntervalEstimator::new(alpha, beta, delta, coefficient)?;
        info!(delta, coefficient, "interval estimation");
        self.check(|satisfied| estimator.observe(satisfied))
    }

    /// Start the pool, learn, then check with the configured method.
    pub fn run(&mut self) -> LearnResult<RunSummary> {
        let started = Instant::now();
        let mut profile = RunProfile::default();

        let t = Instant::now();
        self.start()?;
        profile.thread_start = t.elapsed();

        let t = Instant::now();
        let learning = self.learn(self.config.traces_per_block, self.config.num_blocks)?;
        profile.learning = t.elapsed();
        profile.policy_update = learning.update_time;

        if self.config.determinise {
            let t = Instant::now();
            self.determinise();
            self.set_deterministic(true);
            profile.determinise = t.elapsed();
        }

        let t = Instant::now();
        let c = &self.config;
        let (alpha, beta) = (c.alpha, c.beta);
        let method = c.method;
        let outcome = match method {
            SmcMethod::HypothesisTesting => {
                let (theta, threshold) = (c.theta, c.t);
                SmcOutcome::Testing(self.hypothesis_testing(theta, threshold, alpha, beta)?)
            }
            SmcMethod::IntervalEstimation => {
                let (delta, coefficient) = (c.delta, c.coefficient);
                SmcOutcome::Estimation(self.interval_estimation(alpha, beta, delta, coefficient)?)
            }
        };
        profile.smc = t.elapsed();

        profile.policy_states = self.policy_states();
        let workers = self.stop();
        profile.set_worker_averages(&workers);
        profile.total = started.elapsed();
        Ok(RunSummary {
            outcome,
            learning,
            profile,
            workers,
        })
    }

    /// Feed checking verdicts to `observe` until it returns a result.
    fn check<R>(&mut self, mut observe: impl FnMut(bool) -> Option<R>) -> LearnResult<R> {
        self.ensure_running()?;
        let batch = self.config.modelcheck_block_size;
        // Room for one full batch plus one failure report per worker.
        let (tx, rx) = mpsc::sync_channel(batch + self.workers.len());
        let overlay = if self.deterministic {
            self.overlay.clone()
        } else {
            None
        };
        let shared = Arc::clone(&self.shared);
        shared.jobs.lock().context = BatchContext {
            sink: Sink::Queue(tx),
            overlay,
        };

        let mut issued = 0usize;
        let mut received = 0usize;
        let outcome = loop {
            {
                let mut state = shared.jobs.lock();
                if let Some(err) = state.failure() {
                    break Err(LearnError::WorkerFailed(err.clone()));
                }
                if received == issued && state.active() == 0 {
                    shared.jobs.add_jobs(&mut state, batch);
                    issued += batch;
                }
            }
            match rx.recv() {
                Ok(Ok(verdict)) => {
                    received += 1;
                    if let Some(result) = observe(verdict.satisfied()) {
                        break Ok(result);
                    }
                }
                Ok(Err(err)) => break Err(LearnError::WorkerFailed(err)),
                Err(_) => break Err(LearnError::NotRunning),
            }
        };

        // Let in-flight grants finish before the pool is reused.
        let mut state = shared.jobs.lock();
        let cancelled = state.cancel_remaining();
        let mut state = shared.jobs.wait_idle(state);
        state.context = BatchContext::learning();
        drop(state);
        debug!(issued, received, cancelled, "checking finished");
        outcome
    }

    fn ensure_running(&self) -> LearnResult<()> {
        let state = self.shared.jobs.lock();
        if let Some(err) = state.failure() {
            return Err(LearnError::WorkerFailed(err.clone()));
        }
        if state.is_shutdown() {
            return Err(LearnError::Stopped);
        }
        if self.workers.is_empty() {
            return Err(LearnError::NotRunning);
        }
        Ok(())
    }
}

impl<M: Model, P> Coordinator<M, P> {
    pub fn config(&self) -> &LearnConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy<M::State> {
        &self.shared.policy
    }

    /// Rewards of the block in progress; empty between blocks.
    pub fn rewards(&self) -> &RewardStore<M::State> {
        &self.shared.rewards
    }

    pub fn deterministic_policy(&self) -> Option<&DeterministicPolicy<M::State>> {
        self.overlay.as_deref()
    }

    /// States known to the policy in use, overlay included when active.
    pub fn policy_states(&self) -> usize {
        let overlay = match (&self.overlay, self.deterministic) {
            (Some(overlay), true) => overlay.len(),
            _ => 0,
        };
        self.shared.policy.len() + overlay
    }

    /// Shut the pool down and collect the workers' profiles.
    pub fn stop(&mut self) -> Vec<WorkerProfile> {
        if self.workers.is_empty() {
            return Vec::new();
        }
        self.shared.jobs.shutdown();
        let profiles: Vec<_> = self
            .workers
            .drain(..)
            .filter_map(|handle| match handle.join() {
                Ok(profile) => Some(profile),
                Err(_) => {
                    error!("worker thread panicked");
                    None
                }
            })
            .collect();
        info!(workers = profiles.len(), "worker pool stopped");
        profiles
    }
}

impl<M: Model, P> Drop for Coordinator<M, P> {
    fn drop(&mut self) {
        self.stop();
    }
}
