//! Worker threads: simulate, check, then reward or report.

use crate::attribution::RewardAttribution;
use crate::jobs::{Grant, JobQueue};
use crate::policy::{DeterministicPolicy, Policy, PolicyView};
use crate::profile::WorkerProfile;
use crate::reward::RewardStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smdp_model::{
    ChoiceResolver, Model, ModelError, ModelResult, ModelState, Property, SatResult, Trace,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Verdict as delivered to the checking loop.
pub(crate) type Verdict = Result<SatResult, ModelError>;

/// Where the results of the current batch go.
#[derive(Clone)]
pub(crate) enum Sink {
    /// Credit the policy's reward store (learning).
    Rewards,
    /// Send verdicts to the decision procedure (checking).
    Queue(SyncSender<Verdict>),
}

/// Carried by every grant of a batch.
#[derive(Clone)]
pub(crate) struct BatchContext<S: ModelState> {
    pub(crate) sink: Sink,
    pub(crate) overlay: Option<Arc<DeterministicPolicy<S>>>,
}

impl<S: ModelState> BatchContext<S> {
    pub(crate) fn learning() -> Self {
        Self {
            sink: Sink::Rewards,
            overlay: None,
        }
    }
}

/// Everything the coordinator shares with its workers.
pub(crate) struct Shared<M: Model, P> {
    pub(crate) model: M,
    pub(crate) property: P,
    pub(crate) attribution: RewardAttribution,
    pub(crate) jobs: JobQueue<BatchContext<M::State>>,
    pub(crate) policy: Policy<M::State>,
    pub(crate) rewards: RewardStore<M::State>,
    pub(crate) initial: M::State,
    pub(crate) trace_length: usize,
    pub(crate) jobs_per_request: usize,
    /// Verdicts of the current learning block.
    pub(crate) sat: AtomicU64,
    pub(crate) fail: AtomicU64,
}

impl<M: Model, P> Shared<M, P> {
    pub(crate) fn block_counts(&self) -> (u64, u64) {
        (
            self.sat.load(Ordering::Relaxed),
            self.fail.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn reset_block_counts(&self) {
        self.sat.store(0, Ordering::Relaxed);
        self.fail.store(0, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", msg)
    } else {
        "worker panicked".to_string()
    }
}

/// Samples the policy at every nondeterministic state of a trace.
struct PolicyResolver<'a, S: ModelState> {
    view: PolicyView<'a, S>,
    rng: &'a mut StdRng,
}

impl<S: ModelState> ChoiceResolver<S> for PolicyResolver<'_, S> {
    fn resolve(&mut self, state: &S, num_choices: usize) -> usize {
        let x: f64 = self.rng.gen();
        self.view.choose(state, num_choices, x)
    }
}

pub(crate) struct Worker<M: Model, P> {
    id: usize,
    shared: Arc<Shared<M, P>>,
    ctx: M::Context,
    rng: StdRng,
    profile: WorkerProfile,
}

impl<M, P> Worker<M, P>
where
    M: Model,
    P: Property<M::State>,
{
    pub(crate) fn new(id: usize, shared: Arc<Shared<M, P>>, seed: u64) -> Self {
        let ctx = shared.model.initial_context(seed);
        Self {
            id,
            shared,
            ctx,
            rng: StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
            profile: WorkerProfile::default(),
        }
    }

    /// Serve grants until the queue shuts down.
    pub(crate) fn run(mut self) -> WorkerProfile {
        debug!(worker = self.id, "worker started");
        while let Some(grant) = self.shared.jobs.request_jobs(self.shared.jobs_per_request) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_grant(&grant)))
                .unwrap_or_else(|payload| Err(ModelError::Internal(panic_message(&*payload))));
            if let Err(err) = outcome {
                error!(worker = self.id, error = %err, "simulation failed, stopping");
                self.shared.jobs.fail(err.clone());
                if let Sink::Queue(tx) = &grant.context.sink {
                    let _ = tx.send(Err(err));
                }
                break;
            }
        }
        debug!(worker = self.id, traces = self.profile.traces, "worker stopped");
        self.profile
    }

    fn run_grant(&mut self, grant: &Grant<BatchContext<M::State>>) -> ModelResult<()> {
        let ctx = &grant.context;
        for _ in 1..grant.count {
            let (trace, verdict) = self.run_job(ctx)?;
            self.deliver(&ctx.sink, &trace, verdict);
        }
        let (trace, verdict) = self.run_job(ctx)?;
        // The last result and the grant's completion are one step for the
        // coordinator waiting on the batch.
        let shared = Arc::clone(&self.shared);
        let mut state = shared.jobs.lock();
        self.deliver(&ctx.sink, &trace, verdict);
        shared.jobs.finish(&mut state);
        Ok(())
    }

    fn run_job(
        &mut self,
        ctx: &BatchContext<M::State>,
    ) -> ModelResult<(Trace<M::State>, SatResult)> {
        let shared = &*self.shared;
        let start = Instant::now();
        let mut resolver = PolicyResolver {
            view: PolicyView {
                base: &shared.policy,
                overlay: ctx.overlay.as_deref(),
            },
            rng: &mut self.rng,
        };
        let trace = shared.model.generate_trace(
            &mut self.ctx,
            &shared.initial,
            shared.trace_length,
            &mut resolver,
        )?;
        let simulated = Instant::now();
        let verdict = shared.property.evaluate(&trace)?;
        self.profile.simulating += simulated - start;
        self.profile.checking += simulated.elapsed();
        self.profile.traces += 1;
        Ok((trace, verdict))
    }

    fn deliver(&mut self, sink: &Sink, trace: &Trace<M::State>, verdict: SatResult) {
        let start = Instant::now();
        match sink {
            Sink::Rewards => {
                self.shared
                    .attribution
                    .attribute(&self.shared.rewards, trace.steps(), &verdict);
                let counter = if verdict.satisfied() {
                    &self.shared.sat
                } else {
                    &self.shared.fail
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Sink::Queue(tx) => {
                // A closed queue means the decision was already reached.
                let _ = tx.send(Ok(verdict));
            }
        }
        self.profile.rewarding += start.elapsed();
    }
}
