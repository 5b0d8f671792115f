//! Job hand-out between the coordinator and its workers.
//!
//! One mutex guards the job counters, two condition variables signal "jobs
//! available" (to workers) and "jobs done" (to the coordinator). A worker
//! finishes the last job of its grant while holding the lock, so once the
//! coordinator observes no remaining and no active jobs every result of the
//! batch has been delivered.

use smdp_model::ModelError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// State shared under the job lock.
///
/// `C` is what every grant of the current batch carries to the workers: where
/// to deliver results and which policy to follow.
#[derive(Debug)]
pub struct JobState<C> {
    remaining: usize,
    active: usize,
    shutdown: bool,
    failure: Option<ModelError>,
    pub context: C,
}

impl<C> JobState<C> {
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// First failure reported by a worker, if any.
    pub fn failure(&self) -> Option<&ModelError> {
        self.failure.as_ref()
    }

    /// Withdraw jobs no worker has claimed yet. Returns how many were dropped.
    pub fn cancel_remaining(&mut self) -> usize {
        std::mem::take(&mut self.remaining)
    }
}

/// A worker's share of the current batch.
#[derive(Debug, Clone)]
pub struct Grant<C> {
    pub count: usize,
    pub context: C,
}

pub struct JobQueue<C> {
    state: Mutex<JobState<C>>,
    jobs_available: Condvar,
    jobs_done: Condvar,
}

impl<C: Clone> JobQueue<C> {
    pub fn new(context: C) -> Self {
        Self {
            state: Mutex::new(JobState {
                remaining: 0,
                active: 0,
                shutdown: false,
                failure: None,
                context,
            }),
            jobs_available: Condvar::new(),
            jobs_done: Condvar::new(),
        }
    }

    /// Take the job lock.
    ///
    /// A poisoned lock means a worker panicked while holding it; the counters
    /// are still consistent, so the guard is recovered.
    pub fn lock(&self) -> MutexGuard<'_, JobState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue `count` new jobs and wake every waiting worker.
    ///
    /// # Panics
    ///
    /// If jobs of the previous batch are still unclaimed.
    pub fn add_jobs(&self, state: &mut JobState<C>, count: usize) {
        assert_eq!(
            state.remaining, 0,
            "new jobs issued while {} are still pending",
            state.remaining
        );
        state.remaining = count;
        trace!(count, "jobs added");
        self.jobs_available.notify_all();
    }

    /// Block until jobs are available and claim up to `limit` of them.
    ///
    /// Returns `None` once the queue is shut down.
    pub fn request_jobs(&self, limit: usize) -> Option<Grant<C>> {
        let mut state = self.lock();
        while state.remaining == 0 && !state.shutdown {
            state = self
                .jobs_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.shutdown {
            self.jobs_available.notify_all();
            return None;
        }
        let count = state.remaining.min(limit.max(1));
        state.remaining -= count;
        state.active += 1;
        Some(Grant {
            count,
            context: state.context.clone(),
        })
    }

    /// Mark the caller's grant finished. The caller must still hold the lock
    /// it delivered its last result under.
    pub fn finish(&self, state: &mut JobState<C>) {
        debug_assert!(state.active > 0, "finish without an active grant");
        state.active -= 1;
        self.jobs_done.notify_one();
    }

    /// Abandon the caller's grant after a failure and shut the queue down.
    /// The first reported failure is kept.
    pub fn fail(&self, error: ModelError) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        state.failure.get_or_insert(error);
        state.shutdown = true;
        self.jobs_available.notify_all();
        self.jobs_done.notify_all();
    }

    /// Wait until every issued job is finished or a worker has failed.
    pub fn wait_idle<'a>(
        &self,
        mut state: MutexGuard<'a, JobState<C>>,
    ) -> MutexGuard<'a, JobState<C>> {
        while (state.remaining > 0 || state.active > 0) && state.failure.is_none() {
            state = self
                .jobs_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    /// Raise the shutdown flag and wake every worker.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.jobs_available.notify_all();
    }
}
