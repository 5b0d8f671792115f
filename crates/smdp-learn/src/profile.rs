//! Wall-clock profiles of a run.

use std::fmt;
use std::time::Duration;

/// Time one worker spent in each phase of its jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerProfile {
    /// Generating traces.
    pub simulating: Duration,
    /// Evaluating the property.
    pub checking: Duration,
    /// Attributing rewards or delivering verdicts.
    pub rewarding: Duration,
    pub traces: u64,
}

/// Phase timings of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProfile {
    pub thread_start: Duration,
    pub learning: Duration,
    pub policy_update: Duration,
    pub determinise: Duration,
    pub smc: Duration,
    pub avg_simulating: Duration,
    pub avg_checking: Duration,
    pub avg_rewarding: Duration,
    pub total: Duration,
    pub policy_states: usize,
}

impl RunProfile {
    /// Average the per-phase times over all workers.
    pub fn set_worker_averages(&mut self, workers: &[WorkerProfile]) {
        let n = workers.len().max(1) as u32;
        let sum = |phase: fn(&WorkerProfile) -> Duration| -> Duration {
            workers.iter().map(phase).sum::<Duration>() / n
        };
        self.avg_simulating = sum(|w| w.simulating);
        self.avg_checking = sum(|w| w.checking);
        self.avg_rewarding = sum(|w| w.rewarding);
    }

    /// Millisecond timings, comma separated, in declaration order.
    pub fn csv(&self) -> String {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        format!(
            "{:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {}",
            ms(self.thread_start),
            ms(self.learning),
            ms(self.policy_update),
            ms(self.determinise),
            ms(self.smc),
            ms(self.avg_simulating),
            ms(self.avg_checking),
            ms(self.avg_rewarding),
            ms(self.total),
            self.policy_states
        )
    }
}

impl fmt::Display for RunProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Profile:")?;
        writeln!(f, "  thread start:   {:.3}s", self.thread_start.as_secs_f64())?;
        writeln!(f, "  learning:       {:.3}s", self.learning.as_secs_f64())?;
        writeln!(f, "  policy update:  {:.3}s", self.policy_update.as_secs_f64())?;
        writeln!(f, "  determinise:    {:.3}s", self.determinise.as_secs_f64())?;
        writeln!(f, "  checking:       {:.3}s", self.smc.as_secs_f64())?;
        writeln!(
            f,
            "  per worker:     simulating {:.3}s, checking {:.3}s, rewarding {:.3}s",
            self.avg_simulating.as_secs_f64(),
            self.avg_checking.as_secs_f64(),
            self.avg_rewarding.as_secs_f64()
        )?;
        writeln!(f, "  total:          {:.3}s", self.total.as_secs_f64())?;
        write!(f, "  policy states:  {}", self.policy_states)
    }
}
