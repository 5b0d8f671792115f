//! Bayesian interval estimation.
//!
//! Estimates the success probability `p` of a Bernoulli stream to within
//! `+-delta`, stopping once the posterior `Beta(n_sat + alpha, n_fail + beta)`
//! puts at least `coefficient` of its mass inside the interval.

use crate::beta::BetaDist;
use crate::{StatsError, StatsResult};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    /// Posterior mean estimate.
    pub p: f64,
    pub lower: f64,
    pub upper: f64,
    /// Posterior mass inside `[lower, upper]`.
    pub posterior_mass: f64,
    pub n_sat: u64,
    pub n_traces: u64,
}

impl EstimationResult {
    /// `estimate, lower, upper, satisfied, total`
    pub fn csv(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.p, self.lower, self.upper, self.n_sat, self.n_traces
        )
    }
}

impl fmt::Display for EstimationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** Interval Estimation Results ***")?;
        writeln!(f, " - Estimate: {}", self.p)?;
        writeln!(
            f,
            " - Interval: [{}, {}] with posterior probability {}",
            self.lower, self.upper, self.posterior_mass
        )?;
        write!(
            f,
            " - Number of satisfied traces/total number of traces: {}/{}",
            self.n_sat, self.n_traces
        )
    }
}

/// `[p - delta, p + delta]`, shifted to stay inside `[0, 1]` with its width kept.
pub fn credible_interval(p: f64, delta: f64) -> (f64, f64) {
    if p + delta > 1.0 {
        (1.0 - 2.0 * delta, 1.0)
    } else if p - delta < 0.0 {
        (0.0, 2.0 * delta)
    } else {
        (p - delta, p + delta)
    }
}

#[derive(Debug, Clone)]
pub struct IntervalEstimator {
    alpha: f64,
    beta: f64,
    delta: f64,
    coefficient: f64,
    n_traces: u64,
    n_sat: u64,
}

impl IntervalEstimator {
    pub fn new(alpha: f64, beta: f64, delta: f64, coefficient: f64) -> StatsResult<Self> {
        BetaDist::new(alpha, beta)?;
        if !(delta > 0.0 && delta <= 0.5) {
            return Err(StatsError::InvalidParameter {
                name: "delta",
                value: delta,
                reason: "half-width must lie in (0, 0.5]",
            });
        }
        if !(coefficient > 0.0 && coefficient < 1.0) {
            return Err(StatsError::InvalidParameter {
                name: "coefficient",
                value: coefficient,
                reason: "must lie strictly between 0 and 1",
            });
        }
        Ok(Self {
            alpha,
            beta,
            delta,
            coefficient,
            n_traces: 0,
            n_sat: 0,
        })
    }

    pub fn n_traces(&self) -> u64 {
        self.n_traces
    }

    /// Current estimate and its interval, without checking the stop rule.
    pub fn estimate(&self) -> EstimationResult {
        let p = (self.n_sat as f64 + self.alpha) / (self.n_traces as f64 + self.alpha + self.beta);
        let (lower, upper) = credible_interval(p, self.delta);
        let n_fail = self.n_traces - self.n_sat;
        let posterior_mass = BetaDist::new(self.n_sat as f64 + self.alpha, n_fail as f64 + self.beta)
            .map(|d| d.mass_between(lower, upper))
            .unwrap_or(0.0);
        EstimationResult {
            p,
            lower,
            upper,
            posterior_mass,
            n_sat: self.n_sat,
            n_traces: self.n_traces,
        }
    }

    /// Record one verdict; returns the estimate once the posterior mass in the
    /// interval reaches the coefficient.
    pub fn observe(&mut self, satisfied: bool) -> Option<EstimationResult> {
        self.n_traces += 1;
        if satisfied {
            self.n_sat += 1;
        }
        let result = self.estimate();
        if result.posterior_mass < self.coefficient {
            return None;
        }
        debug!(
            n_traces = result.n_traces,
            n_sat = result.n_sat,
            p = result.p,
            "interval estimation converged"
        );
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_shifts_instead_of_truncating() {
        let (lo, hi) = credible_interval(0.95, 0.1);
        assert!((lo - 0.8).abs() < 1e-12 && hi == 1.0);
        let (lo, hi) = credible_interval(0.02, 0.1);
        assert!(lo == 0.0 && (hi - 0.2).abs() < 1e-12);
        let (lo, hi) = credible_interval(0.5, 0.1);
        assert!((lo - 0.4).abs() < 1e-12 && (hi - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_all_satisfied_stream_clamps_to_top() {
        let mut est = IntervalEstimator::new(1.0, 1.0, 0.1, 0.95).unwrap();
        let r = (0..1000)
            .find_map(|_| est.observe(true))
            .expect("must converge within 1000 verdicts");
        assert!(r.p > 0.9, "p = {}", r.p);
        assert!((r.lower - 0.8).abs() < 1e-12);
        assert_eq!(r.upper, 1.0);
        assert!(r.posterior_mass >= 0.95);
        assert_eq!(r.n_sat, r.n_traces);
        // Beta(n + 1, 1) puts 1 - 0.8^(n+1) in [0.8, 1]; that reaches 0.95 at n = 13.
        assert_eq!(r.n_traces, 13);
    }

    #[test]
    fn test_half_stream_centres_on_half() {
        let mut est = IntervalEstimator::new(1.0, 1.0, 0.05, 0.9).unwrap();
        let r = (0..100_000)
            .find_map(|i| est.observe(i % 2 == 0))
            .unwrap();
        assert!((r.p - 0.5).abs() < 0.01);
        assert!(r.lower < 0.5 && r.upper > 0.5);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(IntervalEstimator::new(1.0, 1.0, 0.0, 0.95).is_err());
        assert!(IntervalEstimator::new(1.0, 1.0, 0.6, 0.95).is_err());
        assert!(IntervalEstimator::new(1.0, 1.0, 0.1, 1.0).is_err());
        assert!(IntervalEstimator::new(-1.0, 1.0, 0.1, 0.9).is_err());
    }
}
