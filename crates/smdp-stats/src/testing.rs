//! Sequential Bayesian hypothesis testing.
//!
//! Tests `H0: p <= theta` against `H1: p > theta` for the success probability
//! `p` of a Bernoulli stream, with a `Beta(alpha, beta)` prior. The Bayes
//! factor in favour of `H1` after `n_sat` successes and `n_fail` failures is
//!
//! ```text
//! B = prior_odds * (1 / F(theta) - 1),   F = cdf of Beta(n_sat + alpha, n_fail + beta)
//! prior_odds = F0(theta) / (1 - F0(theta)), F0 = cdf of Beta(alpha, beta)
//! ```

use crate::beta::BetaDist;
use crate::{StatsError, StatsResult};
use std::fmt;
use tracing::debug;

/// Prior odds `P(H0) / P(H1)` under a `Beta(alpha, beta)` prior.
pub fn prior_odds(alpha: f64, beta: f64, theta: f64) -> StatsResult<f64> {
    let p0 = BetaDist::new(alpha, beta)?.cdf(theta);
    Ok(p0 / (1.0 - p0))
}

/// Bayes factor in favour of `p > theta` after the given counts.
pub fn bayes_factor(
    prior_odds: f64,
    alpha: f64,
    beta: f64,
    theta: f64,
    n_sat: u64,
    n_fail: u64,
) -> StatsResult<f64> {
    let posterior = BetaDist::new(n_sat as f64 + alpha, n_fail as f64 + beta)?;
    Ok(prior_odds * (1.0 / posterior.cdf(theta) - 1.0))
}

/// The hypothesis a test settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypothesis {
    /// `p <= theta`
    Null,
    /// `p > theta`
    Alternative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestingResult {
    pub bayes_factor: f64,
    pub accepted: Hypothesis,
    pub n_sat: u64,
    pub n_traces: u64,
}

impl TestingResult {
    pub fn null_accepted(&self) -> bool {
        self.accepted == Hypothesis::Null
    }

    /// `null accepted (1/0), bayes factor, satisfied, total`
    pub fn csv(&self) -> String {
        format!(
            "{}, {}, {}, {}",
            if self.null_accepted() { 1 } else { 0 },
            self.bayes_factor,
            self.n_sat,
            self.n_traces
        )
    }
}

impl fmt::Display for TestingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** Hypothesis Testing Results ***")?;
        writeln!(
            f,
            " - Accepted: {} hypothesis",
            match self.accepted {
                Hypothesis::Null => "NULL",
                Hypothesis::Alternative => "ALTERNATIVE",
            }
        )?;
        writeln!(f, " - Bayes Factor of: {}", self.bayes_factor)?;
        write!(
            f,
            " - Number of satisfied traces/total number of traces: {}/{}",
            self.n_sat, self.n_traces
        )
    }
}

/// Incremental Bayes-factor test.
#[derive(Debug, Clone)]
pub struct HypothesisTest {
    theta: f64,
    threshold: f64,
    alpha: f64,
    beta: f64,
    prior_odds: f64,
    min_traces: u64,
    max_traces: u64,
    n_traces: u64,
    n_sat: u64,
}

impl HypothesisTest {
    /// `threshold` is the Bayes factor `T` required to accept `H1`; `H0` is
    /// accepted below `1/T`. No decision is taken before `min_traces`
    /// verdicts, and one is forced at `max_traces`.
    pub fn new(
        theta: f64,
        threshold: f64,
        alpha: f64,
        beta: f64,
        min_traces: u64,
        max_traces: u64,
    ) -> StatsResult<Self> {
        if !(theta > 0.0 && theta < 1.0) {
            return Err(StatsError::InvalidParameter {
                name: "theta",
                value: theta,
                reason: "must lie strictly between 0 and 1",
            });
        }
        if !(threshold >= 1.0) || threshold.is_infinite() {
            return Err(StatsError::InvalidParameter {
                name: "T",
                value: threshold,
                reason: "must be a finite Bayes factor of at least 1",
            });
        }
        if max_traces == 0 {
            return Err(StatsError::InvalidParameter {
                name: "max_traces",
                value: 0.0,
                reason: "must be positive",
            });
        }
        let prior_odds = prior_odds(alpha, beta, theta)?;
        Ok(Self {
            theta,
            threshold,
            alpha,
            beta,
            prior_odds,
            min_traces: min_traces.min(max_traces),
            max_traces,
            n_traces: 0,
            n_sat: 0,
        })
    }

    pub fn n_traces(&self) -> u64 {
        self.n_traces
    }

    pub fn n_sat(&self) -> u64 {
        self.n_sat
    }

    /// Bayes factor for the verdicts seen so far.
    pub fn bayes_factor(&self) -> f64 {
        // Parameters were validated in new(); the posterior shape only grows.
        bayes_factor(
            self.prior_odds,
            self.alpha,
            self.beta,
            self.theta,
            self.n_sat,
            self.n_traces - self.n_sat,
        )
        .unwrap_or(f64::NAN)
    }

    /// Record one verdict; returns the decision once one is reached.
    pub fn observe(&mut self, satisfied: bool) -> Option<TestingResult> {
        self.n_traces += 1;
        if satisfied {
            self.n_sat += 1;
        }
        if self.n_traces < self.min_traces {
            return None;
        }

        let factor = self.bayes_factor();
        let exhausted = self.n_traces >= self.max_traces;
        let accepted = if factor > self.threshold || (exhausted && factor > 1.0) {
            Hypothesis::Alternative
        } else if factor < 1.0 / self.threshold || exhausted {
            // At exhaustion a factor of exactly 1 (or NaN) settles on the null.
            Hypothesis::Null
        } else {
            return None;
        };

        debug!(
            n_traces = self.n_traces,
            n_sat = self.n_sat,
            bayes_factor = factor,
            exhausted,
            "hypothesis test decided"
        );
        Some(TestingResult {
            bayes_factor: factor,
            accepted,
            n_sat: self.n_sat,
            n_traces: self.n_traces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(test: &mut HypothesisTest, verdicts: impl IntoIterator<Item = bool>) -> Option<TestingResult> {
        verdicts.into_iter().find_map(|v| test.observe(v))
    }

    #[test]
    fn test_prior_odds_symmetric_prior() {
        assert!((prior_odds(1.0, 1.0, 0.5).unwrap() - 1.0).abs() < 1e-12);
        assert!((prior_odds(0.5, 0.5, 0.5).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_satisfied_accepts_alternative() {
        let mut test = HypothesisTest::new(0.5, 1000.0, 0.5, 0.5, 10, 100_000).unwrap();
        let r = run(&mut test, std::iter::repeat(true)).unwrap();
        assert_eq!(r.accepted, Hypothesis::Alternative);
        assert!(r.bayes_factor > 1000.0);
        assert_eq!(r.n_sat, r.n_traces);
        assert!(r.n_traces >= 10);
    }

    #[test]
    fn test_all_failed_accepts_null() {
        let mut test = HypothesisTest::new(0.5, 1000.0, 0.5, 0.5, 10, 100_000).unwrap();
        let r = run(&mut test, std::iter::repeat(false)).unwrap();
        assert!(r.null_accepted());
        assert!(r.bayes_factor < 1.0 / 1000.0);
        assert_eq!(r.n_sat, 0);
    }

    #[test]
    fn test_no_decision_before_min_traces() {
        let mut test = HypothesisTest::new(0.5, 2.0, 1.0, 1.0, 50, 1000).unwrap();
        for _ in 0..49 {
            assert!(test.observe(true).is_none());
        }
        assert!(test.observe(true).is_some());
    }

    #[test]
    fn test_single_trace_budget_terminates() {
        let mut test = HypothesisTest::new(0.5, 1000.0, 1.0, 1.0, 500, 1).unwrap();
        let r = test.observe(true).expect("budget of one trace must decide");
        assert_eq!(r.n_traces, 1);
        // Beta(2, 1) at 0.5 is 0.25, so B = 3: weak evidence, forced decision.
        assert!((r.bayes_factor - 3.0).abs() < 1e-9);
        assert_eq!(r.accepted, Hypothesis::Alternative);

        let mut test = HypothesisTest::new(0.5, 1000.0, 1.0, 1.0, 500, 1).unwrap();
        let r = test.observe(false).unwrap();
        assert!(r.null_accepted());
    }

    #[test]
    fn test_balanced_stream_forced_at_budget() {
        let mut test = HypothesisTest::new(0.5, 1e6, 1.0, 1.0, 1, 200).unwrap();
        let r = run(&mut test, (0..).map(|i| i % 2 == 0)).unwrap();
        assert_eq!(r.n_traces, 200);
        assert_eq!(r.n_sat, 100);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(HypothesisTest::new(0.0, 10.0, 1.0, 1.0, 1, 10).is_err());
        assert!(HypothesisTest::new(1.0, 10.0, 1.0, 1.0, 1, 10).is_err());
        assert!(HypothesisTest::new(0.5, 0.5, 1.0, 1.0, 1, 10).is_err());
        assert!(HypothesisTest::new(0.5, 10.0, 0.0, 1.0, 1, 10).is_err());
        assert!(HypothesisTest::new(0.5, 10.0, 1.0, 1.0, 1, 0).is_err());
    }

    #[test]
    fn test_csv_and_display() {
        let r = TestingResult {
            bayes_factor: 2.5,
            accepted: Hypothesis::Null,
            n_sat: 3,
            n_traces: 10,
        };
        assert_eq!(r.csv(), "1, 2.5, 3, 10");
        let text = r.to_string();
        assert!(text.contains("Accepted: NULL hypothesis"));
        assert!(text.ends_with("3/10"));
    }
}
