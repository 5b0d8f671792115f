//! Beta distribution.
//!
//! The CDF is the regularised incomplete beta function `I_x(a, b)`, evaluated
//! with the modified Lentz continued fraction and the reflection
//! `I_x(a, b) = 1 - I_{1-x}(b, a)` on whichever side converges faster.

use crate::{StatsError, StatsResult};

/// Iteration cap for the continued fraction. Convergence takes roughly
/// `sqrt(max(a, b))` iterations, so this covers shape parameters in the
/// hundreds of millions.
const MAX_ITERATIONS: usize = 20_000;
const EPSILON: f64 = 1e-15;
const FP_MIN: f64 = 1e-300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaDist {
    alpha: f64,
    beta: f64,
    /// ln B(alpha, beta)
    ln_beta: f64,
}

impl BetaDist {
    pub fn new(alpha: f64, beta: f64) -> StatsResult<Self> {
        if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) {
            return Err(StatsError::InvalidBeta { alpha, beta });
        }
        Ok(Self {
            alpha,
            beta,
            ln_beta: libm::lgamma(alpha) + libm::lgamma(beta) - libm::lgamma(alpha + beta),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// P(X <= x).
    pub fn cdf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        let (a, b) = (self.alpha, self.beta);
        let front = (a * x.ln() + b * (1.0 - x).ln() - self.ln_beta).exp();
        let value = if x < (a + 1.0) / (a + b + 2.0) {
            front * continued_fraction(a, b, x) / a
        } else {
            1.0 - front * continued_fraction(b, a, 1.0 - x) / b
        };
        value.clamp(0.0, 1.0)
    }

    /// Probability mass in `[lo, hi]`.
    pub fn mass_between(&self, lo: f64, hi: f64) -> f64 {
        (self.cdf(hi) - self.cdf(lo)).max(0.0)
    }
}

fn guard(v: f64) -> f64 {
    if v.abs() < FP_MIN {
        FP_MIN
    } else {
        v
    }
}

fn continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_uniform_is_identity() {
        let d = BetaDist::new(1.0, 1.0).unwrap();
        for x in [0.0, 0.1, 0.25, 0.5, 0.9, 1.0] {
            assert!(close(d.cdf(x), x, 1e-12), "x={x} cdf={}", d.cdf(x));
        }
    }

    #[test]
    fn test_closed_forms() {
        // Beta(a, 1): x^a.  Beta(1, b): 1 - (1-x)^b.
        let d = BetaDist::new(3.0, 1.0).unwrap();
        assert!(close(d.cdf(0.5), 0.125, 1e-12));
        let d = BetaDist::new(1.0, 4.0).unwrap();
        assert!(close(d.cdf(0.2), 1.0 - 0.8f64.powi(4), 1e-12));
        // Beta(2, 2): 3x^2 - 2x^3.
        let d = BetaDist::new(2.0, 2.0).unwrap();
        assert!(close(d.cdf(0.3), 3.0 * 0.09 - 2.0 * 0.027, 1e-12));
    }

    #[test]
    fn test_jeffreys_prior_is_symmetric() {
        let d = BetaDist::new(0.5, 0.5).unwrap();
        assert!(close(d.cdf(0.5), 0.5, 1e-12));
        // Arcsine law: 2/pi * asin(sqrt(x)).
        let x: f64 = 0.2;
        let expected = 2.0 / std::f64::consts::PI * x.sqrt().asin();
        assert!(close(d.cdf(x), expected, 1e-10));
    }

    #[test]
    fn test_large_parameters_concentrate() {
        let d = BetaDist::new(50_000.5, 50_000.5).unwrap();
        assert!(close(d.cdf(0.5), 0.5, 1e-7));
        assert!(d.cdf(0.49) < 1e-9);
        assert!(d.cdf(0.51) > 1.0 - 1e-9);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(BetaDist::new(0.0, 1.0).is_err());
        assert!(BetaDist::new(1.0, -2.0).is_err());
        assert!(BetaDist::new(f64::INFINITY, 1.0).is_err());
        assert!(BetaDist::new(f64::NAN, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn cdf_is_monotone_and_bounded(
            a in 0.1f64..200.0,
            b in 0.1f64..200.0,
            x in 0.0f64..1.0,
            dx in 0.0f64..0.5,
        ) {
            let d = BetaDist::new(a, b).unwrap();
            let lo = d.cdf(x);
            let hi = d.cdf((x + dx).min(1.0));
            prop_assert!((0.0..=1.0).contains(&lo));
            prop_assert!(hi + 1e-12 >= lo, "cdf({}) = {} > cdf({}) = {}", x, lo, x + dx, hi);
        }

        #[test]
        fn cdf_reflection(a in 0.1f64..50.0, b in 0.1f64..50.0, x in 0.01f64..0.99) {
            let d = BetaDist::new(a, b).unwrap();
            let r = BetaDist::new(b, a).unwrap();
            prop_assert!((d.cdf(x) + r.cdf(1.0 - x) - 1.0).abs() < 1e-9);
        }
    }
}
