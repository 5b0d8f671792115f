#![no_main]
use libfuzzer_sys::fuzz_target;
use smdp_stats::BetaDist;

fn f64_at(data: &[u8], i: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[i * 8..i * 8 + 8]);
    f64::from_le_bytes(bytes)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 {
        return;
    }
    let (alpha, beta) = (f64_at(data, 0).abs(), f64_at(data, 1).abs());
    let (x, y) = (f64_at(data, 2), f64_at(data, 3));
    // Shapes seen in practice: priors plus trace counts.
    if !(1e-3..=1e6).contains(&alpha) || !(1e-3..=1e6).contains(&beta) {
        return;
    }
    let Ok(dist) = BetaDist::new(alpha, beta) else {
        return;
    };
    if !(x.is_finite() && y.is_finite()) {
        return;
    }
    let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
    let (f_lo, f_hi) = (dist.cdf(lo), dist.cdf(hi));
    assert!((0.0..=1.0).contains(&f_lo), "cdf({}) = {}", lo, f_lo);
    assert!((0.0..=1.0).contains(&f_hi), "cdf({}) = {}", hi, f_hi);
    assert!(f_lo <= f_hi + 1e-9, "cdf not monotone: {} > {}", f_lo, f_hi);
});
