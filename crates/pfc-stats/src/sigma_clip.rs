//! Iterative sigma clipping
//!
//! Mean and width of a peak are re-estimated from the samples lying within
//! `nsigmas` standard deviations of the previous estimate until both settle.

use pfc_core::{Error, Result};

/// Half-width of the clipping window in units of sigma.
pub const DEFAULT_NSIGMAS: f64 = 3.0;

/// Maximum number of clipping iterations after the zeroth pass.
pub const MAX_ITERATIONS: usize = 1000;

const REL_TOL: f64 = 1e-6;

/// Population mean and sigma of the values accepted by `keep`.
fn moments(numbers: &[f64], keep: impl Fn(f64) -> bool) -> Option<(f64, f64)> {
    let (mut n, mut sum, mut sum2) = (0usize, 0.0, 0.0);
    for &x in numbers.iter().filter(|&&x| keep(x)) {
        n += 1;
        sum += x;
        sum2 += x * x;
    }
    if n == 0 {
        return None;
    }
    let mean = sum / n as f64;
    // round-off can push the variance slightly below zero
    let var = (sum2 / n as f64 - mean * mean).max(0.0);
    Some((mean, var.sqrt()))
}

/// Outlier-trimmed mean and population sigma of `numbers`.
///
/// The zeroth iteration uses every value. Each following iteration keeps the
/// values in the closed window `[mean - nsigmas*sigma, mean + nsigmas*sigma]`
/// of the previous iteration. Stops once both statistics change by at most a
/// relative 1e-6.
pub fn mean_sigma(numbers: &[f64], nsigmas: f64) -> Result<(f64, f64)> {
    if numbers.is_empty() {
        return Err(Error::Validation("mean_sigma: empty input".to_string()));
    }
    if !(nsigmas > 0.0) {
        return Err(Error::Validation(format!("mean_sigma: nsigmas must be > 0, got {nsigmas}")));
    }
    if let Some(bad) = numbers.iter().find(|x| !x.is_finite()) {
        return Err(Error::Validation(format!("mean_sigma: non-finite value {bad}")));
    }

    let (mut mean, mut sigma) = moments(numbers, |_| true)
        .ok_or_else(|| Error::Computation("mean_sigma: empty input".to_string()))?;

    for _ in 0..MAX_ITERATIONS {
        let (mean_prev, sigma_prev) = (mean, sigma);
        let lo = mean - nsigmas * sigma;
        let hi = mean + nsigmas * sigma;

        (mean, sigma) = moments(numbers, |x| x >= lo && x <= hi).ok_or_else(|| {
            Error::Computation(format!("mean_sigma: no values within [{lo}, {hi}]"))
        })?;

        if (mean - mean_prev).abs() <= REL_TOL * mean.abs()
            && (sigma - sigma_prev).abs() <= REL_TOL * sigma.abs()
        {
            return Ok((mean, sigma));
        }
    }

    Err(Error::Convergence(format!(
        "mean and/or sigma did not converge: n={}, mean={mean}, sigma={sigma}",
        numbers.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn constant_sample() {
        let (m, s) = mean_sigma(&[2.5; 10], DEFAULT_NSIGMAS).unwrap();
        assert_relative_eq!(m, 2.5);
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn single_value() {
        let (m, s) = mean_sigma(&[-4.0], DEFAULT_NSIGMAS).unwrap();
        assert_relative_eq!(m, -4.0);
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn symmetric_pair() {
        // both values sit at mean +- sigma and stay inside the window
        let (m, s) = mean_sigma(&[1.0, 3.0], DEFAULT_NSIGMAS).unwrap();
        assert_relative_eq!(m, 2.0);
        assert_relative_eq!(s, 1.0);
    }

    #[test]
    fn outlier_is_removed() {
        let mut values = vec![1.0; 50];
        values.extend(std::iter::repeat_n(1.2, 50));
        values.push(100.0);
        let (m, s) = mean_sigma(&values, DEFAULT_NSIGMAS).unwrap();
        assert_relative_eq!(m, 1.1, epsilon = 1e-12);
        assert_relative_eq!(s, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn gaussian_core() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(1.0, 0.05).unwrap();
        let mut values: Vec<f64> = (0..20_000).map(|_| normal.sample(&mut rng)).collect();
        // a flat pedestal of outliers far from the peak
        values.extend((0..200).map(|i| 5.0 + i as f64 * 0.01));
        let (m, s) = mean_sigma(&values, DEFAULT_NSIGMAS).unwrap();
        assert_relative_eq!(m, 1.0, epsilon = 2e-3);
        // clipping at 3 sigma trims ~1.4% of the variance
        assert_relative_eq!(s, 0.05 * 0.9865, epsilon = 2e-3);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(mean_sigma(&[], 3.0), Err(Error::Validation(_))));
        assert!(matches!(mean_sigma(&[1.0], 0.0), Err(Error::Validation(_))));
        assert!(matches!(mean_sigma(&[1.0, f64::NAN], 3.0), Err(Error::Validation(_))));
    }
}
