//! Line shapes for response fits and the per-event MVA densities
//!
//! The fit shapes are unnormalised Crystal Ball variants with an amplitude
//! parameter, evaluated at histogram bin centres. The MVA densities are
//! normalised on a finite target range and evaluated in log space.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use std::f64::consts::{FRAC_PI_2, SQRT_2};

/// Tail parameters are kept away from zero to avoid divisions by zero.
const MIN_TAIL: f64 = 1e-6;

/// Parametric curve `f(x; p)` fitted to a histogram.
pub trait Shape: Send + Sync {
    fn param_names(&self) -> &'static [&'static str];

    fn n_params(&self) -> usize {
        self.param_names().len()
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64;
}

/// Power-law tail joined continuously to a unit Gaussian at `|t| = alpha`.
///
/// `u >= alpha` is the distance into the tail side; the value is
/// `(n/a)^n exp(-a^2/2) (u - a + n/a)^(-n)` written in a form that does not
/// overflow for large `n`.
fn power_tail(u: f64, alpha: f64, n: f64) -> f64 {
    let a = alpha.max(MIN_TAIL);
    let n = n.max(MIN_TAIL);
    let base = 1.0 + (u - a) * a / n;
    if base <= 0.0 {
        return 0.0;
    }
    (-0.5 * a * a - n * base.ln()).exp()
}

/// Gaussian core, power-law left tail, exponential right tail.
///
/// Parameters: amplitude, position, width, left alpha, left power,
/// right alpha. Used for `E^rec/E^gen` responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrystalBallLeftExpRight;

impl Shape for CrystalBallLeftExpRight {
    fn param_names(&self) -> &'static [&'static str] {
        &["amp", "mean", "sigma", "alphaL", "powerL", "alphaR"]
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        let (amp, mean, sigma, a_l, n_l, a_r) = (p[0], p[1], p[2], p[3], p[4], p[5]);
        let t = (x - mean) / sigma;
        let core = if t > -a_l {
            if t < a_r { (-0.5 * t * t).exp() } else { (0.5 * a_r * a_r - a_r * t).exp() }
        } else {
            power_tail(-t, a_l, n_l)
        };
        amp * core
    }
}

/// Gaussian core, exponential left tail, power-law right tail.
///
/// Parameters: amplitude, position, width, left alpha, right alpha,
/// right power. Used for `E^gen/E^PF` targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpLeftCrystalBallRight;

impl Shape for ExpLeftCrystalBallRight {
    fn param_names(&self) -> &'static [&'static str] {
        &["amp", "mean", "sigma", "alphaL", "alphaR", "powerR"]
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        let (amp, mean, sigma, a_l, a_r, n_r) = (p[0], p[1], p[2], p[3], p[4], p[5]);
        let t = (x - mean) / sigma;
        let core = if t > -a_l {
            if t < a_r { (-0.5 * t * t).exp() } else { power_tail(t, a_r, n_r) }
        } else {
            (0.5 * a_l * a_l + a_l * t).exp()
        };
        amp * core
    }
}

/// Family of the per-event target density regressed by the MVA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DensityKind {
    /// Gaussian with exponential tails on both sides.
    GausDoubleExp,
    /// Gaussian with an exponential left tail and a power-law right tail.
    RevCBExp,
}

/// Parameters of a target density in natural units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    pub mean: f64,
    pub sigma: f64,
    pub alpha_l: f64,
    pub alpha_r: f64,
    /// Ignored by [`DensityKind::GausDoubleExp`].
    pub power_r: f64,
}

impl DensityKind {
    /// Number of regressed parameters.
    pub fn n_params(self) -> usize {
        match self {
            DensityKind::GausDoubleExp => 4,
            DensityKind::RevCBExp => 5,
        }
    }

    /// Log of the unnormalised density at standardised `t`.
    fn ln_shape(self, t: f64, p: &DensityParams) -> f64 {
        let (a_l, a_r) = (p.alpha_l.max(MIN_TAIL), p.alpha_r.max(MIN_TAIL));
        if t <= -a_l {
            return 0.5 * a_l * a_l + a_l * t;
        }
        if t < a_r {
            return -0.5 * t * t;
        }
        match self {
            DensityKind::GausDoubleExp => 0.5 * a_r * a_r - a_r * t,
            DensityKind::RevCBExp => {
                let n = p.power_r.max(1.0 + MIN_TAIL);
                -0.5 * a_r * a_r - n * (1.0 + (t - a_r) * a_r / n).ln()
            }
        }
    }

    /// Integral of the unnormalised shape over standardised `[a, b]`.
    fn integral(self, a: f64, b: f64, p: &DensityParams) -> f64 {
        let (a_l, a_r) = (p.alpha_l.max(MIN_TAIL), p.alpha_r.max(MIN_TAIL));
        let mut total = 0.0;

        let left = |t: f64| (0.5 * a_l * a_l + a_l * t).exp() / a_l;
        let (l1, l2) = (a, b.min(-a_l));
        if l2 > l1 {
            total += left(l2) - left(l1);
        }

        let core = |t: f64| FRAC_PI_2.sqrt() * erf(t / SQRT_2);
        let (c1, c2) = (a.max(-a_l), b.min(a_r));
        if c2 > c1 {
            total += core(c2) - core(c1);
        }

        let (r1, r2) = (a.max(a_r), b);
        if r2 > r1 {
            let right = |t: f64| match self {
                DensityKind::GausDoubleExp => -(0.5 * a_r * a_r - a_r * t).exp() / a_r,
                DensityKind::RevCBExp => {
                    let n = p.power_r.max(1.0 + MIN_TAIL);
                    let base = n / a_r - a_r + t;
                    self.ln_shape(t, p).exp() * base / (1.0 - n)
                }
            };
            total += right(r2) - right(r1);
        }
        total
    }

    /// Log density of `y` normalised on `[lo, hi]`.
    pub fn ln_pdf(self, y: f64, p: &DensityParams, lo: f64, hi: f64) -> f64 {
        let sigma = p.sigma;
        let norm = sigma * self.integral((lo - p.mean) / sigma, (hi - p.mean) / sigma, p);
        if !(norm > 0.0) {
            return f64::NEG_INFINITY;
        }
        self.ln_shape((y - p.mean) / sigma, p) - norm.ln()
    }

    pub fn pdf(self, y: f64, p: &DensityParams, lo: f64, hi: f64) -> f64 {
        self.ln_pdf(y, p, lo, hi).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trapezoid(f: impl Fn(f64) -> f64, a: f64, b: f64, n: usize) -> f64 {
        let h = (b - a) / n as f64;
        let mut s = 0.5 * (f(a) + f(b));
        for i in 1..n {
            s += f(a + i as f64 * h);
        }
        s * h
    }

    #[test]
    fn cb_left_is_continuous() {
        let shape = CrystalBallLeftExpRight;
        let p = [10.0, 1.0, 0.05, 1.5, 5.0, 1.5];
        for t in [-1.5, 1.5] {
            let x = 1.0 + t * 0.05;
            let lo = shape.eval(x - 1e-9, &p);
            let hi = shape.eval(x + 1e-9, &p);
            assert_relative_eq!(lo, hi, max_relative = 1e-6);
        }
        assert_relative_eq!(shape.eval(1.0, &p), 10.0);
    }

    #[test]
    fn cb_right_is_continuous() {
        let shape = ExpLeftCrystalBallRight;
        let p = [3.0, 1.1, 0.1, 1.2, 2.0, 20.0];
        for t in [-1.2, 2.0] {
            let x = 1.1 + t * 0.1;
            assert_relative_eq!(
                shape.eval(x - 1e-9, &p),
                shape.eval(x + 1e-9, &p),
                max_relative = 1e-6
            );
        }
        // far right follows the power law, which falls slower than a Gaussian
        assert!(shape.eval(1.1 + 6.0 * 0.1, &p) > 3.0 * (-18.0f64).exp());
    }

    #[test]
    fn huge_power_does_not_overflow() {
        let shape = ExpLeftCrystalBallRight;
        let v = shape.eval(5.0, &[1.0, 1.0, 0.1, 1.0, 0.2, 100.0]);
        assert!(v.is_finite() && v > 0.0);
    }

    fn check_normalised(kind: DensityKind, p: DensityParams) {
        let (lo, hi) = (-0.336, 0.916);
        let area = trapezoid(|y| kind.pdf(y, &p, lo, hi), lo, hi, 200_000);
        assert_relative_eq!(area, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn densities_are_normalised() {
        let p = DensityParams { mean: 0.02, sigma: 0.05, alpha_l: 1.1, alpha_r: 2.0, power_r: 5.0 };
        check_normalised(DensityKind::GausDoubleExp, p);
        check_normalised(DensityKind::RevCBExp, p);
        // wide core truncated by the range on both sides
        let p = DensityParams { mean: 0.3, sigma: 0.4, alpha_l: 7.0, alpha_r: 0.2, power_r: 1.01 };
        check_normalised(DensityKind::GausDoubleExp, p);
        check_normalised(DensityKind::RevCBExp, p);
    }

    #[test]
    fn density_tails_are_continuous() {
        let p = DensityParams { mean: 0.0, sigma: 0.1, alpha_l: 1.0, alpha_r: 1.5, power_r: 3.0 };
        for kind in [DensityKind::GausDoubleExp, DensityKind::RevCBExp] {
            for t in [-1.0, 1.5] {
                let y = t * 0.1;
                assert_relative_eq!(
                    kind.ln_pdf(y - 1e-10, &p, -0.336, 0.916),
                    kind.ln_pdf(y + 1e-10, &p, -0.336, 0.916),
                    epsilon = 1e-6
                );
            }
        }
    }
}
