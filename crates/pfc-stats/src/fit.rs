//! Binned fits of a [`Shape`] to a [`Histogram1D`]
//!
//! A [`BinnedFit`] keeps the parameter state between calls to
//! [`BinnedFit::fit`], so a staged strategy (pre-fit with tails fixed, then
//! release, then switch to likelihood) is a sequence of `fix`/`release`/
//! `set_limits` calls followed by another `fit`.

use nalgebra::DMatrix;
use pfc_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::Histogram1D;
use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};
use crate::shapes::Shape;

/// Number of points sampled for the plotted fit curve.
const CURVE_POINTS: usize = 400;

/// Figure of merit minimised by a binned fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMethod {
    /// Neyman chi-square over non-empty bins.
    ChiSquare,
    /// Poisson binned likelihood ratio, `2 sum(f - n + n ln(n/f))`.
    Likelihood,
}

/// State of one shape parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
    pub fixed: bool,
}

impl ParamSpec {
    pub fn free(value: f64) -> Self {
        Self { value, lo: f64::NEG_INFINITY, hi: f64::INFINITY, fixed: false }
    }
}

/// Outcome of a binned fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Parameter values, fixed ones included
    pub parameters: Vec<f64>,
    /// Symmetric errors; zero for fixed parameters
    pub errors: Vec<f64>,
    /// Minimised objective
    pub fval: f64,
    /// Neyman chi-square of the final parameters
    pub chi2: f64,
    /// Non-empty bins minus free parameters
    pub ndf: usize,
    pub converged: bool,
    /// `false` when errors come from the Hessian diagonal only
    pub covariance_ok: bool,
    /// Sampled curve `(x, f(x))` over the fit range
    pub curve: Vec<(f64, f64)>,
}

impl FitResult {
    /// chi2/ndf, or NaN without degrees of freedom.
    pub fn chi2_ndf(&self) -> f64 {
        if self.ndf == 0 { f64::NAN } else { self.chi2 / self.ndf as f64 }
    }
}

struct Bin {
    x: f64,
    n: f64,
    err: f64,
}

struct BinnedObjective<'a> {
    shape: &'a dyn Shape,
    bins: &'a [Bin],
    method: FitMethod,
}

fn model_value(shape: &dyn Shape, x: f64, p: &[f64]) -> f64 {
    let f = shape.eval(x, p);
    if f.is_finite() { f } else { 0.0 }
}

fn neyman_chi2(shape: &dyn Shape, bins: &[Bin], p: &[f64]) -> f64 {
    bins.iter()
        .filter(|b| b.n != 0.0 && b.err > 0.0)
        .map(|b| ((b.n - model_value(shape, b.x, p)) / b.err).powi(2))
        .sum()
}

impl ObjectiveFunction for BinnedObjective<'_> {
    fn eval(&self, p: &[f64]) -> Result<f64> {
        Ok(match self.method {
            FitMethod::ChiSquare => neyman_chi2(self.shape, self.bins, p),
            FitMethod::Likelihood => {
                2.0 * self
                    .bins
                    .iter()
                    .map(|b| {
                        let f = model_value(self.shape, b.x, p).max(1e-300);
                        if b.n > 0.0 { f - b.n + b.n * (b.n / f).ln() } else { f }
                    })
                    .sum::<f64>()
            }
        })
    }
}

/// Central second differences of `f` at `x`.
fn numerical_hessian(f: &dyn ObjectiveFunction, x: &[f64]) -> Result<DMatrix<f64>> {
    let n = x.len();
    let steps: Vec<f64> = x.iter().map(|v| 1e-4 * v.abs().max(1.0)).collect();
    let f0 = f.eval(x)?;
    let mut h = DMatrix::zeros(n, n);
    let mut work = x.to_vec();

    let shifted = |work: &mut Vec<f64>, moves: &[(usize, f64)]| -> Result<f64> {
        for &(i, d) in moves {
            work[i] += d;
        }
        let v = f.eval(work);
        for &(i, d) in moves {
            work[i] -= d;
        }
        v
    };

    for i in 0..n {
        let e = steps[i];
        let fp = shifted(&mut work, &[(i, e)])?;
        let fm = shifted(&mut work, &[(i, -e)])?;
        h[(i, i)] = (fp - 2.0 * f0 + fm) / (e * e);
        for j in 0..i {
            let ej = steps[j];
            let fpp = shifted(&mut work, &[(i, e), (j, ej)])?;
            let fpm = shifted(&mut work, &[(i, e), (j, -ej)])?;
            let fmp = shifted(&mut work, &[(i, -e), (j, ej)])?;
            let fmm = shifted(&mut work, &[(i, -e), (j, -ej)])?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * e * ej);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }
    Ok(h)
}

/// Inverse of a Hessian with increasing diagonal damping, LU as last resort.
///
/// Returns `None` when no inverse with positive finite variances exists.
pub fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = hessian.nrows();
    let identity = DMatrix::identity(n, n);
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut damped = hessian.clone();
    let mut damping = 0.0_f64;
    for attempt in 0..10 {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(damped.clone()) {
            return Some(chol.solve(&identity));
        }
        if attempt == 9 {
            break;
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            damped[(i, i)] += next - damping;
        }
        damping = next;
    }

    let cov = damped.lu().try_inverse()?;
    (0..n).all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0).then_some(cov)
}

/// Stateful binned fit of `shape` over `[xlo, xhi]`.
pub struct BinnedFit<'a> {
    shape: &'a dyn Shape,
    params: Vec<ParamSpec>,
    xlo: f64,
    xhi: f64,
    optimizer: LbfgsbOptimizer,
}

impl<'a> BinnedFit<'a> {
    pub fn new(shape: &'a dyn Shape, init: &[f64], xlo: f64, xhi: f64) -> Result<Self> {
        if init.len() != shape.n_params() {
            return Err(Error::Validation(format!(
                "shape expects {} parameters, got {}",
                shape.n_params(),
                init.len()
            )));
        }
        if !(xhi > xlo) {
            return Err(Error::Validation(format!("empty fit range [{xlo}, {xhi}]")));
        }
        Ok(Self {
            shape,
            params: init.iter().map(|&v| ParamSpec::free(v)).collect(),
            xlo,
            xhi,
            optimizer: LbfgsbOptimizer::new(OptimizerConfig::default()),
        })
    }

    pub fn with_optimizer(mut self, config: OptimizerConfig) -> Self {
        self.optimizer = LbfgsbOptimizer::new(config);
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    fn spec(&mut self, i: usize) -> Result<&mut ParamSpec> {
        let n = self.params.len();
        self.params
            .get_mut(i)
            .ok_or_else(|| Error::Validation(format!("parameter {i} out of range ({n})")))
    }

    pub fn set_value(&mut self, i: usize, value: f64) -> Result<()> {
        self.spec(i)?.value = value;
        Ok(())
    }

    /// Limits on a parameter; the current value is pulled inside them.
    ///
    /// Setting limits frees a fixed parameter.
    pub fn set_limits(&mut self, i: usize, lo: f64, hi: f64) -> Result<()> {
        if lo > hi {
            return Err(Error::Validation(format!("inverted limits [{lo}, {hi}] for parameter {i}")));
        }
        let p = self.spec(i)?;
        p.lo = lo;
        p.hi = hi;
        p.value = p.value.clamp(lo, hi);
        p.fixed = false;
        Ok(())
    }

    pub fn fix(&mut self, i: usize, value: f64) -> Result<()> {
        let p = self.spec(i)?;
        p.value = value;
        p.fixed = true;
        Ok(())
    }

    /// Free a parameter and drop its limits.
    pub fn release(&mut self, i: usize) -> Result<()> {
        let p = self.spec(i)?;
        *p = ParamSpec::free(p.value);
        Ok(())
    }

    fn collect_bins(&self, hist: &Histogram1D) -> Vec<Bin> {
        (0..hist.nbins())
            .map(|i| Bin { x: hist.bin_center(i), n: hist.content(i), err: hist.error(i) })
            .filter(|b| b.x >= self.xlo && b.x <= self.xhi)
            .collect()
    }

    /// Fit the histogram and keep the result as the new parameter state.
    pub fn fit(&mut self, hist: &Histogram1D, method: FitMethod) -> Result<FitResult> {
        let bins = self.collect_bins(hist);
        if bins.iter().all(|b| b.n == 0.0) {
            return Err(Error::Computation("fit range holds no entries".to_string()));
        }
        let objective = BinnedObjective { shape: self.shape, bins: &bins, method };

        let init = self.values();
        let bounds: Vec<(f64, f64)> = self.params.iter().map(|p| (p.lo, p.hi)).collect();
        let fixed: Vec<bool> = self.params.iter().map(|p| p.fixed).collect();

        let (parameters, fval, converged) =
            match self.optimizer.minimize_with_fixed(&objective, &init, &bounds, &fixed) {
                Ok(r) => {
                    tracing::debug!(%r, "binned fit");
                    (r.parameters, r.fval, r.converged)
                }
                Err(e) => {
                    tracing::debug!(error = %e, "minimisation failed, keeping start values");
                    let fval = objective.eval(&init)?;
                    (init, fval, false)
                }
            };
        for (spec, &v) in self.params.iter_mut().zip(&parameters) {
            spec.value = v;
        }

        let free: Vec<usize> = (0..parameters.len()).filter(|&i| !fixed[i]).collect();
        let (free_errors, covariance_ok) = self.free_errors(&objective, &parameters, &fixed)?;
        let mut errors = vec![0.0; parameters.len()];
        for (k, &i) in free.iter().enumerate() {
            errors[i] = free_errors[k];
        }

        let non_empty = bins.iter().filter(|b| b.n != 0.0).count();
        let chi2 = neyman_chi2(self.shape, &bins, &parameters);
        let step = (self.xhi - self.xlo) / (CURVE_POINTS - 1) as f64;
        let curve = (0..CURVE_POINTS)
            .map(|k| {
                let x = self.xlo + k as f64 * step;
                (x, model_value(self.shape, x, &parameters))
            })
            .collect();

        Ok(FitResult {
            parameters,
            errors,
            fval,
            chi2,
            ndf: non_empty.saturating_sub(free.len()),
            converged,
            covariance_ok,
            curve,
        })
    }

    /// Errors of the free parameters from `cov = 2 H^-1`.
    fn free_errors(
        &self,
        objective: &dyn ObjectiveFunction,
        parameters: &[f64],
        fixed: &[bool],
    ) -> Result<(Vec<f64>, bool)> {
        let reduced = crate::optimizer::FixedSubset::new(objective, parameters, fixed);
        let x = reduced.project(parameters);
        if x.is_empty() {
            return Ok((Vec::new(), true));
        }
        let h = numerical_hessian(&reduced, &x)?;
        if let Some(cov) = invert_hessian(&h) {
            return Ok(((0..x.len()).map(|i| (2.0 * cov[(i, i)]).sqrt()).collect(), true));
        }
        tracing::debug!("Hessian not invertible, using diagonal errors");
        let diag = (0..x.len()).map(|i| (2.0 / h[(i, i)].abs().max(1e-12)).sqrt()).collect();
        Ok((diag, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::CrystalBallLeftExpRight;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// Plain Gaussian with amplitude, for checks against known errors.
    struct Gauss;

    impl Shape for Gauss {
        fn param_names(&self) -> &'static [&'static str] {
            &["amp", "mean", "sigma"]
        }

        fn eval(&self, x: f64, p: &[f64]) -> f64 {
            p[0] * (-0.5 * ((x - p[1]) / p[2]).powi(2)).exp()
        }
    }

    fn gaussian_hist(n: usize, mean: f64, sigma: f64, seed: u64) -> Histogram1D {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(mean, sigma).unwrap();
        let mut h = Histogram1D::new(100, 0.5, 1.5).unwrap();
        for _ in 0..n {
            h.fill(normal.sample(&mut rng));
        }
        h
    }

    #[test]
    fn gaussian_chi2_and_likelihood() {
        let h = gaussian_hist(20_000, 1.0, 0.05, 11);
        let shape = Gauss;
        let mut fit = BinnedFit::new(&shape, &[h.maximum(), 0.98, 0.04], 0.5, 1.5).unwrap();
        fit.set_limits(2, 0.001, 1.0).unwrap();

        let r = fit.fit(&h, FitMethod::ChiSquare).unwrap();
        assert_relative_eq!(r.parameters[1], 1.0, epsilon = 2e-3);
        assert_relative_eq!(r.parameters[2], 0.05, epsilon = 2e-3);

        let r = fit.fit(&h, FitMethod::Likelihood).unwrap();
        assert_relative_eq!(r.parameters[1], 1.0, epsilon = 2e-3);
        assert_relative_eq!(r.parameters[2], 0.05, epsilon = 2e-3);
        // error on the mean is sigma/sqrt(N)
        assert_relative_eq!(r.errors[1], 0.05 / (20_000f64).sqrt(), max_relative = 0.1);
        assert!(r.covariance_ok);
        assert!(r.chi2_ndf() < 2.0);
        assert_eq!(r.curve.len(), CURVE_POINTS);
    }

    #[test]
    fn fixed_parameter_has_zero_error() {
        let h = gaussian_hist(5_000, 1.0, 0.05, 3);
        let shape = Gauss;
        let mut fit = BinnedFit::new(&shape, &[h.maximum(), 1.0, 0.05], 0.5, 1.5).unwrap();
        fit.fix(2, 0.05).unwrap();
        let r = fit.fit(&h, FitMethod::ChiSquare).unwrap();
        assert_eq!(r.parameters[2], 0.05);
        assert_eq!(r.errors[2], 0.0);
        assert!(r.errors[1] > 0.0);

        fit.release(2).unwrap();
        assert!(!fit.params()[2].fixed);
        assert_eq!(fit.params()[2].lo, f64::NEG_INFINITY);
    }

    #[test]
    fn crystal_ball_staged_fit() {
        let h = gaussian_hist(10_000, 0.95, 0.04, 5);
        let shape = CrystalBallLeftExpRight;
        let hmax = h.maximum();
        let mut fit =
            BinnedFit::new(&shape, &[hmax, 0.95, 0.02, 1.5, 5.0, 1.5], 0.55, 1.3).unwrap();
        fit.set_limits(0, 0.33 * hmax, 2.0 * hmax).unwrap();
        fit.set_limits(1, 0.9, 1.0).unwrap();
        fit.set_limits(2, 0.004, 0.044).unwrap();
        fit.fix(3, 1.5).unwrap();
        fit.fix(4, 5.0).unwrap();
        fit.fix(5, 1.5).unwrap();
        fit.fit(&h, FitMethod::ChiSquare).unwrap();

        fit.set_limits(3, 0.4, 10.0).unwrap();
        fit.set_limits(4, 1.01, 100.0).unwrap();
        fit.set_limits(5, 0.4, 10.0).unwrap();
        assert!(fit.params().iter().all(|p| !p.fixed));
        let r = fit.fit(&h, FitMethod::Likelihood).unwrap();
        assert_relative_eq!(r.parameters[1], 0.95, epsilon = 3e-3);
        assert_relative_eq!(r.parameters[2], 0.04, epsilon = 3e-3);
        assert!(r.errors[1] / r.parameters[1] < 0.15);
    }

    #[test]
    fn empty_range_is_an_error() {
        let h = Histogram1D::new(10, 0.0, 1.0).unwrap();
        let shape = Gauss;
        let mut fit = BinnedFit::new(&shape, &[1.0, 0.5, 0.1], 0.0, 1.0).unwrap();
        assert!(fit.fit(&h, FitMethod::ChiSquare).is_err());
        assert!(BinnedFit::new(&shape, &[1.0], 0.0, 1.0).is_err());
        assert!(fit.set_limits(7, 0.0, 1.0).is_err());
    }

    #[test]
    fn singular_hessian_falls_back() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        // damping eventually makes it positive definite
        assert!(invert_hessian(&h).is_some());
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        assert!(invert_hessian(&h).is_none());
    }
}
