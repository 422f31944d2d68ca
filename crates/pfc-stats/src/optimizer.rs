//! Bounded L-BFGS minimisation
//!
//! Thin layer over argmin's L-BFGS with a More-Thuente line search. Box
//! constraints are handled by clamping every trial point and zeroing gradient
//! components that push against an active bound. Parameters can be held
//! fixed, in which case the solver only sees the free subset.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use pfc_core::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Solver settings.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of L-BFGS iterations
    pub max_iter: u64,
    /// Gradient-norm tolerance
    pub tol: f64,
    /// History length of the inverse-Hessian approximation
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Outcome of a minimisation over the full parameter vector.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters, fixed ones included
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`
    pub fval: f64,
    pub n_iter: u64,
    /// Objective evaluations requested by the solver
    pub n_fev: usize,
    pub converged: bool,
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.converged
        )
    }
}

/// Scalar objective over a parameter vector.
pub trait ObjectiveFunction: Send + Sync {
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Central differences with step `1e-8 * max(|x|, 1)` unless overridden.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut work = params.to_vec();
        let mut grad = Vec::with_capacity(params.len());
        for i in 0..params.len() {
            let x = params[i];
            let eps = 1e-8 * x.abs().max(1.0);
            work[i] = x + eps;
            let f_plus = self.eval(&work)?;
            work[i] = x - eps;
            let f_minus = self.eval(&work)?;
            work[i] = x;
            grad.push((f_plus - f_minus) / (2.0 * eps));
        }
        Ok(grad)
    }
}

/// View of an objective with some parameters pinned to their current value.
pub struct FixedSubset<'a> {
    inner: &'a dyn ObjectiveFunction,
    template: Vec<f64>,
    free: Vec<usize>,
}

impl<'a> FixedSubset<'a> {
    pub fn new(inner: &'a dyn ObjectiveFunction, full: &[f64], fixed: &[bool]) -> Self {
        let free = (0..full.len()).filter(|&i| !fixed.get(i).copied().unwrap_or(false)).collect();
        Self { inner, template: full.to_vec(), free }
    }

    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    /// Free sub-vector of a full parameter vector.
    pub fn project(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&i| full[i]).collect()
    }

    /// Full parameter vector for a free sub-vector.
    pub fn expand(&self, free: &[f64]) -> Vec<f64> {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(free) {
            full[i] = v;
        }
        full
    }
}

impl ObjectiveFunction for FixedSubset<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.inner.eval(&self.expand(params))
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Adapter implementing argmin's problem traits.
struct BoundedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    n_cost: &'a AtomicUsize,
}

fn to_argmin(e: Error) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<f64, argmin::core::Error> {
        self.n_cost.fetch_add(1, Ordering::Relaxed);
        let value = self.objective.eval(&clamp_params(params, self.bounds)).map_err(to_argmin)?;
        // NaN would poison the line search
        Ok(if value.is_nan() { f64::INFINITY } else { value })
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        let x = clamp_params(params, self.bounds);
        let mut g = self.objective.gradient(&x).map_err(to_argmin)?;
        const EPS: f64 = 1e-12;
        for ((gi, &xi), &(lo, hi)) in g.iter_mut().zip(&x).zip(self.bounds) {
            if !gi.is_finite() || (xi <= lo + EPS && *gi > 0.0) || (xi >= hi - EPS && *gi < 0.0) {
                *gi = 0.0;
            }
        }
        Ok(g)
    }
}

/// L-BFGS with box constraints.
#[derive(Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimise over all parameters within `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter and bounds length mismatch: {} != {}",
                init.len(),
                bounds.len()
            )));
        }
        if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| lo > hi) {
            return Err(Error::Validation(format!("inverted bounds [{lo}, {hi}]")));
        }

        let start = clamp_params(init, bounds);
        if start.is_empty() {
            let fval = objective.eval(&start)?;
            return Ok(OptimizationResult {
                parameters: start,
                fval,
                n_iter: 0,
                n_fev: 1,
                converged: true,
                message: "no free parameters".to_string(),
            });
        }

        let n_cost = AtomicUsize::new(0);
        let problem = BoundedProblem { objective, bounds, n_cost: &n_cost };

        let tol_cost = if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("invalid optimizer configuration: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("optimization failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("optimizer returned no parameters".to_string()))?;
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );

        Ok(OptimizationResult {
            parameters: clamp_params(best, bounds),
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: n_cost.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        })
    }

    /// Minimise with `fixed[i] == true` parameters held at `init[i]`.
    pub fn minimize_with_fixed(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
        fixed: &[bool],
    ) -> Result<OptimizationResult> {
        if fixed.len() != init.len() || bounds.len() != init.len() {
            return Err(Error::Validation(format!(
                "length mismatch: {} params, {} bounds, {} fixed flags",
                init.len(),
                bounds.len(),
                fixed.len()
            )));
        }
        let reduced = FixedSubset::new(objective, init, fixed);
        let free_bounds: Vec<(f64, f64)> = reduced.free_indices().iter().map(|&i| bounds[i]).collect();
        let free_init = reduced.project(init);

        let mut result = self.minimize(&reduced, &free_init, &free_bounds)?;
        result.parameters = reduced.expand(&result.parameters);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f(x, y) = (x - 2)^2 + (y - 3)^2
    struct Quadratic;

    impl ObjectiveFunction for Quadratic {
        fn eval(&self, p: &[f64]) -> Result<f64> {
            Ok((p[0] - 2.0).powi(2) + (p[1] - 3.0).powi(2))
        }

        fn gradient(&self, p: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![2.0 * (p[0] - 2.0), 2.0 * (p[1] - 3.0)])
        }
    }

    #[test]
    fn quadratic_minimum() {
        let opt = LbfgsbOptimizer::new(OptimizerConfig { max_iter: 100, ..Default::default() });
        let r = opt.minimize(&Quadratic, &[0.0, 0.0], &[(-10.0, 10.0); 2]).unwrap();
        assert!(r.converged, "{}", r.message);
        assert_relative_eq!(r.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(r.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(r.fval, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn active_bounds() {
        let opt = LbfgsbOptimizer::default();
        let r = opt.minimize(&Quadratic, &[4.0, 1.5], &[(3.0, 5.0), (1.0, 2.0)]).unwrap();
        assert_relative_eq!(r.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(r.parameters[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn fixed_parameter_is_untouched() {
        let opt = LbfgsbOptimizer::default();
        let r = opt
            .minimize_with_fixed(&Quadratic, &[0.5, 0.0], &[(-10.0, 10.0); 2], &[true, false])
            .unwrap();
        assert_eq!(r.parameters[0], 0.5);
        assert_relative_eq!(r.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(r.fval, 2.25, epsilon = 1e-6);
    }

    #[test]
    fn everything_fixed() {
        let opt = LbfgsbOptimizer::default();
        let r = opt
            .minimize_with_fixed(&Quadratic, &[1.0, 1.0], &[(-10.0, 10.0); 2], &[true, true])
            .unwrap();
        assert!(r.converged);
        assert_relative_eq!(r.fval, 5.0);
    }

    // Rosenbrock with the default numerical gradient
    struct Rosenbrock;

    impl ObjectiveFunction for Rosenbrock {
        fn eval(&self, p: &[f64]) -> Result<f64> {
            Ok((1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2))
        }
    }

    #[test]
    fn rosenbrock_numerical_gradient() {
        let opt = LbfgsbOptimizer::default();
        let r = opt.minimize(&Rosenbrock, &[-1.0, 1.5], &[(-5.0, 5.0); 2]).unwrap();
        assert_relative_eq!(r.parameters[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(r.parameters[1], 1.0, epsilon = 2e-3);
    }

    #[test]
    fn rejects_mismatched_input() {
        let opt = LbfgsbOptimizer::default();
        assert!(opt.minimize(&Quadratic, &[0.0], &[(-1.0, 1.0); 2]).is_err());
        assert!(opt.minimize(&Quadratic, &[0.0, 0.0], &[(1.0, -1.0); 2]).is_err());
    }
}
