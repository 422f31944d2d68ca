//! Boosted training of the per-event density parameters.

use pfc_core::{Error, Result};
use pfc_stats::{DensityKind, DensityParams};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, InputOptions, InputVar, TrainingSpec};
use crate::forest::{BinnedInputs, Derivatives, Forest, GrowConfig};
use crate::params::{ParamId, TARGET_MAX, TARGET_MIN, density_params, regressed_params};

/// Step in raw units for the numerical derivatives.
const DERIV_STEP: f64 = 1e-4;
/// Floor on per-event second derivatives.
const HESS_FLOOR: f64 = 1e-3;

/// Hyper-parameters of a training.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub shrinkage: f64,
    /// Minimum number of events in each child of a split.
    pub min_weight: usize,
    /// Maximum number of terminal nodes per tree.
    pub max_nodes: usize,
    pub max_trees: usize,
    /// Quantile cut candidates per input.
    pub n_cuts: usize,
    /// Overrides the per-size minimum split gain when set.
    pub min_cut_significance: Option<f64>,
    pub inputs: InputOptions,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            shrinkage: 0.1,
            min_weight: 200,
            max_nodes: 750,
            max_trees: 1_000_000,
            n_cuts: 64,
            min_cut_significance: None,
            inputs: InputOptions::default(),
        }
    }
}

/// A trained regression, self-describing enough to be evaluated on any ntuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub name: String,
    pub spec: TrainingSpec,
    pub kind: DensityKind,
    pub inputs: Vec<InputVar>,
    pub regressed: Vec<ParamId>,
    pub forest: Forest,
    pub n_events: usize,
    /// Mean negative log-likelihood per event after the last tree.
    pub nll: f64,
}

impl TrainedModel {
    /// Density parameters for one event's inputs (ordered as `inputs`).
    pub fn predict(&self, x: &[f64]) -> DensityParams {
        density_params(&self.regressed, &self.forest.predict_raw(x))
    }
}

fn event_nll(kind: DensityKind, regressed: &[ParamId], raw: &[f64], y: f64) -> f64 {
    -kind.ln_pdf(y, &density_params(regressed, raw), TARGET_MIN, TARGET_MAX)
}

/// Fill gradient and diagonal Hessian of one event; returns its NLL.
fn derivatives(
    kind: DensityKind,
    regressed: &[ParamId],
    raw: &[f64],
    y: f64,
    grad: &mut [f64],
    hess: &mut [f64],
) -> f64 {
    let f0 = event_nll(kind, regressed, raw, y);
    let mut shifted = raw.to_vec();
    for k in 0..raw.len() {
        shifted[k] = raw[k] + DERIV_STEP;
        let fp = event_nll(kind, regressed, &shifted, y);
        shifted[k] = raw[k] - DERIV_STEP;
        let fm = event_nll(kind, regressed, &shifted, y);
        shifted[k] = raw[k];

        let g = (fp - fm) / (2.0 * DERIV_STEP);
        let h = (fp - 2.0 * f0 + fm) / (DERIV_STEP * DERIV_STEP);
        if g.is_finite() && h.is_finite() {
            grad[k] = g;
            hess[k] = h.abs().max(HESS_FLOOR);
        } else {
            grad[k] = 0.0;
            hess[k] = HESS_FLOOR;
        }
    }
    f0
}

/// Train one regression on `dataset`.
pub fn train(dataset: &Dataset, spec: &TrainingSpec, config: &TrainConfig) -> Result<TrainedModel> {
    if dataset.is_empty() {
        return Err(Error::Validation(format!("{}: no training events", spec.name())));
    }
    if !(config.shrinkage > 0.0) || config.max_nodes < 2 {
        return Err(Error::Validation(format!(
            "invalid training settings: shrinkage {}, max_nodes {}",
            config.shrinkage, config.max_nodes
        )));
    }

    let kind = spec.density_kind();
    let regressed = regressed_params(kind).to_vec();
    let k_out = regressed.len();
    let n = dataset.len();
    let name = spec.name();

    let binned = BinnedInputs::new(&dataset.features, config.n_cuts);
    let grow = GrowConfig {
        max_leaves: config.max_nodes,
        min_events: config.min_weight.max(1),
        min_gain: config.min_cut_significance.unwrap_or_else(|| spec.min_cut_significance()),
        shrinkage: config.shrinkage,
    };

    let initial: Vec<f64> = regressed.iter().map(|p| p.initial_raw()).collect();
    let mut forest = Forest::new(initial.clone());
    let mut raw: Vec<f64> = initial.iter().copied().cycle().take(n * k_out).collect();
    let mut grad = vec![0.0; n * k_out];
    let mut hess = vec![0.0; n * k_out];
    let rows: Vec<Vec<f64>> =
        (0..n).map(|i| dataset.features.iter().map(|f| f[i]).collect()).collect();

    tracing::info!(model = %name, events = n, inputs = dataset.inputs.len(), "training");
    for iteration in 0..config.max_trees {
        let nll = raw
            .par_chunks(k_out)
            .zip(grad.par_chunks_mut(k_out))
            .zip(hess.par_chunks_mut(k_out))
            .zip(dataset.target.par_iter())
            .map(|(((r, g), h), &y)| derivatives(kind, &regressed, r, y, g, h))
            .sum::<f64>()
            / n as f64;

        let d = Derivatives { n_out: k_out, grad: &grad, hess: &hess };
        let Some(tree) = binned.grow(&d, &grow) else {
            tracing::debug!(model = %name, iteration, "no valid split at the root");
            break;
        };
        raw.par_chunks_mut(k_out).zip(rows.par_iter()).for_each(|(r, x)| {
            for (v, step) in r.iter_mut().zip(tree.response(x)) {
                *v += step;
            }
        });
        if iteration % 50 == 0 {
            tracing::debug!(model = %name, iteration, nll, leaves = tree.n_leaves(), "boosting");
        }
        forest.trees.push(tree);
    }

    let nll = raw
        .par_chunks(k_out)
        .zip(dataset.target.par_iter())
        .map(|(r, &y)| event_nll(kind, &regressed, r, y))
        .sum::<f64>()
        / n as f64;
    tracing::info!(model = %name, trees = forest.trees.len(), nll, "training finished");
    Ok(TrainedModel {
        name,
        spec: *spec,
        kind,
        inputs: dataset.inputs.clone(),
        regressed,
        forest,
        n_events: n,
        nll,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfc_core::{Category, Detector};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal, Uniform};

    fn synthetic(n: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let energy = Uniform::new(1.0, 100.0);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut e = Vec::with_capacity(n);
        let mut target = Vec::with_capacity(n);
        for _ in 0..n {
            let x: f64 = energy.sample(&mut rng);
            let shift: f64 = if x < 50.0 { 0.05 } else { 0.25 };
            let y = (shift + 0.04 * noise.sample(&mut rng)).clamp(TARGET_MIN, TARGET_MAX);
            e.push(x);
            target.push(y);
        }
        Dataset {
            inputs: vec![InputVar { name: "var1".into(), expr: "pfE".into() }],
            features: vec![e],
            target,
        }
    }

    fn barrel_size1() -> TrainingSpec {
        TrainingSpec::for_category(Detector::Barrel, Category::from_index(0).unwrap())
    }

    #[test]
    fn derivatives_are_finite_at_init() {
        let regressed = regressed_params(DensityKind::RevCBExp);
        let raw: Vec<f64> = regressed.iter().map(|p| p.initial_raw()).collect();
        let mut g = vec![0.0; 5];
        let mut h = vec![0.0; 5];
        let nll = derivatives(DensityKind::RevCBExp, regressed, &raw, 0.05, &mut g, &mut h);
        assert!(nll.is_finite());
        assert!(g.iter().all(|v| v.is_finite()));
        assert!(h.iter().all(|&v| v >= HESS_FLOOR));
    }

    #[test]
    fn boosting_learns_a_shift() {
        let data = synthetic(4000, 7);
        let config = TrainConfig { max_trees: 60, max_nodes: 4, ..TrainConfig::default() };
        let model = train(&data, &barrel_size1(), &config).unwrap();

        assert!(!model.forest.trees.is_empty());
        assert_eq!(model.name, "ws_mva_EB_pfSize1");
        let low = model.predict(&[20.0]);
        let high = model.predict(&[80.0]);
        assert!((low.mean - 0.05).abs() < 0.04, "low mean {}", low.mean);
        assert!((high.mean - 0.25).abs() < 0.04, "high mean {}", high.mean);
        assert!(low.sigma < 0.1);
    }

    #[test]
    fn too_few_events_gives_constant_model() {
        let data = synthetic(300, 3);
        let model = train(&data, &barrel_size1(), &TrainConfig::default()).unwrap();
        assert!(model.forest.trees.is_empty());
        let p = model.predict(&[10.0]);
        approx::assert_relative_eq!(p.sigma, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let data = Dataset { inputs: Vec::new(), features: Vec::new(), target: Vec::new() };
        assert!(train(&data, &barrel_size1(), &TrainConfig::default()).is_err());
    }
}
