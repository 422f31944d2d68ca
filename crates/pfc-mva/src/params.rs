//! Regressed density parameters and their bounded mapping.
//!
//! Every parameter is a free real function `F(x)` of the inputs, mapped into
//! its interval as `lo + 0.5 (hi - lo)(sin F + 1)`.

use pfc_stats::{DensityKind, DensityParams};
use serde::{Deserialize, Serialize};

/// Lower edge of the target `log(mcE/pfE)`.
pub const TARGET_MIN: f64 = -0.336;
/// Upper edge of the target `log(mcE/pfE)`.
pub const TARGET_MAX: f64 = 0.916;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamId {
    Mean,
    Sigma,
    AlphaL,
    AlphaR,
    PowerR,
}

impl ParamId {
    pub const ALL: [ParamId; 5] =
        [ParamId::Mean, ParamId::Sigma, ParamId::AlphaL, ParamId::AlphaR, ParamId::PowerR];

    pub fn name(self) -> &'static str {
        match self {
            ParamId::Mean => "mean",
            ParamId::Sigma => "sigma",
            ParamId::AlphaL => "alphaL",
            ParamId::AlphaR => "alphaR",
            ParamId::PowerR => "powerR",
        }
    }

    /// `(lo, hi, init)` in natural units.
    pub fn bounds(self) -> (f64, f64, f64) {
        match self {
            ParamId::Mean => (TARGET_MIN, TARGET_MAX, 0.0),
            ParamId::Sigma => (0.001, 0.4, 0.1),
            ParamId::AlphaL => (0.2, 7.0, 1.2),
            ParamId::AlphaR => (0.2, 7.0, 2.0),
            ParamId::PowerR => (1.01, 100.0, 5.0),
        }
    }

    /// Map a raw regression output into the parameter interval.
    pub fn map(self, raw: f64) -> f64 {
        let (lo, hi, _) = self.bounds();
        lo + 0.5 * (hi - lo) * (raw.sin() + 1.0)
    }

    /// Raw value mapping onto the initial parameter value.
    pub fn initial_raw(self) -> f64 {
        let (lo, hi, init) = self.bounds();
        (2.0 * (init - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin()
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Parameters regressed for a density family; the rest stay at their initial value.
pub fn regressed_params(kind: DensityKind) -> &'static [ParamId] {
    match kind {
        DensityKind::GausDoubleExp => &ParamId::ALL[..4],
        DensityKind::RevCBExp => &ParamId::ALL,
    }
}

/// Natural-unit parameters from raw values of `regressed`.
pub fn density_params(regressed: &[ParamId], raw: &[f64]) -> DensityParams {
    let mut v = ParamId::ALL.map(|p| p.bounds().2);
    for (&p, &f) in regressed.iter().zip(raw) {
        v[p.index()] = p.map(f);
    }
    DensityParams { mean: v[0], sigma: v[1], alpha_l: v[2], alpha_r: v[3], power_r: v[4] }
}
