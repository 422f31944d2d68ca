//! Response fits in equal-population blocks of a control variable
//!
//! Data are sorted by the control variable (true energy, pT, eta, ...) and cut
//! into blocks. In every block the response distribution is histogrammed and
//! fitted; the fitted position and relative width become one point of the
//! `mean` and `sigma` graphs.

use pfc_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::blocks::{Block, sorted_blocks};
use crate::fit::{BinnedFit, FitMethod, FitResult};
use crate::graph::GraphErrors;
use crate::histogram::Histogram1D;
use crate::shapes::{CrystalBallLeftExpRight, ExpLeftCrystalBallRight};
use crate::sigma_clip::{DEFAULT_NSIGMAS, mean_sigma};

/// Blocks drawn per fit-grid page (3x3).
pub const BLOCKS_PER_PAGE: usize = 9;

/// Relative error above which a resolution fit is discarded.
const MAX_REL_ERROR: f64 = 0.15;

/// Fit strategy for [`fit_slices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceMode {
    /// Three-stage fit of `E^rec/E^gen`, poorly constrained blocks dropped.
    Resolution,
    /// Chi-square pre-fit and likelihood fit of the corrected response.
    MvaPars,
}

impl SliceMode {
    fn binning(self) -> (usize, f64, f64) {
        match self {
            SliceMode::Resolution => (100, 0.55, 1.3),
            SliceMode::MvaPars => (200, 0.65, 1.2),
        }
    }
}

/// One fitted block, kept for the fit-grid pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFit {
    pub index: usize,
    pub title: String,
    pub x_mean: f64,
    pub x_sigma: f64,
    pub histogram: Histogram1D,
    /// `None` when the fit itself failed
    pub fit: Option<FitResult>,
    pub accepted: bool,
}

/// Position and relative-width graphs with the per-block fits behind them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceResult {
    pub mean: GraphErrors,
    pub sigma: GraphErrors,
    #[serde(skip)]
    pub blocks: Vec<BlockFit>,
}

/// Name of the fit-grid page holding `first` (0-based block index).
pub fn page_name(title: &str, first: usize) -> String {
    format!("fits_{title}_blk{:03}to{:03}", first + 1, first + BLOCKS_PER_PAGE)
}

/// `%.<sig>g`-style rendering with trailing zeros removed.
pub fn format_significant(v: f64, sig: usize) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{v}");
    }
    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= sig as i32 {
        return format!("{:.*e}", sig.saturating_sub(1), v);
    }
    let decimals = (sig as i32 - 1 - exp).max(0) as usize;
    let s = format!("{v:.decimals$}");
    if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.').to_string() } else { s }
}

struct BlockStats {
    x_mean: f64,
    x_sigma: f64,
    y_mean: f64,
    y_sigma: f64,
}

fn block_stats(block: &Block) -> Result<BlockStats> {
    let (x_mean, x_sigma) = mean_sigma(&block.x, DEFAULT_NSIGMAS)?;
    let (y_mean, y_sigma) = mean_sigma(&block.y, DEFAULT_NSIGMAS)?;
    Ok(BlockStats { x_mean, x_sigma, y_mean, y_sigma })
}

fn resolution_fit(h: &Histogram1D, s: &BlockStats) -> Result<FitResult> {
    let (_, lo, hi) = SliceMode::Resolution.binning();
    let shape = CrystalBallLeftExpRight;
    let hmax = h.maximum();
    let mut fit =
        BinnedFit::new(&shape, &[hmax, s.y_mean, 0.5 * s.y_sigma, 1.5, 5.0, 1.5], lo, hi)?;
    fit.set_limits(0, 0.33 * hmax, 2.0 * hmax)?;
    fit.set_limits(1, s.y_mean - s.y_sigma, s.y_mean + s.y_sigma)?;
    fit.set_limits(2, 0.1 * s.y_sigma, 1.1 * s.y_sigma)?;

    // pre-fit with the tails frozen
    fit.fix(3, 1.5)?;
    fit.fix(4, 5.0)?;
    fit.fix(5, 1.5)?;
    fit.fit(h, FitMethod::ChiSquare)?;

    fit.set_limits(3, 0.4, 10.0)?;
    fit.set_limits(4, 1.01, 100.0)?;
    fit.set_limits(5, 0.4, 10.0)?;
    fit.fit(h, FitMethod::ChiSquare)?;

    // Released for the likelihood stage. The tails keep lower bounds at the
    // edge of the domain where the power law is defined (alpha > 0, n > 1);
    // ROOT's ReleaseParameter would drop them.
    fit.set_limits(0, 0.0, f64::INFINITY)?;
    fit.set_limits(1, 0.65, 1.2)?;
    fit.set_limits(2, 0.0, 1.1 * s.y_sigma)?;
    fit.set_limits(3, 1e-3, f64::INFINITY)?;
    fit.set_limits(4, 1.001, f64::INFINITY)?;
    fit.set_limits(5, 1e-3, f64::INFINITY)?;
    fit.fit(h, FitMethod::Likelihood)
}

fn mva_pars_fit(h: &Histogram1D, s: &BlockStats) -> Result<FitResult> {
    let (_, lo, hi) = SliceMode::MvaPars.binning();
    let shape = CrystalBallLeftExpRight;
    let hmax = h.maximum();
    let mut fit = BinnedFit::new(&shape, &[hmax, s.y_mean, s.y_sigma, 1.5, 5.0, 1.5], lo, hi)?;
    fit.set_limits(0, 0.33 * hmax, 3.0 * hmax)?;
    fit.set_limits(1, 0.65, 1.2)?;
    fit.set_limits(2, 0.33 * s.y_sigma, 1.5 * s.y_sigma)?;
    fit.set_limits(3, 0.0, 10.0)?;
    fit.set_limits(4, 1.01, 100.0)?;
    fit.set_limits(5, 0.0, 10.0)?;
    fit.fit(h, FitMethod::ChiSquare)?;
    fit.fit(h, FitMethod::Likelihood)
}

fn block_title(mode: SliceMode, xtitle: &str, s: &BlockStats) -> String {
    match mode {
        SliceMode::Resolution => format!("{xtitle} = {:.2} #pm {:.2}", s.x_mean, s.x_sigma),
        SliceMode::MvaPars => format!(
            "{xtitle} = ({:.4} #pm {})%",
            s.x_mean * 100.0,
            format_significant(s.x_sigma * 100.0, 2)
        ),
    }
}

/// Fit the `y` distribution in blocks of `block_size` entries sorted by `x`.
pub fn fit_slices(
    x: &[f64],
    y: &[f64],
    block_size: usize,
    mode: SliceMode,
    xtitle: &str,
) -> Result<SliceResult> {
    let blocks = sorted_blocks(x, y, block_size)?;
    let (nbins, lo, hi) = mode.binning();
    tracing::debug!(n = x.len(), blocks = blocks.len(), ?mode, "fitting slices");

    let fitted: Vec<Result<BlockFit>> = blocks
        .par_iter()
        .enumerate()
        .map(|(index, block)| {
            let stats = block_stats(block)?;
            let histogram = Histogram1D::from_values(nbins, lo, hi, &block.y)?;
            let outcome = match mode {
                SliceMode::Resolution => resolution_fit(&histogram, &stats),
                SliceMode::MvaPars => mva_pars_fit(&histogram, &stats),
            };
            let fit = match outcome {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(block = index + 1, error = %e, "block fit failed");
                    None
                }
            };
            let accepted = match (&fit, mode) {
                (None, _) => false,
                (Some(_), SliceMode::MvaPars) => true,
                (Some(f), SliceMode::Resolution) => {
                    let (p, e) = (&f.parameters, &f.errors);
                    e[1] / p[1] < MAX_REL_ERROR && e[2] / p[2] < MAX_REL_ERROR
                }
            };
            Ok(BlockFit {
                index,
                title: block_title(mode, xtitle, &stats),
                x_mean: stats.x_mean,
                x_sigma: stats.x_sigma,
                histogram,
                fit,
                accepted,
            })
        })
        .collect();

    let mut result = SliceResult::default();
    for block in fitted {
        let block = block?;
        if let Some(f) = block.fit.as_ref().filter(|_| block.accepted) {
            let (p, e) = (&f.parameters, &f.errors);
            result.mean.push(block.x_mean, p[1], block.x_sigma, e[1]);
            result.sigma.push(block.x_mean, p[2] / p[1], block.x_sigma, e[2] / p[1]);
        } else {
            tracing::warn!(block = block.index + 1, title = %block.title, "fit rejected");
        }
        result.blocks.push(block);
    }
    Ok(result)
}

/// Graphs of every fit parameter of [`fit_params_slices`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitParamsResult {
    /// amp, mean, sigma, alphaL, alphaR, powerR
    pub params: [GraphErrors; 6],
    pub chi2_ndf: GraphErrors,
    #[serde(skip)]
    pub blocks: Vec<BlockFit>,
}

fn aux_fit(block: &Block, s: &BlockStats) -> Result<(Histogram1D, FitResult)> {
    let lo = s.y_mean - 5.0 * s.y_sigma;
    let hi = s.y_mean + 6.0 * s.y_sigma;
    let h = Histogram1D::from_values(100, lo, hi, &block.y)?;
    let shape = ExpLeftCrystalBallRight;
    let hmax = h.maximum();
    let mut fit = BinnedFit::new(&shape, &[hmax, s.y_mean, s.y_sigma, 1.5, 1.5, 20.0], lo, hi)?;
    fit.set_limits(0, 0.33 * hmax, 2.0 * hmax)?;
    fit.set_limits(1, 0.9, 1.6)?;
    fit.set_limits(2, 0.33 * s.y_sigma, 3.0 * s.y_sigma)?;
    fit.set_limits(3, 0.0, 10.0)?;
    fit.set_limits(4, 0.0, 10.0)?;
    fit.set_limits(5, 1.01, 100.0)?;
    let r = fit.fit(&h, FitMethod::Likelihood)?;
    Ok((h, r))
}

/// Fit `E^gen/E^PF` with [`ExpLeftCrystalBallRight`] in blocks sorted by `x`.
///
/// Every fit parameter and chi2/ndf becomes a graph against the block mean
/// of `x`. A block whose fit fails is skipped.
pub fn fit_params_slices(
    x: &[f64],
    y: &[f64],
    block_size: usize,
    xtitle: &str,
) -> Result<FitParamsResult> {
    let blocks = sorted_blocks(x, y, block_size)?;
    let fitted: Vec<Result<(BlockStats, Option<(Histogram1D, FitResult)>)>> = blocks
        .par_iter()
        .enumerate()
        .map(|(index, block)| {
            let stats = block_stats(block)?;
            let fit = aux_fit(block, &stats)
                .inspect_err(|e| tracing::warn!(block = index + 1, error = %e, "aux fit failed"))
                .ok();
            Ok((stats, fit))
        })
        .collect();

    let mut out = FitParamsResult::default();
    for (index, item) in fitted.into_iter().enumerate() {
        let (stats, fit) = item?;
        let title = format!("{xtitle} = {:.2} #pm {:.2}", stats.x_mean, stats.x_sigma);
        let Some((histogram, f)) = fit else {
            continue;
        };
        for (k, graph) in out.params.iter_mut().enumerate() {
            graph.push(stats.x_mean, f.parameters[k], stats.x_sigma, f.errors[k]);
        }
        out.chi2_ndf.push(stats.x_mean, f.chi2_ndf(), stats.x_sigma, 0.0);
        out.blocks.push(BlockFit {
            index,
            title,
            x_mean: stats.x_mean,
            x_sigma: stats.x_sigma,
            histogram,
            fit: Some(f),
            accepted: true,
        });
    }
    Ok(out)
}

impl SliceResult {
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

/// Fail with a readable message when a slice has no accepted block.
pub fn require_points(result: &SliceResult, what: &str) -> Result<()> {
    if result.is_empty() {
        return Err(Error::Computation(format!("{what}: no accepted blocks")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    /// Response with a resolution that improves with energy.
    fn sample(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let e: f64 = rng.gen_range(1.0..100.0);
            let sigma = 0.02 + 0.1 / e.sqrt();
            let r = Normal::new(0.95, sigma).unwrap().sample(&mut rng);
            x.push(e);
            y.push(r);
        }
        (x, y)
    }

    #[test]
    fn resolution_slices_follow_truth() {
        let (x, y) = sample(12_000, 42);
        let r = fit_slices(&x, &y, 3000, SliceMode::Resolution, "E^{gen}").unwrap();
        assert_eq!(r.blocks.len(), 4);
        assert!(r.mean.len() >= 3);
        for p in r.mean.iter() {
            assert_relative_eq!(p.y, 0.95, epsilon = 0.01);
        }
        // the highest-energy block is the narrowest
        let widths: Vec<f64> = r.sigma.iter().map(|p| p.y).collect();
        assert!(widths.last().unwrap() < widths.first().unwrap());
        assert!(r.blocks[0].title.starts_with("E^{gen} = "));
    }

    #[test]
    fn released_tails_stay_defined() {
        let (x, mut y) = sample(6_000, 5);
        // a low tail from leakage, every tenth cluster
        let mut rng = StdRng::seed_from_u64(6);
        for v in y.iter_mut().step_by(10) {
            *v -= rng.gen_range(0.0..0.25);
        }
        let r = fit_slices(&x, &y, 3000, SliceMode::Resolution, "E^{gen}").unwrap();
        for fit in r.blocks.iter().filter_map(|b| b.fit.as_ref()) {
            let p = &fit.parameters;
            assert!(p.iter().all(|v| v.is_finite()));
            assert!(p[3] > 0.0 && p[5] > 0.0, "alphas {} {}", p[3], p[5]);
            assert!(p[4] > 1.0, "power {}", p[4]);
        }
    }

    #[test]
    fn mva_pars_keeps_every_block() {
        let (x, y) = sample(4_000, 9);
        let r = fit_slices(&x, &y, 2000, SliceMode::MvaPars, "#sigma/#mu").unwrap();
        assert_eq!(r.blocks.len(), 2);
        assert!(r.blocks.iter().all(|b| b.accepted || b.fit.is_none()));
        assert_eq!(r.blocks[0].histogram.nbins(), 200);
        assert!(r.blocks[0].title.ends_with(")%"));
    }

    #[test]
    fn aux_fit_graphs() {
        let (x, y) = sample(6_000, 1);
        let inv: Vec<f64> = y.iter().map(|v| 1.0 / v).collect();
        let r = fit_params_slices(&x, &inv, 3000, "p_{T}^{gen}").unwrap();
        assert_eq!(r.chi2_ndf.len(), r.blocks.len());
        for g in &r.params {
            assert_eq!(g.len(), r.blocks.len());
        }
        if let Some(p) = r.params[1].iter().next() {
            assert_relative_eq!(p.y, 1.0 / 0.95, epsilon = 0.03);
        }
    }

    #[test]
    fn page_names_and_formatting() {
        assert_eq!(page_name("mean_vs_e_EB", 9), "fits_mean_vs_e_EB_blk010to018");
        assert_eq!(format_significant(0.012345, 2), "0.012");
        assert_eq!(format_significant(1.5, 2), "1.5");
        assert_eq!(format_significant(2.0, 2), "2");
        assert_eq!(format_significant(123.0, 2), "1.2e2");
    }

    #[test]
    fn bad_block_size() {
        assert!(fit_slices(&[1.0], &[1.0], 0, SliceMode::Resolution, "x").is_err());
    }
}
