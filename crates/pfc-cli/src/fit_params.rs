//! Parameters of a standalone fit of `E^gen/E^PF` in blocks of truth pT.

use anyhow::{Context, Result};
use pfc_core::Detector;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_plot::Color;
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::{graph, hist};
use pfc_stats::{FitParamsResult, GraphErrors, Histogram1D, fit_params_slices};

use crate::context::RunContext;
use crate::figures::fit_pages;

const COLORS: [i32; 6] =
    [root::BLACK, root::BLUE, root::RED, root::ORANGE, root::GREEN, root::DARK_GREEN];

const COLUMNS: [&str; 6] = ["pfEta", "pfPhoDeltaR", "pfE", "mcE", "pfSize5x5_ZS", "mcPt"];

/// Graph names and y titles: the fit parameters, then chi2/ndf.
const GRAPHS: [(&str, &str); 7] = [
    ("amp", "amp"),
    ("mean", "mean"),
    ("sigma", "#sigma"),
    ("alphaL", "#alpha_{L}"),
    ("alphaR", "#alpha_{R}"),
    ("powerR", "n_{R}"),
    ("chi2ndf", "#chi^{2}/ndf"),
];

/// Distributions of the fitted values: graph index, binning.
const DISTRIBUTIONS: [(usize, (usize, f64, f64)); 2] =
    [(4, (100, 0.0, 11.0)), (5, (100, 0.0, 110.0))];

/// Cluster-size selection: `n > 0` exactly `n`, `n < 0` at least `|n|`, 0 any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCut(pub i32);

impl SizeCut {
    pub fn accepts(self, size: f64) -> bool {
        let n = f64::from(self.0);
        match self.0 {
            0 => true,
            k if k > 0 => size == n,
            _ => size >= -n,
        }
    }

    /// `p3` for exactly 3, `m2` for at least 2.
    fn tag(self) -> String {
        format!("{}{}", if self.0 >= 0 { "p" } else { "m" }, self.0.unsigned_abs())
    }

    fn describe(self) -> String {
        match self.0 {
            0 => "all pfSize".to_string(),
            k if k > 0 => format!("pfSize = {k}"),
            k => format!("pfSize #geq {}", k.unsigned_abs()),
        }
    }
}

/// `(mcPt, mcE/pfE)` of well-matched clusters in `det` passing `cut`.
fn samples(table: &EventTable, det: Detector, cut: SizeCut) -> Result<(Vec<f64>, Vec<f64>)> {
    let (pf_eta, dr) = (table.column("pfEta")?, table.column("pfPhoDeltaR")?);
    let (pf_e, mc_e) = (table.column("pfE")?, table.column("mcE")?);
    let (size, mc_pt) = (table.column("pfSize5x5_ZS")?, table.column("mcPt")?);
    Ok((0..table.len())
        .filter(|&i| det.accepts(pf_eta[i]) && cut.accepts(size[i]))
        .filter(|&i| dr[i] <= 0.03 && pf_e[i] / mc_e[i] >= 0.4)
        .map(|i| (mc_pt[i], mc_e[i] / pf_e[i]))
        .unzip())
}

fn fitted(
    ctx: &RunContext,
    n: &InputNtuple,
    det: Detector,
    cut: SizeCut,
) -> Result<FitParamsResult> {
    let block_size = ctx.config.fit_params.block_size;
    let key = format!("draw_fit_params_{}_{det}_{block_size}_{}", n.name, cut.tag());
    ctx.cache.get_or_compute(&key, &ctx.fingerprint(n, false), || {
        let table = ctx.load(n, &COLUMNS, &[])?;
        let (x, y) = samples(&table, det, cut)?;
        let r = fit_params_slices(&x, &y, block_size, "p_{T}^{gen}")
            .with_context(|| format!("fitting {} in {det}", n.name))?;
        let title = format!("{}_{det}", n.name);
        fit_pages(ctx, &ctx.plot_dir("fit_params"), &title, "E^{gen}/E^{PF}", &r.blocks)?;
        Ok(r)
    })
}

fn graph_of(r: &FitParamsResult, k: usize) -> &GraphErrors {
    r.params.get(k).unwrap_or(&r.chi2_ndf)
}

fn graph_plot(title: &str, y_title: &str, graphs: Vec<(GraphErrors, String)>) -> graph::GraphPlot {
    let range = pfc_stats::joint_range(graphs.iter().map(|(g, _)| g));
    let series = graphs
        .into_iter()
        .enumerate()
        .map(|(i, (g, label))| {
            graph::GraphSeries::new(g, label, Color::root(COLORS[i % COLORS.len()]))
        })
        .collect();
    graph::GraphPlot {
        title: title.to_string(),
        x_title: "p_{T}^{gen}".to_string(),
        y_title: y_title.to_string(),
        series,
        x_min: Some(0.0),
        y_min: range.map(|(_, (ymin, _))| 0.9 * ymin),
        y_max: range.map(|(_, (_, ymax))| 1.1 * ymax),
        legend: LegendPosition::BottomLeft,
        ..Default::default()
    }
}

/// Histogram of the y values of `g`.
fn distribution(g: &GraphErrors, (nbins, lo, hi): (usize, f64, f64)) -> Result<Histogram1D> {
    let values: Vec<f64> = g.iter().map(|p| p.y).collect();
    Ok(Histogram1D::from_values(nbins, lo, hi, &values)?)
}

pub fn cmd_fit_params(ctx: &RunContext, pf_size: i32) -> Result<()> {
    let cut = SizeCut(pf_size);
    let inputs = ctx.inputs()?;
    let dir = ctx.plot_dir("fit_params");

    for det in Detector::ALL {
        let _span = tracing::info_span!("fit_params", %det, pf_size).entered();
        let results: Vec<FitParamsResult> =
            inputs.iter().map(|n| fitted(ctx, n, det, cut)).collect::<Result<_>>()?;
        let title = format!("{det}, {}", cut.describe());

        for (k, (name, y_title)) in GRAPHS.iter().enumerate() {
            let graphs: Vec<(GraphErrors, String)> = inputs
                .iter()
                .zip(&results)
                .map(|(n, r)| (graph_of(r, k).clone(), n.label.clone()))
                .collect();
            if graphs.iter().all(|(g, _)| g.is_empty()) {
                tracing::warn!(graph = name, "no fitted blocks, plot skipped");
                continue;
            }
            let plot = graph_plot(&title, y_title, graphs);
            let svg = graph::render(&plot, ctx.plot_config());
            ctx.save_plot(svg, &dir, &format!("fit_{name}_{det}"))?;
        }

        for (k, binning) in DISTRIBUTIONS {
            let (name, x_title) = GRAPHS[k];
            let mut series = Vec::with_capacity(results.len());
            for (i, (n, r)) in inputs.iter().zip(&results).enumerate() {
                series.push(hist::HistSeries {
                    hist: distribution(graph_of(r, k), binning)?,
                    label: n.label.clone(),
                    color: Color::root(COLORS[i % COLORS.len()]),
                });
            }
            let plot = hist::HistPlot {
                title: title.clone(),
                x_title: x_title.to_string(),
                y_title: "Blocks".to_string(),
                series,
                x_range: None,
                log_y: false,
                legend: LegendPosition::TopRight,
            };
            let svg = hist::render(&plot, ctx.plot_config());
            ctx.save_plot(svg, &dir, &format!("fit_distr_{name}_{det}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_cuts() {
        assert!(SizeCut(0).accepts(7.0));
        assert!(SizeCut(2).accepts(2.0));
        assert!(!SizeCut(2).accepts(3.0));
        assert!(SizeCut(-2).accepts(3.0));
        assert!(!SizeCut(-2).accepts(1.0));
        assert_eq!(SizeCut(3).tag(), "p3");
        assert_eq!(SizeCut(-2).tag(), "m2");
        assert_eq!(SizeCut(0).tag(), "p0");
        assert_eq!(SizeCut(-2).describe(), "pfSize #geq 2");
    }

    #[test]
    fn samples_invert_the_response() {
        let table = EventTable::from_columns([
            ("pfEta", vec![0.1, 0.1, 0.1, 2.0]),
            ("pfPhoDeltaR", vec![0.01, 0.1, 0.01, 0.01]),
            ("pfE", vec![8.0, 8.0, 8.0, 8.0]),
            ("mcE", vec![10.0; 4]),
            ("pfSize5x5_ZS", vec![1.0, 1.0, 2.0, 1.0]),
            ("mcPt", vec![3.0, 4.0, 5.0, 6.0]),
        ])
        .unwrap();
        let (x, y) = samples(&table, Detector::Barrel, SizeCut(1)).unwrap();
        assert_eq!(x, [3.0]);
        approx::assert_relative_eq!(y[0], 1.25);
    }

    #[test]
    fn chi2_follows_parameters() {
        let mut r = FitParamsResult::default();
        r.chi2_ndf.push(1.0, 1.3, 0.1, 0.0);
        assert_eq!(graph_of(&r, 6).len(), 1);
        assert!(graph_of(&r, 0).is_empty());
        let g: GraphErrors = [2.0, 3.0, 20.0]
            .iter()
            .map(|&y| pfc_stats::GraphPoint { x: 1.0, y, ex: 0.0, ey: 0.0 })
            .collect();
        let h = distribution(&g, DISTRIBUTIONS[0].1).unwrap();
        approx::assert_relative_eq!(h.integral(), 2.0);
    }
}
