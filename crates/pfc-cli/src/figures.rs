//! Plot assembly shared by the graph-based analyses.

use std::path::Path;

use anyhow::Result;
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::fit_grid::render_page;
use pfc_plot::plots::graph::{GraphPlot, GraphSeries, RatioPanel, render};
use pfc_plot::Color;
use pfc_stats::{BLOCKS_PER_PAGE, BlockFit, GraphErrors, page_name, ratio_to_reference};

use crate::context::RunContext;

pub const MEAN_TITLE: &str = "Mean_{E^{rec}/E^{gen}}";
pub const SIGMA_TITLE: &str = "#sigma_{E^{rec}/E^{gen}}/mean";

/// y range of the corrected/uncorrected panel.
const RATIO_RANGE: (f64, f64) = (0.1, 1.25);

/// Graphs in groups of equal size: first the uncorrected group, then one
/// group per correction. Uncorrected graphs are orange; corrected graphs take
/// `palette` colours in order.
pub struct GraphGroups {
    pub graphs: Vec<GraphErrors>,
    pub labels: Vec<String>,
    pub group: usize,
    pub palette: &'static [i32],
    /// Drop the first two graphs of the uncorrected and first corrected group
    /// (the samples without pileup).
    pub skip_no_pileup: bool,
}

/// Colours of corrected graphs in the `results` plots.
pub const RESULTS_PALETTE: &[i32] = &[root::DARK_GREEN, root::BLACK, root::BLUE, root::RED];

impl GraphGroups {
    fn skipped(&self, i: usize) -> bool {
        self.skip_no_pileup && (i < 2 || (self.group..self.group + 2).contains(&i))
    }

    fn color(&self, i: usize) -> Color {
        if i < self.group {
            Color::root(root::ORANGE)
        } else {
            Color::root(self.palette[(i - self.group) % self.palette.len()])
        }
    }

    fn series(&self) -> Vec<GraphSeries> {
        self.graphs
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let label = self.labels.get(i).cloned().unwrap_or_default();
                let s = GraphSeries::new(g.clone(), label, self.color(i));
                if self.skipped(i) { s.hidden() } else { s }
            })
            .collect()
    }

    /// Ratios of every corrected group to the uncorrected one, coloured like
    /// the corrected graphs. Pairs with an empty graph have no ratio.
    fn ratios(&self) -> Result<Vec<GraphSeries>> {
        let mut out = Vec::new();
        for (k, corrected) in self.graphs.iter().enumerate().skip(self.group) {
            let n = k % self.group;
            if corrected.is_empty() || self.graphs[n].is_empty() {
                continue;
            }
            let ratio = ratio_to_reference(corrected, &self.graphs[n])?;
            let s = GraphSeries::new(ratio, "", self.color(k));
            out.push(if self.skipped(n) { s.hidden() } else { s });
        }
        Ok(out)
    }

    fn has_points(&self) -> bool {
        self.graphs.iter().any(|g| !g.is_empty())
    }
}

/// Frame and text of one overlay.
pub struct Overlay<'a> {
    pub name: &'a str,
    pub caption: &'a str,
    pub x_title: &'a str,
    pub y_title: &'a str,
    pub x_max: Option<f64>,
    /// Frame starts at zero unless the points are negative
    pub clamp_x_at_zero: bool,
}

impl Overlay<'_> {
    fn plot(&self, groups: &GraphGroups, legend: LegendPosition) -> GraphPlot {
        let x_min = if self.clamp_x_at_zero {
            pfc_stats::joint_range(groups.graphs.iter())
                .map(|((xmin, _), _)| xmin)
                .filter(|&xmin| xmin >= 0.0)
                .map(|_| 0.0)
        } else {
            None
        };
        GraphPlot {
            title: self.caption.to_string(),
            x_title: self.x_title.to_string(),
            y_title: self.y_title.to_string(),
            series: groups.series(),
            x_min,
            x_max: self.x_max,
            legend,
            ..Default::default()
        }
    }
}

fn skip_empty(name: &str, groups: &GraphGroups) -> bool {
    if groups.has_points() {
        return false;
    }
    tracing::warn!(plot = name, "no fitted points, plot skipped");
    true
}

/// Graphs overlaid on one frame, legend bottom right.
pub fn combine(ctx: &RunContext, dir: &Path, o: &Overlay<'_>, groups: &GraphGroups) -> Result<()> {
    if skip_empty(o.name, groups) {
        return Ok(());
    }
    let plot = o.plot(groups, LegendPosition::BottomRight);
    ctx.save_plot(render(&plot, ctx.plot_config()), dir, o.name)?;
    Ok(())
}

/// Graphs overlaid with a corrected/uncorrected ratio panel, legend right.
pub fn combine_ratio(
    ctx: &RunContext,
    dir: &Path,
    o: &Overlay<'_>,
    groups: &GraphGroups,
) -> Result<()> {
    if skip_empty(o.name, groups) {
        return Ok(());
    }
    let mut plot = o.plot(groups, LegendPosition::TopRight);
    plot.ratio = Some(RatioPanel {
        series: groups.ratios()?,
        y_range: RATIO_RANGE,
        y_title: "Corr/uncorr".into(),
    });
    ctx.save_plot(render(&plot, ctx.plot_config()), dir, o.name)?;
    Ok(())
}

/// Write the fitted block histograms as 3x3 pages `fits_<title>_blkNNNtoMMM`.
pub fn fit_pages(
    ctx: &RunContext,
    dir: &Path,
    title: &str,
    x_title: &str,
    blocks: &[BlockFit],
) -> Result<()> {
    for (page, chunk) in blocks.chunks(BLOCKS_PER_PAGE).enumerate() {
        let name = page_name(title, page * BLOCKS_PER_PAGE);
        ctx.save_plot(render_page(chunk, x_title, ctx.plot_config()), dir, &name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, y: f64) -> GraphErrors {
        (0..n).map(|i| pfc_stats::GraphPoint { x: i as f64 + 1.0, y, ex: 0.1, ey: 0.01 }).collect()
    }

    fn groups(skip: bool) -> GraphGroups {
        GraphGroups {
            graphs: [0.2, 0.2, 0.2, 0.1, 0.1, 0.1].map(|y| line(3, y)).to_vec(),
            labels: (0..6).map(|i| format!("g{i}")).collect(),
            group: 3,
            palette: RESULTS_PALETTE,
            skip_no_pileup: skip,
        }
    }

    #[test]
    fn skipping_hides_no_pileup_graphs() {
        let visible: Vec<bool> = groups(true).series().iter().map(|s| s.visible).collect();
        assert_eq!(visible, [false, false, true, false, false, true]);
        assert!(groups(false).series().iter().all(|s| s.visible));
    }

    #[test]
    fn colors_follow_groups() {
        let g = groups(false);
        assert_eq!(g.color(0), Color::root(root::ORANGE));
        assert_eq!(g.color(3), Color::root(root::DARK_GREEN));
        assert_eq!(g.color(5), Color::root(root::BLUE));
    }

    #[test]
    fn ratios_pair_with_uncorrected_graph() {
        let r = groups(true).ratios().unwrap();
        assert_eq!(r.len(), 3);
        approx::assert_relative_eq!(r[0].graph.points()[0].y, 0.5);
        assert!(!r[0].visible && !r[1].visible && r[2].visible);
    }
}
