//! Share of each cluster size versus truth pT.

use anyhow::Result;
use pfc_core::Detector;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_plot::Color;
use pfc_plot::plots::stack::{StackLayer, StackPlot, cumulative_percentages, render};
use pfc_stats::Histogram1D;

use crate::context::RunContext;

/// Largest class; bigger clusters fall into it.
const MAX_SIZE: usize = 6;

/// Colours by size class, smallest first.
const COLORS: [i32; MAX_SIZE] = [49, 40, 4, 6, 2, 8];

const COLUMNS: [&str; 6] = ["pfEta", "pfPhoDeltaR", "pfE", "mcE", "pfSize5x5_ZS", "mcPt"];

/// Truth pT of well-matched clusters in `det`, one histogram per size class.
fn fill(table: &EventTable, det: Detector) -> Result<Vec<Histogram1D>> {
    let (pf_eta, dr) = (table.column("pfEta")?, table.column("pfPhoDeltaR")?);
    let (pf_e, mc_e) = (table.column("pfE")?, table.column("mcE")?);
    let (size, mc_pt) = (table.column("pfSize5x5_ZS")?, table.column("mcPt")?);
    let mut parts = (0..MAX_SIZE)
        .map(|_| Histogram1D::new(60, 0.0, 6.0))
        .collect::<pfc_core::Result<Vec<_>>>()?;
    for i in 0..table.len() {
        if !det.accepts(pf_eta[i]) || dr[i] > 0.03 || pf_e[i] / mc_e[i] < 0.4 || size[i] < 1.0 {
            continue;
        }
        let class = (size[i] as usize).min(MAX_SIZE);
        parts[class - 1].fill(mc_pt[i]);
    }
    Ok(parts)
}

fn label(class: usize) -> String {
    if class == MAX_SIZE { format!("pfSize #geq {class}") } else { format!("pfSize = {class}") }
}

/// Cumulative shares drawn largest first so every class stays visible.
fn stack(n: &InputNtuple, det: Detector, parts: &[Histogram1D]) -> Result<StackPlot> {
    let sums = cumulative_percentages(parts)?;
    let layers: Vec<StackLayer> = sums
        .into_iter()
        .enumerate()
        .rev()
        .map(|(k, hist)| StackLayer { hist, label: label(k + 1), color: Color::root(COLORS[k]) })
        .collect();
    let last = layers.len().saturating_sub(1);
    Ok(StackPlot {
        title: format!("{}, {det}", n.label),
        x_title: "p_{T}^{gen}".to_string(),
        y_title: "%".to_string(),
        legend_order: (0..layers.len()).map(|k| last - k).collect(),
        layers,
        y_range: (0.0, 100.0),
    })
}

pub fn cmd_pfsize(ctx: &RunContext) -> Result<()> {
    let dir = ctx.plot_dir("pfsize");
    for n in ctx.inputs()? {
        for det in Detector::ALL {
            let _span = tracing::info_span!("pfsize", ntuple = %n.name, %det).entered();
            let key = format!("draw_pfsize_{}_{det}", n.name);
            let parts: Vec<Histogram1D> =
                ctx.cache.get_or_compute(&key, &ctx.fingerprint(&n, false), || {
                    fill(&ctx.load(&n, &COLUMNS, &[])?, det)
                })?;
            let plot = stack(&n, det, &parts)?;
            let stem = format!("pfsize_{}_{det}", n.label);
            ctx.save_plot(render(&plot, ctx.plot_config()), &dir, &stem)?;
        }
    }
    Ok(())
}
