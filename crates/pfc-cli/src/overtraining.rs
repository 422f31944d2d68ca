//! Overtraining check: corrected response of the training and test halves.

use anyhow::Result;
use pfc_core::Detector;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_plot::Color;
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::hist::{HistPlot, HistSeries, render};
use pfc_stats::Histogram1D;

use crate::context::RunContext;
use crate::eval::training_names;

const COLORS: [i32; 3] = [root::BLACK, root::BLUE, root::ORANGE];
const TEXTS: [&str; 3] =
    ["Corrections from train", "Corrections from test", "No corrections, test+train"];

/// Train-half, test-half and uncorrected response of the events in `det`.
///
/// Even rows were used for training. The uncorrected histogram holds both
/// halves and is scaled by 1/2 to compare with either.
fn fill(table: &EventTable, det: Detector, branch: &str) -> Result<Vec<Histogram1D>> {
    let (pf_e, mc_e) = (table.column("pfE")?, table.column("mcE")?);
    let (pf_eta, corr) = (table.column("pfEta")?, table.column(branch)?);
    let mut train = Histogram1D::new(500, 0.0, 1.2)?;
    let mut test = train.clone();
    let mut orig = train.clone();
    for i in (0..table.len()).filter(|&i| det.accepts(pf_eta[i])) {
        let resp = pf_e[i] / mc_e[i];
        if i % 2 == 0 {
            train.fill(resp * corr[i]);
        } else {
            test.fill(resp * corr[i]);
        }
        orig.fill(resp);
    }
    orig.scale(0.5);
    Ok(vec![train, test, orig])
}

fn histograms(ctx: &RunContext, n: &InputNtuple, det: Detector) -> Result<Vec<Histogram1D>> {
    let key = format!("draw_overtraining_{}_{det}", n.name);
    ctx.cache.get_or_compute(&key, &ctx.fingerprint(n, true), || {
        let branch = pfc_mva::mean_column(&n.name);
        let table = ctx.load(n, &["pfE", "mcE", "pfEta"], &[branch.clone()])?;
        fill(&table, det, &branch)
    })
}

/// Each ntuple corrected by the training made from it.
pub fn cmd_overtraining(ctx: &RunContext) -> Result<()> {
    let trainings = training_names(ctx.output_dir())?;
    let dir = ctx.plot_dir("overtraining");
    for n in ctx.inputs()? {
        if !trainings.contains(&n.name) {
            tracing::warn!(ntuple = %n.name, "no training on this ntuple, skipped");
            continue;
        }
        for det in Detector::ALL {
            let _span = tracing::info_span!("overtraining", ntuple = %n.name, %det).entered();
            let series = histograms(ctx, &n, det)?
                .into_iter()
                .zip(COLORS.iter().zip(TEXTS))
                .map(|(hist, (&c, text))| HistSeries {
                    hist,
                    label: text.to_string(),
                    color: Color::root(c),
                })
                .collect();
            let plot = HistPlot {
                title: format!("Overtraining test, {det}"),
                x_title: "correction * E^{PF}/E^{gen}".to_string(),
                y_title: "Entries".to_string(),
                series,
                x_range: None,
                log_y: false,
                legend: LegendPosition::TopRight,
            };
            let stem = format!("overtraining_{}_{det}", n.name);
            ctx.save_plot(render(&plot, ctx.plot_config()), &dir, &stem)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn halves_split_on_row_parity() {
        let table = EventTable::from_columns([
            ("pfE", vec![8.0, 9.0, 8.0, 9.0, 8.0]),
            ("mcE", vec![10.0; 5]),
            ("pfEta", vec![0.1, 0.1, 0.1, 0.1, 2.5]),
            ("mva_mean_a", vec![1.25, 1.1, 1.25, 1.1, 1.0]),
        ])
        .unwrap();
        let h = fill(&table, Detector::Barrel, "mva_mean_a").unwrap();
        assert_relative_eq!(h[0].integral(), 2.0);
        assert_relative_eq!(h[1].integral(), 2.0);
        assert_relative_eq!(h[2].integral(), 2.0);
        assert_relative_eq!(h[0].mean(), 1.0, epsilon = 0.01);
        assert_relative_eq!(h[1].mean(), 0.99, epsilon = 0.01);
    }
}
