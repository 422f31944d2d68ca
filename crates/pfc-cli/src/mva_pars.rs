//! Calibration of the predicted width: observed position and width of the
//! corrected response in blocks of the predicted relative width.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use pfc_core::Detector;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_plot::Color;
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::graph::{GraphPlot, GraphSeries, render};
use pfc_stats::{GraphErrors, SliceMode, SliceResult, fit_slices};

use crate::config::Range;
use crate::context::RunContext;
use crate::eval::{training_label, training_names};
use crate::figures::fit_pages;
use crate::results::range_tag;

const COLORS: [i32; 4] = [root::DARK_GREEN, root::BLACK, root::BLUE, root::RED];

const COLUMNS: [&str; 4] = ["pfE", "mcE", "mcPt", "pfEta"];

/// `(x, y)` = (predicted sigma/mean, corrected response) of the test events
/// in `det` with truth pT in `[pt1, pt2)`.
fn samples(
    test: &EventTable,
    mva: &str,
    det: Detector,
    (pt1, pt2): Range,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let [mean, sigma, ..] = pfc_mva::friend_columns(mva);
    let (mean, sigma) = (test.column(&mean)?, test.column(&sigma)?);
    let (pf_e, mc_e) = (test.column("pfE")?, test.column("mcE")?);
    let (mc_pt, pf_eta) = (test.column("mcPt")?, test.column("pfEta")?);
    Ok((0..test.len())
        .filter(|&i| det.accepts(pf_eta[i]) && pt1 <= mc_pt[i] && mc_pt[i] < pt2)
        .map(|i| (sigma[i] / mean[i], pf_e[i] / mc_e[i] * mean[i]))
        .unzip())
}

fn entry_key(det: Detector, slice: Range) -> String {
    format!("{det}_pT{}", range_tag(slice))
}

/// Fitted graphs of one ntuple under training `mva`, keyed by [`entry_key`].
fn fitted(ctx: &RunContext, n: &InputNtuple, mva: &str) -> Result<BTreeMap<String, SliceResult>> {
    let cfg = &ctx.config.mva_pars;
    let mut entries = Vec::new();
    for det in Detector::ALL {
        for &slice in &cfg.pt_slices {
            entries.push((entry_key(det, slice), det, slice));
        }
    }
    let wanted: Vec<String> = entries.iter().map(|(k, _, _)| k.clone()).collect();
    let key = format!("draw_mva_pars_{}_{mva}_{}", n.name, cfg.block_size);
    ctx.cache.get_or_fill(&key, &ctx.fingerprint(n, true), &wanted, |missing| {
        let friend: Vec<String> = pfc_mva::friend_columns(mva)[..2].to_vec();
        let test = ctx.load(n, &COLUMNS, &friend)?.test_rows();
        let fits_dir = ctx.plot_dir("mva_pars").join("fits");
        let mut out = BTreeMap::new();
        for (k, det, slice) in entries.iter().filter(|(k, _, _)| missing.contains(k)) {
            let (x, y) = samples(&test, mva, *det, *slice)?;
            let title = format!("{}_{mva}_{k}", n.name);
            let r = fit_slices(&x, &y, cfg.block_size, SliceMode::MvaPars, "#sigma/#mu")
                .with_context(|| format!("fitting {title}"))?;
            fit_pages(ctx, &fits_dir, &title, "E^{PF}/E^{gen} * correction", &r.blocks)?;
            out.insert(k.clone(), r);
        }
        Ok(out)
    })
}

/// Frame from the origin up to 10% above the highest point.
fn plot(title: &str, y_title: &str, graphs: &[(GraphErrors, String)]) -> GraphPlot {
    let y_max =
        pfc_stats::joint_range(graphs.iter().map(|(g, _)| g)).map(|(_, (_, ymax))| ymax * 1.1);
    let series = graphs
        .iter()
        .enumerate()
        .map(|(i, (g, label))| {
            GraphSeries::new(g.clone(), label.clone(), Color::root(COLORS[i % COLORS.len()]))
        })
        .collect();
    GraphPlot {
        title: title.to_string(),
        x_title: "Width (expected)".to_string(),
        y_title: y_title.to_string(),
        series,
        x_min: Some(0.0),
        y_min: Some(0.0),
        y_max,
        legend: LegendPosition::BottomRight,
        ..Default::default()
    }
}

pub fn cmd_mva_pars(ctx: &RunContext) -> Result<()> {
    let inputs = ctx.inputs()?;
    let trainings = training_names(ctx.output_dir())?;
    if trainings.is_empty() {
        anyhow::bail!("no trainings in {} (run `pfcalib train` first)", ctx.output_dir().display());
    }
    let dir = ctx.plot_dir("mva_pars");

    for mva in &trainings {
        let _span = tracing::info_span!("mva_pars", mva = %mva).entered();
        let per_ntuple: Vec<BTreeMap<String, SliceResult>> =
            inputs.iter().map(|n| fitted(ctx, n, mva)).collect::<Result<_>>()?;
        let mva_label = training_label(&inputs, mva);

        for det in Detector::ALL {
            for &slice in &ctx.config.mva_pars.pt_slices {
                let k = entry_key(det, slice);
                let mut position = Vec::new();
                let mut width = Vec::new();
                for (n, results) in inputs.iter().zip(&per_ntuple) {
                    if let Some(r) = results.get(&k) {
                        position.push((r.mean.clone(), n.label.clone()));
                        width.push((r.sigma.clone(), n.label.clone()));
                    }
                }
                if position.iter().all(|(g, _)| g.is_empty()) {
                    let tag = range_tag(slice);
                    tracing::warn!(%det, slice = %tag, "no fitted points, plot skipped");
                    continue;
                }
                let title = format!(
                    "Trained on {mva_label}, sliced in {} < p_{{T}} < {} GeV/c",
                    slice.0, slice.1
                );
                let tag = range_tag(slice);
                let p = plot(&title, "Position (real)", &position);
                let stem = format!("position_{det}_{mva}_pT{tag}");
                ctx.save_plot(render(&p, ctx.plot_config()), &dir, &stem)?;
                let p = plot(&title, "Sigma/Mean (real)", &width);
                let stem = format!("width_{det}_{mva}_pT{tag}");
                ctx.save_plot(render(&p, ctx.plot_config()), &dir, &stem)?;
            }
        }
    }
    Ok(())
}
