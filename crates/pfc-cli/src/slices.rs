//! Corrected and uncorrected response distributions in regions of truth pT
//! and reconstructed |eta|.

use std::collections::BTreeMap;

use anyhow::Result;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_plot::Color;
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::hist::{HistPlot, HistSeries, render};
use pfc_stats::Histogram1D;

use crate::config::{SliceRegion, SlicesConfig};
use crate::context::RunContext;
use crate::eval::{training_label, training_names};

const COLORS: [i32; 7] = [
    root::ORANGE,
    root::BLACK,
    root::BLUE,
    root::RED,
    root::GREEN,
    root::DARK_GREEN,
    42,
];

const COLUMNS: [&str; 4] = ["pfE", "mcE", "mcPt", "pfEta"];

/// `<det>_pT_<pt1>_<pt2>`, also the plot name suffix.
fn region_name(r: &SliceRegion) -> String {
    format!("{}_pT_{:.1}_{:.1}", r.detector, r.pt.0, r.pt.1)
}

/// Cache entry of one region and correction branch (empty when uncorrected).
fn entry_key(r: &SliceRegion, branch: &str) -> String {
    format!("{}_{}", region_name(r), if branch.is_empty() { "uncorrected" } else { branch })
}

fn in_region(r: &SliceRegion, pt: f64, eta: f64) -> bool {
    let abs_eta = eta.abs();
    r.pt.0 <= pt && pt < r.pt.1 && r.abs_eta.0 <= abs_eta && abs_eta < r.abs_eta.1
}

/// Response histograms of the test events for the `wanted` entries,
/// normalised to `n_total`, the entries of the whole ntuple.
fn fill(
    test: &EventTable,
    n_total: usize,
    cfg: &SlicesConfig,
    entries: &[(String, &SliceRegion, String)],
) -> Result<BTreeMap<String, Histogram1D>> {
    let (pf_e, mc_e) = (test.column("pfE")?, test.column("mcE")?);
    let (mc_pt, pf_eta) = (test.column("mcPt")?, test.column("pfEta")?);
    let norm = if n_total == 0 { 1.0 } else { 1.0 / n_total as f64 };

    let mut out = BTreeMap::new();
    for (key, region, branch) in entries {
        let corr = if branch.is_empty() { None } else { Some(test.column(branch)?) };
        let mut h = Histogram1D::new(cfg.nbins, cfg.range.0, cfg.range.1)?;
        for i in 0..test.len() {
            if in_region(region, mc_pt[i], pf_eta[i]) {
                let c = corr.map_or(1.0, |c| c[i]);
                h.fill(pf_e[i] / mc_e[i] * c);
            }
        }
        h.scale(norm);
        out.insert(key.clone(), h);
    }
    Ok(out)
}

fn histograms(
    ctx: &RunContext,
    n: &InputNtuple,
    branches: &[String],
) -> Result<BTreeMap<String, Histogram1D>> {
    let cfg = &ctx.config.slices;
    let mut entries = Vec::new();
    for region in &cfg.regions {
        for branch in branches {
            entries.push((entry_key(region, branch), region, branch.clone()));
        }
    }
    let wanted: Vec<String> = entries.iter().map(|(k, _, _)| k.clone()).collect();
    let key = format!("draw_slices_{}", n.name);
    ctx.cache.get_or_fill(&key, &ctx.fingerprint(n, true), &wanted, |missing| {
        let todo: Vec<_> =
            entries.iter().filter(|(k, _, _)| missing.contains(k)).cloned().collect();
        let friend: Vec<String> = branches.iter().filter(|b| !b.is_empty()).cloned().collect();
        let table = ctx.load(n, &COLUMNS, &friend)?;
        fill(&table.test_rows(), table.len(), cfg, &todo)
    })
}

pub fn cmd_slices(ctx: &RunContext) -> Result<()> {
    let inputs = ctx.inputs()?;
    let trainings = training_names(ctx.output_dir())?;
    let mut branches = vec![String::new()];
    branches.extend(trainings.iter().map(|t| pfc_mva::mean_column(t)));
    let mut labels = vec!["no correction".to_string()];
    labels.extend(trainings.iter().map(|t| training_label(&inputs, t)));
    let dir = ctx.plot_dir("slices");

    for n in &inputs {
        let _span = tracing::info_span!("slices", ntuple = %n.name).entered();
        let hists = histograms(ctx, n, &branches)?;
        for region in &ctx.config.slices.regions {
            let mut series = Vec::with_capacity(branches.len());
            for (i, (branch, label)) in branches.iter().zip(&labels).enumerate() {
                let Some(h) = hists.get(&entry_key(region, branch)) else {
                    continue;
                };
                series.push(HistSeries {
                    hist: h.rebin(region.rebin.max(1))?,
                    label: label.clone(),
                    color: Color::root(COLORS[i % COLORS.len()]),
                });
            }
            let (pt1, pt2) = region.pt;
            let plot = HistPlot {
                title: format!(
                    "test sample: {}, {}, {pt1:.1} <= p_{{T}}^{{gen}} < {pt2:.1} GeV/c^{{2}}",
                    n.label, region.detector
                ),
                x_title: "correction * E^{PF}/E^{true}".to_string(),
                y_title: "Entries".to_string(),
                series,
                x_range: Some(region.x_range),
                log_y: false,
                legend: LegendPosition::TopRight,
            };
            let stem = format!("slices_{}_{}", n.label, region_name(region));
            ctx.save_plot(render(&plot, ctx.plot_config()), &dir, &stem)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pfc_core::Detector;

    fn region() -> SliceRegion {
        SliceRegion {
            detector: Detector::Barrel,
            pt: (1.0, 10.0),
            abs_eta: (0.0, 1.479),
            rebin: 4,
            x_range: (0.6, 1.5),
        }
    }

    #[test]
    fn names_of_regions() {
        assert_eq!(region_name(&region()), "EB_pT_1.0_10.0");
        assert_eq!(entry_key(&region(), ""), "EB_pT_1.0_10.0_uncorrected");
        assert_eq!(entry_key(&region(), "mva_mean_a"), "EB_pT_1.0_10.0_mva_mean_a");
    }

    #[test]
    fn region_bounds_are_half_open() {
        let r = region();
        assert!(in_region(&r, 1.0, -0.5));
        assert!(!in_region(&r, 10.0, 0.5));
        assert!(!in_region(&r, 5.0, 1.479));
    }

    #[test]
    fn response_is_normalised_to_all_entries() {
        // odd entries are the test events
        let table = EventTable::from_columns([
            ("pfE", vec![9.0, 9.0, 9.0, 8.0, 9.0, 5.0, 9.0, 9.0]),
            ("mcE", vec![10.0; 8]),
            ("mcPt", vec![2.0, 2.0, 2.0, 3.0, 2.0, 50.0, 2.0, 2.0]),
            ("pfEta", vec![0.1, 0.1, 0.1, 0.2, 0.1, 0.3, 0.1, 2.0]),
            ("mva_mean_a", vec![1.0, 1.1, 1.0, 1.25, 1.0, 2.0, 1.0, 1.0]),
        ])
        .unwrap();
        let test = table.test_rows();
        let r = region();
        let entries = vec![
            (entry_key(&r, ""), &r, String::new()),
            (entry_key(&r, "mva_mean_a"), &r, "mva_mean_a".to_string()),
        ];
        let out = fill(&test, table.len(), &SlicesConfig::default(), &entries).unwrap();
        let raw = &out["EB_pT_1.0_10.0_uncorrected"];
        assert_relative_eq!(raw.integral(), 0.25);
        let corr = &out["EB_pT_1.0_10.0_mva_mean_a"];
        // both corrected values land at 0.99 and 1.0
        assert_relative_eq!(corr.mean(), 0.995, epsilon = 0.01);
    }
}
