//! Response and resolution before and after correction, in blocks of true
//! energy, pT, eta and number of vertices.

use anyhow::{Context, Result};
use pfc_core::Detector;
use pfc_ntuple::{EventTable, InputNtuple};
use pfc_stats::{GraphErrors, SliceMode, SliceResult, fit_slices};
use serde::{Deserialize, Serialize};

use crate::config::Range;
use crate::context::RunContext;
use crate::eval::training_names;
use crate::figures::{
    GraphGroups, MEAN_TITLE, Overlay, RESULTS_PALETTE, SIGMA_TITLE, combine, combine_ratio,
    fit_pages,
};

/// Fitted graphs of one ntuple, detector and correction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultGraphs {
    pub mean_e: GraphErrors,
    pub sigma_e: GraphErrors,
    pub mean_pt: GraphErrors,
    pub sigma_pt: GraphErrors,
    /// One graph per true-energy slice
    pub mean_eta: Vec<GraphErrors>,
    pub sigma_eta: Vec<GraphErrors>,
    pub mean_nvtx: Vec<GraphErrors>,
    pub sigma_nvtx: Vec<GraphErrors>,
}

/// Cache key; `branch` is empty for the uncorrected response.
pub fn cache_key(ntuple: &str, det: Detector, branch: &str, block_size: usize) -> String {
    format!("draw_results_{ntuple}_{det}_{branch}_{block_size}")
}

/// `lo-hi` with integral bounds printed without decimals.
pub fn range_tag((lo, hi): Range) -> String {
    format!("{lo}-{hi}")
}

struct Samples {
    mc_e: Vec<f64>,
    mc_pt: Vec<f64>,
    mc_eta: Vec<f64>,
    nvtx: Vec<f64>,
    resol: Vec<f64>,
    in_detector: Vec<bool>,
}

impl Samples {
    /// Test events with `pfE/mcE` times the correction in `branch`.
    fn from_table(table: &EventTable, det: Detector, branch: &str) -> Result<Self> {
        let test = table.test_rows();
        let pf_e = test.column("pfE")?;
        let mc_e = test.column("mcE")?;
        let resol: Vec<f64> = if branch.is_empty() {
            pf_e.iter().zip(mc_e).map(|(p, m)| p / m).collect()
        } else {
            let corr = test.column(branch)?;
            pf_e.iter().zip(mc_e).zip(corr).map(|((p, m), c)| p / m * c).collect()
        };
        let in_detector = test.column("pfEta")?.iter().map(|&eta| det.accepts(eta)).collect();
        Ok(Self {
            mc_e: mc_e.to_vec(),
            mc_pt: test.column("mcPt")?.to_vec(),
            mc_eta: test.column("mcEta")?.to_vec(),
            nvtx: test.column("nVtx")?.to_vec(),
            resol,
            in_detector,
        })
    }

    /// `(x, resol)` of the events passing `keep`.
    fn select(&self, x: &[f64], keep: impl Fn(usize) -> bool) -> (Vec<f64>, Vec<f64>) {
        (0..x.len()).filter(|&i| keep(i)).map(|i| (x[i], self.resol[i])).unzip()
    }

    fn in_slice(&self, i: usize, (lo, hi): Range) -> bool {
        self.mc_e[i] >= lo && self.mc_e[i] < hi
    }
}

const RESULTS_COLUMNS: [&str; 6] = ["mcE", "mcPt", "mcEta", "nVtx", "pfE", "pfEta"];

fn fit_one(
    ctx: &RunContext,
    (x, y): (Vec<f64>, Vec<f64>),
    title: &str,
    x_title: &str,
) -> Result<SliceResult> {
    let cfg = &ctx.config.results;
    let result = fit_slices(&x, &y, cfg.block_size, SliceMode::Resolution, x_title)
        .with_context(|| format!("fitting {title}"))?;
    tracing::debug!(title, points = result.mean.len(), blocks = result.blocks.len(), "sliced");
    fit_pages(ctx, &ctx.plot_dir("results").join("fits"), title, x_title, &result.blocks)?;
    Ok(result)
}

fn compute(
    ctx: &RunContext,
    ntuple: &InputNtuple,
    det: Detector,
    branch: &str,
) -> Result<ResultGraphs> {
    let friend: Vec<String> = if branch.is_empty() { vec![] } else { vec![branch.to_string()] };
    let table = ctx.load(ntuple, &RESULTS_COLUMNS, &friend)?;
    let s = Samples::from_table(&table, det, branch)?;
    let name = &ntuple.name;
    let mut out = ResultGraphs::default();

    let title = format!("mcE_{name}_{det}_{branch}");
    let r = fit_one(ctx, s.select(&s.mc_e, |i| s.in_detector[i]), &title, "E^{gen}")?;
    (out.mean_e, out.sigma_e) = (r.mean, r.sigma);

    let title = format!("mcPt_{name}_{det}_{branch}");
    let r = fit_one(ctx, s.select(&s.mc_pt, |i| s.in_detector[i]), &title, "p_{T}^{gen}")?;
    (out.mean_pt, out.sigma_pt) = (r.mean, r.sigma);

    for &slice in &ctx.config.results.e_slices {
        let tag = range_tag(slice);
        // eta graphs span both partitions
        let title = format!("mcEta_{name}_{det}_{branch}_pT{tag}");
        let data = s.select(&s.mc_eta, |i| s.in_slice(i, slice));
        let r = fit_one(ctx, data, &title, "#eta^{gen}")?;
        out.mean_eta.push(r.mean);
        out.sigma_eta.push(r.sigma);

        let title = format!("nVtx_{name}_{det}_{branch}_pT{tag}");
        let keep = |i| s.in_detector[i] && s.in_slice(i, slice);
        let r = fit_one(ctx, s.select(&s.nvtx, keep), &title, "nVtx")?;
        out.mean_nvtx.push(r.mean);
        out.sigma_nvtx.push(r.sigma);
    }
    Ok(out)
}

/// Cached graphs of one ntuple, detector and correction branch.
pub fn make_graphs(
    ctx: &RunContext,
    ntuple: &InputNtuple,
    det: Detector,
    branch: &str,
) -> Result<ResultGraphs> {
    let _span = tracing::info_span!("results", ntuple = %ntuple.name, %det, branch).entered();
    let key = cache_key(&ntuple.name, det, branch, ctx.config.results.block_size);
    let fp = ctx.fingerprint(ntuple, !branch.is_empty());
    ctx.cache.get_or_compute(&key, &fp, || compute(ctx, ntuple, det, branch))
}

/// Graphs of every ntuple, uncorrected first, in the overlay order.
struct Collected {
    all: Vec<ResultGraphs>,
    labels: Vec<String>,
    group: usize,
}

impl Collected {
    fn groups(
        &self,
        pick: impl Fn(&ResultGraphs) -> &GraphErrors,
        skip_no_pileup: bool,
    ) -> GraphGroups {
        GraphGroups {
            graphs: self.all.iter().map(|r| pick(r).clone()).collect(),
            labels: self.labels.clone(),
            group: self.group,
            palette: RESULTS_PALETTE,
            skip_no_pileup,
        }
    }
}

pub fn cmd_results(ctx: &RunContext) -> Result<()> {
    let inputs = ctx.inputs()?;
    let trainings = training_names(ctx.output_dir())?;
    if trainings.is_empty() {
        anyhow::bail!(
            "no trainings in {} (run `pfcalib train` first)",
            ctx.output_dir().display()
        );
    }
    let dir = ctx.plot_dir("results");
    let zoom = Some(ctx.config.results.zoom_xmax);

    let mut labels: Vec<String> =
        inputs.iter().map(|n| format!("{}, no correction", n.label)).collect();
    labels.extend(inputs.iter().map(|n| n.label.clone()));

    for det in Detector::ALL {
        let uncorrected: Vec<ResultGraphs> =
            inputs.iter().map(|n| make_graphs(ctx, n, det, "")).collect::<Result<_>>()?;

        for training in &trainings {
            let branch = pfc_mva::mean_column(training);
            let mut all = uncorrected.clone();
            for n in &inputs {
                all.push(make_graphs(ctx, n, det, &branch)?);
            }
            let c = Collected { all, labels: labels.clone(), group: inputs.len() };
            let caption = det.as_str();

            let by_energy = [
                ("e", "E^{gen}", c.groups(|r| &r.mean_e, false), c.groups(|r| &r.sigma_e, false)),
                (
                    "pt",
                    "p_{T}^{gen}",
                    c.groups(|r| &r.mean_pt, false),
                    c.groups(|r| &r.sigma_pt, false),
                ),
            ];
            for (var, x_title, mean, sigma) in by_energy {
                for (suffix, x_max) in [("", None), ("_zoom", zoom)] {
                    let name = format!("mean_vs_{var}_{branch}_{det}{suffix}");
                    let o = Overlay {
                        name: &name,
                        caption,
                        x_title,
                        y_title: MEAN_TITLE,
                        x_max,
                        clamp_x_at_zero: false,
                    };
                    combine(ctx, &dir, &o, &mean)?;

                    let name = format!("sigma_vs_{var}_{branch}_{det}{suffix}");
                    let o = Overlay { name: &name, y_title: SIGMA_TITLE, ..o };
                    combine_ratio(ctx, &dir, &o, &sigma)?;
                }
            }

            for (k, &slice) in ctx.config.results.e_slices.iter().enumerate() {
                let tag = range_tag(slice);
                // eta graphs do not depend on the partition
                if det == Detector::Barrel {
                    let caption = format!("{} < p_{{T}} < {} GeV/c", slice.0, slice.1);
                    let name = format!("mean_vs_eta_{branch}_pT{tag}");
                    let o = Overlay {
                        name: &name,
                        caption: &caption,
                        x_title: "#eta^{gen}",
                        y_title: MEAN_TITLE,
                        x_max: None,
                        clamp_x_at_zero: false,
                    };
                    combine(ctx, &dir, &o, &c.groups(|r| &r.mean_eta[k], false))?;

                    let name = format!("sigma_vs_eta_{branch}_pT{tag}");
                    let o = Overlay { name: &name, y_title: SIGMA_TITLE, ..o };
                    combine_ratio(ctx, &dir, &o, &c.groups(|r| &r.sigma_eta[k], false))?;
                }

                // samples without pileup have no spread in nVtx
                let name = format!("mean_vs_nvtx_{branch}_{det}_pT{tag}");
                let o = Overlay {
                    name: &name,
                    caption,
                    x_title: "nVtx",
                    y_title: MEAN_TITLE,
                    x_max: None,
                    clamp_x_at_zero: false,
                };
                combine(ctx, &dir, &o, &c.groups(|r| &r.mean_nvtx[k], true))?;

                let name = format!("sigma_vs_nvtx_{branch}_{det}_pT{tag}");
                let o = Overlay { name: &name, y_title: SIGMA_TITLE, ..o };
                combine_ratio(ctx, &dir, &o, &c.groups(|r| &r.sigma_nvtx[k], true))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_follow_analysis_parameters() {
        assert_eq!(
            cache_key("gun_pu", Detector::Barrel, "", 10000),
            "draw_results_gun_pu_EB__10000"
        );
        assert_eq!(
            cache_key("gun_pu", Detector::Endcap, "mva_mean_gun_pu", 500),
            "draw_results_gun_pu_EE_mva_mean_gun_pu_500"
        );
    }

    #[test]
    fn range_tags_print_integers_plainly() {
        assert_eq!(range_tag((0.0, 1.0)), "0-1");
        assert_eq!(range_tag((10.0, 100.0)), "10-100");
        assert_eq!(range_tag((0.5, 1.0)), "0.5-1");
    }

    #[test]
    fn samples_apply_correction_to_test_events() {
        let table = EventTable::from_columns([
            ("mcE", vec![10.0, 10.0, 20.0, 20.0]),
            ("mcPt", vec![1.0, 1.0, 2.0, 2.0]),
            ("mcEta", vec![0.1, 0.2, 2.0, 2.1]),
            ("nVtx", vec![10.0, 20.0, 30.0, 40.0]),
            ("pfE", vec![9.0, 8.0, 18.0, 16.0]),
            ("pfEta", vec![0.1, 0.2, 2.0, 2.1]),
            ("mva_mean_t", vec![1.0, 1.25, 1.0, 1.25]),
        ])
        .unwrap();
        let s = Samples::from_table(&table, Detector::Barrel, "mva_mean_t").unwrap();
        assert_eq!(s.resol.len(), 2);
        approx::assert_relative_eq!(s.resol[0], 1.0);
        approx::assert_relative_eq!(s.resol[1], 1.0);
        assert_eq!(s.in_detector, [true, false]);

        let (x, y) = s.select(&s.mc_e, |i| s.in_detector[i]);
        assert_eq!(x, [10.0]);
        assert_eq!(y.len(), 1);
        assert!(s.in_slice(1, (10.0, 100.0)));
    }
}
