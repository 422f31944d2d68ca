//! Distributions of the regression inputs and of the generated photons.

use std::collections::BTreeMap;

use anyhow::Result;
use pfc_core::Detector;
use pfc_ntuple::{CompiledExpr, EventTable, InputNtuple};
use pfc_plot::color::root;
use pfc_plot::layout::legend::LegendPosition;
use pfc_plot::plots::hist::{HistPlot, HistSeries, render};
use pfc_plot::Color;
use pfc_stats::Histogram1D;

use crate::config::Range;
use crate::context::RunContext;

const COLORS: [i32; 6] =
    [root::BLACK, root::BLUE, root::RED, root::ORANGE, root::GREEN, root::DARK_GREEN];

const Y_TITLE: &str = "Entries/nPhotons";

/// One per-cluster distribution.
struct Distribution {
    cname: &'static str,
    expr: &'static str,
    nbins: usize,
    lo: f64,
    hi: f64,
    x_title: &'static str,
    endcap_only: bool,
}

const fn dist(
    cname: &'static str,
    expr: &'static str,
    (nbins, lo, hi): (usize, f64, f64),
    x_title: &'static str,
    endcap_only: bool,
) -> Distribution {
    Distribution { cname, expr, nbins, lo, hi, x_title, endcap_only }
}

static DISTRIBUTIONS: [Distribution; 13] = [
    dist("energy", "pfE", (250, 0.0, 1000.0), "Energy (GeV)", false),
    dist("eta", "pfEta", (150, -3.2, 3.2), "#eta", false),
    dist("phi", "pfPhi", (150, -3.4, 3.4), "#phi", false),
    dist("r13", "pfE1x3/pfE", (200, 0.4, 1.05), "E_{1x3}/E", false),
    dist("r22", "pfE2x2/pfE", (250, 0.7, 1.05), "E_{2x2}/E", false),
    dist("r25", "pfE2x5Max/pfE", (250, 0.8, 1.05), "E_{2x5,max}/E", false),
    dist("r33", "pfE3x3/pfE", (250, 0.8, 1.05), "E_{3x3}/E", false),
    dist("r55", "pfE5x5/pfE", (250, 0.9, 1.05), "E_{5x5}/E", false),
    dist("nVtx", "nVtx", (60, 0.0, 60.0), "nVtx", false),
    dist("ps1r", "ps1E/pfE", (250, 0.0, 0.3e-3), "E_{ps1}/E", true),
    dist("ps2r", "ps2E/pfE", (250, 0.0, 0.5e-3), "E_{ps2}/E", true),
    dist("ps1n", "ps1N", (50, 0.0, 50.0), "N_{ps1}", true),
    dist("ps2n", "ps2N", (50, 0.0, 50.0), "N_{ps2}", true),
];

const DELTA_R_PT_SLICES: [Range; 4] = [(0.0, 1.0), (1.0, 10.0), (10.0, 20.0), (20.0, 100.0)];
const RESPONSE_DR_SLICES: [Range; 5] =
    [(0.0, 0.005), (0.0, 0.01), (0.0, 0.02), (0.0, 0.03), (0.0, 0.1)];

fn distributions(det: Detector) -> impl Iterator<Item = &'static Distribution> {
    DISTRIBUTIONS.iter().filter(move |d| det.is_endcap() || !d.endcap_only)
}

/// Energy distributions are drawn up to 300 GeV in EB and 700 GeV in EE.
fn energy_xmax(det: Detector) -> f64 {
    if det.is_endcap() { 700.0 } else { 300.0 }
}

fn columns_of(exprs: &[CompiledExpr]) -> Vec<String> {
    let mut cols = vec!["pfEta".to_string()];
    for e in exprs {
        for c in e.required_columns() {
            if !cols.contains(c) {
                cols.push(c.clone());
            }
        }
    }
    cols
}

fn as_strs(cols: &[String]) -> Vec<&str> {
    cols.iter().map(String::as_str).collect()
}

/// Scale by the number of clusters in the whole ntuple.
fn normalized(mut h: Histogram1D, n_total: usize) -> Histogram1D {
    if n_total > 0 {
        h.scale(1.0 / n_total as f64);
    }
    h
}

fn compile_all(det: Detector) -> Result<Vec<CompiledExpr>> {
    let exprs = distributions(det).map(|d| CompiledExpr::compile(d.expr));
    Ok(exprs.collect::<pfc_core::Result<_>>()?)
}

fn fill_distributions(table: &EventTable, det: Detector) -> Result<Vec<Histogram1D>> {
    let exprs = compile_all(det)?;
    let eta = table.column("pfEta")?;
    let mut out = Vec::with_capacity(exprs.len());
    for (d, e) in distributions(det).zip(&exprs) {
        let values = e.eval_table(table)?;
        let mut h = Histogram1D::new(d.nbins, d.lo, d.hi)?;
        for (v, &eta) in values.iter().zip(eta) {
            if det.accepts(eta) {
                h.fill(*v);
            }
        }
        out.push(normalized(h, table.len()));
    }
    Ok(out)
}

/// Histograms of `value` in slices of `slice_var`, keyed like `slices`.
fn fill_sliced(
    table: &EventTable,
    det: Detector,
    slices: &[(String, Range)],
    (slice_var, value): (&str, &str),
    (nbins, lo, hi): (usize, f64, f64),
) -> Result<BTreeMap<String, Histogram1D>> {
    let eta = table.column("pfEta")?;
    let z = CompiledExpr::compile(slice_var)?.eval_table(table)?;
    let v = CompiledExpr::compile(value)?.eval_table(table)?;
    let mut out = BTreeMap::new();
    for (key, (z1, z2)) in slices {
        let mut h = Histogram1D::new(nbins, lo, hi)?;
        for i in 0..table.len() {
            if det.accepts(eta[i]) && *z1 <= z[i] && z[i] < *z2 {
                h.fill(v[i]);
            }
        }
        out.insert(key.clone(), normalized(h, table.len()));
    }
    Ok(out)
}

/// Generated photons: pT in EB and EE (full and zoomed), eta and phi.
fn fill_mc(table: &EventTable) -> Result<Vec<Histogram1D>> {
    let mut pt = [Histogram1D::new(110, 0.0, 110.0)?, Histogram1D::new(110, 0.0, 110.0)?];
    let mut zoom = [Histogram1D::new(60, 0.0, 3.0)?, Histogram1D::new(60, 0.0, 3.0)?];
    let mut eta_h = Histogram1D::new(250, -3.2, 3.2)?;
    let mut phi_h = Histogram1D::new(250, -3.4, 3.4)?;
    let mc_pt = table.column("mcPt")?;
    let (mc_eta, mc_phi) = (table.column("mcEta")?, table.column("mcPhi")?);
    for i in 0..table.len() {
        eta_h.fill(mc_eta[i]);
        phi_h.fill(mc_phi[i]);
        let k = usize::from(mc_eta[i].abs() >= pfc_core::BARREL_ETA_MAX);
        pt[k].fill(mc_pt[i]);
        zoom[k].fill(mc_pt[i]);
    }
    let [pt_eb, pt_ee] = pt;
    let [zoom_eb, zoom_ee] = zoom;
    Ok([pt_eb, pt_ee, eta_h, phi_h, zoom_eb, zoom_ee]
        .into_iter()
        .map(|h| normalized(h, table.len()))
        .collect())
}

fn pt_key((pt1, pt2): Range) -> String {
    format!("{pt1:.1}_{pt2:.1}")
}

fn dr_key((dr1, dr2): Range) -> String {
    format!("{dr1:.3}_{dr2:.3}")
}

fn keyed(slices: &[Range], key: fn(Range) -> String) -> Vec<(String, Range)> {
    slices.iter().map(|&s| (key(s), s)).collect()
}

struct Draw<'a> {
    name: String,
    title: String,
    x_title: &'a str,
    x_max: Option<f64>,
    top_legend: bool,
    log_y: bool,
}

fn draw(ctx: &RunContext, d: Draw<'_>, hists: Vec<Histogram1D>, labels: &[String]) -> Result<()> {
    let Some(first) = hists.first() else {
        return Ok(());
    };
    let x_range = Some((first.lo(), d.x_max.unwrap_or(first.hi())));
    let series = hists
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (hist, label))| HistSeries {
            hist,
            label: label.clone(),
            color: Color::root(COLORS[i % COLORS.len()]),
        })
        .collect();
    let plot = HistPlot {
        title: d.title,
        x_title: d.x_title.to_string(),
        y_title: Y_TITLE.to_string(),
        series,
        x_range,
        log_y: d.log_y,
        legend: if d.top_legend { LegendPosition::TopRight } else { LegendPosition::BottomLeft },
    };
    let stem = format!("distrib_{}", d.name);
    ctx.save_plot(render(&plot, ctx.plot_config()), &ctx.plot_dir("inputs"), &stem)?;
    Ok(())
}

/// `hists[i][k]` to `k`-th list over `i`.
fn transpose(hists: Vec<Vec<Histogram1D>>) -> Vec<Vec<Histogram1D>> {
    let n = hists.first().map_or(0, Vec::len);
    let mut out: Vec<Vec<Histogram1D>> = (0..n).map(|_| Vec::with_capacity(hists.len())).collect();
    for row in hists {
        for (k, h) in row.into_iter().enumerate() {
            out[k].push(h);
        }
    }
    out
}

fn distributions_of(ctx: &RunContext, n: &InputNtuple, det: Detector) -> Result<Vec<Histogram1D>> {
    let key = format!("draw_inputs_{}_{det}", n.name);
    ctx.cache.get_or_compute(&key, &ctx.fingerprint(n, false), || {
        let cols = columns_of(&compile_all(det)?);
        let table = ctx.load(n, &as_strs(&cols), &[])?;
        fill_distributions(&table, det)
    })
}

fn sliced_of(
    ctx: &RunContext,
    n: &InputNtuple,
    det: Detector,
    what: &str,
    slices: &[(String, Range)],
    vars: (&str, &str),
    binning: (usize, f64, f64),
) -> Result<Vec<Histogram1D>> {
    let key = format!("draw_inputs_{}_{what}_{det}", n.name);
    let wanted: Vec<String> = slices.iter().map(|(k, _)| k.clone()).collect();
    let map = ctx.cache.get_or_fill(&key, &ctx.fingerprint(n, false), &wanted, |missing| {
        let todo: Vec<(String, Range)> =
            slices.iter().filter(|(k, _)| missing.contains(k)).cloned().collect();
        let exprs = [CompiledExpr::compile(vars.0)?, CompiledExpr::compile(vars.1)?];
        let cols = columns_of(&exprs);
        let table = ctx.load(n, &as_strs(&cols), &[])?;
        fill_sliced(&table, det, &todo, vars, binning)
    })?;
    Ok(wanted.iter().filter_map(|k| map.get(k).cloned()).collect())
}

pub fn cmd_inputs(ctx: &RunContext) -> Result<()> {
    let inputs = ctx.inputs()?;
    let labels: Vec<String> = inputs.iter().map(|n| n.label.clone()).collect();

    for det in Detector::ALL {
        let _span = tracing::info_span!("inputs", %det).entered();
        let per_ntuple: Vec<Vec<Histogram1D>> =
            inputs.iter().map(|n| distributions_of(ctx, n, det)).collect::<Result<_>>()?;
        for (d, hists) in distributions(det).zip(transpose(per_ntuple)) {
            let figure = Draw {
                name: format!("{}_{det}", d.cname),
                title: det.to_string(),
                x_title: d.x_title,
                x_max: (d.cname == "energy").then(|| energy_xmax(det)),
                top_legend: d.endcap_only,
                log_y: false,
            };
            draw(ctx, figure, hists, &labels)?;
        }

        let slices = keyed(&DELTA_R_PT_SLICES, pt_key);
        let vars = ("mcPt", "pfPhoDeltaR");
        let per_ntuple: Vec<Vec<Histogram1D>> = inputs
            .iter()
            .map(|n| sliced_of(ctx, n, det, "deltaR", &slices, vars, (200, 0.0, 0.1)))
            .collect::<Result<_>>()?;
        for (&(pt1, pt2), hists) in DELTA_R_PT_SLICES.iter().zip(transpose(per_ntuple)) {
            let figure = Draw {
                name: format!("deltaR_{det}_pT_{pt1:.1}_{pt2:.1}"),
                title: format!("{det}, {pt1:.1} <= p_{{T}}^{{gen}} < {pt2:.1} GeV/c^{{2}}"),
                x_title: "#Delta R(MC photon, PFCluster)",
                x_max: None,
                top_legend: true,
                log_y: true,
            };
            draw(ctx, figure, hists, &labels)?;
        }

        let slices = keyed(&RESPONSE_DR_SLICES, dr_key);
        let vars = ("pfPhoDeltaR", "pfE/mcE");
        let per_ntuple: Vec<Vec<Histogram1D>> = inputs
            .iter()
            .map(|n| sliced_of(ctx, n, det, "pfEToMcE", &slices, vars, (200, 0.0, 1.5)))
            .collect::<Result<_>>()?;
        for (&(dr1, dr2), hists) in RESPONSE_DR_SLICES.iter().zip(transpose(per_ntuple)) {
            let figure = Draw {
                name: format!("pfEToMcE_{det}_dR_{dr1:.3}_{dr2:.3}"),
                title: format!("{det}, {dr1:.3} <= #Delta R < {dr2:.3}"),
                x_title: "E^{PF}/E^{gen}",
                x_max: None,
                top_legend: true,
                log_y: true,
            };
            draw(ctx, figure, hists, &labels)?;
        }
    }

    let per_ntuple: Vec<Vec<Histogram1D>> = inputs
        .iter()
        .map(|n| {
            let key = format!("draw_inputs_{}_mc", n.name);
            ctx.cache.get_or_compute(&key, &ctx.fingerprint(n, false), || {
                fill_mc(&ctx.load(n, &["mcPt", "mcEta", "mcPhi"], &[])?)
            })
        })
        .collect::<Result<_>>()?;
    let mut mc = transpose(per_ntuple).into_iter();
    let (Some(pt_eb), Some(pt_ee), Some(eta), Some(phi), Some(zoom_eb), Some(zoom_ee)) =
        (mc.next(), mc.next(), mc.next(), mc.next(), mc.next(), mc.next())
    else {
        anyhow::bail!("incomplete MC truth histograms");
    };

    let mut labels_mc: Vec<String> = labels.iter().map(|l| format!("{l}, EB")).collect();
    labels_mc.extend(labels.iter().map(|l| format!("{l}, EE")));
    let truth = |name: &str, x_title, top_legend| Draw {
        name: name.to_string(),
        title: "MC truth".to_string(),
        x_title,
        x_max: None,
        top_legend,
        log_y: false,
    };
    let pt_title = "p_{T}^{gen} (GeV/c^{2})";
    draw(ctx, truth("mcPt", pt_title, false), [pt_eb, pt_ee].concat(), &labels_mc)?;
    draw(ctx, truth("mcPtZoom", pt_title, true), [zoom_eb, zoom_ee].concat(), &labels_mc)?;
    draw(ctx, truth("mcEta", "#eta^{gen}", false), eta, &labels)?;
    draw(ctx, truth("mcPhi", "#phi^{gen}", false), phi, &labels)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> EventTable {
        EventTable::from_columns([
            ("pfE", vec![10.0, 20.0, 30.0, 40.0]),
            ("pfEta", vec![0.5, 1.479, 2.0, -2.5]),
            ("pfPhi", vec![0.0, 0.1, 0.2, 0.3]),
            ("pfE1x3", vec![8.0, 16.0, 24.0, 32.0]),
            ("pfE2x2", vec![9.0, 18.0, 27.0, 36.0]),
            ("pfE2x5Max", vec![9.0, 18.0, 27.0, 36.0]),
            ("pfE3x3", vec![9.0, 18.0, 27.0, 36.0]),
            ("pfE5x5", vec![9.5, 19.0, 28.5, 38.0]),
            ("nVtx", vec![1.0, 2.0, 3.0, 4.0]),
            ("ps1E", vec![0.0, 0.0, 0.001, 0.002]),
            ("ps2E", vec![0.0, 0.0, 0.001, 0.002]),
            ("ps1N", vec![0.0, 0.0, 2.0, 3.0]),
            ("ps2N", vec![0.0, 0.0, 2.0, 3.0]),
            ("mcPt", vec![0.5, 5.0, 15.0, 50.0]),
            ("mcE", vec![10.0, 20.0, 30.0, 40.0]),
            ("pfPhoDeltaR", vec![0.001, 0.004, 0.02, 0.05]),
        ])
        .unwrap()
    }

    #[test]
    fn endcap_adds_preshower() {
        assert_eq!(distributions(Detector::Barrel).count(), 9);
        assert_eq!(distributions(Detector::Endcap).count(), 13);
    }

    #[test]
    fn distributions_normalised_by_all_clusters() {
        let t = table();
        let eb = fill_distributions(&t, Detector::Barrel).unwrap();
        // boundary cluster belongs to both partitions
        assert_relative_eq!(eb[0].integral(), 0.5);
        let ee = fill_distributions(&t, Detector::Endcap).unwrap();
        assert_relative_eq!(ee[0].integral(), 0.75);
        assert_eq!(ee.len(), 13);
    }

    #[test]
    fn delta_r_slices_by_truth_pt() {
        let t = table();
        let slices = keyed(&DELTA_R_PT_SLICES, pt_key);
        let m = fill_sliced(&t, Detector::Endcap, &slices, ("mcPt", "pfPhoDeltaR"), (200, 0.0, 0.1))
            .unwrap();
        assert_relative_eq!(m["10.0_20.0"].integral(), 0.25);
        assert_relative_eq!(m["20.0_100.0"].integral(), 0.25);
        assert_relative_eq!(m["0.0_1.0"].integral(), 0.0);
        assert_eq!(dr_key((0.0, 0.005)), "0.000_0.005");
    }

    #[test]
    fn mc_split_on_true_eta() {
        let t = EventTable::from_columns([
            ("mcPt", vec![1.0, 2.0, 3.0]),
            ("mcEta", vec![0.1, 1.6, -2.0]),
            ("mcPhi", vec![0.0, 0.0, 0.0]),
        ])
        .unwrap();
        let h = fill_mc(&t).unwrap();
        assert_eq!(h.len(), 6);
        assert_relative_eq!(h[0].integral(), 1.0 / 3.0);
        assert_relative_eq!(h[1].integral(), 2.0 / 3.0);
        assert_relative_eq!(h[2].integral(), 1.0);
    }
}
