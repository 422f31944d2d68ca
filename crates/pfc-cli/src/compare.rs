//! Side-by-side validation of two calibration versions from their cached
//! `results` graphs.

use std::path::Path;

use anyhow::{Context, Result};
use pfc_core::Detector;
use pfc_plot::color::root;
use pfc_stats::GraphErrors;

use crate::cache::Cache;
use crate::context::RunContext;
use crate::figures::{GraphGroups, MEAN_TITLE, Overlay, SIGMA_TITLE, combine, combine_ratio};
use crate::results::{ResultGraphs, cache_key, range_tag};

/// Colours of the first and second calibration.
const COMPARE_PALETTE: &[i32] = &[root::BLACK, root::RED, root::DARK_GREEN];

struct Version<'a> {
    name: &'a str,
    cache: Cache,
}

impl Version<'_> {
    fn graphs(
        &self,
        ntuple: &str,
        det: Detector,
        branch: &str,
        block_size: usize,
    ) -> Result<ResultGraphs> {
        self.cache.load_foreign(&cache_key(ntuple, det, branch, block_size)).with_context(|| {
            format!("results of '{}' not cached (run `pfcalib results` there)", self.name)
        })
    }
}

/// `<base>/output_<name>`
pub fn version_dir(base: &Path, name: &str) -> std::path::PathBuf {
    base.join(format!("output_{name}"))
}

fn groups(
    results: &[ResultGraphs],
    labels: &[String],
    pick: impl Fn(&ResultGraphs) -> &GraphErrors,
) -> GraphGroups {
    GraphGroups {
        graphs: results.iter().map(|g| pick(g).clone()).collect(),
        labels: labels.to_vec(),
        group: 1,
        palette: COMPARE_PALETTE,
        skip_no_pileup: false,
    }
}

pub fn cmd_compare(ctx: &RunContext, first: &str, second: &str, base: &Path) -> Result<()> {
    let versions = [first, second].map(|name| Version {
        name,
        cache: Cache::new(version_dir(base, name).join("cache"), false),
    });
    let block_size = ctx.config.compare.block_size;
    let e_slices = &ctx.config.results.e_slices;
    let inputs = ctx.inputs()?;
    let dir = ctx.output_dir().join(format!("plots_comparison_{first}_{second}"));

    for det in Detector::ALL {
        for mva in &inputs {
            let branch = pfc_mva::mean_column(&mva.name);
            for ntuple in &inputs {
                let _span =
                    tracing::info_span!("compare", %det, mva = %mva.name, ntuple = %ntuple.name)
                        .entered();
                let r = [
                    versions[0].graphs(&ntuple.name, det, "", block_size)?,
                    versions[0].graphs(&ntuple.name, det, &branch, block_size)?,
                    versions[1].graphs(&ntuple.name, det, &branch, block_size)?,
                ];
                for g in &r {
                    if g.mean_eta.len() != e_slices.len() {
                        anyhow::bail!(
                            "cached results of {} have {} energy slices, configured {}",
                            ntuple.name,
                            g.mean_eta.len(),
                            e_slices.len()
                        );
                    }
                }

                let label = &ntuple.label;
                let labels = vec![
                    format!("{label}, no correction"),
                    format!("{label}, {first}"),
                    format!("{label}, {second}"),
                ];
                let caption = format!("trained on {}, {det}", mva.label);

                let by_energy = [
                    (
                        "e",
                        "E^{gen}",
                        groups(&r, &labels, |g| &g.mean_e),
                        groups(&r, &labels, |g| &g.sigma_e),
                    ),
                    (
                        "pt",
                        "p_{T}^{gen}",
                        groups(&r, &labels, |g| &g.mean_pt),
                        groups(&r, &labels, |g| &g.sigma_pt),
                    ),
                ];
                let zoom = Some(ctx.config.results.zoom_xmax);
                for (var, x_title, mean, sigma) in by_energy {
                    for (suffix, x_max) in [("", None), ("_zoom", zoom)] {
                        let name = format!("mean_vs_{var}_{}_{label}_{det}{suffix}", mva.name);
                        let o = Overlay {
                            name: &name,
                            caption: &caption,
                            x_title,
                            y_title: MEAN_TITLE,
                            x_max,
                            clamp_x_at_zero: true,
                        };
                        combine(ctx, &dir, &o, &mean)?;

                        let name = format!("sigma_vs_{var}_{}_{label}_{det}{suffix}", mva.name);
                        let o = Overlay { name: &name, y_title: SIGMA_TITLE, ..o };
                        combine_ratio(ctx, &dir, &o, &sigma)?;
                    }
                }

                if det != Detector::Barrel {
                    continue;
                }
                for (k, &slice) in e_slices.iter().enumerate() {
                    let caption = format!(
                        "trained on {}, {} < E^{{gen}} < {} GeV/c",
                        mva.label,
                        slice.0,
                        slice.1
                    );
                    let tag = range_tag(slice);
                    let name = format!("mean_vs_eta_{}_{label}_E{tag}", mva.name);
                    let o = Overlay {
                        name: &name,
                        caption: &caption,
                        x_title: "#eta^{gen}",
                        y_title: MEAN_TITLE,
                        x_max: None,
                        clamp_x_at_zero: true,
                    };
                    combine(ctx, &dir, &o, &groups(&r, &labels, |g| &g.mean_eta[k]))?;

                    let name = format!("sigma_vs_eta_{}_{label}_E{tag}", mva.name);
                    let o = Overlay { name: &name, y_title: SIGMA_TITLE, ..o };
                    combine_ratio(ctx, &dir, &o, &groups(&r, &labels, |g| &g.sigma_eta[k]))?;
                }
            }
        }
    }
    println!("{}", dir.display());
    Ok(())
}
