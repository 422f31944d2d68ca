//! Run configuration (`--config`, YAML or JSON)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pfc_core::Detector;
use pfc_mva::TrainConfig;
use pfc_plot::PlotConfig;
use serde::Deserialize;

/// Everything a run can be tuned with. Missing keys take the defaults of the
/// calibration study.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Tree name inside ROOT ntuples
    pub tree: String,
    /// Worker threads, 0 = rayon default
    pub threads: usize,
    pub plot: PlotConfig,
    pub train: TrainConfig,
    pub results: ResultsConfig,
    pub slices: SlicesConfig,
    pub mva_pars: MvaParsConfig,
    pub fit_params: FitParamsConfig,
    pub compare: CompareConfig,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            tree: pfc_core::DEFAULT_TREE.to_string(),
            threads: 0,
            plot: PlotConfig::default(),
            train: TrainConfig::default(),
            results: ResultsConfig::default(),
            slices: SlicesConfig::default(),
            mva_pars: MvaParsConfig::default(),
            fit_params: FitParamsConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

/// A half-open `[lo, hi)` range of a slicing variable.
pub type Range = (f64, f64);

fn default_slices() -> Vec<Range> {
    vec![(0.0, 1.0), (1.0, 10.0), (10.0, 100.0)]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub block_size: usize,
    /// Ranges of true energy for the eta and nVtx graphs
    pub e_slices: Vec<Range>,
    /// Upper x limit of the `_zoom` plots
    pub zoom_xmax: f64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self { block_size: 10_000, e_slices: default_slices(), zoom_xmax: 20.0 }
    }
}

/// One truth-pT x reco-|eta| region of the `slices` analysis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SliceRegion {
    pub detector: Detector,
    pub pt: Range,
    pub abs_eta: Range,
    /// Bins merged before drawing
    pub rebin: usize,
    pub x_range: Range,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlicesConfig {
    pub nbins: usize,
    pub range: Range,
    pub regions: Vec<SliceRegion>,
}

impl Default for SlicesConfig {
    fn default() -> Self {
        let pts = [(0.3, 0.6), (0.6, 1.0), (1.0, 10.0), (10.0, 100.0)];
        let eb = [(10, (0.0, 2.0)), (10, (0.0, 2.0)), (4, (0.6, 1.5)), (1, (0.85, 1.2))];
        let ee = [(25, (0.0, 2.0)), (20, (0.0, 2.0)), (4, (0.6, 1.4)), (1, (0.75, 1.3))];

        let mut regions = Vec::with_capacity(8);
        for (detector, abs_eta, styles) in [
            (Detector::Barrel, (0.0, pfc_core::BARREL_ETA_MAX), eb),
            (Detector::Endcap, (pfc_core::BARREL_ETA_MAX, 5.0), ee),
        ] {
            for (&pt, (rebin, x_range)) in pts.iter().zip(styles) {
                regions.push(SliceRegion { detector, pt, abs_eta, rebin, x_range });
            }
        }
        Self { nbins: 1000, range: (0.0, 2.0), regions }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MvaParsConfig {
    pub block_size: usize,
    pub pt_slices: Vec<Range>,
}

impl Default for MvaParsConfig {
    fn default() -> Self {
        Self { block_size: 10_000, pt_slices: default_slices() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitParamsConfig {
    pub block_size: usize,
}

impl Default for FitParamsConfig {
    fn default() -> Self {
        Self { block_size: 20_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Block size the compared `results` caches were produced with
    pub block_size: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self { block_size: ResultsConfig::default().block_size }
    }
}

/// Read a config file: JSON when the extension says so, YAML otherwise.
pub fn read_config(path: &Path) -> Result<CalibConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let config = if is_json {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse JSON config {}", path.display()))?
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .with_context(|| format!("failed to parse YAML config {}", path.display()))?
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_study() {
        let c = CalibConfig::default();
        assert_eq!(c.tree, "ntuplizer/PFClusterTree");
        assert_eq!(c.results.block_size, 10_000);
        assert_eq!(c.fit_params.block_size, 20_000);
        assert_eq!(c.slices.regions.len(), 8);
        assert_eq!(c.slices.regions[4].detector, Detector::Endcap);
        assert_eq!(c.slices.regions[4].rebin, 25);
        assert_eq!(c.slices.regions[7].x_range, (0.75, 1.3));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml =
            "output_dir: out\nresults:\n  block_size: 500\nplot:\n  output:\n    format: svg\n";
        let c: CalibConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(c.output_dir, PathBuf::from("out"));
        assert_eq!(c.results.block_size, 500);
        assert_eq!(c.results.e_slices.len(), 3);
        assert_eq!(c.mva_pars.block_size, 10_000);
    }

    #[test]
    fn json_by_extension() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir()
            .join(format!("pfcalib_cfg_{}_{}.json", std::process::id(), nanos));
        std::fs::write(&path, r#"{"threads": 3, "train": {"max_trees": 5}}"#).unwrap();
        let c = read_config(&path).unwrap();
        assert_eq!(c.threads, 3);
        assert_eq!(c.train.max_trees, 5);
        let _ = std::fs::remove_file(&path);
    }
}
