use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use pfc_ntuple::EventTable;
use pfc_ntuple::parquet_io::write_ntuple_parquet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pfcalib"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("pfcalib_cli_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
    }
}

fn assert_ok(out: &Output, what: &str) {
    assert!(
        out.status.success(),
        "{what} failed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
}

const INT_COLUMNS: [&str; 6] = ["pfIEtaIX", "pfIPhiIY", "pfSize5x5_ZS", "ps1N", "ps2N", "nVtx"];

/// Single photons with a 90% response, spread over both partitions, every
/// cluster size class and pT window.
fn write_ntuple(path: &Path, n: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let response = Normal::new(0.9, 0.05).unwrap();
    let sizes = [1.0, 2.0, 3.0, 4.0, 7.0];

    let mut cols: Vec<(&str, Vec<f64>)> =
        pfc_ntuple::NTUPLE_COLUMNS.iter().map(|&c| (c, Vec::with_capacity(n))).collect();
    for i in 0..n {
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let eta: f64 =
            sign * if i % 4 < 2 { rng.gen_range(0.0..1.4) } else { rng.gen_range(1.6..2.8) };
        let phi: f64 = rng.gen_range(-3.1..3.1);
        let pf_pt: f64 = rng.gen_range(0.5..40.0);
        let pf_e = pf_pt * eta.cosh();
        let r: f64 = response.sample(&mut rng);
        let r = r.clamp(0.6, 1.2);
        let size = sizes[rng.gen_range(0..sizes.len())];
        let ps = if eta.abs() > 1.479 { 1.0 } else { 0.0 };
        let row = [
            ("mcE", pf_e / r),
            ("mcPt", pf_pt / r),
            ("mcEta", eta + rng.gen_range(-0.01..0.01)),
            ("mcPhi", phi + rng.gen_range(-0.01..0.01)),
            ("pfE", pf_e),
            ("pfPt", pf_pt),
            ("pfEta", eta),
            ("pfPhi", phi),
            ("pfIEtaIX", (eta * 50.0).round()),
            ("pfIPhiIY", (phi * 57.0).round()),
            ("pfSize5x5_ZS", size),
            ("pfE1x3", pf_e * rng.gen_range(0.6..1.0)),
            ("pfE2x2", pf_e * rng.gen_range(0.8..1.0)),
            ("pfE2x5Max", pf_e * rng.gen_range(0.85..1.0)),
            ("pfE3x3", pf_e * rng.gen_range(0.9..1.0)),
            ("pfE5x5", pf_e * rng.gen_range(0.95..1.0)),
            ("ps1E", ps * pf_e * rng.gen_range(0.0..1e-4)),
            ("ps2E", ps * pf_e * rng.gen_range(0.0..2e-4)),
            ("ps1N", ps * f64::from(rng.gen_range(0..10u32))),
            ("ps2N", ps * f64::from(rng.gen_range(0..10u32))),
            ("nVtx", f64::from(rng.gen_range(0..40u32))),
            ("pfPhoDeltaR", rng.gen_range(0.0..0.02)),
        ];
        for ((name, col), (row_name, v)) in cols.iter_mut().zip(row) {
            assert_eq!(*name, row_name);
            col.push(v);
        }
    }
    let table = EventTable::from_columns(cols).unwrap();
    write_ntuple_parquet(path, &table, &INT_COLUMNS).unwrap();
}

const CONFIG: &str = "\
train:
  max_trees: 3
  min_weight: 20
  n_cuts: 8
results:
  block_size: 150
mva_pars:
  block_size: 150
fit_params:
  block_size: 300
compare:
  block_size: 150
";

struct Workspace {
    root: PathBuf,
    input: PathBuf,
    output: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let root = tmp_dir(name);
        let input = root.join("input");
        std::fs::create_dir_all(&input).unwrap();
        write_ntuple(&input.join("photon_gun_pu.parquet"), 4000, 7);
        let config = root.join("config.yaml");
        std::fs::write(&config, CONFIG).unwrap();
        Self { output: root.join("output"), root, input, config }
    }

    fn run(&self, cmd: &[&str]) -> Output {
        let mut args = vec![
            "--config",
            self.config.to_str().unwrap(),
            "--input-dir",
            self.input.to_str().unwrap(),
            "--output-dir",
            self.output.to_str().unwrap(),
        ];
        args.extend_from_slice(cmd);
        run(&args)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

#[test]
fn version_prints_name() {
    let out = run(&["version"]);
    assert_ok(&out, "version");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("pfcalib "), "stdout={stdout}");
}

#[test]
fn empty_input_dir_is_an_error() {
    let root = tmp_dir("empty");
    std::fs::create_dir_all(&root).unwrap();
    let out = run(&["--input-dir", root.to_str().unwrap(), "inputs"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no *.root or *.parquet ntuples"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn results_need_trainings() {
    let ws = Workspace::new("no_train");
    let out = ws.run(&["results"]);
    assert!(!out.status.success());
}

#[test]
fn input_distributions_are_drawn_and_cached() {
    let ws = Workspace::new("inputs");
    assert_ok(&ws.run(&["inputs"]), "inputs");

    let plots = ws.output.join("plots_inputs");
    for name in ["distrib_energy_EB", "distrib_ps1r_EE", "distrib_mcPt", "distrib_mcPhi"] {
        assert!(plots.join(format!("{name}.svg")).exists(), "missing {name}");
    }
    assert!(!plots.join("distrib_ps1r_EB.svg").exists());
    assert!(plots.join("distrib_deltaR_EB_pT_1.0_10.0.svg").exists());
    assert!(plots.join("distrib_pfEToMcE_EE_dR_0.000_0.030.svg").exists());

    let cached = ws.output.join("cache/draw_inputs_photon_gun_pu_EB.json");
    assert!(cached.exists());
    let envelope: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&cached).unwrap()).unwrap();
    assert_eq!(envelope["schema_version"], 1);

    // served from the cache the second time
    assert_ok(&ws.run(&["inputs"]), "inputs (cached)");
}

#[test]
fn pfsize_and_fit_params_run_without_training() {
    let ws = Workspace::new("pfsize");
    assert_ok(&ws.run(&["pfsize"]), "pfsize");
    assert!(ws.output.join("plots_pfsize/pfsize_pu_EB.svg").exists());
    assert!(ws.output.join("plots_pfsize/pfsize_pu_EE.svg").exists());

    assert_ok(&ws.run(&["fit-params", "--pf-size", "-2"]), "fit-params");
    assert!(ws.output.join("cache/draw_fit_params_photon_gun_pu_EB_300_m2.json").exists());
    assert!(ws.output.join("plots_fit_params/fit_distr_alphaR_EE.svg").exists());
}

#[test]
fn train_eval_and_validate() {
    let ws = Workspace::new("pipeline");

    let out = ws.run(&["train"]);
    assert_ok(&out, "train");
    let results = ws.output.join("training_results_photon_gun_pu.json");
    assert!(results.exists());
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&results).unwrap()).unwrap();
    assert_eq!(json["models"].as_object().map(|m| m.len()), Some(10));

    let out = ws.run(&["eval"]);
    assert_ok(&out, "eval");
    let friend = ws.output.join("friend_photon_gun_pu.parquet");
    assert!(friend.exists());
    let table = pfc_ntuple::read_table(&friend, "", &["mva_mean_photon_gun_pu"]).unwrap();
    assert_eq!(table.len(), 4000);
    let means = table.column("mva_mean_photon_gun_pu").unwrap();
    assert!(means.iter().all(|m| m.is_finite() && *m > 0.0));

    assert_ok(&ws.run(&["results"]), "results");
    assert!(ws.output.join("cache/draw_results_photon_gun_pu_EB__150.json").exists());
    assert!(
        ws.output
            .join("cache/draw_results_photon_gun_pu_EE_mva_mean_photon_gun_pu_150.json")
            .exists()
    );

    assert_ok(&ws.run(&["slices"]), "slices");
    assert!(ws.output.join("plots_slices/slices_pu_EB_pT_1.0_10.0.svg").exists());

    assert_ok(&ws.run(&["overtraining"]), "overtraining");
    assert!(ws.output.join("plots_overtraining/overtraining_photon_gun_pu_EE.svg").exists());

    assert_ok(&ws.run(&["mva-pars"]), "mva-pars");
    assert!(ws.output.join("cache/draw_mva_pars_photon_gun_pu_photon_gun_pu_150.json").exists());

    // two calibration versions sharing the same cached results
    for version in ["a", "b"] {
        copy_dir(&ws.output.join("cache"), &ws.root.join(format!("output_{version}/cache")));
    }
    let base = ws.root.to_str().unwrap().to_string();
    assert_ok(&ws.run(&["compare", "a", "b", "--base-dir", &base]), "compare");
    let plots = ws.output.join("plots_comparison_a_b");
    for det in ["EB", "EE"] {
        let name = format!("sigma_vs_e_photon_gun_pu_pu_{det}.svg");
        assert!(plots.join(&name).exists(), "missing {name}");
    }
    assert!(plots.join("mean_vs_pt_photon_gun_pu_pu_EB_zoom.svg").exists());

    let out = ws.run(&["compare", "a", "missing", "--base-dir", &base]);
    assert!(!out.status.success());
}
