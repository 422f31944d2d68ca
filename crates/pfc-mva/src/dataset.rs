//! What a regression is trained on: inputs, target, selection.

use pfc_core::{Category, Detector, PfSizeClass, PtWindow, Result};
use pfc_ntuple::{CompiledExpr, EventTable, expr::EVENT_COLUMN};
use pfc_stats::DensityKind;
use serde::{Deserialize, Serialize};

use crate::params::{TARGET_MAX, TARGET_MIN};

/// Target expression of every regression.
pub const TARGET_EXPR: &str = "log(mcE/pfE)";

/// A named input variable and the ntuple expression it is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVar {
    pub name: String,
    pub expr: String,
}

impl InputVar {
    fn new(name: &str, expr: &str) -> Self {
        Self { name: name.to_string(), expr: expr.to_string() }
    }
}

/// Options shared by all regressions of one training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputOptions {
    /// Use the number of primary vertices as an input.
    #[serde(default)]
    pub use_nvtx: bool,
    /// Use the cluster shower-shape ratios (size 2 and above).
    #[serde(default)]
    pub use_shower_shapes: bool,
}

/// One regression: detector region, cluster-size class and pT window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSpec {
    pub detector: Detector,
    pub size: PfSizeClass,
    pub window: PtWindow,
}

impl TrainingSpec {
    /// The ten regressions of a full training, in training order.
    pub fn steering() -> Vec<TrainingSpec> {
        Detector::ALL
            .into_iter()
            .flat_map(|detector| Category::all().map(move |c| Self::for_category(detector, c)))
            .collect()
    }

    /// The regression used to evaluate events of `category`.
    pub fn for_category(detector: Detector, category: Category) -> Self {
        Self { detector, size: category.size_class(), window: category.training_window() }
    }

    /// Model name, e.g. `ws_mva_EE_pfSize3_ptMin4.0_ptMax20.0`.
    pub fn name(&self) -> String {
        format!("ws_mva_{}_pfSize{}{}", self.detector, self.size.number(), self.window.name_suffix())
    }

    pub fn density_kind(&self) -> DensityKind {
        if self.size.has_power_tail() { DensityKind::RevCBExp } else { DensityKind::GausDoubleExp }
    }

    /// Minimum NLL gain for a split to be accepted.
    pub fn min_cut_significance(&self) -> f64 {
        if self.size.has_power_tail() { 5.0 } else { 1.0 }
    }

    pub fn inputs(&self, opts: InputOptions) -> Vec<InputVar> {
        let mut vars = vec![
            InputVar::new("var1", "pfE"),
            InputVar::new("var2", "pfIEtaIX"),
            InputVar::new("var3", "pfIPhiIY"),
        ];
        if opts.use_shower_shapes && self.size != PfSizeClass::One {
            vars.push(InputVar::new("var4", "pfE1x3/pfE"));
        }
        if opts.use_shower_shapes && self.size == PfSizeClass::ThreePlus {
            vars.push(InputVar::new("var5", "pfE2x2/pfE"));
            vars.push(InputVar::new("var6", "pfE2x5Max/pfE"));
            vars.push(InputVar::new("var7", "pfE3x3/pfE"));
            vars.push(InputVar::new("var8", "pfE5x5/pfE"));
        }
        if opts.use_nvtx {
            vars.push(InputVar::new("nVtx", "nVtx"));
        }
        if self.detector.is_endcap() {
            vars.push(InputVar::new("varEE1", "ps1E/pfE"));
            vars.push(InputVar::new("varEE2", "ps2E/pfE"));
        }
        vars
    }

    /// Training-event selection clauses, ANDed together.
    pub fn selection(&self) -> Vec<String> {
        let mut cuts = vec![
            self.detector.training_cut(),
            "pfE/mcE > 0.4".to_string(),
            "pfPhoDeltaR < 0.03".to_string(),
            format!("{EVENT_COLUMN} % 2 == 0"),
            self.size.selection().to_string(),
        ];
        cuts.extend(self.window.selection());
        cuts
    }
}

/// Selected training events as column-major inputs plus target.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub inputs: Vec<InputVar>,
    /// `features[v][i]`: input `v` of event `i`
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl Dataset {
    /// Apply the selection of `spec` to `table` and compute inputs and target.
    ///
    /// Events whose target falls outside the regression range are dropped.
    pub fn from_table(table: &EventTable, spec: &TrainingSpec, opts: InputOptions) -> Result<Self> {
        let mask = CompiledExpr::all_of(&spec.selection())?.mask(table)?;
        let selected = table.select_rows(&mask)?;

        let target = CompiledExpr::compile(TARGET_EXPR)?.eval_table(&selected)?;
        let inputs = spec.inputs(opts);
        let mut features = Vec::with_capacity(inputs.len());
        for var in &inputs {
            features.push(CompiledExpr::compile(&var.expr)?.eval_table(&selected)?);
        }

        let keep: Vec<usize> = (0..target.len())
            .filter(|&i| {
                (TARGET_MIN..=TARGET_MAX).contains(&target[i])
                    && features.iter().all(|f| f[i].is_finite())
            })
            .collect();
        let dataset = Self {
            inputs,
            features: features.iter().map(|f| keep.iter().map(|&i| f[i]).collect()).collect(),
            target: keep.iter().map(|&i| target[i]).collect(),
        };
        tracing::debug!(
            model = %spec.name(),
            selected = selected.len(),
            in_range = dataset.len(),
            "built training dataset"
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Columns every regression reads from the ntuple.
    pub fn required_columns(opts: InputOptions) -> Result<Vec<String>> {
        let mut cols: Vec<String> = Vec::new();
        for spec in TrainingSpec::steering() {
            let exprs = spec
                .selection()
                .into_iter()
                .chain(spec.inputs(opts).into_iter().map(|v| v.expr))
                .chain(std::iter::once(TARGET_EXPR.to_string()));
            for e in exprs {
                for c in CompiledExpr::compile(&e)?.required_columns() {
                    if c != EVENT_COLUMN && !cols.contains(c) {
                        cols.push(c.clone());
                    }
                }
            }
        }
        Ok(cols)
    }
}
