//! Per-event evaluation of trained regressions into friend columns.

use pfc_core::{Category, Detector, Error, Result};
use pfc_ntuple::{CompiledExpr, EventTable};
use rayon::prelude::*;

use crate::dataset::TrainingSpec;
use crate::store::TrainingResults;
use crate::train::TrainedModel;

/// Maximum number of trainings evaluated into one friend table.
pub const MAX_TRAININGS: usize = 99;

/// Ntuple columns used to pick the regression of an event.
pub const CATEGORY_COLUMNS: [&str; 3] = ["pfEta", "pfPt", "pfSize5x5_ZS"];

/// Friend column names of a training: mean, sigma, alphaL, alphaR, powerR.
pub fn friend_columns(training: &str) -> [String; 5] {
    ["mean", "sigma", "alphaL", "alphaR", "powerR"].map(|p| format!("mva_{p}_{training}"))
}

/// Name of the corrected-response column of a training.
pub fn mean_column(training: &str) -> String {
    format!("mva_mean_{training}")
}

/// Every ntuple column needed to evaluate `trainings`.
pub fn required_columns<'a>(
    trainings: impl IntoIterator<Item = &'a TrainingResults>,
) -> Result<Vec<String>> {
    let mut cols: Vec<String> = CATEGORY_COLUMNS.iter().map(|c| c.to_string()).collect();
    for results in trainings {
        for model in results.models.values() {
            for var in &model.inputs {
                for c in CompiledExpr::compile(&var.expr)?.required_columns() {
                    if !cols.contains(c) {
                        cols.push(c.clone());
                    }
                }
            }
        }
    }
    Ok(cols)
}

/// One model with its inputs computed for every row of the table.
struct Slot<'a> {
    model: &'a TrainedModel,
    features: Vec<Vec<f64>>,
}

impl Slot<'_> {
    fn row(&self, i: usize) -> Vec<f64> {
        self.features.iter().map(|f| f[i]).collect()
    }
}

/// Slot index of every event: `detector * Category::COUNT + category`.
fn event_slots(table: &EventTable) -> Result<Vec<usize>> {
    let eta = table.column("pfEta")?;
    let pt = table.column("pfPt")?;
    let size = table.column("pfSize5x5_ZS")?;
    (0..table.len())
        .map(|i| {
            let det = Detector::of(eta[i]) as usize;
            let cat = Category::of(size[i] as i64, pt[i])?;
            Ok(det * Category::COUNT + cat.index())
        })
        .collect()
}

fn prepare_slots<'a>(table: &EventTable, results: &'a TrainingResults) -> Result<Vec<Slot<'a>>> {
    let mut slots = Vec::with_capacity(2 * Category::COUNT);
    for det in Detector::ALL {
        for cat in Category::all() {
            let model = results.get(&TrainingSpec::for_category(det, cat).name())?;
            let mut features = Vec::with_capacity(model.inputs.len());
            for var in &model.inputs {
                features.push(CompiledExpr::compile(&var.expr)?.eval_table(table)?);
            }
            slots.push(Slot { model, features });
        }
    }
    Ok(slots)
}

/// Evaluate every training on every row of `table`.
///
/// `trainings` pairs a training name with its results; the returned table
/// holds the five [`friend_columns`] of each training.
pub fn evaluate(table: &EventTable, trainings: &[(String, TrainingResults)]) -> Result<EventTable> {
    if trainings.is_empty() || trainings.len() > MAX_TRAININGS {
        return Err(Error::Validation(format!(
            "number of trainings {} not in range 1-{MAX_TRAININGS}",
            trainings.len()
        )));
    }
    let slots_of_event = event_slots(table)?;

    let mut friend = EventTable::new();
    for (name, results) in trainings {
        let slots = prepare_slots(table, results)?;
        let outputs: Vec<[f64; 5]> = slots_of_event
            .par_iter()
            .enumerate()
            .map(|(i, &s)| {
                let slot = &slots[s];
                let p = slot.model.predict(&slot.row(i));
                let power_r = if s % Category::COUNT > 1 { p.power_r } else { 0.0 };
                [p.mean.exp(), p.sigma, p.alpha_l, p.alpha_r, power_r]
            })
            .collect();

        for (k, col) in friend_columns(name).into_iter().enumerate() {
            friend.insert_column(col, outputs.iter().map(|o| o[k]).collect())?;
        }
        tracing::debug!(training = %name, rows = table.len(), "evaluated regressions");
    }
    Ok(friend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::Forest;
    use crate::params::regressed_params;
    use approx::assert_relative_eq;

    fn constant_results() -> TrainingResults {
        let mut results = TrainingResults::new();
        for spec in TrainingSpec::steering() {
            let kind = spec.density_kind();
            let regressed = regressed_params(kind).to_vec();
            let model = TrainedModel {
                name: spec.name(),
                spec,
                kind,
                inputs: spec.inputs(Default::default()),
                forest: Forest::new(regressed.iter().map(|p| p.initial_raw()).collect()),
                regressed,
                n_events: 0,
                nll: 0.0,
            };
            results.models.insert(model.name.clone(), model);
        }
        results
    }

    fn table(sizes: Vec<f64>) -> EventTable {
        let n = sizes.len();
        EventTable::from_columns([
            ("pfEta", vec![0.5; n]),
            ("pfPt", vec![20.0; n]),
            ("pfSize5x5_ZS", sizes),
            ("pfE", vec![10.0; n]),
            ("pfIEtaIX", vec![3.0; n]),
            ("pfIPhiIY", vec![7.0; n]),
            ("ps1E", vec![0.0; n]),
            ("ps2E", vec![0.0; n]),
        ])
        .unwrap()
    }

    #[test]
    fn friend_columns_per_training() {
        let t = table(vec![1.0, 3.0]);
        let friend = evaluate(&t, &[("a".into(), constant_results())]).unwrap();
        assert_eq!(friend.columns(), friend_columns("a"));
        assert_relative_eq!(friend.column("mva_mean_a").unwrap()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(friend.column("mva_sigma_a").unwrap()[1], 0.1, epsilon = 1e-12);
        assert_eq!(friend.column("mva_powerR_a").unwrap()[0], 0.0);
        assert_relative_eq!(friend.column("mva_powerR_a").unwrap()[1], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn bad_inputs_are_errors() {
        let t = table(vec![0.0]);
        assert!(evaluate(&t, &[("a".into(), constant_results())]).is_err());
        assert!(evaluate(&table(vec![1.0]), &[]).is_err());

        let mut partial = constant_results();
        partial.models.remove("ws_mva_EB_pfSize2");
        assert!(evaluate(&table(vec![1.0]), &[("a".into(), partial)]).is_err());
    }

    #[test]
    fn required_columns_include_inputs() {
        let results = constant_results();
        let cols = required_columns([&results]).unwrap();
        for c in ["pfEta", "pfPt", "pfSize5x5_ZS", "pfE", "pfIEtaIX", "ps2E"] {
            assert!(cols.iter().any(|x| x == c), "{c}");
        }
    }
}
