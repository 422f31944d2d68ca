use std::path::Path;

use anyhow::{Context, Result};
use pfc_mva::{TrainingResults, evaluate, results_path, training_name};
use pfc_ntuple::InputNtuple;

use crate::context::RunContext;

/// Names of the trainings stored in `dir`, sorted.
pub fn training_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        if let Some(name) = training_name(&entry?.path()) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Legend text of a training: the label of the ntuple it was trained on.
pub fn training_label(inputs: &[InputNtuple], training: &str) -> String {
    inputs
        .iter()
        .find(|n| n.name == training)
        .map_or_else(|| training.to_string(), |n| n.label.clone())
}

/// Every `training_results_<name>.json` in `dir`, loaded.
pub fn available_trainings(dir: &Path) -> Result<Vec<(String, TrainingResults)>> {
    let mut out = Vec::new();
    for name in training_names(dir)? {
        let path = results_path(dir, &name);
        let results = TrainingResults::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        out.push((name, results));
    }
    Ok(out)
}

/// Evaluate every available training on every ntuple into friend tables.
pub fn cmd_eval(ctx: &RunContext) -> Result<()> {
    let trainings = available_trainings(ctx.output_dir())?;
    if trainings.is_empty() {
        anyhow::bail!(
            "no training results in {} (run `pfcalib train` first)",
            ctx.output_dir().display()
        );
    }
    tracing::info!(trainings = trainings.len(), "evaluating");

    let columns = pfc_mva::eval::required_columns(trainings.iter().map(|(_, r)| r))?;
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();

    for input in ctx.inputs()? {
        let table = ctx.load(&input, &columns, &[])?;
        let friend = evaluate(&table, &trainings)
            .with_context(|| format!("evaluating trainings on {}", input.name))?;
        let path = ctx.friend_path(&input);
        pfc_ntuple::write_table(&path, &friend)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}
