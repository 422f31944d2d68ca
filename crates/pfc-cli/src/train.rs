use anyhow::{Context, Result};
use pfc_mva::{Dataset, TrainingResults, TrainingSpec, results_path, train};

use crate::context::RunContext;

/// Train the regressions of every selected ntuple.
///
/// `ntuple` restricts training to one input (by file stem) and `only` to one
/// model; models not retrained keep their slot in the results file.
pub fn cmd_train(ctx: &RunContext, ntuple: Option<&str>, only: Option<&str>) -> Result<()> {
    let config = &ctx.config.train;
    let inputs: Vec<_> = ctx
        .inputs()?
        .into_iter()
        .filter(|n| ntuple.is_none_or(|name| n.name == name))
        .collect();
    if inputs.is_empty() {
        anyhow::bail!(
            "ntuple '{}' not found in {}",
            ntuple.unwrap_or_default(),
            ctx.config.input_dir.display()
        );
    }

    let specs: Vec<TrainingSpec> = TrainingSpec::steering()
        .into_iter()
        .filter(|s| only.is_none_or(|name| s.name() == name))
        .collect();
    if specs.is_empty() {
        anyhow::bail!("unknown model '{}'", only.unwrap_or_default());
    }

    let columns = Dataset::required_columns(config.inputs)?;
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    std::fs::create_dir_all(ctx.output_dir())?;

    for input in &inputs {
        let table = ctx.load(input, &columns, &[])?;
        let path = results_path(ctx.output_dir(), &input.name);
        for spec in &specs {
            let _span =
                tracing::info_span!("train", ntuple = %input.name, model = %spec.name()).entered();
            let dataset = Dataset::from_table(&table, spec, config.inputs)?;
            let model = train(&dataset, spec, config)
                .with_context(|| format!("training {} on {}", spec.name(), input.name))?;
            tracing::info!(trees = model.forest.trees.len(), nll = model.nll, "trained");
            TrainingResults::update(&path, model)
                .with_context(|| format!("failed to store {}", path.display()))?;
        }
        println!("{}", path.display());
    }
    Ok(())
}
