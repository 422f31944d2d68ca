//! On-disk training results (`training_results_<name>.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pfc_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::train::TrainedModel;

/// Bumped whenever [`TrainedModel`] changes incompatibly.
pub const RESULTS_SCHEMA_VERSION: u32 = 1;

/// All regressions of one training, keyed by model name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingResults {
    pub schema_version: u32,
    pub models: BTreeMap<String, TrainedModel>,
}

/// `<output>/training_results_<name>.json`
pub fn results_path(output_dir: &Path, training: &str) -> PathBuf {
    output_dir.join(format!("training_results_{training}.json"))
}

/// Training name encoded in a results file name, if it is one.
pub fn training_name(path: &Path) -> Option<String> {
    let file = path.file_name()?.to_str()?;
    let name = file.strip_prefix("training_results_")?.strip_suffix(".json")?;
    (!name.is_empty()).then(|| name.to_string())
}

impl TrainingResults {
    pub fn new() -> Self {
        Self { schema_version: RESULTS_SCHEMA_VERSION, models: BTreeMap::new() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let results: TrainingResults = serde_json::from_slice(&bytes)?;
        if results.schema_version != RESULTS_SCHEMA_VERSION {
            return Err(Error::Format(format!(
                "{}: schema version {} (expected {RESULTS_SCHEMA_VERSION})",
                path.display(),
                results.schema_version
            )));
        }
        Ok(results)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Insert `model` into the results file at `path`, keeping other models.
    pub fn update(path: &Path, model: TrainedModel) -> Result<()> {
        let mut results = if path.exists() { Self::load(path)? } else { Self::new() };
        tracing::debug!(path = %path.display(), model = %model.name, "storing model");
        results.models.insert(model.name.clone(), model);
        results.save(path)
    }

    pub fn get(&self, name: &str) -> Result<&TrainedModel> {
        self.models
            .get(name)
            .ok_or_else(|| Error::Validation(format!("model '{name}' missing from training results")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TrainingSpec;
    use crate::forest::Forest;
    use crate::params::regressed_params;

    fn model(spec: TrainingSpec, nll: f64) -> TrainedModel {
        let kind = spec.density_kind();
        let regressed = regressed_params(kind).to_vec();
        TrainedModel {
            name: spec.name(),
            spec,
            kind,
            inputs: Vec::new(),
            forest: Forest::new(regressed.iter().map(|p| p.initial_raw()).collect()),
            regressed,
            n_events: 0,
            nll,
        }
    }

    #[test]
    fn names_roundtrip() {
        let p = results_path(Path::new("output"), "gun_noPU");
        assert_eq!(p, PathBuf::from("output/training_results_gun_noPU.json"));
        assert_eq!(training_name(&p).as_deref(), Some("gun_noPU"));
        assert_eq!(training_name(Path::new("output/friend_x.parquet")), None);
    }

    #[test]
    fn update_keeps_other_models() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("pfc_store_{}_{nanos}", std::process::id()));
        let path = results_path(&dir, "t");
        let specs = TrainingSpec::steering();

        TrainingResults::update(&path, model(specs[0], 1.0)).unwrap();
        TrainingResults::update(&path, model(specs[4], 2.0)).unwrap();
        TrainingResults::update(&path, model(specs[0], 3.0)).unwrap();

        let back = TrainingResults::load(&path).unwrap();
        assert_eq!(back.models.len(), 2);
        assert_eq!(back.get(&specs[0].name()).unwrap().nll, 3.0);
        assert!(back.get(&specs[1].name()).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
