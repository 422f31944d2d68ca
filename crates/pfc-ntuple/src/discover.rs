//! Input ntuple discovery

use std::path::{Path, PathBuf};

use pfc_core::Result;

/// An ntuple found in the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNtuple {
    pub path: PathBuf,
    /// File stem, used in cache keys and friend names
    pub name: String,
    /// Legend text: what follows the last `gun_` in the stem
    pub label: String,
}

impl InputNtuple {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let label = match name.rfind("gun_") {
            Some(i) => name[i + 4..].to_string(),
            None => name.clone(),
        };
        Self { path, name, label }
    }
}

/// Every `*.root` and `*.parquet` file in `dir`, sorted by path.
pub fn discover_inputs(dir: &Path) -> Result<Vec<InputNtuple>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ntuple = path.is_file()
            && matches!(path.extension().and_then(|e| e.to_str()), Some("root" | "parquet"));
        if is_ntuple {
            paths.push(path);
        }
    }
    paths.sort();
    tracing::info!(dir = %dir.display(), found = paths.len(), "discovered input ntuples");
    Ok(paths.into_iter().map(InputNtuple::from_path).collect())
}

/// Location of the MVA-output friend table for ntuple `name`.
pub fn friend_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("friend_{name}.parquet"))
}
