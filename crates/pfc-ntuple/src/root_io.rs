//! ROOT TTree reader (scalar branches only)

use std::path::Path;

use oxyroot::{Branch, RootFile};
use pfc_core::{Error, Result};

use crate::table::EventTable;

#[derive(Debug, Clone, Copy)]
enum ScalarKind {
    F32,
    F64,
    I32,
    I64,
}

fn root_err(context: &str, err: impl std::fmt::Display) -> Error {
    // oxyroot does not export its error type
    Error::Format(format!("{context}: {err}"))
}

fn scalar_kind(branch: &Branch) -> Option<ScalarKind> {
    match branch.item_type_name().to_ascii_lowercase().as_str() {
        "float" | "float_t" | "float32_t" => Some(ScalarKind::F32),
        "double" | "double_t" | "double32_t" => Some(ScalarKind::F64),
        "int" | "int_t" | "int32_t" => Some(ScalarKind::I32),
        "long64_t" | "int64_t" | "long" => Some(ScalarKind::I64),
        _ => None,
    }
}

fn read_branch(branch: &Branch, name: &str) -> Result<Vec<f64>> {
    let kind = scalar_kind(branch).ok_or_else(|| {
        Error::Format(format!(
            "branch '{name}' has unsupported type '{}'",
            branch.item_type_name()
        ))
    })?;
    let context = format!("reading branch '{name}'");
    let values = match kind {
        ScalarKind::F32 => {
            branch.as_iter::<f32>().map_err(|e| root_err(&context, e))?.map(f64::from).collect()
        }
        ScalarKind::F64 => branch.as_iter::<f64>().map_err(|e| root_err(&context, e))?.collect(),
        ScalarKind::I32 => {
            branch.as_iter::<i32>().map_err(|e| root_err(&context, e))?.map(f64::from).collect()
        }
        ScalarKind::I64 => {
            branch.as_iter::<i64>().map_err(|e| root_err(&context, e))?.map(|v| v as f64).collect()
        }
    };
    Ok(values)
}

/// Read scalar branches `columns` of `tree` in a ROOT file.
pub fn read_root(path: &Path, tree: &str, columns: &[&str]) -> Result<EventTable> {
    let mut file =
        RootFile::open(path).map_err(|e| root_err(&format!("opening {}", path.display()), e))?;
    let tree = file.get_tree(tree).map_err(|e| root_err(&format!("tree '{tree}'"), e))?;

    let mut table = EventTable::new();
    for &name in columns {
        let branch = tree.branch(name).ok_or_else(|| Error::MissingColumn(name.to_string()))?;
        table.insert_column(name, read_branch(branch, name)?)?;
    }
    Ok(table)
}
