//! # pfc-ntuple
//!
//! Columnar access to PFCluster ntuples.
//!
//! Tables are plain named `f64` columns. The native on-disk format is Parquet;
//! ROOT ntuples straight from the ntuplizer are read through `oxyroot`.
//! Per-event MVA outputs live in separate "friend" Parquet files that are
//! joined row by row onto the ntuple they were computed from.

pub mod discover;
pub mod expr;
pub mod parquet_io;
pub mod root_io;
pub mod table;

use std::path::Path;

use pfc_core::{Error, Result};

pub use discover::{InputNtuple, discover_inputs, friend_path};
pub use expr::CompiledExpr;
pub use table::EventTable;

/// Branches of the ntuplizer cluster tree.
pub const NTUPLE_COLUMNS: &[&str] = &[
    "mcE",
    "mcPt",
    "mcEta",
    "mcPhi",
    "pfE",
    "pfPt",
    "pfEta",
    "pfPhi",
    "pfIEtaIX",
    "pfIPhiIY",
    "pfSize5x5_ZS",
    "pfE1x3",
    "pfE2x2",
    "pfE2x5Max",
    "pfE3x3",
    "pfE5x5",
    "ps1E",
    "ps2E",
    "ps1N",
    "ps2N",
    "nVtx",
    "pfPhoDeltaR",
];

/// Read `columns` of an ntuple, picking the reader from the file extension.
///
/// `tree` is only used for ROOT files.
pub fn read_table(path: &Path, tree: &str, columns: &[&str]) -> Result<EventTable> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let table = match ext {
        "parquet" => parquet_io::read_parquet(path, columns)?,
        "root" => root_io::read_root(path, tree, columns)?,
        other => {
            return Err(Error::Format(format!(
                "unsupported ntuple extension '{other}' ({})",
                path.display()
            )));
        }
    };
    tracing::debug!(path = %path.display(), rows = table.len(), cols = columns.len(), "read ntuple");
    Ok(table)
}

/// Write a table as single-precision Parquet.
pub fn write_table(path: &Path, table: &EventTable) -> Result<()> {
    parquet_io::write_parquet(path, table)
}
