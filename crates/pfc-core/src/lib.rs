//! # pfc-core
//!
//! Shared vocabulary of the PFCluster calibration workspace: the error type,
//! detector regions, cluster-size classes and the evaluation categories used
//! to pick a trained regression for an event.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BARREL_ETA_MAX, Category, Detector, PfSizeClass, PtWindow};

/// Workspace version, reported by `pfcalib version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the flat cluster tree inside the ntuplizer output.
pub const DEFAULT_TREE: &str = "ntuplizer/PFClusterTree";
