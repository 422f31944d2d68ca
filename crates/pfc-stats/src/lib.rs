//! # pfc-stats
//!
//! Numerical building blocks of the calibration analyses.
//!
//! - [`sigma_clip`]: iterative outlier-trimmed mean and sigma
//! - [`histogram`] / [`graph`]: fixed-binning histograms and error graphs
//! - [`blocks`]: equal-population slicing of a sorted variable
//! - [`shapes`]: Crystal Ball variants and the normalised MVA densities
//! - [`optimizer`]: bounded L-BFGS on top of argmin
//! - [`fit`]: binned chi-square and likelihood fits with Hessian errors
//! - [`slices`]: per-block response fits producing position/width graphs

pub mod blocks;
pub mod fit;
pub mod graph;
pub mod histogram;
pub mod optimizer;
pub mod shapes;
pub mod sigma_clip;
pub mod slices;

pub use blocks::{Block, sorted_blocks};
pub use fit::{BinnedFit, FitMethod, FitResult, ParamSpec};
pub use graph::{GraphErrors, GraphPoint, joint_range, ratio_to_reference};
pub use histogram::Histogram1D;
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use shapes::{
    CrystalBallLeftExpRight, DensityKind, DensityParams, ExpLeftCrystalBallRight, Shape,
};
pub use sigma_clip::{DEFAULT_NSIGMAS, mean_sigma};
pub use slices::{
    BLOCKS_PER_PAGE, BlockFit, FitParamsResult, SliceMode, SliceResult, fit_params_slices,
    fit_slices, page_name,
};
