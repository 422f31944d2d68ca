//! # pfc-mva
//!
//! Semi-parametric energy regression for PFClusters.
//!
//! The target `log(mcE/pfE)` of every cluster is described by a parametric
//! density whose parameters (mean, width, tail shapes) are each a boosted
//! function of the cluster inputs. Training minimises the summed negative
//! log-likelihood; evaluation writes the predicted parameters of every
//! cluster into a friend table.
//!
//! - [`dataset`]: inputs, target and selection of each regression
//! - [`params`]: bounded parameter mapping
//! - [`forest`]: multi-output trees grown on Newton gains
//! - [`train`]: the boosting loop
//! - [`store`]: JSON training results
//! - [`eval`]: friend-table evaluation

pub mod dataset;
pub mod eval;
pub mod forest;
pub mod params;
pub mod store;
pub mod train;

pub use dataset::{Dataset, InputOptions, InputVar, TrainingSpec};
pub use eval::{MAX_TRAININGS, evaluate, friend_columns, mean_column};
pub use params::{ParamId, TARGET_MAX, TARGET_MIN};
pub use store::{TrainingResults, results_path, training_name};
pub use train::{TrainConfig, TrainedModel, train};
