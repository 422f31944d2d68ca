//! # pfc-plot
//!
//! Plots of the calibration analyses drawn on an immediate-mode SVG
//! [`canvas::Canvas`], optionally rasterised to PNG (feature `png`).
//!
//! Plot builders in [`plots`] take ready histograms and graphs from
//! `pfc-stats` and return an SVG string; [`output::save`] writes it in the
//! configured format.

pub mod canvas;
pub mod color;
pub mod config;
pub mod font;
pub mod header;
pub mod layout;
pub mod output;
pub mod plots;
pub mod primitives;
pub mod text;

use thiserror::Error;

pub use color::Color;
pub use config::{OutputFormat, PlotConfig};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("config error: {0}")]
    Config(String),
    #[error("font error: {0}")]
    Font(String),
    #[error("layout error: {0}")]
    Layout(String),
    #[error(transparent)]
    Stats(#[from] pfc_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "png")]
    #[error("PNG encoding error: {0}")]
    Png(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
