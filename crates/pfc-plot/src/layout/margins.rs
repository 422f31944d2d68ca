use crate::canvas::Canvas;
use crate::config::PlotConfig;
use crate::layout::axes::Axis;
use crate::primitives::TextStyle;

/// Rectangular plot area within the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PlotArea {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Margins sized for the y tick labels, axis titles and header.
    pub fn auto(canvas: &Canvas, y_axis: &Axis, config: &PlotConfig) -> Self {
        let left = Self::left_margin(canvas, y_axis, config);
        let top = Self::top_margin(config);
        let bottom = config.font.tick_size + config.font.label_size + 22.0;
        let right = 18.0;
        let width = canvas.width - left - right;
        let height = canvas.height - top - bottom;
        Self { left, top, width: width.max(50.0), height: height.max(50.0) }
    }

    pub fn left_margin(canvas: &Canvas, y_axis: &Axis, config: &PlotConfig) -> f64 {
        let tick_style = TextStyle { size: config.font.tick_size, ..Default::default() };
        let max_tick_w = y_axis
            .tick_labels
            .iter()
            .map(|l| canvas.measure_text(l, &tick_style).width)
            .fold(0.0_f64, f64::max);
        let mut left = 15.0 + max_tick_w + 8.0;
        if !y_axis.label.is_empty() {
            left += config.font.label_size + 6.0;
        }
        left
    }

    pub fn top_margin(config: &PlotConfig) -> f64 {
        if config.experiment.name.is_empty() { 14.0 } else { config.font.label_size * 1.3 + 14.0 }
    }

    pub fn manual(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }
}
