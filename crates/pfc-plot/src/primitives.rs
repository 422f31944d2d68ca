//! Drawing styles shared by the canvas and the plot kinds.

use crate::color::Color;

/// Area style: histogram fills, legend boxes, frames.
#[derive(Debug, Clone)]
pub struct Style {
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f64,
    pub opacity: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self { fill: None, stroke: None, stroke_width: 1.0, opacity: 1.0 }
    }
}

impl Style {
    pub fn filled(color: Color) -> Self {
        Self { fill: Some(color), ..Default::default() }
    }
}

/// Stroke of graph lines, histogram steps and fitted curves.
#[derive(Debug, Clone)]
pub struct LineStyle {
    pub color: Color,
    pub width: f64,
    /// SVG dash pattern; `None` draws a solid line
    pub dash: Option<String>,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::solid(Color::BLACK, 1.0)
    }
}

impl LineStyle {
    pub fn solid(color: Color, width: f64) -> Self {
        Self { color, width, dash: None }
    }

    /// Long dashes, used for rejected block fits.
    pub fn dashed(color: Color, width: f64) -> Self {
        Self { color, width, dash: Some("6 3".into()) }
    }
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub size: f64,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub anchor: TextAnchor,
    pub baseline: TextBaseline,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 10.0,
            color: Color::BLACK,
            bold: false,
            italic: false,
            anchor: TextAnchor::Start,
            baseline: TextBaseline::Alphabetic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

impl TextAnchor {
    pub fn svg(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Middle => "middle",
            Self::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBaseline {
    Alphabetic,
    Central,
    Hanging,
}

impl TextBaseline {
    pub fn svg(self) -> &'static str {
        match self {
            Self::Alphabetic => "auto",
            Self::Central => "central",
            Self::Hanging => "hanging",
        }
    }
}

/// Full circle, the marker of every graph point and histogram error bar.
#[derive(Debug, Clone, Copy)]
pub struct MarkerStyle {
    /// Radius in pixels
    pub size: f64,
    pub color: Color,
}
