use crate::canvas::Canvas;
use crate::color::Color;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

#[derive(Debug, Clone)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
    pub kind: LegendKind,
}

impl LegendEntry {
    pub fn new(label: impl Into<String>, color: Color, kind: LegendKind) -> Self {
        Self { label: label.into(), color, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendKind {
    Line,
    Marker,
    /// Marker on a line, as for graphs drawn with `PZL`
    MarkerLine,
    Fill,
}

/// Corner of the plot area the legend box is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegendPosition {
    #[default]
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
}

pub fn draw_legend(
    canvas: &mut Canvas,
    area: &PlotArea,
    entries: &[LegendEntry],
    font_size: f64,
    position: LegendPosition,
) {
    if entries.is_empty() {
        return;
    }

    let row_height = font_size + 4.0;
    let swatch_w = 16.0;
    let swatch_h = font_size - 2.0;
    let gap = 6.0;
    let padding = 6.0;
    let inset = 8.0;

    let text_style =
        TextStyle { size: font_size * 0.9, baseline: TextBaseline::Central, ..Default::default() };

    let max_w = entries
        .iter()
        .map(|e| canvas.measure_text(&e.label, &text_style).width)
        .fold(0.0_f64, f64::max);

    let legend_w = padding + swatch_w + gap + max_w + padding;
    let legend_h = padding + entries.len() as f64 * row_height + padding;

    let lx = match position {
        LegendPosition::TopRight | LegendPosition::BottomRight => area.right() - legend_w - inset,
        LegendPosition::TopLeft | LegendPosition::BottomLeft => area.left + inset,
    };
    let ly = match position {
        LegendPosition::TopRight | LegendPosition::TopLeft => area.top + inset,
        LegendPosition::BottomRight | LegendPosition::BottomLeft => {
            area.bottom() - legend_h - inset
        }
    };

    let bg = Style {
        fill: Some(Color::WHITE),
        stroke: Some(Color::BLACK),
        stroke_width: 0.5,
        opacity: 1.0,
    };
    canvas.rect(lx, ly, legend_w, legend_h, &bg);

    for (i, entry) in entries.iter().enumerate() {
        let ey = ly + padding + i as f64 * row_height + row_height / 2.0;
        let sx = lx + padding;
        let marker = MarkerStyle { color: entry.color, size: 3.0 };

        match entry.kind {
            LegendKind::Fill => {
                canvas.rect(sx, ey - swatch_h / 2.0, swatch_w, swatch_h, &Style::filled(entry.color));
            }
            LegendKind::Line => {
                canvas.line(sx, ey, sx + swatch_w, ey, &LineStyle::solid(entry.color, 1.5));
            }
            LegendKind::Marker => canvas.marker(sx + swatch_w / 2.0, ey, &marker),
            LegendKind::MarkerLine => {
                canvas.line(sx, ey, sx + swatch_w, ey, &LineStyle::solid(entry.color, 1.0));
                canvas.marker(sx + swatch_w / 2.0, ey, &marker);
            }
        }

        canvas.text(sx + swatch_w + gap, ey, &entry.label, &text_style);
    }
}
