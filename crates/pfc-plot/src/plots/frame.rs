use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::PlotConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

/// What of the frame decorations to draw.
#[derive(Debug, Clone, Copy)]
pub struct FrameOpts {
    pub x_labels: bool,
    /// Font scale of tick labels and titles, for small panels.
    pub text_scale: f64,
}

impl Default for FrameOpts {
    fn default() -> Self {
        Self { x_labels: true, text_scale: 1.0 }
    }
}

/// Box frame with inward ticks, grid lines, tick labels and axis titles.
pub fn draw_axes(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    config: &PlotConfig,
    opts: FrameOpts,
) {
    let frame_style = LineStyle::solid(Color::BLACK, 0.8);
    let tick_style = LineStyle::solid(Color::BLACK, 0.6);
    let minor_style = LineStyle::solid(Color::BLACK, 0.4);
    let grid_style = LineStyle {
        color: Color::rgb(128, 128, 128).with_alpha(config.grid.alpha),
        width: 0.5,
        dash: Some("2 2".into()),
    };
    let tl = config.axes.tick_length;
    let mtl = config.axes.minor_tick_length;
    let tick_size = config.font.tick_size * opts.text_scale;
    let label_size = config.font.label_size * opts.text_scale;

    draw_frame(canvas, area, &frame_style);

    let x_label_style = TextStyle {
        size: tick_size,
        anchor: TextAnchor::Middle,
        baseline: TextBaseline::Hanging,
        ..Default::default()
    };
    for (i, &val) in x_axis.tick_positions.iter().enumerate() {
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        if px < area.left - 0.5 || px > area.right() + 0.5 {
            continue;
        }
        if config.grid.show {
            canvas.line(px, area.top, px, area.bottom(), &grid_style);
        }
        canvas.line(px, area.bottom(), px, area.bottom() - tl, &tick_style);
        if config.axes.show_top_ticks {
            canvas.line(px, area.top, px, area.top + tl, &tick_style);
        }
        if opts.x_labels {
            if let Some(label) = x_axis.tick_labels.get(i) {
                canvas.text(px, area.bottom() + 3.0, label, &x_label_style);
            }
        }
    }
    for &val in &x_axis.minor_ticks {
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        if px >= area.left && px <= area.right() {
            canvas.line(px, area.bottom(), px, area.bottom() - mtl, &minor_style);
        }
    }

    let y_label_style = TextStyle {
        size: tick_size,
        anchor: TextAnchor::End,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    let mut widest = 0.0_f64;
    for (i, &val) in y_axis.tick_positions.iter().enumerate() {
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        if py < area.top - 0.5 || py > area.bottom() + 0.5 {
            continue;
        }
        if config.grid.show {
            canvas.line(area.left, py, area.right(), py, &grid_style);
        }
        canvas.line(area.left, py, area.left + tl, py, &tick_style);
        if config.axes.show_right_ticks {
            canvas.line(area.right(), py, area.right() - tl, py, &tick_style);
        }
        if let Some(label) = y_axis.tick_labels.get(i) {
            canvas.text(area.left - 4.0, py, label, &y_label_style);
            widest = widest.max(canvas.measure_text(label, &y_label_style).width);
        }
    }
    for &val in &y_axis.minor_ticks {
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        if py >= area.top && py <= area.bottom() {
            canvas.line(area.left, py, area.left + mtl, py, &minor_style);
        }
    }

    // axis titles sit at the far end of the axis, as in ROOT
    let title_style = TextStyle { size: label_size, anchor: TextAnchor::End, ..Default::default() };
    if opts.x_labels && !x_axis.label.is_empty() {
        let y = area.bottom() + tick_size + label_size + 6.0;
        canvas.text(area.right(), y, &x_axis.label, &title_style);
    }
    if !y_axis.label.is_empty() {
        let x = area.left - widest - 10.0;
        canvas.text_rotated(x, area.top, &y_axis.label, &title_style, -90.0);
    }
}

pub fn draw_frame(canvas: &mut Canvas, area: &PlotArea, style: &LineStyle) {
    canvas.line(area.left, area.top, area.right(), area.top, style);
    canvas.line(area.left, area.bottom(), area.right(), area.bottom(), style);
    canvas.line(area.left, area.top, area.left, area.bottom(), style);
    canvas.line(area.right(), area.top, area.right(), area.bottom(), style);
}
