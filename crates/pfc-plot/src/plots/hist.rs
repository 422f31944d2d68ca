use pfc_stats::Histogram1D;

use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::PlotConfig;
use crate::header::draw_header;
use crate::layout::axes::Axis;
use crate::layout::legend::{LegendEntry, LegendKind, LegendPosition, draw_legend};
use crate::layout::margins::PlotArea;
use crate::plots::frame::{FrameOpts, draw_axes};
use crate::primitives::*;

#[derive(Debug, Clone)]
pub struct HistSeries {
    pub hist: Histogram1D,
    pub label: String,
    pub color: Color,
}

/// Several histograms overlaid on one frame.
#[derive(Debug, Clone, Default)]
pub struct HistPlot {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub series: Vec<HistSeries>,
    /// Frame x range; the binning of the first histogram by default
    pub x_range: Option<(f64, f64)>,
    pub log_y: bool,
    pub legend: LegendPosition,
}

impl HistPlot {
    /// Frame y range: `[0, 1.1 max]`, or `[1e-3 max, 1.1 max]` on a log scale.
    pub fn y_range(&self) -> (f64, f64) {
        let ymax = self.series.iter().map(|s| s.hist.maximum()).fold(0.0_f64, f64::max);
        let ymax = if ymax > 0.0 { ymax } else { 1.0 };
        let ymin = if self.log_y { ymax * 1e-3 } else { 0.0 };
        (ymin, ymax * 1.1)
    }
}

pub fn render(plot: &HistPlot, config: &PlotConfig) -> crate::Result<String> {
    let Some(first) = plot.series.first() else {
        return Err(crate::RenderError::Layout(format!("{}: no histograms", plot.title)));
    };
    let mut canvas = Canvas::new(config.figure.width, config.figure.height)?;

    let (xmin, xmax) = plot.x_range.unwrap_or((first.hist.lo(), first.hist.hi()));
    let (ymin, ymax) = plot.y_range();
    let x_axis = Axis::linear(xmin, xmax, 6).with_label(&plot.x_title);
    let y_axis = if plot.log_y { Axis::log(ymin, ymax) } else { Axis::linear(ymin, ymax, 6) }
        .with_label(&plot.y_title);

    let area = PlotArea::auto(&canvas, &y_axis, config);
    draw_header(&mut canvas, &area, config, &plot.title);
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config, FrameOpts::default());

    canvas.push_clip(area.left, area.top, area.width, area.height);
    for s in &plot.series {
        draw_steps(&mut canvas, &area, &x_axis, &y_axis, &s.hist, &LineStyle::solid(s.color, 1.2));
    }
    canvas.pop_clip();

    let entries: Vec<LegendEntry> = plot
        .series
        .iter()
        .map(|s| LegendEntry::new(&s.label, s.color, LegendKind::Line))
        .collect();
    draw_legend(&mut canvas, &area, &entries, config.font.size, plot.legend);

    Ok(canvas.finish_svg())
}

/// Histogram outline as a step polyline.
pub fn draw_steps(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    hist: &Histogram1D,
    style: &LineStyle,
) {
    let floor = if y_axis.log { y_axis.min } else { y_axis.min.max(0.0) };
    let py = |v: f64| y_axis.data_to_pixel(v.max(floor), area.bottom(), area.top);
    let px = |v: f64| x_axis.data_to_pixel(v, area.left, area.right());

    let mut points = Vec::with_capacity(2 * hist.nbins() + 2);
    points.push((px(hist.lo()), py(floor)));
    for (i, &c) in hist.contents().iter().enumerate() {
        let lo = hist.bin_low_edge(i);
        let y = py(c);
        points.push((px(lo), y));
        points.push((px(lo + hist.bin_width()), y));
    }
    points.push((px(hist.hi()), py(floor)));
    canvas.polyline(&points, style);
}

/// Histogram drawn as points with vertical error bars.
pub fn draw_error_points(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    hist: &Histogram1D,
    color: Color,
) {
    let bar = LineStyle::solid(color, 0.6);
    let marker = MarkerStyle { size: 1.0, color };
    for (i, (&c, e)) in hist.contents().iter().zip(hist.errors()).enumerate() {
        if c <= 0.0 {
            continue;
        }
        let x = x_axis.data_to_pixel(hist.bin_center(i), area.left, area.right());
        let lo = y_axis.data_to_pixel((c - e).max(y_axis.min), area.bottom(), area.top);
        let hi = y_axis.data_to_pixel(c + e, area.bottom(), area.top);
        canvas.error_bar(x, lo, hi, &bar);
        canvas.marker(x, y_axis.data_to_pixel(c, area.bottom(), area.top), &marker);
    }
}
