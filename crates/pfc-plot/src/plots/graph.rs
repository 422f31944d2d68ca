use pfc_stats::{GraphErrors, joint_range};

use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::PlotConfig;
use crate::header::draw_header;
use crate::layout::axes::Axis;
use crate::layout::legend::{LegendEntry, LegendKind, LegendPosition, draw_legend};
use crate::layout::margins::PlotArea;
use crate::layout::multi_panel::MainRatioLayout;
use crate::plots::frame::{FrameOpts, draw_axes};
use crate::primitives::*;

#[derive(Debug, Clone)]
pub struct GraphSeries {
    pub graph: GraphErrors,
    pub label: String,
    pub color: Color,
    /// Hidden series still widen the frame but are not drawn.
    pub visible: bool,
}

impl GraphSeries {
    pub fn new(graph: GraphErrors, label: impl Into<String>, color: Color) -> Self {
        Self { graph, label: label.into(), color, visible: true }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Lower panel of ratios against a reference.
#[derive(Debug, Clone)]
pub struct RatioPanel {
    pub series: Vec<GraphSeries>,
    pub y_range: (f64, f64),
    pub y_title: String,
}

/// Graphs drawn with markers, error bars and connecting lines.
#[derive(Debug, Clone, Default)]
pub struct GraphPlot {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub series: Vec<GraphSeries>,
    /// Lower x limit of the frame; the smallest point x by default
    pub x_min: Option<f64>,
    /// Lower y limit of the frame, used as is; `0.9` of the smallest point y by default
    pub y_min: Option<f64>,
    /// Upper x limit of the frame; the largest point x by default
    pub x_max: Option<f64>,
    /// Upper y limit before the 10% headroom; the largest point y by default
    pub y_max: Option<f64>,
    pub legend: LegendPosition,
    pub ratio: Option<RatioPanel>,
}

impl GraphPlot {
    /// `(xmin, xmax, ymin, ymax)` of the frame: point extremes over all
    /// series with `0.9 ymin` and `1.1 ymax`.
    pub fn frame(&self) -> Option<(f64, f64, f64, f64)> {
        let ((xmin, xmax), (ymin, ymax)) = joint_range(self.series.iter().map(|s| &s.graph))?;
        let xmin = self.x_min.unwrap_or(xmin);
        let xmax = self.x_max.unwrap_or(xmax);
        let ymin = self.y_min.unwrap_or(ymin * 0.9);
        let ymax = self.y_max.unwrap_or(ymax);
        Some((xmin, xmax, ymin, ymax * 1.1))
    }
}

pub fn render(plot: &GraphPlot, config: &PlotConfig) -> crate::Result<String> {
    let Some((xmin, xmax, ymin, ymax)) = plot.frame() else {
        return Err(crate::RenderError::Layout(format!("{}: no graph points", plot.title)));
    };
    let mut canvas = Canvas::new(config.figure.width, config.figure.height)?;

    let x_axis = Axis::linear(xmin, xmax, 6).with_label(&plot.x_title);
    let y_axis = Axis::linear(ymin, ymax, 6).with_label(&plot.y_title);

    let full = PlotArea::auto(&canvas, &y_axis, config);
    let main = match &plot.ratio {
        None => {
            draw_axes(&mut canvas, &full, &x_axis, &y_axis, config, FrameOpts::default());
            full
        }
        Some(ratio) => {
            let layout = MainRatioLayout::new(full.left, full.top, full.width, full.height, 0.0, 0.3);
            let no_x = FrameOpts { x_labels: false, ..Default::default() };
            draw_axes(&mut canvas, &layout.main, &x_axis, &y_axis, config, no_x);

            let (rlo, rhi) = ratio.y_range;
            let r_axis = Axis::linear(rlo, rhi, 3).with_label(&ratio.y_title);
            let small = FrameOpts { text_scale: 0.85, ..Default::default() };
            draw_axes(&mut canvas, &layout.ratio, &x_axis, &r_axis, config, small);
            draw_series(&mut canvas, &layout.ratio, &x_axis, &r_axis, &ratio.series);
            layout.main
        }
    };

    draw_header(&mut canvas, &main, config, &plot.title);
    draw_series(&mut canvas, &main, &x_axis, &y_axis, &plot.series);

    let entries: Vec<LegendEntry> = plot
        .series
        .iter()
        .filter(|s| s.visible)
        .map(|s| LegendEntry::new(&s.label, s.color, LegendKind::Marker))
        .collect();
    draw_legend(&mut canvas, &main, &entries, config.font.size, plot.legend);

    Ok(canvas.finish_svg())
}

fn draw_series(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    series: &[GraphSeries],
) {
    canvas.push_clip(area.left, area.top, area.width, area.height);
    for s in series.iter().filter(|s| s.visible) {
        draw_graph(canvas, area, x_axis, y_axis, &s.graph, s.color);
    }
    canvas.pop_clip();
}

/// One graph with markers, error bars without caps and a connecting line.
pub fn draw_graph(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    graph: &GraphErrors,
    color: Color,
) {
    let px = |v: f64| x_axis.data_to_pixel(v, area.left, area.right());
    let py = |v: f64| y_axis.data_to_pixel(v, area.bottom(), area.top);
    let bar = LineStyle::solid(color, 0.6);
    let marker = MarkerStyle { size: 1.6, color };

    let points: Vec<(f64, f64)> = graph.iter().map(|p| (px(p.x), py(p.y))).collect();
    canvas.polyline(&points, &LineStyle::solid(color, 0.8));
    for p in graph.iter() {
        let (x, y) = (px(p.x), py(p.y));
        if p.ey > 0.0 {
            canvas.error_bar(x, py(p.y - p.ey), py(p.y + p.ey), &bar);
        }
        if p.ex > 0.0 {
            canvas.error_bar_h(px(p.x - p.ex), px(p.x + p.ex), y, &bar);
        }
        canvas.marker(x, y, &marker);
    }
}
