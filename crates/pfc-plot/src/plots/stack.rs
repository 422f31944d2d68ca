use pfc_stats::Histogram1D;

use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::PlotConfig;
use crate::header::draw_header;
use crate::layout::axes::Axis;
use crate::layout::legend::{LegendEntry, LegendKind, LegendPosition, draw_legend};
use crate::layout::margins::PlotArea;
use crate::plots::frame::{FrameOpts, draw_axes};
use crate::plots::hist::draw_steps;
use crate::primitives::*;

#[derive(Debug, Clone)]
pub struct StackLayer {
    pub hist: Histogram1D,
    pub label: String,
    pub color: Color,
}

/// Filled histograms drawn back to front on a fixed frame.
#[derive(Debug, Clone, Default)]
pub struct StackPlot {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    /// Drawn in order, so later layers cover earlier ones
    pub layers: Vec<StackLayer>,
    /// Legend entries top to bottom, as indices into `layers`
    pub legend_order: Vec<usize>,
    pub y_range: (f64, f64),
}

/// Running sums of `parts` expressed in percent of the total in every bin.
///
/// Element `k` holds the share of `parts[0..=k]`; bins with no entries stay
/// at zero. All parts must share the binning.
pub fn cumulative_percentages(parts: &[Histogram1D]) -> crate::Result<Vec<Histogram1D>> {
    let mut sums: Vec<Histogram1D> = Vec::with_capacity(parts.len());
    for part in parts {
        let mut h = part.clone();
        if let Some(prev) = sums.last() {
            h.add(prev, 1.0)?;
        }
        sums.push(h);
    }
    let Some(total) = sums.last().map(|h| h.contents().to_vec()) else {
        return Ok(sums);
    };
    for h in &mut sums {
        for (i, &t) in total.iter().enumerate() {
            if t > 0.0 {
                let v = h.content(i) / t * 100.0;
                h.set_bin_content(i, v)?;
            }
        }
    }
    Ok(sums)
}

pub fn render(plot: &StackPlot, config: &PlotConfig) -> crate::Result<String> {
    let Some(first) = plot.layers.first() else {
        return Err(crate::RenderError::Layout(format!("{}: no layers", plot.title)));
    };
    let mut canvas = Canvas::new(config.figure.width, config.figure.height)?;

    let xmax = plot.layers.iter().map(|l| l.hist.hi()).fold(first.hist.hi(), f64::max);
    let (ylo, yhi) = plot.y_range;
    let x_axis = Axis::linear(0.0, xmax, 6).with_label(&plot.x_title);
    let y_axis = Axis::linear(ylo, yhi, 6).with_label(&plot.y_title);

    let area = PlotArea::auto(&canvas, &y_axis, config);
    draw_header(&mut canvas, &area, config, &plot.title);

    canvas.push_clip(area.left, area.top, area.width, area.height);
    for layer in &plot.layers {
        fill_steps(&mut canvas, &area, &x_axis, &y_axis, &layer.hist, layer.color);
    }
    canvas.pop_clip();
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config, FrameOpts::default());

    let entries: Vec<LegendEntry> = plot
        .legend_order
        .iter()
        .filter_map(|&i| plot.layers.get(i))
        .map(|l| LegendEntry::new(&l.label, l.color, LegendKind::Fill))
        .collect();
    draw_legend(&mut canvas, &area, &entries, config.font.size, LegendPosition::TopRight);

    Ok(canvas.finish_svg())
}

fn fill_steps(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    hist: &Histogram1D,
    color: Color,
) {
    let base = y_axis.data_to_pixel(y_axis.min, area.bottom(), area.top);
    let mut points = vec![(x_axis.data_to_pixel(hist.lo(), area.left, area.right()), base)];
    for (i, &c) in hist.contents().iter().enumerate() {
        let lo = hist.bin_low_edge(i);
        let y = y_axis.data_to_pixel(c, area.bottom(), area.top);
        points.push((x_axis.data_to_pixel(lo, area.left, area.right()), y));
        points.push((x_axis.data_to_pixel(lo + hist.bin_width(), area.left, area.right()), y));
    }
    points.push((x_axis.data_to_pixel(hist.hi(), area.left, area.right()), base));

    canvas.polygon(&points, &Style::filled(color.with_alpha(0.6)));
    draw_steps(canvas, area, x_axis, y_axis, hist, &LineStyle::solid(color, 1.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist(values: &[f64]) -> Histogram1D {
        Histogram1D::from_values(2, 0.0, 2.0, values).unwrap()
    }

    #[test]
    fn percentages_accumulate_to_hundred() {
        let parts = [hist(&[0.5, 0.5, 1.5]), hist(&[0.5]), hist(&[0.5, 1.5])];
        let sums = cumulative_percentages(&parts).unwrap();
        assert_relative_eq!(sums[0].content(0), 50.0);
        assert_relative_eq!(sums[1].content(0), 75.0);
        assert_relative_eq!(sums[2].content(0), 100.0);
        assert_relative_eq!(sums[0].content(1), 50.0);
        assert_relative_eq!(sums[2].content(1), 100.0);
    }

    #[test]
    fn empty_bins_stay_zero() {
        let sums = cumulative_percentages(&[hist(&[0.5]), hist(&[])]).unwrap();
        assert_relative_eq!(sums[1].content(1), 0.0);
    }

    #[test]
    fn renders_legend_in_requested_order() {
        let sums = cumulative_percentages(&[hist(&[0.5]), hist(&[1.5])]).unwrap();
        let plot = StackPlot {
            title: "EB".into(),
            x_title: "p_{T}^{gen}".into(),
            y_title: "%".into(),
            layers: vec![
                StackLayer { hist: sums[1].clone(), label: "second".into(), color: Color::root(49) },
                StackLayer { hist: sums[0].clone(), label: "first".into(), color: Color::root(40) },
            ],
            legend_order: vec![1, 0],
            y_range: (0.0, 100.0),
        };
        let svg = render(&plot, &PlotConfig::default()).unwrap();
        let first = svg.find(">first<").unwrap();
        let second = svg.find(">second<").unwrap();
        assert!(first < second);
        assert!(svg.contains("<polygon"));
    }
}
