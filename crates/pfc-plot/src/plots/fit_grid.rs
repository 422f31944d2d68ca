use pfc_stats::{BLOCKS_PER_PAGE, BlockFit};

use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::PlotConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::layout::multi_panel::GridLayout;
use crate::plots::frame::{FrameOpts, draw_axes};
use crate::plots::hist::draw_error_points;
use crate::primitives::*;

/// Page size in points, 1000x700 pixels at 72 dpi.
const PAGE_WIDTH: f64 = 720.0;
const PAGE_HEIGHT: f64 = 504.0;

/// One 3x3 page of block histograms with their fitted curves.
///
/// Blocks whose fit was rejected draw the curve dashed and grey.
pub fn render_page(
    blocks: &[BlockFit],
    x_title: &str,
    config: &PlotConfig,
) -> crate::Result<String> {
    if blocks.is_empty() || blocks.len() > BLOCKS_PER_PAGE {
        return Err(crate::RenderError::Layout(format!(
            "fit page needs 1..={BLOCKS_PER_PAGE} blocks, got {}",
            blocks.len()
        )));
    }
    let mut canvas = Canvas::new(PAGE_WIDTH, PAGE_HEIGHT)?;
    let grid = GridLayout::new(
        PlotArea::manual(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT),
        3,
        3,
        (34.0, 16.0, 6.0, 22.0),
    );

    let small = FrameOpts { text_scale: 0.7, ..Default::default() };
    let title_style = TextStyle { size: config.font.size * 0.8, ..Default::default() };

    for (block, area) in blocks.iter().zip(&grid.cells) {
        let h = &block.histogram;
        let ymax = h
            .contents()
            .iter()
            .zip(h.errors())
            .map(|(c, e)| c + e)
            .fold(0.0_f64, f64::max)
            .max(1.0);
        let x_axis = Axis::linear(h.lo(), h.hi(), 4).with_label(x_title);
        let y_axis = Axis::linear(0.0, ymax * 1.05, 4).with_label("Entries");

        draw_axes(&mut canvas, area, &x_axis, &y_axis, config, small);
        canvas.text(area.left, area.top - 4.0, &block.title, &title_style);

        canvas.push_clip(area.left, area.top, area.width, area.height);
        draw_error_points(&mut canvas, area, &x_axis, &y_axis, h, Color::BLACK);
        if let Some(fit) = &block.fit {
            let style = if block.accepted {
                LineStyle::solid(Color::root(crate::color::root::RED), 1.0)
            } else {
                LineStyle::dashed(Color::rgb(128, 128, 128), 1.0)
            };
            let points: Vec<(f64, f64)> = fit
                .curve
                .iter()
                .map(|&(x, y)| {
                    (
                        x_axis.data_to_pixel(x, area.left, area.right()),
                        y_axis.data_to_pixel(y, area.bottom(), area.top),
                    )
                })
                .collect();
            canvas.polyline(&points, &style);
        }
        canvas.pop_clip();
    }

    Ok(canvas.finish_svg())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfc_stats::{FitResult, Histogram1D};

    fn block(index: usize, accepted: bool) -> BlockFit {
        let histogram =
            Histogram1D::from_values(10, 0.55, 1.3, &[0.9, 0.95, 0.97, 1.0, 1.0, 1.02]).unwrap();
        let fit = FitResult {
            parameters: vec![2.0, 0.98, 0.03, 1.5, 5.0, 1.5],
            errors: vec![0.1; 6],
            fval: 1.0,
            chi2: 1.0,
            ndf: 1,
            converged: true,
            covariance_ok: true,
            curve: vec![(0.6, 0.0), (1.0, 2.0), (1.2, 0.0)],
        };
        BlockFit {
            index,
            title: format!("E^{{gen}} = {index}.00 #pm 0.10"),
            x_mean: index as f64,
            x_sigma: 0.1,
            histogram,
            fit: Some(fit),
            accepted,
        }
    }

    #[test]
    fn page_has_one_title_per_block() {
        let blocks: Vec<BlockFit> = (0..4).map(|i| block(i, i != 2)).collect();
        let svg = render_page(&blocks, "E^{rec}/E^{gen}", &PlotConfig::default()).unwrap();
        assert_eq!(svg.matches(" ± 0.10").count(), 4);
        assert_eq!(svg.matches("stroke-dasharray=\"6 3\"").count(), 1);
    }

    #[test]
    fn page_size_limits() {
        let blocks: Vec<BlockFit> = (0..10).map(|i| block(i, true)).collect();
        assert!(render_page(&blocks, "x", &PlotConfig::default()).is_err());
        assert!(render_page(&[], "x", &PlotConfig::default()).is_err());
    }
}
