use crate::canvas::Canvas;
use crate::config::PlotConfig;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

/// Experiment label (**CMS** *Simulation*) above the top-left corner and an
/// optional title right-aligned above the frame.
pub fn draw_header(canvas: &mut Canvas, area: &PlotArea, config: &PlotConfig, title: &str) {
    let header_size = config.font.label_size * 1.2;
    let y = area.top - 6.0;

    if !config.experiment.name.is_empty() {
        let bold = TextStyle { size: header_size, bold: true, ..Default::default() };
        canvas.text(area.left, y, &config.experiment.name, &bold);
        let name_w = canvas.measure_text(&config.experiment.name, &bold).width;

        if !config.experiment.status.is_empty() {
            let italic = TextStyle { size: header_size * 0.85, italic: true, ..Default::default() };
            canvas.text(area.left + name_w + 5.0, y, &config.experiment.status, &italic);
        }
    }

    if !title.is_empty() {
        let style = TextStyle {
            size: config.font.size,
            anchor: TextAnchor::End,
            ..Default::default()
        };
        canvas.text(area.right(), y, title, &style);
    }
}
