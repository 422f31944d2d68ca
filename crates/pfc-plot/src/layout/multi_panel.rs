use crate::layout::margins::PlotArea;

/// Main panel over a ratio panel sharing the x axis.
#[derive(Debug, Clone)]
pub struct MainRatioLayout {
    pub main: PlotArea,
    pub ratio: PlotArea,
}

impl MainRatioLayout {
    pub fn new(
        left: f64,
        top: f64,
        width: f64,
        total_height: f64,
        gap: f64,
        ratio_frac: f64,
    ) -> Self {
        let ratio_h = total_height * ratio_frac;
        let main_h = total_height - ratio_h - gap;

        Self {
            main: PlotArea::manual(left, top, width, main_h),
            ratio: PlotArea::manual(left, top + main_h + gap, width, ratio_h),
        }
    }
}

/// Regular grid of cells filling a rectangle row by row.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub cells: Vec<PlotArea>,
}

impl GridLayout {
    /// `cell_margin` is reserved inside every cell for tick labels and titles:
    /// (left, top, right, bottom).
    pub fn new(area: PlotArea, rows: usize, cols: usize, cell_margin: (f64, f64, f64, f64)) -> Self {
        let (ml, mt, mr, mb) = cell_margin;
        let cw = area.width / cols.max(1) as f64;
        let ch = area.height / rows.max(1) as f64;
        let cells = (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                PlotArea::manual(
                    area.left + c as f64 * cw + ml,
                    area.top + r as f64 * ch + mt,
                    (cw - ml - mr).max(10.0),
                    (ch - mt - mb).max(10.0),
                )
            })
            .collect();
        Self { cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn main_ratio_split() {
        let l = MainRatioLayout::new(50.0, 20.0, 400.0, 400.0, 4.0, 0.25);
        assert_relative_eq!(l.ratio.height, 100.0);
        assert_relative_eq!(l.main.height, 296.0);
        assert_relative_eq!(l.ratio.top, l.main.bottom() + 4.0);
    }

    #[test]
    fn grid_cells_row_major() {
        let g = GridLayout::new(PlotArea::manual(0.0, 0.0, 300.0, 300.0), 3, 3, (10.0, 5.0, 0.0, 5.0));
        assert_eq!(g.cells.len(), 9);
        assert_relative_eq!(g.cells[1].left, 110.0);
        assert_relative_eq!(g.cells[3].top, 105.0);
        assert_relative_eq!(g.cells[8].width, 90.0);
    }
}
