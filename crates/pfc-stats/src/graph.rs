//! Graphs with symmetric errors

use pfc_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub x: f64,
    pub y: f64,
    pub ex: f64,
    pub ey: f64,
}

/// Ordered set of points with x and y errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphErrors {
    points: Vec<GraphPoint>,
}

impl GraphErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64, y: f64, ex: f64, ey: f64) {
        self.points.push(GraphPoint { x, y, ex, ey });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[GraphPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphPoint> {
        self.points.iter()
    }

    /// Range of point x values (errors not included).
    pub fn x_range(&self) -> Option<(f64, f64)> {
        range(self.points.iter().map(|p| p.x))
    }

    /// Range of point y values (errors not included).
    pub fn y_range(&self) -> Option<(f64, f64)> {
        range(self.points.iter().map(|p| p.y))
    }

    /// Keep only points whose x lies in `[lo, hi]`.
    pub fn clipped_x(&self, lo: f64, hi: f64) -> Self {
        Self { points: self.points.iter().filter(|p| p.x >= lo && p.x <= hi).copied().collect() }
    }
}

impl FromIterator<GraphPoint> for GraphErrors {
    fn from_iter<I: IntoIterator<Item = GraphPoint>>(iter: I) -> Self {
        Self { points: iter.into_iter().collect() }
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Combined range of several graphs.
pub fn joint_range<'a>(
    graphs: impl IntoIterator<Item = &'a GraphErrors>,
) -> Option<((f64, f64), (f64, f64))> {
    let mut out: Option<((f64, f64), (f64, f64))> = None;
    for g in graphs {
        let (Some(xr), Some(yr)) = (g.x_range(), g.y_range()) else { continue };
        out = Some(match out {
            None => (xr, yr),
            Some((ox, oy)) => ((ox.0.min(xr.0), ox.1.max(xr.1)), (oy.0.min(yr.0), oy.1.max(yr.1))),
        });
    }
    out
}

/// Reference y and ey at `x`: linear between the bracketing points
/// `x1 <= x < x2`, clamped to the end points outside the covered range.
fn interpolate(reference: &[GraphPoint], x: f64) -> (f64, f64) {
    for w in reference.windows(2) {
        let (p1, p2) = (w[0], w[1]);
        if p1.x <= x && x < p2.x {
            let t = (x - p1.x) / (p2.x - p1.x);
            return (p1.y + t * (p2.y - p1.y), p1.ey + t * (p2.ey - p1.ey));
        }
    }
    let edge = if x < reference[0].x { reference[0] } else { reference[reference.len() - 1] };
    (edge.y, edge.ey)
}

/// Ratio of a corrected graph to an uncorrected reference.
///
/// The points of the two graphs need not share x positions: the reference is
/// interpolated at every corrected point. Relative errors add in quadrature.
pub fn ratio_to_reference(corrected: &GraphErrors, uncorrected: &GraphErrors) -> Result<GraphErrors> {
    if uncorrected.is_empty() {
        return Err(Error::Validation("ratio_to_reference: empty reference graph".to_string()));
    }
    let reference = uncorrected.points();
    Ok(corrected
        .iter()
        .map(|p| {
            let (y2, ey2) = interpolate(reference, p.x);
            let r = p.y / y2;
            let er = r * ((p.ey / p.y).powi(2) + (ey2 / y2).powi(2)).sqrt();
            GraphPoint { x: p.x, y: r, ex: p.ex, ey: er }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn graph(points: &[(f64, f64, f64)]) -> GraphErrors {
        let mut g = GraphErrors::new();
        for &(x, y, ey) in points {
            g.push(x, y, 0.1, ey);
        }
        g
    }

    #[test]
    fn ranges() {
        let g = graph(&[(1.0, 5.0, 0.1), (-2.0, 7.0, 0.1), (3.0, 4.0, 0.1)]);
        assert_eq!(g.x_range(), Some((-2.0, 3.0)));
        assert_eq!(g.y_range(), Some((4.0, 7.0)));
        assert_eq!(GraphErrors::new().x_range(), None);
        let h = graph(&[(10.0, 1.0, 0.1)]);
        assert_eq!(joint_range([&g, &h]), Some(((-2.0, 10.0), (1.0, 7.0))));
        assert_eq!(g.clipped_x(0.0, 2.0).len(), 1);
    }

    #[test]
    fn ratio_interpolates_reference() {
        let unc = graph(&[(0.0, 1.0, 0.1), (2.0, 3.0, 0.3)]);
        let cor = graph(&[(1.0, 1.0, 0.1)]);
        let r = ratio_to_reference(&cor, &unc).unwrap();
        let p = r.points()[0];
        // reference at x=1 is y=2, ey=0.2
        assert_relative_eq!(p.y, 0.5);
        assert_relative_eq!(p.ey, 0.5 * (0.01f64 + 0.01).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(p.ex, 0.1);
    }

    #[test]
    fn ratio_clamps_outside_reference() {
        let unc = graph(&[(1.0, 2.0, 0.2), (2.0, 4.0, 0.4)]);
        let cor = graph(&[(0.0, 1.0, 0.0), (2.0, 2.0, 0.0), (5.0, 8.0, 0.0)]);
        let r = ratio_to_reference(&cor, &unc).unwrap();
        let ys: Vec<f64> = r.iter().map(|p| p.y).collect();
        // x=2 is not inside [1, 2) so it takes the last reference point
        assert_eq!(ys, vec![0.5, 0.5, 2.0]);
    }

    #[test]
    fn ratio_needs_reference() {
        let cor = graph(&[(0.0, 1.0, 0.0)]);
        assert!(ratio_to_reference(&cor, &GraphErrors::new()).is_err());
    }
}
