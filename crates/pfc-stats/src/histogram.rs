//! Fixed-binning 1D histogram

use pfc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One-dimensional histogram with uniform binning over `[lo, hi)`.
///
/// Keeps per-bin sums of weights and squared weights so that scaled or
/// weighted histograms still carry correct statistical errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    nbins: usize,
    lo: f64,
    hi: f64,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram1D {
    pub fn new(nbins: usize, lo: f64, hi: f64) -> Result<Self> {
        if nbins == 0 {
            return Err(Error::Validation("histogram needs at least one bin".to_string()));
        }
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(Error::Validation(format!("invalid histogram range [{lo}, {hi})")));
        }
        Ok(Self {
            nbins,
            lo,
            hi,
            contents: vec![0.0; nbins],
            sumw2: vec![0.0; nbins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        })
    }

    /// Build and fill in one go.
    pub fn from_values(nbins: usize, lo: f64, hi: f64, values: &[f64]) -> Result<Self> {
        let mut h = Self::new(nbins, lo, hi)?;
        for &v in values {
            h.fill(v);
        }
        Ok(h)
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn lo(&self) -> f64 {
        self.lo
    }

    pub fn hi(&self) -> f64 {
        self.hi
    }

    pub fn bin_width(&self) -> f64 {
        (self.hi - self.lo) / self.nbins as f64
    }

    /// Centre of bin `i` (0-based).
    pub fn bin_center(&self, i: usize) -> f64 {
        self.lo + (i as f64 + 0.5) * self.bin_width()
    }

    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.lo + i as f64 * self.bin_width()
    }

    /// In-range bin holding `x`, `None` for under/overflow.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.lo && x < self.hi) {
            return None;
        }
        let i = ((x - self.lo) / self.bin_width()) as usize;
        Some(i.min(self.nbins - 1))
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        if x.is_nan() {
            return;
        }
        self.entries += 1;
        match self.find_bin(x) {
            Some(i) => {
                self.contents[i] += w;
                self.sumw2[i] += w * w;
            }
            None if x < self.lo => self.underflow += w,
            None => self.overflow += w,
        }
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn content(&self, i: usize) -> f64 {
        self.contents.get(i).copied().unwrap_or(0.0)
    }

    /// Statistical error of bin `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.sumw2.get(i).map_or(0.0, |w2| w2.sqrt())
    }

    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|w2| w2.sqrt()).collect()
    }

    /// Overwrite a bin; its error becomes `sqrt(|content|)`.
    pub fn set_bin_content(&mut self, i: usize, value: f64) -> Result<()> {
        if i >= self.nbins {
            return Err(Error::Validation(format!("bin {i} out of range (nbins={})", self.nbins)));
        }
        self.contents[i] = value;
        self.sumw2[i] = value.abs();
        Ok(())
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Largest bin content (0 for an empty histogram).
    pub fn maximum(&self) -> f64 {
        self.contents.iter().copied().fold(0.0, f64::max)
    }

    /// Smallest strictly positive bin content, used for log-scale frames.
    pub fn minimum_positive(&self) -> Option<f64> {
        self.contents.iter().copied().filter(|&c| c > 0.0).reduce(f64::min)
    }

    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.contents {
            *c *= factor;
        }
        for w2 in &mut self.sumw2 {
            *w2 *= factor * factor;
        }
        self.underflow *= factor;
        self.overflow *= factor;
    }

    /// Scale to unit area per entry (`1/N`), no-op for an empty histogram.
    pub fn normalize_by_entries(&mut self) {
        if self.entries > 0 {
            self.scale(1.0 / self.entries as f64);
        }
    }

    /// Merge groups of `k` adjacent bins.
    ///
    /// When `k` does not divide the number of bins the trailing partial group
    /// is moved into the overflow and the upper edge shrinks accordingly.
    pub fn rebin(&self, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Validation("rebin factor must be >= 1".to_string()));
        }
        let nbins = self.nbins / k;
        if nbins == 0 {
            return Err(Error::Validation(format!(
                "rebin factor {k} exceeds number of bins {}",
                self.nbins
            )));
        }
        let width = self.bin_width() * k as f64;
        let mut out = Self::new(nbins, self.lo, self.lo + width * nbins as f64)?;
        for i in 0..nbins {
            let group = i * k..(i + 1) * k;
            out.contents[i] = self.contents[group.clone()].iter().sum();
            out.sumw2[i] = self.sumw2[group].iter().sum();
        }
        out.underflow = self.underflow;
        out.overflow = self.overflow + self.contents[nbins * k..].iter().sum::<f64>();
        out.entries = self.entries;
        Ok(out)
    }

    /// Add another histogram with identical binning.
    pub fn add(&mut self, other: &Histogram1D, factor: f64) -> Result<()> {
        if self.nbins != other.nbins || self.lo != other.lo || self.hi != other.hi {
            return Err(Error::Validation(format!(
                "incompatible binning: ({}, {}, {}) vs ({}, {}, {})",
                self.nbins, self.lo, self.hi, other.nbins, other.lo, other.hi
            )));
        }
        for i in 0..self.nbins {
            self.contents[i] += factor * other.contents[i];
            self.sumw2[i] += factor * factor * other.sumw2[i];
        }
        self.underflow += factor * other.underflow;
        self.overflow += factor * other.overflow;
        self.entries += other.entries;
        Ok(())
    }

    /// Mean of the in-range contents, weighted by bin centre.
    pub fn mean(&self) -> f64 {
        let sw = self.integral();
        if sw == 0.0 {
            return 0.0;
        }
        (0..self.nbins).map(|i| self.contents[i] * self.bin_center(i)).sum::<f64>() / sw
    }

    /// Cumulative sums of the in-range contents.
    pub fn cumulative(&self) -> Vec<f64> {
        self.contents
            .iter()
            .scan(0.0, |acc, &c| {
                *acc += c;
                Some(*acc)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn binning_and_flows() {
        let mut h = Histogram1D::new(10, 0.0, 1.0).unwrap();
        for x in [-0.1, 0.0, 0.05, 0.15, 0.999, 1.0, 2.0] {
            h.fill(x);
        }
        assert_eq!(h.entries(), 7);
        assert_relative_eq!(h.underflow(), 1.0);
        assert_relative_eq!(h.overflow(), 2.0);
        assert_relative_eq!(h.content(0), 2.0);
        assert_relative_eq!(h.content(1), 1.0);
        assert_relative_eq!(h.content(9), 1.0);
        assert_relative_eq!(h.integral(), 4.0);
        assert_relative_eq!(h.bin_center(0), 0.05);
        assert_relative_eq!(h.bin_width(), 0.1);
        assert_eq!(h.find_bin(0.55), Some(5));
        assert_eq!(h.find_bin(1.0), None);
    }

    #[test]
    fn nan_is_ignored() {
        let mut h = Histogram1D::new(4, 0.0, 4.0).unwrap();
        h.fill(f64::NAN);
        assert_eq!(h.entries(), 0);
    }

    #[test]
    fn weighted_errors_and_scale() {
        let mut h = Histogram1D::new(2, 0.0, 2.0).unwrap();
        h.fill_weighted(0.5, 2.0);
        h.fill_weighted(0.5, 1.0);
        assert_relative_eq!(h.content(0), 3.0);
        assert_relative_eq!(h.error(0), 5.0_f64.sqrt());
        h.scale(0.5);
        assert_relative_eq!(h.content(0), 1.5);
        assert_relative_eq!(h.error(0), 0.5 * 5.0_f64.sqrt());
    }

    #[test]
    fn normalize_by_entries_includes_flows() {
        let mut h = Histogram1D::from_values(2, 0.0, 2.0, &[0.5, 1.5, 1.5, 7.0]).unwrap();
        h.normalize_by_entries();
        assert_relative_eq!(h.content(1), 0.5);
        assert_relative_eq!(h.integral(), 0.75);
    }

    #[test]
    fn rebin_drops_partial_group_into_overflow() {
        let values: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
        let h = Histogram1D::from_values(10, 0.0, 10.0, &values).unwrap();
        let r = h.rebin(4).unwrap();
        assert_eq!(r.nbins(), 2);
        assert_relative_eq!(r.hi(), 8.0);
        assert_relative_eq!(r.content(0), 4.0);
        assert_relative_eq!(r.content(1), 4.0);
        assert_relative_eq!(r.overflow(), 2.0);
        assert_relative_eq!(r.error(1), 2.0);
        assert!(h.rebin(0).is_err());
        assert!(h.rebin(11).is_err());
    }

    #[test]
    fn add_requires_same_binning() {
        let mut a = Histogram1D::from_values(2, 0.0, 2.0, &[0.5]).unwrap();
        let b = Histogram1D::from_values(2, 0.0, 2.0, &[0.5, 1.5]).unwrap();
        a.add(&b, 2.0).unwrap();
        assert_relative_eq!(a.content(0), 3.0);
        assert_relative_eq!(a.content(1), 2.0);
        assert_relative_eq!(a.error(0), 5.0_f64.sqrt());
        let c = Histogram1D::new(3, 0.0, 2.0).unwrap();
        assert!(a.add(&c, 1.0).is_err());
    }

    #[test]
    fn maximum_mean_cumulative() {
        let h = Histogram1D::from_values(4, 0.0, 4.0, &[0.5, 1.5, 1.5, 3.5]).unwrap();
        assert_relative_eq!(h.maximum(), 2.0);
        assert_relative_eq!(h.mean(), (0.5 + 3.0 + 3.5) / 4.0);
        assert_eq!(h.cumulative(), vec![1.0, 3.0, 3.0, 4.0]);
        assert_eq!(h.minimum_positive(), Some(1.0));
    }

    #[test]
    fn serde_roundtrip() {
        let h = Histogram1D::from_values(3, -1.0, 2.0, &[0.0, 0.1]).unwrap();
        let s = serde_json::to_string(&h).unwrap();
        let back: Histogram1D = serde_json::from_str(&s).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn invalid_construction() {
        assert!(Histogram1D::new(0, 0.0, 1.0).is_err());
        assert!(Histogram1D::new(5, 1.0, 1.0).is_err());
        let mut h = Histogram1D::new(5, 0.0, 1.0).unwrap();
        assert!(h.set_bin_content(5, 1.0).is_err());
        h.set_bin_content(2, 4.0).unwrap();
        assert_relative_eq!(h.error(2), 2.0);
    }
}
