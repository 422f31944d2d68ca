//! Detector regions, cluster-size classes and evaluation categories

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// |eta| boundary between the ECAL barrel and the endcaps.
pub const BARREL_ETA_MAX: f64 = 1.479;

/// ECAL partition a cluster was reconstructed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Detector {
    /// ECAL barrel (`EB`)
    #[serde(rename = "EB")]
    Barrel,
    /// ECAL endcaps (`EE`)
    #[serde(rename = "EE")]
    Endcap,
}

impl Detector {
    /// Both partitions, barrel first.
    pub const ALL: [Detector; 2] = [Detector::Barrel, Detector::Endcap];

    /// Exclusive assignment of a cluster to a partition.
    pub fn of(pf_eta: f64) -> Self {
        if pf_eta.abs() < BARREL_ETA_MAX { Detector::Barrel } else { Detector::Endcap }
    }

    /// Analysis filter on reconstructed eta.
    ///
    /// A cluster sitting exactly on the boundary passes both filters.
    pub fn accepts(self, pf_eta: f64) -> bool {
        match self {
            Detector::Barrel => pf_eta.abs() <= BARREL_ETA_MAX,
            Detector::Endcap => pf_eta.abs() >= BARREL_ETA_MAX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Detector::Barrel => "EB",
            Detector::Endcap => "EE",
        }
    }

    /// Selection expression used for training datasets.
    pub fn training_cut(self) -> String {
        match self {
            Detector::Barrel => format!("abs(pfEta) < {BARREL_ETA_MAX}"),
            Detector::Endcap => format!("abs(pfEta) > {BARREL_ETA_MAX}"),
        }
    }

    pub fn is_endcap(self) -> bool {
        self == Detector::Endcap
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Detector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EB" | "BARREL" => Ok(Detector::Barrel),
            "EE" | "ENDCAP" | "ENDCAPS" => Ok(Detector::Endcap),
            other => Err(Error::Validation(format!("unknown detector '{other}', expected EB or EE"))),
        }
    }
}

/// Cluster size class (`pfSize5x5_ZS`) a regression is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PfSizeClass {
    One,
    Two,
    ThreePlus,
}

impl PfSizeClass {
    pub const ALL: [PfSizeClass; 3] = [PfSizeClass::One, PfSizeClass::Two, PfSizeClass::ThreePlus];

    pub fn of(pf_size: i64) -> Result<Self> {
        match pf_size {
            i64::MIN..=0 => Err(Error::Validation(format!("pfSize5x5_ZS <= 0 ({pf_size})"))),
            1 => Ok(PfSizeClass::One),
            2 => Ok(PfSizeClass::Two),
            _ => Ok(PfSizeClass::ThreePlus),
        }
    }

    /// Number used in model names (`pfSize1`, `pfSize2`, `pfSize3`).
    pub fn number(self) -> u32 {
        match self {
            PfSizeClass::One => 1,
            PfSizeClass::Two => 2,
            PfSizeClass::ThreePlus => 3,
        }
    }

    pub fn from_number(n: i64) -> Self {
        match n {
            1 => PfSizeClass::One,
            2 => PfSizeClass::Two,
            _ => PfSizeClass::ThreePlus,
        }
    }

    pub fn selection(self) -> &'static str {
        match self {
            PfSizeClass::One => "pfSize5x5_ZS == 1",
            PfSizeClass::Two => "pfSize5x5_ZS == 2",
            PfSizeClass::ThreePlus => "pfSize5x5_ZS >= 3",
        }
    }

    /// Size 1 and 2 clusters regress four parameters, larger ones five.
    pub fn has_power_tail(self) -> bool {
        self == PfSizeClass::ThreePlus
    }
}

/// Half-open `[min, max)` window on reconstructed pT; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PtWindow {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PtWindow {
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub const fn unbounded() -> Self {
        Self { min: None, max: None }
    }

    pub fn contains(&self, pt: f64) -> bool {
        self.min.is_none_or(|lo| pt >= lo) && self.max.is_none_or(|hi| pt < hi)
    }

    /// Selection clauses; a zero lower bound adds no cut.
    pub fn selection(&self) -> Vec<String> {
        let mut cuts = Vec::new();
        if let Some(lo) = self.min
            && lo > 0.0
        {
            cuts.push(format!("pfPt >= {lo}"));
        }
        if let Some(hi) = self.max
            && hi > 0.0
        {
            cuts.push(format!("pfPt < {hi}"));
        }
        cuts
    }

    /// Model-name suffix (`_ptMin4.0_ptMax20.0`).
    pub fn name_suffix(&self) -> String {
        let mut s = String::new();
        if let Some(lo) = self.min {
            s.push_str(&format!("_ptMin{lo:.1}"));
        }
        if let Some(hi) = self.max {
            s.push_str(&format!("_ptMax{hi:.1}"));
        }
        s
    }
}

/// Regression slot an event is evaluated with.
///
/// Slots 0 and 1 are the size-1 and size-2 regressions; slots 2..=4 are the
/// size-3+ regressions of increasing pT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category(u8);

impl Category {
    pub const COUNT: usize = 5;

    pub fn of(pf_size: i64, pf_pt: f64) -> Result<Self> {
        let slot = match PfSizeClass::of(pf_size)? {
            PfSizeClass::One => 0,
            PfSizeClass::Two => 1,
            PfSizeClass::ThreePlus => {
                if pf_pt >= 18.0 {
                    4
                } else if pf_pt >= 4.5 {
                    3
                } else {
                    2
                }
            }
        };
        Ok(Category(slot))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(i: usize) -> Result<Self> {
        if i < Self::COUNT {
            Ok(Category(i as u8))
        } else {
            Err(Error::Validation(format!("category index {i} out of range")))
        }
    }

    pub fn size_class(self) -> PfSizeClass {
        match self.0 {
            0 => PfSizeClass::One,
            1 => PfSizeClass::Two,
            _ => PfSizeClass::ThreePlus,
        }
    }

    /// pT window of the regression trained for this slot.
    pub fn training_window(self) -> PtWindow {
        match self.0 {
            2 => PtWindow::new(Some(0.0), Some(5.0)),
            3 => PtWindow::new(Some(4.0), Some(20.0)),
            4 => PtWindow::new(Some(16.0), None),
            _ => PtWindow::unbounded(),
        }
    }

    pub fn all() -> impl Iterator<Item = Category> {
        (0..Self::COUNT as u8).map(Category)
    }
}
