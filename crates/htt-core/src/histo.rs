//! Fixed-binning 1D/2D histograms and a named histogram set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Uniform binning along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Number of bins (excluding under/overflow).
    pub n_bins: usize,
    /// Lower edge of first bin.
    pub min: f64,
    /// Upper edge of last bin.
    pub max: f64,
}

impl Axis {
    /// Validated axis.
    pub fn new(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        if n_bins == 0 || !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::Validation(format!(
                "invalid axis (n_bins={n_bins}, min={min}, max={max})"
            )));
        }
        Ok(Self { n_bins, min, max })
    }

    /// Slot index including flows: 0 = underflow, `n_bins + 1` = overflow.
    pub fn slot(&self, x: f64) -> usize {
        if x < self.min {
            return 0;
        }
        if x >= self.max || x.is_nan() {
            return self.n_bins + 1;
        }
        let width = (self.max - self.min) / self.n_bins as f64;
        let bin = ((x - self.min) / width) as usize;
        bin.min(self.n_bins - 1) + 1
    }

    /// Bin edges (length = n_bins + 1).
    pub fn edges(&self) -> Vec<f64> {
        let width = (self.max - self.min) / self.n_bins as f64;
        (0..=self.n_bins).map(|i| self.min + width * i as f64).collect()
    }
}

/// 1D histogram with flow slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    /// Binning.
    pub axis: Axis,
    /// Sum of weights per slot (length = n_bins + 2, slot 0 is underflow).
    pub content: Vec<f64>,
    /// Sum of weights squared per slot.
    pub sumw2: Vec<f64>,
    /// Number of fill calls.
    pub entries: u64,
}

impl Hist1D {
    /// Empty histogram.
    pub fn new(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        let axis = Axis::new(n_bins, min, max)?;
        Ok(Self { content: vec![0.0; n_bins + 2], sumw2: vec![0.0; n_bins + 2], axis, entries: 0 })
    }

    /// Add `weight` at `x`.
    pub fn fill(&mut self, x: f64, weight: f64) {
        let s = self.axis.slot(x);
        self.content[s] += weight;
        self.sumw2[s] += weight * weight;
        self.entries += 1;
    }

    /// Content of in-range bin `i` (0-based).
    pub fn bin_content(&self, i: usize) -> f64 {
        self.content[i + 1]
    }

    /// Underflow content.
    pub fn underflow(&self) -> f64 {
        self.content[0]
    }

    /// Overflow content.
    pub fn overflow(&self) -> f64 {
        self.content[self.axis.n_bins + 1]
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.content[1..=self.axis.n_bins].iter().sum()
    }
}

/// 2D histogram with flow slots on both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    /// x binning.
    pub x_axis: Axis,
    /// y binning.
    pub y_axis: Axis,
    /// Row-major sum of weights: `(nx + 2) * (ny + 2)`, x slot major.
    pub content: Vec<f64>,
    /// Sum of weights squared per slot.
    pub sumw2: Vec<f64>,
    /// Number of fill calls.
    pub entries: u64,
}

impl Hist2D {
    /// Empty histogram.
    pub fn new(
        nx: usize,
        x_min: f64,
        x_max: f64,
        ny: usize,
        y_min: f64,
        y_max: f64,
    ) -> Result<Self> {
        let x_axis = Axis::new(nx, x_min, x_max)?;
        let y_axis = Axis::new(ny, y_min, y_max)?;
        let n = (nx + 2) * (ny + 2);
        Ok(Self { x_axis, y_axis, content: vec![0.0; n], sumw2: vec![0.0; n], entries: 0 })
    }

    fn index(&self, sx: usize, sy: usize) -> usize {
        sx * (self.y_axis.n_bins + 2) + sy
    }

    /// Add `weight` at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, weight: f64) {
        let idx = self.index(self.x_axis.slot(x), self.y_axis.slot(y));
        self.content[idx] += weight;
        self.sumw2[idx] += weight * weight;
        self.entries += 1;
    }

    /// Content of in-range bin `(i, j)` (0-based).
    pub fn bin_content(&self, i: usize, j: usize) -> f64 {
        self.content[self.index(i + 1, j + 1)]
    }
}

/// A named histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Histo {
    /// One-dimensional.
    H1(Hist1D),
    /// Two-dimensional.
    H2(Hist2D),
}

/// Histograms booked by one module, grouped under a directory name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoSet {
    /// Directory name in the output.
    pub directory: String,
    /// Histograms by name.
    pub histos: BTreeMap<String, Histo>,
}

impl HistoSet {
    /// Empty set under `directory`.
    pub fn new(directory: impl Into<String>) -> Self {
        Self { directory: directory.into(), histos: BTreeMap::new() }
    }

    /// Book a 1D histogram, replacing any with the same name.
    pub fn create_1d(&mut self, name: &str, n_bins: usize, min: f64, max: f64) -> Result<()> {
        self.histos.insert(name.to_string(), Histo::H1(Hist1D::new(n_bins, min, max)?));
        Ok(())
    }

    /// Book a 2D histogram, replacing any with the same name.
    #[allow(clippy::too_many_arguments)]
    pub fn create_2d(
        &mut self,
        name: &str,
        nx: usize,
        x_min: f64,
        x_max: f64,
        ny: usize,
        y_min: f64,
        y_max: f64,
    ) -> Result<()> {
        self.histos
            .insert(name.to_string(), Histo::H2(Hist2D::new(nx, x_min, x_max, ny, y_min, y_max)?));
        Ok(())
    }

    /// Fill a booked 1D histogram.
    pub fn fill_1d(&mut self, name: &str, x: f64, weight: f64) -> Result<()> {
        match self.histos.get_mut(name) {
            Some(Histo::H1(h)) => {
                h.fill(x, weight);
                Ok(())
            }
            _ => Err(not_booked(&self.directory, name, "1D")),
        }
    }

    /// Fill a booked 2D histogram.
    pub fn fill_2d(&mut self, name: &str, x: f64, y: f64, weight: f64) -> Result<()> {
        match self.histos.get_mut(name) {
            Some(Histo::H2(h)) => {
                h.fill(x, y, weight);
                Ok(())
            }
            _ => Err(not_booked(&self.directory, name, "2D")),
        }
    }

    /// Borrow a 1D histogram.
    pub fn get_1d(&self, name: &str) -> Option<&Hist1D> {
        match self.histos.get(name) {
            Some(Histo::H1(h)) => Some(h),
            _ => None,
        }
    }

    /// Borrow a 2D histogram.
    pub fn get_2d(&self, name: &str) -> Option<&Hist2D> {
        match self.histos.get(name) {
            Some(Histo::H2(h)) => Some(h),
            _ => None,
        }
    }
}

fn not_booked(directory: &str, name: &str, dim: &str) -> Error {
    Error::Validation(format!("no {dim} histogram '{name}' booked in '{directory}'"))
}
