//! Fixed-width 1D histograms with ROOT bin numbering.
//!
//! Bin 0 is the underflow, bins `1..=nbins` are in range and `nbins + 1` is the
//! overflow, so `contents` and `sumw2` always hold `nbins + 2` values.

use crate::utils::error::{PartsError, Result};
use serde::{Deserialize, Serialize};

/// Drawing attributes carried along with a histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistStyle {
    pub color: (u8, u8, u8),
    pub line_width: u32,
    /// Fill the area under the histogram.
    pub fill: bool,
    /// Draw markers with error bars instead of a step line.
    pub markers: bool,
    /// ROOT-style draw option, e.g. `hist`, `E1`, `hist F`.
    pub draw_option: String,
}

impl Default for HistStyle {
    fn default() -> Self {
        Self {
            color: (0, 0, 0),
            line_width: 2,
            fill: false,
            markers: false,
            draw_option: "hist".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub nbins: usize,
    pub xmin: f64,
    pub xmax: f64,
    pub contents: Vec<f64>,
    #[serde(default)]
    pub sumw2: Vec<f64>,
    #[serde(default)]
    pub entries: f64,
    #[serde(default)]
    pub style: HistStyle,
}

impl Histogram1D {
    pub fn new(name: &str, title: &str, nbins: usize, xmin: f64, xmax: f64) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            nbins,
            xmin,
            xmax,
            contents: vec![0.0; nbins + 2],
            sumw2: vec![0.0; nbins + 2],
            entries: 0.0,
            style: HistStyle::default(),
        }
    }

    /// Check binning consistency after deserialization. Missing `sumw2`
    /// defaults to the contents (Poisson errors).
    pub fn validated(mut self) -> Result<Self> {
        if self.nbins == 0 || self.xmax <= self.xmin {
            return Err(PartsError::ProcessingError {
                message: format!(
                    "histogram '{}' has invalid binning ({} bins, [{}, {}])",
                    self.name, self.nbins, self.xmin, self.xmax
                ),
            });
        }
        let expected = self.nbins + 2;
        if self.contents.len() == self.nbins {
            // in-range contents only
            self.contents.insert(0, 0.0);
            self.contents.push(0.0);
        }
        if self.contents.len() != expected {
            return Err(PartsError::ProcessingError {
                message: format!(
                    "histogram '{}' has {} contents, expected {} or {}",
                    self.name,
                    self.contents.len(),
                    self.nbins,
                    expected
                ),
            });
        }
        if self.sumw2.is_empty() {
            self.sumw2 = self.contents.iter().map(|c| c.abs()).collect();
        } else if self.sumw2.len() == self.nbins {
            self.sumw2.insert(0, 0.0);
            self.sumw2.push(0.0);
        }
        if self.sumw2.len() != expected {
            return Err(PartsError::ProcessingError {
                message: format!("histogram '{}' has mismatched sumw2", self.name),
            });
        }
        if self.entries == 0.0 {
            self.entries = self.contents.iter().sum();
        }
        Ok(self)
    }

    pub fn bin_width(&self) -> f64 {
        (self.xmax - self.xmin) / self.nbins as f64
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.xmin + (bin as f64 - 1.0) * self.bin_width()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.bin_low_edge(bin) + 0.5 * self.bin_width()
    }

    /// Bin index for `x`, including the flow bins.
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.xmin {
            0
        } else if x >= self.xmax {
            self.nbins + 1
        } else {
            1 + ((x - self.xmin) / self.bin_width()) as usize
        }
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        let bin = self.find_bin(x);
        self.contents[bin] += weight;
        self.sumw2[bin] += weight * weight;
        self.entries += 1.0;
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    pub fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2.get(bin).map(|w| w.sqrt()).unwrap_or(0.0)
    }

    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(c) = self.contents.get_mut(bin) {
            *c = value;
        }
    }

    pub fn set_bin_error(&mut self, bin: usize, error: f64) {
        if let Some(w) = self.sumw2.get_mut(bin) {
            *w = error * error;
        }
    }

    /// Fold the flow bins into the first and last in-range bins.
    pub fn handle_flows(&mut self, underflow: bool, overflow: bool) {
        let n = self.nbins;
        if underflow {
            self.contents[1] += self.contents[0];
            self.sumw2[1] += self.sumw2[0];
            self.contents[0] = 0.0;
            self.sumw2[0] = 0.0;
        }
        if overflow {
            self.contents[n] += self.contents[n + 1];
            self.sumw2[n] += self.sumw2[n + 1];
            self.contents[n + 1] = 0.0;
            self.sumw2[n + 1] = 0.0;
        }
    }

    /// Bin-by-bin ratio with uncorrelated errors. Bins with an empty
    /// denominator are zero.
    pub fn divide(&self, den: &Histogram1D) -> Result<Histogram1D> {
        if self.nbins != den.nbins || self.xmin != den.xmin || self.xmax != den.xmax {
            return Err(PartsError::ProcessingError {
                message: format!(
                    "cannot divide '{}' by '{}': different binning",
                    self.name, den.name
                ),
            });
        }

        let mut ratio = self.clone();
        for bin in 0..self.nbins + 2 {
            let (a, b) = (self.contents[bin], den.contents[bin]);
            if b == 0.0 {
                ratio.contents[bin] = 0.0;
                ratio.sumw2[bin] = 0.0;
            } else {
                let (ea2, eb2) = (self.sumw2[bin], den.sumw2[bin]);
                ratio.contents[bin] = a / b;
                ratio.sumw2[bin] = (ea2 * b * b + eb2 * a * a) / (b * b * b * b);
            }
        }
        Ok(ratio)
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.integral_bins(1, self.nbins)
    }

    /// Sum of contents over bins `first..=last`, clamped to the histogram.
    pub fn integral_bins(&self, first: usize, last: usize) -> f64 {
        let last = last.min(self.nbins + 1);
        if first > last {
            return 0.0;
        }
        self.contents[first..=last].iter().sum()
    }

    fn moments(&self) -> (f64, f64, f64) {
        (1..=self.nbins).fold((0.0, 0.0, 0.0), |(sw, swx, swx2), bin| {
            let w = self.contents[bin];
            let x = self.bin_center(bin);
            (sw + w, swx + w * x, swx2 + w * x * x)
        })
    }

    pub fn mean(&self) -> f64 {
        let (sw, swx, _) = self.moments();
        if sw == 0.0 {
            0.0
        } else {
            swx / sw
        }
    }

    pub fn std_dev(&self) -> f64 {
        let (sw, swx, swx2) = self.moments();
        if sw == 0.0 {
            return 0.0;
        }
        let mean = swx / sw;
        (swx2 / sw - mean * mean).max(0.0).sqrt()
    }

    pub fn maximum(&self) -> f64 {
        self.contents[1..=self.nbins]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn minimum(&self) -> f64 {
        self.contents[1..=self.nbins]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    /// x below which a fraction `q` of the in-range content lies,
    /// interpolating linearly inside the bin.
    pub fn quantile(&self, q: f64) -> f64 {
        let total = self.integral();
        if total <= 0.0 {
            return self.xmin;
        }
        let target = q.clamp(0.0, 1.0) * total;
        let mut cumulative = 0.0;
        for bin in 1..=self.nbins {
            let content = self.contents[bin];
            if content > 0.0 && cumulative + content >= target {
                let frac = (target - cumulative) / content;
                return self.bin_low_edge(bin) + frac * self.bin_width();
            }
            cumulative += content;
        }
        self.xmax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> Histogram1D {
        let mut h = Histogram1D::new("h", "Amplitude", 4, 0.0, 4.0);
        for x in [-1.0, 0.5, 1.5, 1.5, 2.5, 3.5, 9.0, 9.0] {
            h.fill(x);
        }
        h
    }

    #[test]
    fn test_find_bin_and_flows() {
        let h = filled();
        assert_eq!(h.find_bin(-0.1), 0);
        assert_eq!(h.find_bin(0.0), 1);
        assert_eq!(h.find_bin(3.99), 4);
        assert_eq!(h.find_bin(4.0), 5);
        assert_eq!(h.bin_content(0), 1.0);
        assert_eq!(h.bin_content(5), 2.0);
        assert_eq!(h.entries, 8.0);
    }

    #[test]
    fn test_handle_flows() {
        let mut h = filled();
        h.handle_flows(true, true);
        assert_eq!(h.bin_content(0), 0.0);
        assert_eq!(h.bin_content(1), 2.0);
        assert_eq!(h.bin_content(4), 3.0);
        assert_eq!(h.bin_content(5), 0.0);
        assert_eq!(h.bin_error(5), 0.0);
        assert!((h.bin_error(4) - 3f64.sqrt()).abs() < 1e-12);

        let mut only_under = filled();
        only_under.handle_flows(true, false);
        assert_eq!(only_under.bin_content(5), 2.0);
    }

    #[test]
    fn test_statistics() {
        let h = filled();
        assert_eq!(h.integral(), 5.0);
        assert_eq!(h.integral_bins(2, 2), 2.0);
        assert!((h.mean() - 1.9).abs() < 1e-12);
        assert_eq!(h.maximum(), 2.0);
        assert_eq!(h.minimum(), 1.0);
        assert!(h.std_dev() > 0.0);
        assert!((h.quantile(0.5) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_divide_propagates_errors() {
        let mut num = Histogram1D::new("num", "", 2, 0.0, 2.0);
        let mut den = Histogram1D::new("den", "", 2, 0.0, 2.0);
        num.set_bin_content(1, 4.0);
        num.set_bin_error(1, 2.0);
        den.set_bin_content(1, 2.0);
        den.set_bin_error(1, 1.0);

        let ratio = num.divide(&den).unwrap();
        assert_eq!(ratio.bin_content(1), 2.0);
        // sqrt((4*4 + 1*16) / 16)
        assert!((ratio.bin_error(1) - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(ratio.bin_content(2), 0.0);

        let other = Histogram1D::new("other", "", 3, 0.0, 2.0);
        assert!(num.divide(&other).is_err());
    }

    #[test]
    fn test_validated_pads_in_range_contents() {
        let h = Histogram1D {
            contents: vec![1.0, 2.0, 3.0],
            ..Histogram1D::new("h", "", 3, 0.0, 3.0)
        };
        let h = Histogram1D {
            sumw2: Vec::new(),
            ..h
        }
        .validated()
        .unwrap();
        assert_eq!(h.contents, vec![0.0, 1.0, 2.0, 3.0, 0.0]);
        assert_eq!(h.sumw2, h.contents);
        assert_eq!(h.entries, 6.0);
    }
}
