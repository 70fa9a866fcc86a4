//! Jet energy-scale uncertainty tables.
//!
//! Reads the plain-text uncertainty format: an optional `{...}` header line,
//! then one line per eta bin of the form
//! `eta_min eta_max 3n pt_1 up_1 down_1 ... pt_n up_n down_n`.

use std::path::Path;

use htt_core::{Error, Result};

/// Uncertainty points for one eta bin.
#[derive(Debug, Clone, PartialEq)]
pub struct EtaBin {
    /// Lower eta edge.
    pub eta_min: f64,
    /// Upper eta edge.
    pub eta_max: f64,
    /// `(pt, up, down)` points, sorted by pt.
    pub points: Vec<(f64, f64, f64)>,
}

/// Relative JES uncertainty as a function of (pt, eta).
#[derive(Debug, Clone, PartialEq)]
pub struct JetCorrectionUncertainty {
    bins: Vec<EtaBin>,
}

impl JetCorrectionUncertainty {
    /// Build from explicit bins.
    pub fn from_bins(mut bins: Vec<EtaBin>) -> Result<Self> {
        if bins.is_empty() {
            return Err(Error::Config("uncertainty table has no eta bins".into()));
        }
        for b in &mut bins {
            if b.points.is_empty() {
                return Err(Error::Config(format!(
                    "eta bin [{}, {}) has no points",
                    b.eta_min, b.eta_max
                )));
            }
            b.points.sort_by(|x, y| x.0.total_cmp(&y.0));
        }
        bins.sort_by(|a, b| a.eta_min.total_cmp(&b.eta_min));
        Ok(Self { bins })
    }

    /// Parse the text format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut bins = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('{') || line.starts_with('#') {
                continue;
            }
            let values = line
                .split_whitespace()
                .map(|t| {
                    t.parse::<f64>().map_err(|e| {
                        Error::Config(format!("line {}: invalid number '{t}': {e}", lineno + 1))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if values.len() < 3 {
                return Err(Error::Config(format!("line {}: too few columns", lineno + 1)));
            }
            let count = values[2];
            let integral = count.is_finite() && count.fract() == 0.0;
            if !integral || count < 0.0 || count > f64::from(u32::MAX) {
                return Err(Error::Config(format!(
                    "line {}: invalid value count {count}",
                    lineno + 1
                )));
            }
            let n = count as usize;
            if n % 3 != 0 || n.checked_add(3) != Some(values.len()) {
                return Err(Error::Config(format!(
                    "line {}: expected {} values after the header, found {}",
                    lineno + 1,
                    n,
                    values.len() - 3
                )));
            }
            let points = values[3..].chunks_exact(3).map(|c| (c[0], c[1], c[2])).collect();
            bins.push(EtaBin { eta_min: values[0], eta_max: values[1], points });
        }
        Self::from_bins(bins)
    }

    /// Read and parse a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Relative uncertainty for a jet; `up` selects the upward variation.
    ///
    /// Eta outside the table uses the nearest bin; pt is interpolated
    /// linearly and clamped to the table range.
    pub fn uncertainty(&self, pt: f64, eta: f64, up: bool) -> f64 {
        let bin = self
            .bins
            .iter()
            .find(|b| eta >= b.eta_min && eta < b.eta_max)
            .unwrap_or_else(|| {
                let last = self.bins.len() - 1;
                if eta < self.bins[0].eta_min { &self.bins[0] } else { &self.bins[last] }
            });
        let pick = |p: &(f64, f64, f64)| if up { p.1 } else { p.2 };

        let pts = &bin.points;
        if pt <= pts[0].0 {
            return pick(&pts[0]);
        }
        if pt >= pts[pts.len() - 1].0 {
            return pick(&pts[pts.len() - 1]);
        }
        let hi = pts.partition_point(|p| p.0 <= pt);
        let (a, b) = (&pts[hi - 1], &pts[hi]);
        let t = (pt - a.0) / (b.0 - a.0);
        pick(a) + t * (pick(b) - pick(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TABLE: &str = "\
{1 JetEta 1 JetPt \"\" Correction JECSource}
-5.0 0.0 6 20 0.04 0.05 100 0.02 0.03
0.0 5.0 9 20 0.03 0.03 50 0.02 0.02 200 0.01 0.01
";

    #[test]
    fn test_parse_and_interpolate() {
        let u = JetCorrectionUncertainty::parse(TABLE).unwrap();
        assert_relative_eq!(u.uncertainty(60.0, -1.0, true), 0.03, epsilon = 1e-12);
        assert_relative_eq!(u.uncertainty(60.0, -1.0, false), 0.04, epsilon = 1e-12);
        assert_relative_eq!(u.uncertainty(35.0, 1.0, true), 0.025, epsilon = 1e-12);
        // clamped in pt and eta
        assert_relative_eq!(u.uncertainty(5.0, 1.0, true), 0.03, epsilon = 1e-12);
        assert_relative_eq!(u.uncertainty(500.0, 7.0, true), 0.01, epsilon = 1e-12);
        assert_relative_eq!(u.uncertainty(500.0, -7.0, true), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_errors() {
        assert!(JetCorrectionUncertainty::parse("").is_err());
        assert!(JetCorrectionUncertainty::parse("0 1 4 1 2 3 4").is_err());
        assert!(JetCorrectionUncertainty::parse("0 1 3 20 x 0.1").is_err());
        assert!(JetCorrectionUncertainty::parse("0 1 6 20 0.1 0.1").is_err());
    }

    #[test]
    fn test_bad_value_count() {
        for line in ["0 1 1e30", "0 1 -3 20 0.1 0.1", "0 1 3.5 20 0.1 0.1", "0 1 inf", "0 1 NaN"] {
            match JetCorrectionUncertainty::parse(line) {
                Err(Error::Config(msg)) => assert!(msg.starts_with("line 1:"), "{msg}"),
                other => panic!("{line}: unexpected {other:?}"),
            }
        }
    }
}
