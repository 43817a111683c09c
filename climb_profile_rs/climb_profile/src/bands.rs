//! Gradient bands and their display colors.

use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

use crate::ProfileError;

/// Band thresholds in percent grade, ascending.
const DEFAULT_THRESHOLDS: [f64; 4] = [2.0, 5.0, 10.0, 15.0];
const DEFAULT_COLORS: [&str; 5] = ["#ffea84", "#ffd384", "#ffb684", "#ff9f84", "#ff8484"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub low: f64,
    pub high: f64,
    pub color: RGBColor,
}

impl Band {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value < self.high
    }

    /// Legend text for the band's range, e.g. `5 - 10%`.
    pub fn label(&self) -> String {
        match (self.low.is_finite(), self.high.is_finite()) {
            (false, true) => format!("< {}%", self.high),
            (true, false) => format!("> {}%", self.low),
            (true, true) => format!("{} - {}%", self.low, self.high),
            (false, false) => "all grades".to_string(),
        }
    }
}

/// Ordered bands forming a gap-free partition of the real line.
/// Band 0 is the flat/background band.
#[derive(Clone, Debug, PartialEq)]
pub struct BandSet {
    bands: Vec<Band>,
}

impl BandSet {
    pub fn new(bands: Vec<Band>) -> Result<Self, ProfileError> {
        let (first, last) = match (bands.first(), bands.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ProfileError::InvalidParameter("no gradient bands".into())),
        };
        if first.low != f64::NEG_INFINITY || last.high != f64::INFINITY {
            return Err(ProfileError::InvalidParameter(
                "bands must cover every gradient".into(),
            ));
        }
        for band in &bands {
            if band.low.is_nan() || band.high.is_nan() || band.low >= band.high {
                return Err(ProfileError::InvalidParameter(format!(
                    "empty band [{}, {})",
                    band.low, band.high
                )));
            }
        }
        for pair in bands.windows(2) {
            if pair[0].high != pair[1].low {
                return Err(ProfileError::InvalidParameter(format!(
                    "bands [{}, {}) and [{}, {}) are not adjacent",
                    pair[0].low, pair[0].high, pair[1].low, pair[1].high
                )));
            }
        }
        Ok(Self { bands })
    }

    /// Build bands split at `thresholds`; needs one more color than thresholds.
    pub fn from_thresholds(thresholds: &[f64], colors: &[RGBColor]) -> Result<Self, ProfileError> {
        if colors.len() != thresholds.len() + 1 {
            return Err(ProfileError::InvalidParameter(format!(
                "{} thresholds need {} colors, got {}",
                thresholds.len(),
                thresholds.len() + 1,
                colors.len()
            )));
        }
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(ProfileError::InvalidParameter(
                "band thresholds must be finite".into(),
            ));
        }
        let mut edges = Vec::with_capacity(thresholds.len() + 2);
        edges.push(f64::NEG_INFINITY);
        edges.extend_from_slice(thresholds);
        edges.push(f64::INFINITY);
        let bands = edges
            .windows(2)
            .zip(colors.iter())
            .map(|(edge, &color)| Band {
                low: edge[0],
                high: edge[1],
                color,
            })
            .collect();
        Self::new(bands)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Band> {
        self.bands.iter()
    }

    /// Index of the band for an average gradient. NaN always maps to band 0.
    pub fn band_for(&self, value: f64) -> usize {
        if value.is_nan() {
            return 0;
        }
        let last = self.bands.len() - 1;
        if value >= self.bands[last].low {
            return last;
        }
        self.bands
            .iter()
            .position(|band| band.contains(value))
            .unwrap_or(0)
    }
}

impl Default for BandSet {
    fn default() -> Self {
        let colors: Vec<RGBColor> = DEFAULT_COLORS
            .iter()
            .filter_map(|hex| parse_hex_color(hex).ok())
            .collect();
        let bands = DEFAULT_THRESHOLDS
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(colors)
            .scan(f64::NEG_INFINITY, |low, (high, color)| {
                let band = Band {
                    low: *low,
                    high,
                    color,
                };
                *low = high;
                Some(band)
            })
            .collect();
        Self { bands }
    }
}

/// Serializable band configuration: thresholds plus hex colors.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BandSpec {
    pub thresholds: Vec<f64>,
    pub colors: Vec<String>,
}

impl Default for BandSpec {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            colors: DEFAULT_COLORS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl BandSpec {
    pub fn from_json(text: &str) -> Result<Self, ProfileError> {
        serde_json::from_str(text)
            .map_err(|e| ProfileError::InvalidParameter(format!("band spec: {}", e)))
    }

    pub fn to_band_set(&self) -> Result<BandSet, ProfileError> {
        let colors = self
            .colors
            .iter()
            .map(|c| parse_hex_color(c))
            .collect::<Result<Vec<_>, _>>()?;
        if self.thresholds.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(ProfileError::InvalidParameter(
                "band thresholds must be strictly ascending".into(),
            ));
        }
        BandSet::from_thresholds(&self.thresholds, &colors)
    }
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex_color(s: &str) -> Result<RGBColor, ProfileError> {
    let digits = s
        .strip_prefix('#')
        .ok_or_else(|| ProfileError::Color(format!("'{}' must start with '#'", s)))?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProfileError::Color(format!("'{}' is not hexadecimal", s)));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|e| ProfileError::Color(e.to_string()))
    };
    match digits.len() {
        6 => Ok(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
        3 => Ok(RGBColor(
            channel(0..1)? * 17,
            channel(1..2)? * 17,
            channel(2..3)? * 17,
        )),
        _ => Err(ProfileError::Color(format!(
            "'{}' has invalid length, must be 7 or 4",
            s
        ))),
    }
}
