//! Fixed-width index windows and their average-gradient band.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bands::BandSet;
use crate::sequence::DerivedPoint;
use crate::ProfileError;

/// A run of point indices `[start, end)` sharing one band.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WindowAssignment {
    pub start: usize,
    pub end: usize,
    pub average: f64,
    pub band: usize,
}

impl WindowAssignment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Split indices `1..points.len()` into windows of `window_width` points and
/// band each by its mean gradient. The last window holds the remainder.
///
/// Windows count points, not metres: unevenly spaced samples still average
/// with equal weight.
pub fn classify(
    points: &[DerivedPoint],
    window_width: usize,
    bands: &BandSet,
) -> Result<Vec<WindowAssignment>, ProfileError> {
    if window_width == 0 {
        return Err(ProfileError::InvalidParameter(
            "window width must be at least 1".into(),
        ));
    }
    if points.len() < 2 {
        return Ok(Vec::new());
    }

    let windows = points[1..]
        .par_chunks(window_width)
        .enumerate()
        .map(|(idx, chunk)| {
            let start = 1 + idx * window_width;
            let average = mean_gradient(chunk);
            WindowAssignment {
                start,
                end: start + chunk.len(),
                average,
                band: bands.band_for(average),
            }
        })
        .collect();
    Ok(windows)
}

fn mean_gradient(chunk: &[DerivedPoint]) -> f64 {
    if chunk.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = chunk.iter().map(|p| p.gradient).sum();
    sum / chunk.len() as f64
}
