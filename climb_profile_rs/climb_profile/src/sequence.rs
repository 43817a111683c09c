//! Cumulative distance and interpolated gradient along a track.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geodesy::{distance_3d, DistanceMode};
use crate::ProfileError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DerivedPoint {
    /// Metres from the first point.
    pub distance: f64,
    /// Metres; NaN when the track point had none.
    pub elevation: f64,
    /// Percent grade from the previous point; NaN for the first point.
    pub gradient: f64,
}

/// Read-only indexed access to track points, independent of storage.
pub trait TrackSource {
    fn len(&self) -> usize;

    fn point(&self, index: usize) -> TrackPoint;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackSource for [TrackPoint] {
    fn len(&self) -> usize {
        <[TrackPoint]>::len(self)
    }

    fn point(&self, index: usize) -> TrackPoint {
        self[index]
    }
}

impl TrackSource for Vec<TrackPoint> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn point(&self, index: usize) -> TrackPoint {
        self[index]
    }
}

/// `(latitude, longitude, elevation)` triples; a NaN elevation reads as absent.
impl TrackSource for [(f64, f64, f64)] {
    fn len(&self) -> usize {
        <[(f64, f64, f64)]>::len(self)
    }

    fn point(&self, index: usize) -> TrackPoint {
        let (latitude, longitude, elevation) = self[index];
        TrackPoint {
            latitude,
            longitude,
            elevation: if elevation.is_nan() {
                None
            } else {
                Some(elevation)
            },
        }
    }
}

/// Build the derived sequence for `source`, one point per input point.
pub fn build_sequence<S>(source: &S, mode: DistanceMode) -> Result<Vec<DerivedPoint>, ProfileError>
where
    S: TrackSource + ?Sized,
{
    if source.is_empty() {
        return Err(ProfileError::InvalidInput("track has no points".into()));
    }

    let mut out = Vec::with_capacity(source.len());
    let mut prev = source.point(0);
    out.push(DerivedPoint {
        distance: 0.0,
        elevation: prev.elevation.unwrap_or(f64::NAN),
        gradient: f64::NAN,
    });

    for i in 1..source.len() {
        let current = source.point(i);
        let step = distance_3d(&prev, &current, mode)?;
        let distance = out[i - 1].distance + step;
        let gradient = match (prev.elevation, current.elevation) {
            (Some(e0), Some(e1)) => {
                if step > 0.0 {
                    (e1 - e0) / step * 100.0
                } else {
                    // duplicate coordinate
                    0.0
                }
            }
            _ => f64::NAN,
        };
        trace!(index = i, step, gradient, "derived segment");
        out.push(DerivedPoint {
            distance,
            elevation: current.elevation.unwrap_or(f64::NAN),
            gradient,
        });
        prev = current;
    }

    Ok(out)
}
