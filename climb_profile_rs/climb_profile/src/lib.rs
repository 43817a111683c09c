//! Gradient-banded elevation profile computation for GPX climbs.

pub mod bands;
pub mod classify;
pub mod geodesy;
pub mod render;
pub mod sequence;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use bands::{parse_hex_color, Band, BandSet, BandSpec};
pub use classify::{classify, WindowAssignment};
pub use geodesy::{distance_3d, DistanceMode};
pub use render::{
    draw_legend, draw_profile, legend_swatches, profile_trapezoids, ClipRect, LegendLayout,
    LegendSwatch, RenderStyle, Trapezoid,
};
pub use sequence::{build_sequence, DerivedPoint, TrackPoint, TrackSource};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("render precondition violated: {0}")]
    Precondition(String),
    #[error("geodesy error: {0}")]
    Geodesy(String),
    #[error("invalid color: {0}")]
    Color(String),
    #[error("drawing error: {0}")]
    Drawing(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Params {
    /// Points per averaging window; derived from the track length when unset.
    pub window_width: Option<usize>,
    pub distance_mode: DistanceMode,
    pub bands: BandSpec,
}

/// Derived sequence plus its window classification for one render.
#[derive(Clone, Debug)]
pub struct Profile {
    pub points: Vec<DerivedPoint>,
    pub windows: Vec<WindowAssignment>,
    pub window_width: usize,
}

impl Profile {
    pub fn total_distance(&self) -> f64 {
        self.points.last().map(|p| p.distance).unwrap_or(0.0)
    }

    /// Highest finite elevation in the sequence, if any.
    pub fn max_elevation(&self) -> Option<f64> {
        self.points
            .iter()
            .map(|p| p.elevation)
            .filter(|e| e.is_finite())
            .fold(None, |acc: Option<f64>, e| Some(acc.map_or(e, |m| m.max(e))))
    }

    /// Window covering point `index`; point 0 belongs to none.
    pub fn window_at(&self, index: usize) -> Option<&WindowAssignment> {
        let slot = index.checked_sub(1)?.checked_div(self.window_width)?;
        self.windows
            .get(slot)
            .filter(|w| w.start <= index && index < w.end)
    }

    /// Band index of the window covering `index`, if one does.
    pub fn band_at(&self, index: usize) -> Option<usize> {
        self.window_at(index).map(|w| w.band)
    }
}

/// Parse GPX track points from raw bytes, whatever the file was called.
pub fn parse_track(input: &[u8]) -> Result<Vec<TrackPoint>, ProfileError> {
    parse_gpx_points(input)
}

fn parse_gpx_points(input: &[u8]) -> Result<Vec<TrackPoint>, ProfileError> {
    use gpx::read;
    use std::io::Cursor;

    let mut cursor = Cursor::new(input);
    let gpx = read(&mut cursor).map_err(|e| ProfileError::GpxParse(e.to_string()))?;
    let mut out = Vec::new();

    // Every segment of every track is flattened into one ordered run.
    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                let geo = point.point();
                out.push(TrackPoint {
                    latitude: geo.y(),
                    longitude: geo.x(),
                    elevation: point.elevation,
                });
            }
        }
    }
    debug!("parsed {} GPX track points", out.len());
    Ok(out)
}

/// Window width used when none is configured: five percent of the points,
/// counted in whole hundreds, never less than one.
pub fn default_window_width(point_count: usize) -> usize {
    ((point_count / 100) * 5).max(1)
}

/// Derive and classify a track in one pass.
pub fn compute_profile<S>(source: &S, params: &Params) -> Result<Profile, ProfileError>
where
    S: TrackSource + ?Sized,
{
    let bands = params.bands.to_band_set()?;
    let points = build_sequence(source, params.distance_mode)?;
    let window_width = params
        .window_width
        .unwrap_or_else(|| default_window_width(points.len()));
    if window_width == 0 {
        return Err(ProfileError::InvalidParameter(
            "window width must be at least 1".into(),
        ));
    }
    let windows = classify(&points, window_width, &bands)?;
    debug!(
        "profile: {} points, {} windows of width {}",
        points.len(),
        windows.len(),
        window_width
    );
    Ok(Profile {
        points,
        windows,
        window_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>climb</name>
    <trkseg>
      <trkpt lat="44.1740" lon="5.2780"><ele>300.0</ele></trkpt>
      <trkpt lat="44.1745" lon="5.2785"><ele>305.0</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="44.1750" lon="5.2790"><ele>312.0</ele></trkpt>
      <trkpt lat="44.1755" lon="5.2795"/>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_parse_track_flattens_segments() {
        let points = parse_track(SAMPLE_GPX.as_bytes()).unwrap();
        assert_eq!(points.len(), 4);
        assert!((points[0].latitude - 44.1740).abs() < 1e-9);
        assert!((points[0].longitude - 5.2780).abs() < 1e-9);
        assert_eq!(points[2].elevation, Some(312.0));
        assert_eq!(points[3].elevation, None);
    }

    #[test]
    fn test_parse_track_rejects_non_gpx_content() {
        let err = parse_track(b"lat,lon,ele\n45.0,6.0,100.0\n").unwrap_err();
        assert!(matches!(err, ProfileError::GpxParse(_)));
    }

    #[test]
    fn test_parse_track_reports_malformed_gpx() {
        let err = parse_track(b"<gpx><trk>").unwrap_err();
        assert!(matches!(err, ProfileError::GpxParse(_)));
    }

    #[test]
    fn test_default_window_width() {
        assert_eq!(default_window_width(1), 1);
        assert_eq!(default_window_width(99), 1);
        assert_eq!(default_window_width(100), 5);
        assert_eq!(default_window_width(1234), 60);
    }

    #[test]
    fn test_compute_profile_single_window() {
        let track: Vec<(f64, f64, f64)> = (0..11)
            .map(|i| (45.0 + i as f64 * 0.0005, 6.0, 100.0 + i as f64 * 3.0))
            .collect();
        let params = Params {
            window_width: Some(10),
            ..Params::default()
        };
        let profile = compute_profile(track.as_slice(), &params).unwrap();
        assert_eq!(profile.points.len(), 11);
        assert_eq!(profile.windows.len(), 1);
        assert_eq!(profile.band_at(0), None);
        assert_eq!(profile.band_at(10), Some(profile.windows[0].band));
        assert!(profile.total_distance() > 0.0);
        assert_eq!(profile.max_elevation(), Some(130.0));
    }

    #[test]
    fn test_band_at_matches_covering_window() {
        let track: Vec<(f64, f64, f64)> = (0..23)
            .map(|i| (45.0 + i as f64 * 0.0004, 6.0, 100.0 + (i * i % 13) as f64))
            .collect();
        for width in 1..=8 {
            let params = Params {
                window_width: Some(width),
                ..Params::default()
            };
            let profile = compute_profile(track.as_slice(), &params).unwrap();
            assert_eq!(profile.band_at(0), None);
            assert_eq!(profile.band_at(track.len()), None);
            for idx in 1..track.len() {
                let covering = profile
                    .windows
                    .iter()
                    .find(|w| w.start <= idx && idx < w.end)
                    .unwrap();
                assert_eq!(profile.window_at(idx), Some(covering));
                assert_eq!(profile.band_at(idx), Some(covering.band));
            }
        }
    }

    #[test]
    fn test_compute_profile_single_point_has_no_windows() {
        let track = vec![TrackPoint {
            latitude: 45.0,
            longitude: 6.0,
            elevation: Some(100.0),
        }];
        let profile = compute_profile(&track, &Params::default()).unwrap();
        assert_eq!(profile.points.len(), 1);
        assert!(profile.windows.is_empty());
    }

    #[test]
    fn test_compute_profile_rejects_zero_window() {
        let track = vec![(45.0, 6.0, 100.0), (45.001, 6.0, 110.0)];
        let params = Params {
            window_width: Some(0),
            ..Params::default()
        };
        let err = compute_profile(track.as_slice(), &params).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidParameter(_)));
    }
}
