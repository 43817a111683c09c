//! Point-to-point distances between track points.

use serde::{Deserialize, Serialize};

use crate::{ProfileError, TrackPoint};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Metres per degree used by the flat approximation.
const ONE_DEGREE_M: f64 = 1000.0 * 10_000.8 / 90.0;

/// Flat mode switches to haversine once either span exceeds this, in degrees.
const FLAT_MAX_SPAN_DEG: f64 = 0.2;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    #[default]
    Haversine,
    Flat,
}

/// Distance in metres between two points, treating elevation as a third
/// dimension when both points carry one.
pub fn distance_3d(a: &TrackPoint, b: &TrackPoint, mode: DistanceMode) -> Result<f64, ProfileError> {
    check_coordinate(a)?;
    check_coordinate(b)?;
    let planar = distance_2d(a, b, mode);
    match (a.elevation, b.elevation) {
        (Some(ea), Some(eb)) if ea.is_finite() && eb.is_finite() => {
            let dh = eb - ea;
            Ok((planar * planar + dh * dh).sqrt())
        }
        _ => Ok(planar),
    }
}

fn distance_2d(a: &TrackPoint, b: &TrackPoint, mode: DistanceMode) -> f64 {
    let span_lat = (a.latitude - b.latitude).abs();
    let span_lon = (a.longitude - b.longitude).abs();
    let too_wide = span_lat > FLAT_MAX_SPAN_DEG || span_lon > FLAT_MAX_SPAN_DEG;
    if mode == DistanceMode::Haversine || too_wide {
        return haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
    }
    let coef = a.latitude.to_radians().cos();
    let x = a.latitude - b.latitude;
    let y = (a.longitude - b.longitude) * coef;
    (x * x + y * y).sqrt() * ONE_DEGREE_M
}

fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

fn check_coordinate(p: &TrackPoint) -> Result<(), ProfileError> {
    if !p.latitude.is_finite() || !p.longitude.is_finite() {
        return Err(ProfileError::Geodesy(format!(
            "non-finite coordinate ({}, {})",
            p.latitude, p.longitude
        )));
    }
    if p.latitude.abs() > 90.0 || p.longitude.abs() > 180.0 {
        return Err(ProfileError::Geodesy(format!(
            "coordinate out of range ({}, {})",
            p.latitude, p.longitude
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64, ele: Option<f64>) -> TrackPoint {
        TrackPoint {
            latitude: lat,
            longitude: lon,
            elevation: ele,
        }
    }

    #[test]
    fn test_haversine_distance() {
        let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_elevation_adds_third_dimension() {
        let a = pt(45.0, 6.0, Some(100.0));
        let b = pt(45.0, 6.0, Some(130.0));
        let d = distance_3d(&a, &b, DistanceMode::Haversine).unwrap();
        assert!((d - 30.0).abs() < 1e-9);

        let flat = pt(45.0, 6.0, None);
        let d = distance_3d(&flat, &b, DistanceMode::Haversine).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_flat_mode_close_to_haversine_for_short_spans() {
        let a = pt(44.17, 5.27, None);
        let b = pt(44.171, 5.271, None);
        let h = distance_3d(&a, &b, DistanceMode::Haversine).unwrap();
        let f = distance_3d(&a, &b, DistanceMode::Flat).unwrap();
        assert!((h - f).abs() / h < 0.01);
    }

    #[test]
    fn test_flat_mode_uses_haversine_past_span_limit() {
        let a = pt(44.0, 5.0, None);
        let near = pt(44.15, 5.15, None);
        let far = pt(44.5, 5.0, None);
        let flat_near = distance_3d(&a, &near, DistanceMode::Flat).unwrap();
        let hav_near = distance_3d(&a, &near, DistanceMode::Haversine).unwrap();
        assert_ne!(flat_near, hav_near);
        assert_eq!(
            distance_3d(&a, &far, DistanceMode::Flat).unwrap(),
            distance_3d(&a, &far, DistanceMode::Haversine).unwrap()
        );
        assert_eq!(DistanceMode::default(), DistanceMode::Haversine);
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        let good = pt(45.0, 6.0, Some(0.0));
        let nan = pt(f64::NAN, 6.0, Some(0.0));
        let far = pt(95.0, 6.0, Some(0.0));
        assert!(matches!(
            distance_3d(&good, &nan, DistanceMode::Haversine),
            Err(ProfileError::Geodesy(_))
        ));
        assert!(matches!(
            distance_3d(&far, &good, DistanceMode::Flat),
            Err(ProfileError::Geodesy(_))
        ));
    }
}
