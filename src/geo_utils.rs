//! Geographic utilities: great-circle distance, bearing, centroid and
//! point-to-polyline distance.
//!
//! All distances are in meters, all coordinates in WGS84 degrees. The
//! point-to-segment math uses a local equirectangular projection, which is
//! accurate at the snap-distance scales (tens of meters) it is used for.

use crate::GpsPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Great-circle (haversine) distance between two points in meters.
pub fn haversine_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Total length of a polyline in meters (sum of consecutive pair distances).
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Arithmetic centroid of a point set. Returns `None` for an empty slice.
///
/// Good enough to absorb GPS jitter around a stop; not intended for point
/// sets spanning the antimeridian.
pub fn centroid(points: &[GpsPoint]) -> Option<GpsPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;
    let lng = points.iter().map(|p| p.longitude).sum::<f64>() / n;
    Some(GpsPoint::new(lat, lng))
}

/// Minimum distance in meters from `p` to the segment `a`-`b`.
pub fn point_to_segment_distance(p: &GpsPoint, a: &GpsPoint, b: &GpsPoint) -> f64 {
    // Project into a local tangent plane centered on p.
    let cos_lat = p.latitude.to_radians().cos();
    let ax = (a.longitude - p.longitude) * cos_lat * METERS_PER_DEGREE;
    let ay = (a.latitude - p.latitude) * METERS_PER_DEGREE;
    let bx = (b.longitude - p.longitude) * cos_lat * METERS_PER_DEGREE;
    let by = (b.latitude - p.latitude) * METERS_PER_DEGREE;

    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (ax * ax + ay * ay).sqrt();
    }

    // Clamp the projection of the origin (= p) onto the segment.
    let t = (-(ax * dx + ay * dy) / len2).clamp(0.0, 1.0);
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    (cx * cx + cy * cy).sqrt()
}

/// Minimum distance in meters from `p` to a polyline.
///
/// Returns `f64::INFINITY` for an empty polyline; a single-point polyline is
/// treated as a degenerate segment.
pub fn point_to_polyline_distance(p: &GpsPoint, line: &[GpsPoint]) -> f64 {
    match line.len() {
        0 => f64::INFINITY,
        1 => haversine_distance(p, &line[0]),
        _ => line
            .windows(2)
            .map(|w| point_to_segment_distance(p, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}
