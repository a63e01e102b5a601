//! Geometry kernel: haversine distance, point-to-polyline distance, and the
//! corridor test.
//!
//! All functions are pure and synchronous. Segments are treated as linearized
//! great-circle arcs via a local equirectangular projection — accurate to a
//! few meters at the scale of a single country, which is all the corridor
//! test needs.

pub mod gazetteer;

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude.
const KM_PER_DEG_LAT: f64 = 110.574;
/// Kilometers per degree of longitude at the equator.
const KM_PER_DEG_LON_EQ: f64 = 111.320;

/// Minimum corridor radius, short in-town rides.
pub const MIN_CORRIDOR_KM: f64 = 1.5;
/// Maximum corridor radius, long intercity rides.
pub const MAX_CORRIDOR_KM: f64 = 8.0;
/// Corridor growth per route kilometer.
const CORRIDOR_SLOPE: f64 = 0.05;

/// A WGS84 coordinate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(p: Point, q: Point) -> f64 {
    let (lat1, lon1) = (p.lat.to_radians(), p.lon.to_radians());
    let (lat2, lon2) = (q.lat.to_radians(), q.lon.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Minimum distance from `p` to the segment `a`–`b`, in kilometers.
///
/// Projects into a local tangent plane centered on the segment's mean
/// latitude, clamps the perpendicular foot to the segment, and measures in
/// that plane.
fn point_to_segment_km(p: Point, a: Point, b: Point) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let kx = KM_PER_DEG_LON_EQ * mean_lat.cos();
    let ky = KM_PER_DEG_LAT;

    let (ax, ay) = (0.0, 0.0);
    let (bx, by) = ((b.lon - a.lon) * kx, (b.lat - a.lat) * ky);
    let (px, py) = ((p.lon - a.lon) * kx, (p.lat - a.lat) * ky);

    let seg_len2 = (bx - ax).powi(2) + (by - ay).powi(2);
    if seg_len2 == 0.0 {
        return (px.powi(2) + py.powi(2)).sqrt();
    }

    let t = (((px - ax) * (bx - ax) + (py - ay) * (by - ay)) / seg_len2).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * (bx - ax), ay + t * (by - ay));
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Minimum distance from `p` to any segment of `poly`, in kilometers.
///
/// Returns `f64::INFINITY` for an empty polyline, the haversine distance for
/// a single-point polyline.
pub fn point_to_polyline_km(p: Point, poly: &[Point]) -> f64 {
    match poly {
        [] => f64::INFINITY,
        [only] => haversine_km(p, *only),
        _ => poly
            .windows(2)
            .map(|w| point_to_segment_km(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Distance-dependent corridor radius around a route.
///
/// Monotonically non-decreasing, continuous, bounded in
/// [[`MIN_CORRIDOR_KM`], [`MAX_CORRIDOR_KM`]].
pub fn corridor_threshold_km(route_distance_km: f64) -> f64 {
    (MIN_CORRIDOR_KM + CORRIDOR_SLOPE * route_distance_km).clamp(MIN_CORRIDOR_KM, MAX_CORRIDOR_KM)
}

/// Whether `p` lies within `threshold_km` of the polyline.
pub fn on_corridor(p: Point, poly: &[Point], threshold_km: f64) -> bool {
    point_to_polyline_km(p, poly) <= threshold_km
}
