//! Driving-route client for an OSRM-style routing engine.
//!
//! The engine returns a densified polyline (consecutive points a few hundred
//! meters apart at most) plus driving distance and duration. Network errors,
//! non-2xx statuses, timeouts, and malformed bodies all collapse to the one
//! recoverable [`RoutingError`]; callers persist the ride without route data
//! and fall back to name-exact matching.

use crate::error::RoutingError;
use crate::geo::Point;
use crate::retry::{BackoffPolicy, fatal, retryable};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A driving route between two points.
#[derive(Clone, Debug)]
pub struct DrivingRoute {
    pub polyline: Vec<Point>,
    pub distance_km: f64,
    pub duration_s: f64,
}

/// Boxed future returned by [`RouteProvider::route`].
pub type RouteFuture<'a> = Pin<Box<dyn Future<Output = Result<DrivingRoute, RoutingError>> + Send + 'a>>;

/// Seam for the external routing engine, dyn-compatible so tests can swap in
/// a scripted provider.
pub trait RouteProvider: Send + Sync {
    fn route(&self, from: Point, to: Point) -> RouteFuture<'_>;
}

// ── OSRM client ────────────────────────────────────────────────────

/// HTTP client for the OSRM `route` service.
///
/// Bounded retry: transient failures back off exponentially with jitter and
/// stop once the wall-clock budget is spent; permanent failures stop
/// immediately.
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
    retry: BackoffPolicy,
    retry_budget: Duration,
}

impl OsrmClient {
    /// Build a client. `timeout` bounds a single call; `retry_budget` bounds
    /// the total wall time across retries.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry_budget: Duration,
    ) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .user_agent("tremp/0.3")
            .timeout(timeout)
            .build()
            .map_err(|e| RoutingError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry: BackoffPolicy::retries(3),
            retry_budget,
        })
    }

    async fn route_once(&self, from: Point, to: Point) -> Result<DrivingRoute, String> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, from.lon, from.lat, to.lon, to.lat,
        );
        debug!("routing request: {url}");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("routing API HTTP {status}: {text}"));
        }

        let parsed: OsrmResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if parsed.code != "Ok" {
            return Err(format!("routing API code {}", parsed.code));
        }

        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| "routing API returned no routes".to_string())?;

        Ok(DrivingRoute {
            polyline: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[lon, lat]| Point::new(lat, lon))
                .collect(),
            distance_km: route.distance / 1000.0,
            duration_s: route.duration,
        })
    }
}

impl RouteProvider for OsrmClient {
    fn route(&self, from: Point, to: Point) -> RouteFuture<'_> {
        Box::pin(async move {
            let start = Instant::now();
            let mut attempt = 0u32;
            loop {
                match self.route_once(from, to).await {
                    Ok(route) => {
                        debug!(
                            "route resolved: {:.1} km, {} points, attempt {}",
                            route.distance_km,
                            route.polyline.len(),
                            attempt + 1,
                        );
                        return Ok(route);
                    }
                    Err(cause) => {
                        let out_of_budget = attempt >= self.retry.attempts
                            || start.elapsed() >= self.retry_budget;
                        if out_of_budget || fatal(&cause) || !retryable(&cause) {
                            warn!("routing failed after {} attempt(s): {cause}", attempt + 1);
                            return Err(RoutingError(cause));
                        }
                        let delay = self.retry.pause_before(attempt);
                        debug!(
                            "routing attempt {} failed ({cause}); retrying in {delay:?}",
                            attempt + 1,
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}

// ── Response shapes ────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize, Debug)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

#[derive(Deserialize, Debug)]
struct OsrmGeometry {
    /// GeoJSON order: `[lon, lat]`.
    coordinates: Vec<[f64; 2]>,
}

// ── Fixed provider ─────────────────────────────────────────────────

/// Provider that answers every request with the same route.
///
/// Used by the sandbox and by tests that need deterministic geometry without
/// a network dependency.
pub struct FixedRouteProvider {
    route: DrivingRoute,
}

impl FixedRouteProvider {
    pub fn new(route: DrivingRoute) -> Self {
        Self { route }
    }

    /// A straight two-point route between the endpoints, with the haversine
    /// distance and a rough driving duration.
    pub fn straight_line(from: Point, to: Point) -> DrivingRoute {
        let distance_km = crate::geo::haversine_km(from, to);
        DrivingRoute {
            polyline: vec![from, to],
            distance_km,
            // ~72 km/h average.
            duration_s: distance_km * 50.0,
        }
    }
}

impl RouteProvider for FixedRouteProvider {
    fn route(&self, _from: Point, _to: Point) -> RouteFuture<'_> {
        let route = self.route.clone();
        Box::pin(async move { Ok(route) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osrm_response_parses_geojson_order() {
        let raw = r#"{
            "code": "Ok",
            "routes": [{
                "geometry": {"coordinates": [[34.6139, 31.5917], [34.7818, 32.0853]]},
                "distance": 61500.0,
                "duration": 3100.0
            }]
        }"#;
        let parsed: OsrmResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.code, "Ok");
        let route = &parsed.routes[0];
        // Coordinates arrive lon-first.
        assert_eq!(route.geometry.coordinates[0], [34.6139, 31.5917]);
        assert_eq!(route.distance, 61500.0);
    }

    #[test]
    fn error_code_detected() {
        let raw = r#"{"code": "NoRoute", "routes": []}"#;
        let parsed: OsrmResponse = serde_json::from_str(raw).unwrap();
        assert_ne!(parsed.code, "Ok");
    }

    #[tokio::test]
    async fn fixed_provider_returns_configured_route() {
        let from = Point::new(31.59, 34.61);
        let to = Point::new(32.08, 34.78);
        let provider = FixedRouteProvider::new(FixedRouteProvider::straight_line(from, to));
        let route = provider.route(from, to).await.unwrap();
        assert_eq!(route.polyline.len(), 2);
        assert!(route.distance_km > 50.0);
    }
}
