//! Background route pipeline: geocode → route → corridor threshold →
//! persist → re-match.
//!
//! Spawned at persist time as a named task with a typed result
//! ([`PipelineOutcome`] through the returned `JoinHandle`), detached from the
//! user-reply path so the reply never waits on the routing engine. Errors
//! are logged with `{phone, id, stage, cause}` and swallowed — a ride
//! without route data still participates in name-exact matching.
//!
//! A per-`(prefix, phone, ride)` in-flight set drops duplicate triggers;
//! pipeline input is deterministic per record, so the running instance's
//! result stands.

use crate::geo::corridor_threshold_km;
use crate::geo::gazetteer::Gazetteer;
use crate::matching::matches_for_driver;
use crate::notify::NotificationEmitter;
use crate::records::RouteData;
use crate::routing::RouteProvider;
use crate::store::{Prefix, RideStore};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// An endpoint label did not geocode; the ride keeps no route data.
    GazetteerMiss { label: String },
    /// The routing engine failed past its retry budget.
    RoutingUnavailable,
    /// The ride was deleted before the pipeline finished.
    RecordGone,
    /// Route data attached; matching re-ran.
    Attached { matches_notified: usize },
    /// The store failed past its retry.
    StoreFailed,
}

/// The background geocode-route-rematch job.
pub struct RoutePipeline {
    store: Arc<RideStore>,
    gazetteer: &'static Gazetteer,
    routes: Arc<dyn RouteProvider>,
    emitter: Arc<NotificationEmitter>,
    route_permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<(String, String, u64)>>,
}

impl RoutePipeline {
    pub fn new(
        store: Arc<RideStore>,
        gazetteer: &'static Gazetteer,
        routes: Arc<dyn RouteProvider>,
        emitter: Arc<NotificationEmitter>,
        route_concurrency: usize,
    ) -> Self {
        Self {
            store,
            gazetteer,
            routes,
            emitter,
            route_permits: Arc::new(Semaphore::new(route_concurrency.max(1))),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn the pipeline for one driver ride.
    ///
    /// Returns `None` when a pipeline for the same `(prefix, phone, ride)`
    /// is already in flight — the duplicate trigger is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        phone: &str,
        ride_id: u64,
        prefix: &Prefix,
        send_externally: bool,
    ) -> Option<JoinHandle<PipelineOutcome>> {
        let key = (prefix.as_str().to_string(), phone.to_string(), ride_id);
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(key.clone()) {
                debug!("route pipeline already in flight for {phone}/{ride_id}, dropping");
                return None;
            }
        }

        let pipeline = Arc::clone(self);
        let phone = phone.to_string();
        let prefix = prefix.clone();
        Some(tokio::spawn(async move {
            let outcome = pipeline
                .run(&phone, ride_id, &prefix, send_externally)
                .await;
            pipeline
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            debug!("route pipeline for {phone}/{ride_id} finished: {outcome:?}");
            outcome
        }))
    }

    async fn run(
        &self,
        phone: &str,
        ride_id: u64,
        prefix: &Prefix,
        send_externally: bool,
    ) -> PipelineOutcome {
        // Stage 1: load the ride and geocode its endpoints.
        let doc = match self.store.get_user(phone, prefix).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return PipelineOutcome::RecordGone,
            Err(cause) => {
                warn!(
                    phone = %phone,
                    id = ride_id,
                    stage = "load",
                    "route pipeline store read failed: {cause}"
                );
                return PipelineOutcome::StoreFailed;
            }
        };
        let Some(ride) = doc.find_ride(ride_id) else {
            return PipelineOutcome::RecordGone;
        };
        let (origin_label, destination_label) = (ride.origin.clone(), ride.destination.clone());

        let Some(origin) = self.gazetteer.lookup(&origin_label) else {
            info!(
                phone = %phone,
                id = ride_id,
                stage = "geocode",
                "origin label not in gazetteer: {origin_label}"
            );
            return PipelineOutcome::GazetteerMiss {
                label: origin_label,
            };
        };
        let Some(destination) = self.gazetteer.lookup(&destination_label) else {
            info!(
                phone = %phone,
                id = ride_id,
                stage = "geocode",
                "destination label not in gazetteer: {destination_label}"
            );
            return PipelineOutcome::GazetteerMiss {
                label: destination_label,
            };
        };

        // Stage 2: driving route, bounded by the provider's retry budget and
        // the shared concurrency permit.
        let route = {
            let Ok(_permit) = self.route_permits.acquire().await else {
                // Semaphore closed: runtime shutting down.
                return PipelineOutcome::RoutingUnavailable;
            };
            match self.routes.route(origin, destination).await {
                Ok(route) => route,
                Err(cause) => {
                    warn!(
                        phone = %phone,
                        id = ride_id,
                        stage = "route",
                        "route pipeline routing failed: {cause}"
                    );
                    return PipelineOutcome::RoutingUnavailable;
                }
            }
        };

        // Stage 3: corridor threshold + idempotent attach. A ride deleted
        // while we were routing turns this into a no-op.
        let route_data = RouteData {
            threshold_km: corridor_threshold_km(route.distance_km),
            distance_km: route.distance_km,
            polyline: route.polyline,
        };
        match self
            .store
            .attach_route_data(phone, ride_id, route_data.clone(), prefix)
            .await
        {
            Ok(true) => {}
            Ok(false) => return PipelineOutcome::RecordGone,
            Err(cause) => {
                warn!(
                    phone = %phone,
                    id = ride_id,
                    stage = "attach",
                    "route pipeline attach failed: {cause}"
                );
                return PipelineOutcome::StoreFailed;
            }
        }

        // Stage 4: re-run matching — a fresh corridor sometimes unlocks
        // matches that coarse name matching missed. The emitter's notified
        // set keeps already-announced pairs silent.
        let mut ride = ride.clone();
        ride.route_data = Some(route_data);
        let hitchhikers = match self.store.scan_hitchhikers(prefix).await {
            Ok(scan) => scan,
            Err(cause) => {
                warn!(
                    phone = %phone,
                    id = ride_id,
                    stage = "rematch",
                    "route pipeline scan failed: {cause}"
                );
                return PipelineOutcome::StoreFailed;
            }
        };
        let matches = matches_for_driver(
            self.gazetteer,
            Utc::now().date_naive(),
            phone,
            &ride,
            &hitchhikers,
        );
        let notices = self.emitter.emit(&matches, prefix, send_externally).await;

        PipelineOutcome::Attached {
            matches_notified: notices.len(),
        }
    }
}
