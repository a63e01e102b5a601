//! Typed, prefix-scoped facade over the document store.
//!
//! The backing store is external to the core and reached through the narrow
//! [`UserDocumentStore`] seam: per-user documents keyed by phone number under
//! a named collection. [`RideStore`] layers the domain operations on top —
//! record CRUD with server-assigned ids, opposite-role scans for matching,
//! and the idempotent route-data upsert.
//!
//! Every operation takes an explicit [`Prefix`]. The collection name is
//! derived from it (`{prefix}users`), so the live and sandbox namespaces can
//! never mix inside one call.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::records::{
    DriverRide, DriverSchedule, HitchhikerRequest, PickupWindow, Record, Role, RouteData, UserDoc,
};
use crate::retry::BackoffPolicy;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

/// Boxed future returned by [`UserDocumentStore`] methods.
///
/// Type alias to keep the trait dyn-compatible, same shape as the tool
/// dispatch seam.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Narrow key-value-of-user-documents interface to the backing store.
///
/// Implementations must provide atomic per-document writes; no
/// multi-document transactions are required.
pub trait UserDocumentStore: Send + Sync {
    fn get(&self, collection: &str, phone: &str) -> StoreFuture<'_, Option<UserDoc>>;
    fn put(&self, collection: &str, phone: &str, doc: UserDoc) -> StoreFuture<'_, ()>;
    fn delete(&self, collection: &str, phone: &str) -> StoreFuture<'_, ()>;
    fn list(&self, collection: &str) -> StoreFuture<'_, Vec<(String, UserDoc)>>;
}

// ── Prefix ─────────────────────────────────────────────────────────

/// Namespace token isolating sandbox state from production state.
///
/// Carried as an explicit parameter everywhere, never process-wide state,
/// so a test suite can exercise both namespaces in the same process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Prefix(String);

impl Prefix {
    /// The production namespace (empty prefix).
    pub fn live() -> Self {
        Self(String::new())
    }

    /// The isolated test namespace.
    pub fn sandbox() -> Self {
        Self("test_".to_string())
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Collection name for user documents under this namespace.
    pub fn collection(&self) -> String {
        format!("{}users", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sandbox(&self) -> bool {
        !self.0.is_empty()
    }
}

// ── Record patch ───────────────────────────────────────────────────

/// Field-level update for an existing record. `None` leaves a field as-is.
#[derive(Debug, Default, Clone)]
pub struct RecordPatch {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub schedule: Option<DriverSchedule>,
    pub window: Option<PickupWindow>,
    pub available_seats: Option<u32>,
    pub flexibility_minutes: Option<u32>,
    pub notes: Option<String>,
}

// ── Ride store ─────────────────────────────────────────────────────

/// Typed CRUD over per-user ride lists.
pub struct RideStore {
    backend: Arc<dyn UserDocumentStore>,
    retry: BackoffPolicy,
}

impl RideStore {
    /// Wrap a backend. Transient failures are retried once with jitter.
    pub fn new(backend: Arc<dyn UserDocumentStore>) -> Self {
        Self {
            backend,
            retry: BackoffPolicy::retries(1),
        }
    }

    // ── User documents ────────────────────────────────────────────

    /// Fetch a user document, if it exists.
    pub async fn get_user(&self, phone: &str, prefix: &Prefix) -> Result<Option<UserDoc>, StoreError> {
        let collection = prefix.collection();
        self.retry_once(|| self.backend.get(&collection, phone)).await
    }

    /// Fetch a user document, creating an empty one if absent.
    pub async fn load_or_create(&self, phone: &str, prefix: &Prefix) -> Result<UserDoc, StoreError> {
        Ok(self
            .get_user(phone, prefix)
            .await?
            .unwrap_or_else(|| UserDoc::new(Utc::now())))
    }

    /// Write a user document back.
    pub async fn put_user(
        &self,
        phone: &str,
        prefix: &Prefix,
        doc: UserDoc,
    ) -> Result<(), StoreError> {
        let collection = prefix.collection();
        self.retry_once(|| self.backend.put(&collection, phone, doc.clone()))
            .await
    }

    /// Remove a user document entirely.
    pub async fn delete_user(&self, phone: &str, prefix: &Prefix) -> Result<(), StoreError> {
        let collection = prefix.collection();
        self.retry_once(|| self.backend.delete(&collection, phone))
            .await
    }

    /// Move a user document to a new phone number.
    ///
    /// Fails with [`StoreError::NotFound`] if the source does not exist.
    /// An existing target document is overwritten; the admin surface checks
    /// first.
    pub async fn rename_user(
        &self,
        old_phone: &str,
        new_phone: &str,
        prefix: &Prefix,
    ) -> Result<(), StoreError> {
        let doc = self
            .get_user(old_phone, prefix)
            .await?
            .ok_or(StoreError::NotFound)?;
        self.put_user(new_phone, prefix, doc).await?;
        self.delete_user(old_phone, prefix).await
    }

    // ── Records ───────────────────────────────────────────────────

    /// Persist a new record, assigning its server-side id.
    ///
    /// The record's incoming id is ignored; `created_at`/`last_modified`
    /// are stamped here.
    pub async fn add_record(
        &self,
        phone: &str,
        record: Record,
        prefix: &Prefix,
    ) -> Result<Record, StoreError> {
        let mut doc = self.load_or_create(phone, prefix).await?;
        let now = Utc::now();
        let id = doc.allocate_id();

        let stored = match record {
            Record::Driver(mut ride) => {
                ride.ride_id = id;
                ride.created_at = now;
                ride.last_modified = now;
                doc.driver_rides.push(ride.clone());
                Record::Driver(ride)
            }
            Record::Hitchhiker(mut request) => {
                request.request_id = id;
                request.created_at = now;
                doc.hitchhiker_requests.push(request.clone());
                Record::Hitchhiker(request)
            }
        };

        doc.last_seen = now;
        self.put_user(phone, prefix, doc).await?;
        Ok(stored)
    }

    /// Both record lists for a user. Empty lists for an unknown phone.
    pub async fn list_records(
        &self,
        phone: &str,
        prefix: &Prefix,
    ) -> Result<(Vec<DriverRide>, Vec<HitchhikerRequest>), StoreError> {
        Ok(match self.get_user(phone, prefix).await? {
            Some(doc) => (doc.driver_rides, doc.hitchhiker_requests),
            None => (Vec::new(), Vec::new()),
        })
    }

    /// Delete one record by `(phone, id, role)`.
    pub async fn remove_record(
        &self,
        phone: &str,
        id: u64,
        role: Role,
        prefix: &Prefix,
    ) -> Result<(), StoreError> {
        let mut doc = self
            .get_user(phone, prefix)
            .await?
            .ok_or(StoreError::NotFound)?;

        let removed = match role {
            Role::Driver => {
                let before = doc.driver_rides.len();
                doc.driver_rides.retain(|r| r.ride_id != id);
                doc.driver_rides.len() != before
            }
            Role::Hitchhiker => {
                let before = doc.hitchhiker_requests.len();
                doc.hitchhiker_requests.retain(|r| r.request_id != id);
                doc.hitchhiker_requests.len() != before
            }
        };

        if !removed {
            return Err(StoreError::NotFound);
        }
        self.put_user(phone, prefix, doc).await
    }

    /// Delete every record a user has; returns how many were removed.
    pub async fn remove_all_records(
        &self,
        phone: &str,
        prefix: &Prefix,
    ) -> Result<usize, StoreError> {
        let Some(mut doc) = self.get_user(phone, prefix).await? else {
            return Ok(0);
        };
        let count = doc.driver_rides.len() + doc.hitchhiker_requests.len();
        doc.driver_rides.clear();
        doc.hitchhiker_requests.clear();
        self.put_user(phone, prefix, doc).await?;
        Ok(count)
    }

    /// Patch an existing record, returning the updated copy.
    ///
    /// Changing an endpoint invalidates any attached route data; the route
    /// pipeline repopulates it.
    pub async fn update_record(
        &self,
        phone: &str,
        id: u64,
        role: Role,
        patch: RecordPatch,
        prefix: &Prefix,
    ) -> Result<Record, StoreError> {
        let mut doc = self
            .get_user(phone, prefix)
            .await?
            .ok_or(StoreError::NotFound)?;
        let now = Utc::now();

        let updated = match role {
            Role::Driver => {
                let ride = doc
                    .driver_rides
                    .iter_mut()
                    .find(|r| r.ride_id == id)
                    .ok_or(StoreError::NotFound)?;
                let endpoints_changed = patch
                    .origin
                    .as_ref()
                    .is_some_and(|o| o != &ride.origin)
                    || patch
                        .destination
                        .as_ref()
                        .is_some_and(|d| d != &ride.destination);
                if let Some(origin) = patch.origin {
                    ride.origin = origin;
                }
                if let Some(destination) = patch.destination {
                    ride.destination = destination;
                }
                if let Some(schedule) = patch.schedule {
                    ride.schedule = schedule;
                }
                if let Some(seats) = patch.available_seats {
                    ride.available_seats = seats.max(1);
                }
                if let Some(notes) = patch.notes {
                    ride.notes = notes;
                }
                if endpoints_changed {
                    ride.route_data = None;
                }
                ride.last_modified = now;
                Record::Driver(ride.clone())
            }
            Role::Hitchhiker => {
                let request = doc
                    .hitchhiker_requests
                    .iter_mut()
                    .find(|r| r.request_id == id)
                    .ok_or(StoreError::NotFound)?;
                if let Some(origin) = patch.origin {
                    request.origin = origin;
                }
                if let Some(destination) = patch.destination {
                    request.destination = destination;
                }
                if let Some(window) = patch.window {
                    request.window = window;
                }
                if let Some(flex) = patch.flexibility_minutes {
                    request.flexibility_minutes =
                        flex.min(crate::records::MAX_FLEXIBILITY_MINUTES);
                }
                if let Some(notes) = patch.notes {
                    request.notes = notes;
                }
                Record::Hitchhiker(request.clone())
            }
        };

        doc.last_seen = now;
        self.put_user(phone, prefix, doc).await?;
        Ok(updated)
    }

    // ── Matching scans ────────────────────────────────────────────

    /// Every driver ride in the namespace, with its owner's phone.
    ///
    /// Full-collection enumeration — fine at thousands of active records.
    pub async fn scan_drivers(
        &self,
        prefix: &Prefix,
    ) -> Result<Vec<(String, DriverRide)>, StoreError> {
        let collection = prefix.collection();
        let docs = self.retry_once(|| self.backend.list(&collection)).await?;
        Ok(docs
            .into_iter()
            .flat_map(|(phone, doc)| {
                doc.driver_rides
                    .into_iter()
                    .map(move |ride| (phone.clone(), ride))
            })
            .collect())
    }

    /// Every hitchhiker request in the namespace, with its owner's phone.
    pub async fn scan_hitchhikers(
        &self,
        prefix: &Prefix,
    ) -> Result<Vec<(String, HitchhikerRequest)>, StoreError> {
        let collection = prefix.collection();
        let docs = self.retry_once(|| self.backend.list(&collection)).await?;
        Ok(docs
            .into_iter()
            .flat_map(|(phone, doc)| {
                doc.hitchhiker_requests
                    .into_iter()
                    .map(move |request| (phone.clone(), request))
            })
            .collect())
    }

    /// Idempotent upsert of a ride's route data.
    ///
    /// Returns `false` (a no-op) when the ride no longer exists — a user
    /// delete must not be resurrected by a late pipeline write.
    pub async fn attach_route_data(
        &self,
        phone: &str,
        id: u64,
        route_data: RouteData,
        prefix: &Prefix,
    ) -> Result<bool, StoreError> {
        let Some(mut doc) = self.get_user(phone, prefix).await? else {
            return Ok(false);
        };
        let Some(ride) = doc.driver_rides.iter_mut().find(|r| r.ride_id == id) else {
            return Ok(false);
        };
        ride.route_data = Some(route_data);
        ride.last_modified = Utc::now();
        self.put_user(phone, prefix, doc).await?;
        Ok(true)
    }

    // ── Retry ─────────────────────────────────────────────────────

    /// Run a backend call, retrying once with jitter on a transient failure.
    async fn retry_once<'a, T>(
        &self,
        mk: impl Fn() -> StoreFuture<'a, T>,
    ) -> Result<T, StoreError> {
        match mk().await {
            Err(StoreError::Transient(cause)) => {
                warn!("store transient failure, retrying once: {cause}");
                tokio::time::sleep(self.retry.pause_before(0)).await;
                mk().await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Day, DEFAULT_AVAILABLE_SEATS};
    use chrono::{NaiveDate, NaiveTime, Utc};
    use std::sync::Mutex;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn store() -> RideStore {
        RideStore::new(Arc::new(MemoryStore::new()))
    }

    fn driver(origin: &str, destination: &str) -> Record {
        Record::Driver(DriverRide {
            ride_id: 0,
            origin: origin.into(),
            destination: destination.into(),
            schedule: DriverSchedule::Recurring {
                days: vec![Day::Mon],
                departure_time: t(8, 0),
                return_time: None,
            },
            available_seats: DEFAULT_AVAILABLE_SEATS,
            notes: String::new(),
            route_data: None,
            created_at: Utc::now(),
            last_modified: Utc::now(),
        })
    }

    fn hitchhiker(origin: &str, destination: &str) -> Record {
        Record::Hitchhiker(HitchhikerRequest {
            request_id: 0,
            origin: origin.into(),
            destination: destination.into(),
            window: PickupWindow::OneShot {
                travel_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                departure_time: t(8, 10),
            },
            flexibility_minutes: 30,
            notes: String::new(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn add_assigns_unique_ids_across_roles() {
        let store = store();
        let prefix = Prefix::live();

        let a = store
            .add_record("972501", driver("גברעם", "תל אביב"), &prefix)
            .await
            .unwrap();
        let b = store
            .add_record("972501", hitchhiker("שדרות", "באר שבע"), &prefix)
            .await
            .unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);

        let (rides, requests) = store.list_records("972501", &prefix).await.unwrap();
        assert_eq!(rides.len(), 1);
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn remove_then_list_round_trip() {
        let store = store();
        let prefix = Prefix::live();

        let rec = store
            .add_record("972501", driver("גברעם", "תל אביב"), &prefix)
            .await
            .unwrap();
        store
            .remove_record("972501", rec.id(), Role::Driver, &prefix)
            .await
            .unwrap();

        let (rides, _) = store.list_records("972501", &prefix).await.unwrap();
        assert!(rides.is_empty());

        let err = store
            .remove_record("972501", rec.id(), Role::Driver, &prefix)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn prefixes_are_isolated() {
        let store = store();
        let live = Prefix::live();
        let sandbox = Prefix::sandbox();

        store
            .add_record("972501", driver("גברעם", "תל אביב"), &sandbox)
            .await
            .unwrap();

        let (live_rides, _) = store.list_records("972501", &live).await.unwrap();
        assert!(live_rides.is_empty());
        assert!(store.scan_drivers(&live).await.unwrap().is_empty());
        assert_eq!(store.scan_drivers(&sandbox).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_patches_fields_and_drops_stale_route() {
        let store = store();
        let prefix = Prefix::live();

        let rec = store
            .add_record("972501", driver("גברעם", "תל אביב"), &prefix)
            .await
            .unwrap();
        store
            .attach_route_data(
                "972501",
                rec.id(),
                RouteData {
                    polyline: vec![crate::geo::Point::new(31.59, 34.61)],
                    distance_km: 60.0,
                    threshold_km: 4.5,
                },
                &prefix,
            )
            .await
            .unwrap();

        // Notes-only patch keeps route data.
        let updated = store
            .update_record(
                "972501",
                rec.id(),
                Role::Driver,
                RecordPatch {
                    notes: Some("יוצא מהצומת".into()),
                    ..Default::default()
                },
                &prefix,
            )
            .await
            .unwrap();
        let Record::Driver(ride) = updated else {
            panic!("expected driver")
        };
        assert!(ride.route_data.is_some());

        // Endpoint patch drops it for the pipeline to repopulate.
        let updated = store
            .update_record(
                "972501",
                rec.id(),
                Role::Driver,
                RecordPatch {
                    destination: Some("ירושלים".into()),
                    ..Default::default()
                },
                &prefix,
            )
            .await
            .unwrap();
        let Record::Driver(ride) = updated else {
            panic!("expected driver")
        };
        assert!(ride.route_data.is_none());
    }

    #[tokio::test]
    async fn attach_route_data_noops_for_missing_record() {
        let store = store();
        let prefix = Prefix::live();
        let attached = store
            .attach_route_data(
                "972501",
                7,
                RouteData {
                    polyline: vec![],
                    distance_km: 1.0,
                    threshold_km: 1.5,
                },
                &prefix,
            )
            .await
            .unwrap();
        assert!(!attached);
    }

    #[tokio::test]
    async fn rename_user_moves_document() {
        let store = store();
        let prefix = Prefix::live();
        store
            .add_record("972501", driver("גברעם", "תל אביב"), &prefix)
            .await
            .unwrap();

        store.rename_user("972501", "972502", &prefix).await.unwrap();
        assert!(store.get_user("972501", &prefix).await.unwrap().is_none());
        let (rides, _) = store.list_records("972502", &prefix).await.unwrap();
        assert_eq!(rides.len(), 1);
    }

    /// Backend that fails transiently once per operation.
    struct FlakyStore {
        inner: MemoryStore,
        failures: Mutex<u32>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: Mutex::new(failures),
            }
        }

        fn take_failure(&self) -> bool {
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                true
            } else {
                false
            }
        }
    }

    impl UserDocumentStore for FlakyStore {
        fn get(&self, collection: &str, phone: &str) -> StoreFuture<'_, Option<UserDoc>> {
            if self.take_failure() {
                return Box::pin(async { Err(StoreError::Transient("flaky get".into())) });
            }
            self.inner.get(collection, phone)
        }
        fn put(&self, collection: &str, phone: &str, doc: UserDoc) -> StoreFuture<'_, ()> {
            if self.take_failure() {
                return Box::pin(async { Err(StoreError::Transient("flaky put".into())) });
            }
            self.inner.put(collection, phone, doc)
        }
        fn delete(&self, collection: &str, phone: &str) -> StoreFuture<'_, ()> {
            self.inner.delete(collection, phone)
        }
        fn list(&self, collection: &str) -> StoreFuture<'_, Vec<(String, UserDoc)>> {
            self.inner.list(collection)
        }
    }

    #[tokio::test]
    async fn transient_failures_retried_once() {
        let store = RideStore::new(Arc::new(FlakyStore::new(1)));
        let prefix = Prefix::live();
        // First get fails transiently, the retry succeeds.
        assert!(store.get_user("972501", &prefix).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_transient_failure_surfaces() {
        let store = RideStore::new(Arc::new(FlakyStore::new(2)));
        let prefix = Prefix::live();
        let err = store.get_user("972501", &prefix).await.unwrap_err();
        assert!(matches!(err, StoreError::Transient(_)));
    }
}
