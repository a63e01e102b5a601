//! Ride, request, and user document types.
//!
//! Driver vs hitchhiker is a tagged variant ([`Record`]), not a subclass;
//! both kinds persist under a single per-phone [`UserDoc`].

use crate::geo::Point;
use crate::geo::gazetteer::normalize;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default seat count for a new driver ride.
pub const DEFAULT_AVAILABLE_SEATS: u32 = 3;
/// Default hitchhiker time flexibility, minutes.
pub const DEFAULT_FLEXIBILITY_MINUTES: u32 = 30;
/// Upper bound on hitchhiker flexibility, minutes.
pub const MAX_FLEXIBILITY_MINUTES: u32 = 240;

// ── Role and weekday ───────────────────────────────────────────────

/// Which side of a match a record belongs to.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Hitchhiker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Driver => write!(f, "driver"),
            Role::Hitchhiker => write!(f, "hitchhiker"),
        }
    }
}

/// Day of week for recurring rides. Serialized as lowercase three-letter
/// tokens, matching the tool-call contract.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Day {
    pub fn weekday(self) -> Weekday {
        match self {
            Day::Sun => Weekday::Sun,
            Day::Mon => Weekday::Mon,
            Day::Tue => Weekday::Tue,
            Day::Wed => Weekday::Wed,
            Day::Thu => Weekday::Thu,
            Day::Fri => Weekday::Fri,
            Day::Sat => Weekday::Sat,
        }
    }

    pub fn from_weekday(w: Weekday) -> Self {
        match w {
            Weekday::Sun => Day::Sun,
            Weekday::Mon => Day::Mon,
            Weekday::Tue => Day::Tue,
            Weekday::Wed => Day::Wed,
            Weekday::Thu => Day::Thu,
            Weekday::Fri => Day::Fri,
            Weekday::Sat => Day::Sat,
        }
    }
}

// ── Route data ─────────────────────────────────────────────────────

/// Driving route attached asynchronously by the route pipeline.
///
/// Refreshed as a whole or absent — never a partial state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteData {
    pub polyline: Vec<Point>,
    pub distance_km: f64,
    pub threshold_km: f64,
}

// ── Driver rides ───────────────────────────────────────────────────

/// Temporal shape of a driver ride.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverSchedule {
    /// Repeats on a weekday set; `return_time` is a separate reverse trip.
    Recurring {
        days: Vec<Day>,
        departure_time: NaiveTime,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_time: Option<NaiveTime>,
    },
    /// A single dated trip.
    OneShot {
        travel_date: NaiveDate,
        departure_time: NaiveTime,
    },
}

/// A driver's planned trip.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DriverRide {
    /// Server-assigned, unique within the owning user.
    pub ride_id: u64,
    pub origin: String,
    pub destination: String,
    pub schedule: DriverSchedule,
    pub available_seats: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_data: Option<RouteData>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl DriverRide {
    /// Normalized identity used for duplicate detection: same endpoints and
    /// schedule means the same listing regardless of notes or seats.
    pub fn fingerprint(&self) -> String {
        format!(
            "driver|{}|{}|{}",
            normalize(&self.origin),
            normalize(&self.destination),
            schedule_token(&self.schedule),
        )
    }

    /// Whether the ride can take a passenger at all.
    pub fn has_capacity(&self) -> bool {
        self.available_seats >= 1
    }
}

fn schedule_token(s: &DriverSchedule) -> String {
    match s {
        DriverSchedule::Recurring {
            days,
            departure_time,
            return_time,
        } => {
            let mut days = days.clone();
            days.sort_by_key(|d| d.weekday().num_days_from_sunday());
            days.dedup();
            format!(
                "rec:{}:{}:{}",
                days.iter()
                    .map(|d| format!("{:?}", d).to_lowercase())
                    .collect::<Vec<_>>()
                    .join(","),
                departure_time.format("%H:%M"),
                return_time.map_or_else(String::new, |t| t.format("%H:%M").to_string()),
            )
        }
        DriverSchedule::OneShot {
            travel_date,
            departure_time,
        } => format!("once:{travel_date}:{}", departure_time.format("%H:%M")),
    }
}

// ── Hitchhiker requests ────────────────────────────────────────────

/// Temporal shape of a hitchhiker request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PickupWindow {
    /// A specific departure time on a given date.
    OneShot {
        travel_date: NaiveDate,
        departure_time: NaiveTime,
    },
    /// Any time in `[earliest, latest]` on a given date.
    Flexible {
        travel_date: NaiveDate,
        earliest: NaiveTime,
        latest: NaiveTime,
    },
}

impl PickupWindow {
    pub fn travel_date(&self) -> NaiveDate {
        match self {
            PickupWindow::OneShot { travel_date, .. }
            | PickupWindow::Flexible { travel_date, .. } => *travel_date,
        }
    }
}

/// A hitchhiker's pickup request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HitchhikerRequest {
    /// Server-assigned, unique within the owning user.
    pub request_id: u64,
    pub origin: String,
    pub destination: String,
    pub window: PickupWindow,
    pub flexibility_minutes: u32,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl HitchhikerRequest {
    pub fn fingerprint(&self) -> String {
        let window = match &self.window {
            PickupWindow::OneShot {
                travel_date,
                departure_time,
            } => format!("once:{travel_date}:{}", departure_time.format("%H:%M")),
            PickupWindow::Flexible {
                travel_date,
                earliest,
                latest,
            } => format!(
                "flex:{travel_date}:{}:{}",
                earliest.format("%H:%M"),
                latest.format("%H:%M")
            ),
        };
        format!(
            "hitchhiker|{}|{}|{window}",
            normalize(&self.origin),
            normalize(&self.destination),
        )
    }
}

// ── Tagged record ──────────────────────────────────────────────────

/// A ride record of either role.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Record {
    Driver(DriverRide),
    Hitchhiker(HitchhikerRequest),
}

impl Record {
    pub fn role(&self) -> Role {
        match self {
            Record::Driver(_) => Role::Driver,
            Record::Hitchhiker(_) => Role::Hitchhiker,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Record::Driver(r) => r.ride_id,
            Record::Hitchhiker(r) => r.request_id,
        }
    }

    pub fn fingerprint(&self) -> String {
        match self {
            Record::Driver(r) => r.fingerprint(),
            Record::Hitchhiker(r) => r.fingerprint(),
        }
    }
}

// ── Chat history ───────────────────────────────────────────────────

/// Author of a chat-history entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One persisted conversation turn.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

// ── User document ──────────────────────────────────────────────────

/// Per-phone document holding everything the coordinator knows about a user.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub driver_rides: Vec<DriverRide>,
    #[serde(default)]
    pub hitchhiker_requests: Vec<HitchhikerRequest>,
    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,
    pub last_seen: DateTime<Utc>,
    /// Monotonic id source for both record kinds; never reused.
    #[serde(default)]
    pub next_record_id: u64,
}

impl UserDoc {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            display_name: None,
            driver_rides: Vec::new(),
            hitchhiker_requests: Vec::new(),
            chat_history: Vec::new(),
            last_seen: now,
            next_record_id: 1,
        }
    }

    /// Take the next server-assigned record id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_record_id.max(1);
        self.next_record_id = id + 1;
        id
    }

    pub fn find_ride(&self, id: u64) -> Option<&DriverRide> {
        self.driver_rides.iter().find(|r| r.ride_id == id)
    }

    pub fn find_request(&self, id: u64) -> Option<&HitchhikerRequest> {
        self.hitchhiker_requests.iter().find(|r| r.request_id == id)
    }

    /// Append a turn and truncate to the newest `cap` entries.
    pub fn push_history(&mut self, entry: ChatEntry, cap: usize) {
        self.chat_history.push(entry);
        if self.chat_history.len() > cap {
            let excess = self.chat_history.len() - cap;
            self.chat_history.drain(..excess);
        }
    }

    /// Whether a live record with the same fingerprint already exists.
    pub fn has_duplicate(&self, fingerprint: &str) -> bool {
        self.driver_rides
            .iter()
            .map(DriverRide::fingerprint)
            .chain(self.hitchhiker_requests.iter().map(HitchhikerRequest::fingerprint))
            .any(|f| f == fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ride(origin: &str, destination: &str) -> DriverRide {
        DriverRide {
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
            created_at: now(),
            last_modified: now(),
        }
    }

    #[test]
    fn id_allocation_is_monotonic() {
        let mut doc = UserDoc::new(now());
        assert_eq!(doc.allocate_id(), 1);
        assert_eq!(doc.allocate_id(), 2);
        assert_eq!(doc.allocate_id(), 3);
    }

    #[test]
    fn history_truncates_oldest_first() {
        let mut doc = UserDoc::new(now());
        for i in 0..7 {
            doc.push_history(
                ChatEntry {
                    role: ChatRole::User,
                    text: format!("msg {i}"),
                    timestamp: now(),
                },
                5,
            );
        }
        assert_eq!(doc.chat_history.len(), 5);
        assert_eq!(doc.chat_history[0].text, "msg 2");
        assert_eq!(doc.chat_history[4].text, "msg 6");
    }

    #[test]
    fn fingerprint_ignores_notes_and_seats() {
        let mut a = ride("גברעם", "תל אביב");
        let mut b = ride("גברעם", "תל-אביב");
        a.notes = "יש מקום למזוודה".into();
        b.available_seats = 1;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_schedules() {
        let a = ride("גברעם", "תל אביב");
        let mut b = ride("גברעם", "תל אביב");
        b.schedule = DriverSchedule::OneShot {
            travel_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            departure_time: t(8, 0),
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn duplicate_detection_sees_both_lists() {
        let mut doc = UserDoc::new(now());
        let mut r = ride("גברעם", "תל אביב");
        r.ride_id = doc.allocate_id();
        let fp = r.fingerprint();
        doc.driver_rides.push(r);
        assert!(doc.has_duplicate(&fp));
        assert!(!doc.has_duplicate("driver|אילת|ערד|rec:sun:08:00:"));
    }

    #[test]
    fn schedule_token_orders_days() {
        let a = DriverSchedule::Recurring {
            days: vec![Day::Wed, Day::Sun],
            departure_time: t(8, 0),
            return_time: None,
        };
        let b = DriverSchedule::Recurring {
            days: vec![Day::Sun, Day::Wed],
            departure_time: t(8, 0),
            return_time: None,
        };
        assert_eq!(schedule_token(&a), schedule_token(&b));
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = Record::Driver(ride("גברעם", "תל אביב"));
        let json = serde_json::to_string(&rec).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role(), Role::Driver);
        assert!(json.contains(r#""role":"driver""#));
    }
}
