//! Matching engine: pure compatibility predicates and ranking.
//!
//! Given a newly persisted record and a scan of the opposite role under the
//! same prefix, produces an ordered list of [`RideMatch`]es. The engine is
//! pure with respect to the store snapshot it was handed — it never mutates
//! records and never performs I/O.
//!
//! Recurring driver rides expand against the next 7 days; a `return_time`
//! becomes a separate reverse trip with origin and destination swapped.
//! Without route data the predicates degrade to settlement-exact matching.

use crate::geo::gazetteer::Gazetteer;
use crate::geo::{on_corridor, point_to_polyline_km};
use crate::records::{DriverRide, DriverSchedule, HitchhikerRequest, PickupWindow, RouteData};
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use tracing::debug;

/// How many days ahead a recurring ride is expanded.
const RECURRENCE_HORIZON_DAYS: u64 = 7;

/// Why a pair was considered compatible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasonCode {
    /// Both endpoints resolved to the same settlements.
    ExactName,
    /// At least one endpoint sat on the driver's route corridor.
    Corridor,
}

/// A compatible driver/hitchhiker pair. Ephemeral — a suggestion surfaced to
/// both parties, not a contract.
#[derive(Clone, Debug)]
pub struct RideMatch {
    pub driver_phone: String,
    pub ride: DriverRide,
    pub hitchhiker_phone: String,
    pub request: HitchhikerRequest,
    pub trip_date: NaiveDate,
    pub driver_time: NaiveTime,
    /// True when the matched leg is the driver's return trip.
    pub reversed: bool,
    pub time_delta_minutes: i64,
    pub corridor_distance_km: f64,
    pub reason: ReasonCode,
}

// ── Entry points ───────────────────────────────────────────────────

/// Matches for a newly persisted driver ride against a hitchhiker scan.
pub fn matches_for_driver(
    gazetteer: &Gazetteer,
    today: NaiveDate,
    driver_phone: &str,
    ride: &DriverRide,
    requests: &[(String, HitchhikerRequest)],
) -> Vec<RideMatch> {
    let mut matches: Vec<RideMatch> = requests
        .iter()
        .filter_map(|(hitch_phone, request)| {
            pair_match(gazetteer, today, driver_phone, ride, hitch_phone, request)
        })
        .collect();
    rank(&mut matches);
    matches
}

/// Matches for a newly persisted hitchhiker request against a driver scan.
pub fn matches_for_hitchhiker(
    gazetteer: &Gazetteer,
    today: NaiveDate,
    hitch_phone: &str,
    request: &HitchhikerRequest,
    drivers: &[(String, DriverRide)],
) -> Vec<RideMatch> {
    let mut matches: Vec<RideMatch> = drivers
        .iter()
        .filter_map(|(driver_phone, ride)| {
            pair_match(gazetteer, today, driver_phone, ride, hitch_phone, request)
        })
        .collect();
    rank(&mut matches);
    matches
}

/// Stable sort, best fit first: smallest time delta, then tightest corridor
/// distance, then oldest driver listing.
fn rank(matches: &mut [RideMatch]) {
    matches.sort_by(|a, b| {
        a.time_delta_minutes
            .abs()
            .cmp(&b.time_delta_minutes.abs())
            .then_with(|| a.corridor_distance_km.total_cmp(&b.corridor_distance_km))
            .then_with(|| a.ride.created_at.cmp(&b.ride.created_at))
    });
}

// ── Pairwise predicate ─────────────────────────────────────────────

/// The best compatible trip between one driver ride and one request, if any.
fn pair_match(
    gazetteer: &Gazetteer,
    today: NaiveDate,
    driver_phone: &str,
    ride: &DriverRide,
    hitch_phone: &str,
    request: &HitchhikerRequest,
) -> Option<RideMatch> {
    if driver_phone == hitch_phone {
        return None;
    }
    if !ride.has_capacity() {
        return None;
    }

    let window = TimeWindow::of(request)?;
    let mut best: Option<RideMatch> = None;

    for candidate in expand_driver(ride, today) {
        if candidate.date != window.date {
            continue;
        }
        let Some(delta) = window.delta_minutes(candidate.time) else {
            continue;
        };

        let (origin, destination) = if candidate.reversed {
            (&ride.destination, &ride.origin)
        } else {
            (&ride.origin, &ride.destination)
        };
        let Some((corridor_km, reason)) = endpoints_compatible(
            gazetteer,
            origin,
            destination,
            request,
            ride.route_data.as_ref(),
        ) else {
            continue;
        };

        let closer = best
            .as_ref()
            .is_none_or(|b| delta.abs() < b.time_delta_minutes.abs());
        if closer {
            best = Some(RideMatch {
                driver_phone: driver_phone.to_string(),
                ride: ride.clone(),
                hitchhiker_phone: hitch_phone.to_string(),
                request: request.clone(),
                trip_date: candidate.date,
                driver_time: candidate.time,
                reversed: candidate.reversed,
                time_delta_minutes: delta,
                corridor_distance_km: corridor_km,
                reason,
            });
        }
    }

    best
}

/// Origin and destination compatibility, together.
///
/// Returns the corridor distance (0 for settlement-exact on both ends) and
/// the reason code, or `None` when either endpoint is incompatible.
fn endpoints_compatible(
    gazetteer: &Gazetteer,
    driver_origin: &str,
    driver_destination: &str,
    request: &HitchhikerRequest,
    route: Option<&RouteData>,
) -> Option<(f64, ReasonCode)> {
    let destination_km =
        endpoint_distance(gazetteer, driver_destination, &request.destination, route)?;
    let origin_km = endpoint_distance(gazetteer, driver_origin, &request.origin, route)?;

    let corridor_km = origin_km.max(destination_km);
    let reason = if corridor_km > 0.0 {
        ReasonCode::Corridor
    } else {
        ReasonCode::ExactName
    };
    Some((corridor_km, reason))
}

/// Distance cost of one endpoint: 0 for the same settlement, the
/// point-to-corridor distance when the requested point sits inside the
/// driver's corridor, `None` when neither holds.
///
/// Without route data only the settlement-exact path is available — a
/// gazetteer miss on the requested label degrades to normalized string
/// equality inside [`Gazetteer::same_settlement`].
fn endpoint_distance(
    gazetteer: &Gazetteer,
    driver_label: &str,
    requested_label: &str,
    route: Option<&RouteData>,
) -> Option<f64> {
    if gazetteer.same_settlement(driver_label, requested_label) {
        return Some(0.0);
    }
    let route = route?;
    let point = gazetteer.lookup(requested_label)?;
    if on_corridor(point, &route.polyline, route.threshold_km) {
        Some(point_to_polyline_km(point, &route.polyline))
    } else {
        None
    }
}

// ── Candidate expansion ────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct DriverCandidate {
    date: NaiveDate,
    time: NaiveTime,
    reversed: bool,
}

/// Concrete (date, time) trips a ride offers, looking ahead from `today`.
fn expand_driver(ride: &DriverRide, today: NaiveDate) -> Vec<DriverCandidate> {
    match &ride.schedule {
        DriverSchedule::Recurring {
            days,
            departure_time,
            return_time,
        } => {
            let mut out = Vec::new();
            for offset in 0..RECURRENCE_HORIZON_DAYS {
                let Some(date) = today.checked_add_days(Days::new(offset)) else {
                    continue;
                };
                if !days.iter().any(|d| d.weekday() == date.weekday()) {
                    continue;
                }
                out.push(DriverCandidate {
                    date,
                    time: *departure_time,
                    reversed: false,
                });
                if let Some(return_time) = return_time {
                    out.push(DriverCandidate {
                        date,
                        time: *return_time,
                        reversed: true,
                    });
                }
            }
            out
        }
        DriverSchedule::OneShot {
            travel_date,
            departure_time,
        } => {
            // Past-dated listings offer no trips.
            if *travel_date < today {
                Vec::new()
            } else {
                vec![DriverCandidate {
                    date: *travel_date,
                    time: *departure_time,
                    reversed: false,
                }]
            }
        }
    }
}

// ── Time windows ───────────────────────────────────────────────────

/// A request's acceptable departure interval on its date, in minutes from
/// midnight, flexibility already applied.
struct TimeWindow {
    date: NaiveDate,
    lo: i64,
    hi: i64,
    /// Core interval for delta computation (without flexibility).
    core_lo: i64,
    core_hi: i64,
}

impl TimeWindow {
    fn of(request: &HitchhikerRequest) -> Option<Self> {
        let flex = i64::from(request.flexibility_minutes);
        match &request.window {
            PickupWindow::OneShot {
                travel_date,
                departure_time,
            } => {
                let center = minutes(*departure_time);
                Some(Self {
                    date: *travel_date,
                    lo: center - flex,
                    hi: center + flex,
                    core_lo: center,
                    core_hi: center,
                })
            }
            PickupWindow::Flexible {
                travel_date,
                earliest,
                latest,
            } => {
                let (lo, hi) = (minutes(*earliest), minutes(*latest));
                if hi < lo {
                    debug!("empty flexible window, skipping candidate: {lo}..{hi}");
                    return None;
                }
                Some(Self {
                    date: *travel_date,
                    lo: lo - flex,
                    hi: hi + flex,
                    core_lo: lo,
                    core_hi: hi,
                })
            }
        }
    }

    /// Signed distance from the requested interval, or `None` when the
    /// candidate falls outside the flexibility bounds.
    fn delta_minutes(&self, candidate: NaiveTime) -> Option<i64> {
        let m = minutes(candidate);
        if m < self.lo || m > self.hi {
            return None;
        }
        Some(if m < self.core_lo {
            m - self.core_lo
        } else if m > self.core_hi {
            m - self.core_hi
        } else {
            0
        })
    }
}

fn minutes(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;
    use crate::records::{DEFAULT_AVAILABLE_SEATS, Day};
    use chrono::{TimeZone, Utc};

    /// A Monday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn recurring_ride(origin: &str, destination: &str, days: Vec<Day>, dep: NaiveTime) -> DriverRide {
        DriverRide {
            ride_id: 1,
            origin: origin.into(),
            destination: destination.into(),
            schedule: DriverSchedule::Recurring {
                days,
                departure_time: dep,
                return_time: None,
            },
            available_seats: DEFAULT_AVAILABLE_SEATS,
            notes: String::new(),
            route_data: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    fn one_shot_request(
        origin: &str,
        destination: &str,
        date: NaiveDate,
        dep: NaiveTime,
        flex: u32,
    ) -> HitchhikerRequest {
        HitchhikerRequest {
            request_id: 1,
            origin: origin.into(),
            destination: destination.into(),
            window: PickupWindow::OneShot {
                travel_date: date,
                departure_time: dep,
            },
            flexibility_minutes: flex,
            notes: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    fn gaz() -> &'static Gazetteer {
        Gazetteer::bundled()
    }

    #[test]
    fn exact_match_same_settlements_within_flex() {
        let ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        // 2024-06-03 is a Monday; 08:10 sits inside 30 minutes of flex.
        let request = one_shot_request("גברעם", "תל-אביב", today(), t(8, 10), 30);

        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972502",
            &request,
            &[("972501".into(), ride)],
        );
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.reason, ReasonCode::ExactName);
        assert_eq!(m.time_delta_minutes, -10);
        assert_eq!(m.corridor_distance_km, 0.0);
        assert_eq!(m.trip_date, today());
        assert!(!m.reversed);
    }

    #[test]
    fn recurring_wednesday_boundary() {
        let ride = recurring_ride("גברעם", "תל אביב", vec![Day::Sun, Day::Wed], t(8, 0));
        let wednesday = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();

        let near = one_shot_request("גברעם", "תל אביב", wednesday, t(8, 15), 30);
        let far = one_shot_request("גברעם", "תל אביב", wednesday, t(9, 0), 30);

        let drivers = vec![("972501".to_string(), ride)];
        assert_eq!(
            matches_for_hitchhiker(gaz(), today(), "972502", &near, &drivers).len(),
            1
        );
        assert!(matches_for_hitchhiker(gaz(), today(), "972502", &far, &drivers).is_empty());
    }

    #[test]
    fn corridor_pickup_on_long_ride() {
        // Jerusalem → Eilat passes the Arad area; the corridor of a ~290 km
        // ride is clamped to 8 km.
        let mut ride = recurring_ride("ירושלים", "אילת", vec![Day::Mon], t(7, 0));
        let arad = gaz().lookup("ערד").unwrap();
        ride.route_data = Some(RouteData {
            polyline: vec![
                gaz().lookup("ירושלים").unwrap(),
                Point::new(31.45, 35.38),
                Point::new(arad.lat + 0.02, arad.lon),
                Point::new(30.61, 35.21),
                gaz().lookup("אילת").unwrap(),
            ],
            distance_km: 290.0,
            threshold_km: 8.0,
        });

        let request = one_shot_request("ערד", "אילת", today(), t(7, 0), 30);
        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972502",
            &request,
            &[("972501".into(), ride)],
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].reason, ReasonCode::Corridor);
        assert!(matches[0].corridor_distance_km > 0.0);
        assert!(matches[0].corridor_distance_km <= 8.0);
    }

    #[test]
    fn corridor_boundary_two_vs_four_km() {
        // Synthetic settlements at controlled offsets from a west-east route.
        let json = r#"[
            {"id": "origin", "name_he": "מוצא", "name_en": "Motsa", "kind": "town",
             "population": 100, "lat": 31.0, "lon": 34.5, "aliases": []},
            {"id": "dest", "name_he": "יעד", "name_en": "Yaad", "kind": "town",
             "population": 100, "lat": 31.0, "lon": 35.5, "aliases": []},
            {"id": "near", "name_he": "קרוב", "name_en": "Karov", "kind": "town",
             "population": 100, "lat": 31.018, "lon": 35.0, "aliases": []},
            {"id": "far", "name_he": "רחוק", "name_en": "Rahok", "kind": "town",
             "population": 100, "lat": 31.036, "lon": 35.0, "aliases": []}
        ]"#;
        let gazetteer = Gazetteer::from_json_str(json).unwrap();

        let mut ride = recurring_ride("מוצא", "יעד", vec![Day::Mon], t(8, 0));
        ride.route_data = Some(RouteData {
            polyline: vec![Point::new(31.0, 34.5), Point::new(31.0, 35.5)],
            distance_km: 95.0,
            threshold_km: 3.0,
        });
        let drivers = vec![("972501".to_string(), ride)];

        // ~2 km off-route: inside the 3 km corridor.
        let near = one_shot_request("קרוב", "יעד", today(), t(8, 0), 30);
        let got = matches_for_hitchhiker(&gazetteer, today(), "972502", &near, &drivers);
        assert_eq!(got.len(), 1);
        assert!((1.5..2.5).contains(&got[0].corridor_distance_km));

        // ~4 km off-route: outside.
        let far = one_shot_request("רחוק", "יעד", today(), t(8, 0), 30);
        assert!(matches_for_hitchhiker(&gazetteer, today(), "972502", &far, &drivers).is_empty());
    }

    #[test]
    fn no_route_data_falls_back_to_name_exact() {
        let ride = recurring_ride("ירושלים", "אילת", vec![Day::Mon], t(7, 0));
        let drivers = vec![("972501".to_string(), ride)];

        // Same settlements (normalized) still match.
        let exact = one_shot_request("ירושלים", "אילת", today(), t(7, 10), 30);
        assert_eq!(
            matches_for_hitchhiker(gaz(), today(), "972502", &exact, &drivers).len(),
            1
        );

        // A corridor-only origin cannot match without a polyline.
        let corridor_only = one_shot_request("ערד", "אילת", today(), t(7, 10), 30);
        assert!(
            matches_for_hitchhiker(gaz(), today(), "972502", &corridor_only, &drivers).is_empty()
        );
    }

    #[test]
    fn unknown_labels_still_match_by_exact_string() {
        let ride = recurring_ride("חניון הצומת", "תל אביב", vec![Day::Mon], t(8, 0));
        let request = one_shot_request("חניון הצומת", "תל אביב", today(), t(8, 0), 30);
        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972502",
            &request,
            &[("972501".into(), ride)],
        );
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn self_match_excluded() {
        let ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        let request = one_shot_request("גברעם", "תל אביב", today(), t(8, 0), 30);
        assert!(
            matches_for_hitchhiker(
                gaz(),
                today(),
                "972501",
                &request,
                &[("972501".into(), ride)],
            )
            .is_empty()
        );
    }

    #[test]
    fn zero_seats_ineligible() {
        let mut ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        ride.available_seats = 0;
        let request = one_shot_request("גברעם", "תל אביב", today(), t(8, 0), 30);
        assert!(
            matches_for_hitchhiker(
                gaz(),
                today(),
                "972502",
                &request,
                &[("972501".into(), ride)],
            )
            .is_empty()
        );
    }

    #[test]
    fn return_trip_matches_reversed() {
        let mut ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        if let DriverSchedule::Recurring { return_time, .. } = &mut ride.schedule {
            *return_time = Some(t(17, 0));
        }
        // Hitchhiker travels the opposite direction at return time.
        let request = one_shot_request("תל אביב", "גברעם", today(), t(17, 10), 30);
        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972502",
            &request,
            &[("972501".into(), ride)],
        );
        assert_eq!(matches.len(), 1);
        assert!(matches[0].reversed);
        assert_eq!(matches[0].driver_time, t(17, 0));
    }

    #[test]
    fn flexible_window_zero_delta_inside_core() {
        let ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        let request = HitchhikerRequest {
            request_id: 1,
            origin: "גברעם".into(),
            destination: "תל אביב".into(),
            window: PickupWindow::Flexible {
                travel_date: today(),
                earliest: t(7, 30),
                latest: t(9, 0),
            },
            flexibility_minutes: 0,
            notes: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        };
        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972502",
            &request,
            &[("972501".into(), ride)],
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].time_delta_minutes, 0);
    }

    #[test]
    fn ranking_prefers_small_delta_then_age() {
        let mut early = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        early.ride_id = 1;
        let mut close = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 10));
        close.ride_id = 2;
        close.created_at = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();

        let request = one_shot_request("גברעם", "תל אביב", today(), t(8, 10), 30);
        let matches = matches_for_hitchhiker(
            gaz(),
            today(),
            "972503",
            &request,
            &[("972501".into(), early), ("972502".into(), close)],
        );
        assert_eq!(matches.len(), 2);
        // 0-minute delta ranks above the 10-minute one.
        assert_eq!(matches[0].ride.ride_id, 2);
        assert_eq!(matches[1].ride.ride_id, 1);
    }

    #[test]
    fn driver_side_scan_finds_waiting_hitchhikers() {
        let ride = recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0));
        let request = one_shot_request("גברעם", "תל אביב", today(), t(8, 10), 30);
        let matches = matches_for_driver(
            gaz(),
            today(),
            "972501",
            &ride,
            &[("972502".into(), request)],
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hitchhiker_phone, "972502");
    }

    #[test]
    fn past_one_shot_ride_offers_nothing() {
        let ride = DriverRide {
            schedule: DriverSchedule::OneShot {
                travel_date: NaiveDate::from_ymd_opt(2024, 5, 27).unwrap(),
                departure_time: t(8, 0),
            },
            ..recurring_ride("גברעם", "תל אביב", vec![Day::Mon], t(8, 0))
        };
        let request = one_shot_request(
            "גברעם",
            "תל אביב",
            NaiveDate::from_ymd_opt(2024, 5, 27).unwrap(),
            t(8, 0),
            30,
        );
        assert!(
            matches_for_hitchhiker(
                gaz(),
                today(),
                "972502",
                &request,
                &[("972501".into(), ride)],
            )
            .is_empty()
        );
    }
}
