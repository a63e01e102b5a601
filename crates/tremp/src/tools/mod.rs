//! The closed set of tool calls the intent model is permitted to emit.
//!
//! Each call is validated against its JSON Schema before execution; unknown
//! names and schema violations come back as [`DispatchResult::ToolError`] —
//! an error string the model reads and self-corrects from, never shown to
//! the user directly. Every handler threads the
//! `(phone, args, prefix, send_externally)` spine: the sandbox duality lives
//! in those two trailing parameters.

use crate::geo::gazetteer::Gazetteer;
use crate::json_schema_for;
use crate::matching::{RideMatch, matches_for_driver, matches_for_hitchhiker};
use crate::notify::{MatchNotice, NotificationEmitter};
use crate::pipeline::RoutePipeline;
use crate::records::{
    DEFAULT_AVAILABLE_SEATS, DEFAULT_FLEXIBILITY_MINUTES, Day, DriverRide, DriverSchedule,
    HitchhikerRequest, MAX_FLEXIBILITY_MINUTES, PickupWindow, Record, Role,
};
use crate::store::{Prefix, RecordPatch, RideStore};
use crate::{ToolCall, ToolDef};
use chrono::{NaiveDate, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

// ── Tool names ─────────────────────────────────────────────────────

pub const TOOL_UPDATE_RECORDS: &str = "update_user_records";
pub const TOOL_VIEW_RECORDS: &str = "view_user_records";
pub const TOOL_DELETE_RECORD: &str = "delete_user_record";
pub const TOOL_DELETE_ALL: &str = "delete_all_user_records";
pub const TOOL_SHOW_HELP: &str = "show_help";

// ── Arguments ──────────────────────────────────────────────────────

/// Arguments for `update_user_records` — create or patch a ride/request.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct UpdateRecordArgs {
    /// Whether the user is offering a ride (driver) or asking for one
    /// (hitchhiker).
    pub role: Role,
    /// Departure settlement, as the user wrote it.
    #[serde(default)]
    pub origin: Option<String>,
    /// Destination settlement, as the user wrote it.
    #[serde(default)]
    pub destination: Option<String>,
    /// Weekdays of a recurring driver ride.
    #[serde(default)]
    pub days: Option<Vec<Day>>,
    /// Departure time, HH:MM.
    #[serde(default)]
    pub departure_time: Option<String>,
    /// Return-leg departure time of a recurring driver ride, HH:MM.
    #[serde(default)]
    pub return_time: Option<String>,
    /// Trip date for one-shot records, YYYY-MM-DD.
    #[serde(default)]
    pub travel_date: Option<String>,
    /// Earliest acceptable pickup for a flexible hitchhiker window, HH:MM.
    #[serde(default)]
    pub earliest: Option<String>,
    /// Latest acceptable pickup for a flexible hitchhiker window, HH:MM.
    #[serde(default)]
    pub latest: Option<String>,
    /// Hitchhiker time flexibility in minutes, 0-240.
    #[serde(default)]
    pub flexibility_minutes: Option<u32>,
    /// Seats the driver offers.
    #[serde(default)]
    pub available_seats: Option<u32>,
    /// Id of an existing record to patch; omit to create.
    #[serde(default)]
    pub record_id: Option<u64>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Arguments for `view_user_records`.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ViewRecordsArgs {}

/// Arguments for `delete_user_record`.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct DeleteRecordArgs {
    /// Id of the record to delete.
    pub record_id: u64,
    /// Which list the record lives in.
    pub role: Role,
}

/// Arguments for `delete_all_user_records`.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct DeleteAllArgs {}

/// Arguments for `show_help`.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ShowHelpArgs {}

// ── Definitions ────────────────────────────────────────────────────

/// The tool definitions exported to the intent model. Fixed set; nothing
/// outside this list executes.
pub fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            TOOL_UPDATE_RECORDS,
            "Create a new ride record or update an existing one. Use role \
             'driver' when the user offers a ride and 'hitchhiker' when the \
             user asks for one. Recurring driver rides take 'days' plus \
             'departure_time' (and optionally 'return_time'); one-shot trips \
             take 'travel_date' plus 'departure_time'. Hitchhikers may give a \
             flexible window with 'earliest'/'latest' instead of a departure \
             time. Pass 'record_id' only when changing an existing record.",
            json_schema_for::<UpdateRecordArgs>(),
        ),
        ToolDef::new(
            TOOL_VIEW_RECORDS,
            "List the user's current driver rides and hitchhiker requests.",
            json_schema_for::<ViewRecordsArgs>(),
        ),
        ToolDef::new(
            TOOL_DELETE_RECORD,
            "Delete one of the user's records by its id and role.",
            json_schema_for::<DeleteRecordArgs>(),
        ),
        ToolDef::new(
            TOOL_DELETE_ALL,
            "Delete every ride and request the user has.",
            json_schema_for::<DeleteAllArgs>(),
        ),
        ToolDef::new(
            TOOL_SHOW_HELP,
            "Show usage help when the user asks what the service can do.",
            json_schema_for::<ShowHelpArgs>(),
        ),
    ]
}

// ── Dispatch result ────────────────────────────────────────────────

/// A successfully handled tool call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// User-facing reply, Hebrew.
    pub reply: String,
    /// Match notices produced by this call. Sent externally on the live
    /// path; returned inline for sandbox display.
    pub notices: Vec<MatchNotice>,
}

/// Result of dispatching one model-produced call.
#[derive(Debug, Clone)]
pub enum DispatchResult {
    Reply(DispatchOutcome),
    /// Internal error string fed back to the model, not to the user.
    ToolError(String),
}

// ── Dispatcher ─────────────────────────────────────────────────────

/// Validates and executes model-produced tool calls against the ride store.
pub struct Dispatcher {
    store: Arc<RideStore>,
    gazetteer: &'static Gazetteer,
    pipeline: Arc<RoutePipeline>,
    emitter: Arc<NotificationEmitter>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<RideStore>,
        gazetteer: &'static Gazetteer,
        pipeline: Arc<RoutePipeline>,
        emitter: Arc<NotificationEmitter>,
    ) -> Self {
        Self {
            store,
            gazetteer,
            pipeline,
            emitter,
        }
    }

    /// Validate and execute one tool call.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        phone: &str,
        prefix: &Prefix,
        send_externally: bool,
    ) -> DispatchResult {
        let name = call.function.name.as_str();
        let arguments = call.function.arguments.as_str();
        debug!("dispatching tool {name} for {phone} (prefix '{}')", prefix.as_str());

        let Some(def) = definitions().into_iter().find(|d| d.function.name == name) else {
            return DispatchResult::ToolError(format!(
                "Error: no tool named '{name}' exists; pick one of the declared tools."
            ));
        };
        if let Some(error) = validate_arguments(&def, arguments) {
            return DispatchResult::ToolError(error);
        }

        let result = match name {
            TOOL_UPDATE_RECORDS => match parse_args::<UpdateRecordArgs>(arguments) {
                Ok(args) => self.update_records(phone, args, prefix, send_externally).await,
                Err(e) => return DispatchResult::ToolError(e),
            },
            TOOL_VIEW_RECORDS => self.view_records(phone, prefix).await,
            TOOL_DELETE_RECORD => match parse_args::<DeleteRecordArgs>(arguments) {
                Ok(args) => self.delete_record(phone, args, prefix).await,
                Err(e) => return DispatchResult::ToolError(e),
            },
            TOOL_DELETE_ALL => self.delete_all(phone, prefix).await,
            TOOL_SHOW_HELP => Ok(DispatchOutcome {
                reply: help_text().to_string(),
                notices: Vec::new(),
            }),
            _ => unreachable!("covered by the definitions lookup"),
        };

        match result {
            Ok(outcome) => DispatchResult::Reply(outcome),
            Err(e) => DispatchResult::ToolError(e),
        }
    }

    // ── update_user_records ───────────────────────────────────────

    async fn update_records(
        &self,
        phone: &str,
        args: UpdateRecordArgs,
        prefix: &Prefix,
        send_externally: bool,
    ) -> Result<DispatchOutcome, String> {
        match args.record_id {
            Some(id) => self.patch_record(phone, id, args, prefix, send_externally).await,
            None => self.create_record(phone, args, prefix, send_externally).await,
        }
    }

    async fn create_record(
        &self,
        phone: &str,
        args: UpdateRecordArgs,
        prefix: &Prefix,
        send_externally: bool,
    ) -> Result<DispatchOutcome, String> {
        let origin = required(&args.origin, "origin")?;
        let destination = required(&args.destination, "destination")?;
        let now = Utc::now();

        let record = match args.role {
            Role::Driver => Record::Driver(DriverRide {
                ride_id: 0,
                origin: origin.clone(),
                destination: destination.clone(),
                schedule: driver_schedule(&args)?,
                available_seats: args
                    .available_seats
                    .unwrap_or(DEFAULT_AVAILABLE_SEATS)
                    .max(1),
                notes: args.notes.clone().unwrap_or_default(),
                route_data: None,
                created_at: now,
                last_modified: now,
            }),
            Role::Hitchhiker => Record::Hitchhiker(HitchhikerRequest {
                request_id: 0,
                origin: origin.clone(),
                destination: destination.clone(),
                window: pickup_window(&args)?,
                flexibility_minutes: args
                    .flexibility_minutes
                    .unwrap_or(DEFAULT_FLEXIBILITY_MINUTES)
                    .min(MAX_FLEXIBILITY_MINUTES),
                notes: args.notes.clone().unwrap_or_default(),
                created_at: now,
            }),
        };

        // Duplicate fingerprint within the live records: answer instead of
        // re-creating.
        let doc = self
            .store
            .load_or_create(phone, prefix)
            .await
            .map_err(store_error)?;
        if doc.has_duplicate(&record.fingerprint()) {
            return Ok(DispatchOutcome {
                reply: "נסיעה כזו כבר רשומה אצלך. אפשר לעדכן אותה או למחוק אותה.".to_string(),
                notices: Vec::new(),
            });
        }

        let stored = self
            .store
            .add_record(phone, record, prefix)
            .await
            .map_err(store_error)?;
        info!(
            "record created: {} #{} for {phone} ({origin} → {destination})",
            stored.role(),
            stored.id(),
        );

        let mut reply = match &stored {
            Record::Driver(ride) => format!("נרשמה נסיעה חדשה:\n{}", format_ride(ride)),
            Record::Hitchhiker(req) => format!("נרשמה בקשת טרמפ חדשה:\n{}", format_request(req)),
        };
        for label in [&origin, &destination] {
            if self.gazetteer.entry(label).is_none() {
                reply.push_str(&format!(
                    "\nלא הצלחתי לאתר את '{label}' — נסו שם של יישוב מוכר קרוב."
                ));
            }
        }

        let (matches, notices) = self
            .match_and_notify(phone, &stored, prefix, send_externally)
            .await?;
        append_match_summary(&mut reply, &matches, &notices, send_externally);

        if let Record::Driver(ride) = &stored {
            self.pipeline.spawn(phone, ride.ride_id, prefix, send_externally);
        }

        reply.push_str(&self.shortlist(phone, prefix).await?);
        Ok(DispatchOutcome { reply, notices })
    }

    async fn patch_record(
        &self,
        phone: &str,
        id: u64,
        args: UpdateRecordArgs,
        prefix: &Prefix,
        send_externally: bool,
    ) -> Result<DispatchOutcome, String> {
        let patch = RecordPatch {
            origin: args.origin.clone(),
            destination: args.destination.clone(),
            schedule: match args.role {
                Role::Driver => driver_schedule(&args).ok(),
                Role::Hitchhiker => None,
            },
            window: match args.role {
                Role::Hitchhiker => pickup_window(&args).ok(),
                Role::Driver => None,
            },
            available_seats: args.available_seats,
            flexibility_minutes: args.flexibility_minutes,
            notes: args.notes.clone(),
        };

        let updated = match self
            .store
            .update_record(phone, id, args.role, patch, prefix)
            .await
        {
            Ok(record) => record,
            Err(crate::error::StoreError::NotFound) => {
                return Ok(DispatchOutcome {
                    reply: format!("לא נמצאה רשומה מספר {id}."),
                    notices: Vec::new(),
                });
            }
            Err(e) => return Err(store_error(e)),
        };

        let mut reply = match &updated {
            Record::Driver(ride) => format!("הנסיעה עודכנה:\n{}", format_ride(ride)),
            Record::Hitchhiker(req) => format!("הבקשה עודכנה:\n{}", format_request(req)),
        };

        // Re-run matching; the emitter suppresses pairs already announced.
        let (matches, notices) = self
            .match_and_notify(phone, &updated, prefix, send_externally)
            .await?;
        append_match_summary(&mut reply, &matches, &notices, send_externally);

        if let Record::Driver(ride) = &updated {
            if ride.route_data.is_none() {
                self.pipeline.spawn(phone, ride.ride_id, prefix, send_externally);
            }
        }

        Ok(DispatchOutcome { reply, notices })
    }

    /// Run the matching engine for a freshly persisted record and emit
    /// notifications.
    async fn match_and_notify(
        &self,
        phone: &str,
        record: &Record,
        prefix: &Prefix,
        send_externally: bool,
    ) -> Result<(Vec<RideMatch>, Vec<MatchNotice>), String> {
        let today = Utc::now().date_naive();
        let matches = match record {
            Record::Driver(ride) => {
                let requests = self
                    .store
                    .scan_hitchhikers(prefix)
                    .await
                    .map_err(store_error)?;
                matches_for_driver(self.gazetteer, today, phone, ride, &requests)
            }
            Record::Hitchhiker(request) => {
                let drivers = self.store.scan_drivers(prefix).await.map_err(store_error)?;
                matches_for_hitchhiker(self.gazetteer, today, phone, request, &drivers)
            }
        };
        let notices = self.emitter.emit(&matches, prefix, send_externally).await;
        Ok((matches, notices))
    }

    // ── view / delete ─────────────────────────────────────────────

    async fn view_records(&self, phone: &str, prefix: &Prefix) -> Result<DispatchOutcome, String> {
        let (rides, requests) = self
            .store
            .list_records(phone, prefix)
            .await
            .map_err(store_error)?;

        let reply = if rides.is_empty() && requests.is_empty() {
            "אין לך נסיעות או בקשות רשומות כרגע.".to_string()
        } else {
            let mut out = String::from("הרשומות שלך:");
            for ride in &rides {
                out.push('\n');
                out.push_str(&format_ride(ride));
            }
            for request in &requests {
                out.push('\n');
                out.push_str(&format_request(request));
            }
            out
        };
        Ok(DispatchOutcome {
            reply,
            notices: Vec::new(),
        })
    }

    async fn delete_record(
        &self,
        phone: &str,
        args: DeleteRecordArgs,
        prefix: &Prefix,
    ) -> Result<DispatchOutcome, String> {
        let reply = match self
            .store
            .remove_record(phone, args.record_id, args.role, prefix)
            .await
        {
            Ok(()) => {
                info!("record deleted: {} #{} for {phone}", args.role, args.record_id);
                format!("הרשומה מספר {} נמחקה.", args.record_id)
            }
            Err(crate::error::StoreError::NotFound) => {
                format!("לא נמצאה רשומה מספר {}.", args.record_id)
            }
            Err(e) => return Err(store_error(e)),
        };
        Ok(DispatchOutcome {
            reply,
            notices: Vec::new(),
        })
    }

    async fn delete_all(&self, phone: &str, prefix: &Prefix) -> Result<DispatchOutcome, String> {
        let count = self
            .store
            .remove_all_records(phone, prefix)
            .await
            .map_err(store_error)?;
        let reply = if count == 0 {
            "לא היו רשומות למחיקה.".to_string()
        } else {
            format!("נמחקו {count} רשומות.")
        };
        Ok(DispatchOutcome {
            reply,
            notices: Vec::new(),
        })
    }

    async fn shortlist(&self, phone: &str, prefix: &Prefix) -> Result<String, String> {
        let (rides, requests) = self
            .store
            .list_records(phone, prefix)
            .await
            .map_err(store_error)?;
        let total = rides.len() + requests.len();
        Ok(if total > 1 {
            format!("\n\nסך הכל רשומות פעילות: {total}. כתבו \"הצג\" לרשימה המלאה.")
        } else {
            String::new()
        })
    }
}

// ── Argument parsing and validation ────────────────────────────────

/// Check raw arguments against the tool's declared JSON Schema.
///
/// `None` means the call may proceed. Otherwise the returned string goes
/// back to the model as the tool result, worded so it can fix the call.
fn validate_arguments(def: &ToolDef, arguments: &str) -> Option<String> {
    let name = &def.function.name;

    let parsed: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(value) => value,
        Err(e) => {
            return Some(format!(
                "Error: arguments for '{name}' are not parseable JSON ({e}); \
                 resend the call with a JSON object that follows the declared schema."
            ));
        }
    };

    // A schema that fails to compile would block every call to the tool, so
    // a compile failure skips validation instead.
    let Ok(checker) = jsonschema::validator_for(&def.function.parameters) else {
        return None;
    };

    let mut problems = Vec::new();
    for issue in checker.iter_errors(&parsed) {
        problems.push(format!("  {} → {issue}", issue.instance_path()));
    }
    if problems.is_empty() {
        return None;
    }
    Some(format!(
        "Error: the arguments for '{name}' break its schema:\n{}\n\
         Correct the listed fields and call the tool again.",
        problems.join("\n"),
    ))
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "Error: could not decode the tool arguments ({e}); \
             resend them as JSON that follows the declared schema."
        )
    })
}

fn required(field: &Option<String>, name: &str) -> Result<String, String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!("Error: '{name}' is required for this record.")),
    }
}

fn parse_time(value: &str, field: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| format!("Error: '{field}' must be HH:MM, got '{value}'."))
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Error: '{field}' must be YYYY-MM-DD, got '{value}'."))
}

fn driver_schedule(args: &UpdateRecordArgs) -> Result<DriverSchedule, String> {
    if let Some(days) = args.days.as_ref().filter(|d| !d.is_empty()) {
        let departure = args
            .departure_time
            .as_deref()
            .ok_or("Error: recurring rides need 'departure_time'.")?;
        let mut days = days.clone();
        days.sort_by_key(|d| d.weekday().num_days_from_sunday());
        days.dedup();
        return Ok(DriverSchedule::Recurring {
            days,
            departure_time: parse_time(departure, "departure_time")?,
            return_time: args
                .return_time
                .as_deref()
                .map(|t| parse_time(t, "return_time"))
                .transpose()?,
        });
    }
    match (args.travel_date.as_deref(), args.departure_time.as_deref()) {
        (Some(date), Some(time)) => Ok(DriverSchedule::OneShot {
            travel_date: parse_date(date, "travel_date")?,
            departure_time: parse_time(time, "departure_time")?,
        }),
        _ => Err("Error: a driver ride needs either 'days' + 'departure_time' \
                  (recurring) or 'travel_date' + 'departure_time' (one-shot)."
            .to_string()),
    }
}

fn pickup_window(args: &UpdateRecordArgs) -> Result<PickupWindow, String> {
    let date = args
        .travel_date
        .as_deref()
        .ok_or("Error: a hitchhiker request needs 'travel_date'.")?;
    let travel_date = parse_date(date, "travel_date")?;

    match (args.earliest.as_deref(), args.latest.as_deref()) {
        (Some(earliest), Some(latest)) => Ok(PickupWindow::Flexible {
            travel_date,
            earliest: parse_time(earliest, "earliest")?,
            latest: parse_time(latest, "latest")?,
        }),
        _ => {
            let time = args.departure_time.as_deref().ok_or(
                "Error: a hitchhiker request needs 'departure_time' or both \
                 'earliest' and 'latest'.",
            )?;
            Ok(PickupWindow::OneShot {
                travel_date,
                departure_time: parse_time(time, "departure_time")?,
            })
        }
    }
}

fn store_error(e: crate::error::StoreError) -> String {
    format!("Error: storage failure: {e}. Please try again.")
}

// ── Formatting ─────────────────────────────────────────────────────

fn day_letter(day: Day) -> &'static str {
    match day {
        Day::Sun => "א'",
        Day::Mon => "ב'",
        Day::Tue => "ג'",
        Day::Wed => "ד'",
        Day::Thu => "ה'",
        Day::Fri => "ו'",
        Day::Sat => "ש'",
    }
}

pub(crate) fn format_ride(ride: &DriverRide) -> String {
    let when = match &ride.schedule {
        DriverSchedule::Recurring {
            days,
            departure_time,
            return_time,
        } => {
            let days = days
                .iter()
                .map(|d| day_letter(*d))
                .collect::<Vec<_>>()
                .join(",");
            match return_time {
                Some(rt) => format!(
                    "ימים {days} | יציאה {} | חזרה {}",
                    departure_time.format("%H:%M"),
                    rt.format("%H:%M"),
                ),
                None => format!("ימים {days} | יציאה {}", departure_time.format("%H:%M")),
            }
        }
        DriverSchedule::OneShot {
            travel_date,
            departure_time,
        } => format!(
            "{} בשעה {}",
            travel_date.format("%d/%m/%Y"),
            departure_time.format("%H:%M"),
        ),
    };
    format!(
        "🚗 נהג #{}: {} ← {} | {when} | {} מקומות",
        ride.ride_id, ride.origin, ride.destination, ride.available_seats,
    )
}

pub(crate) fn format_request(request: &HitchhikerRequest) -> String {
    let when = match &request.window {
        PickupWindow::OneShot {
            travel_date,
            departure_time,
        } => format!(
            "{} בשעה {}",
            travel_date.format("%d/%m/%Y"),
            departure_time.format("%H:%M"),
        ),
        PickupWindow::Flexible {
            travel_date,
            earliest,
            latest,
        } => format!(
            "{} בין {} ל-{}",
            travel_date.format("%d/%m/%Y"),
            earliest.format("%H:%M"),
            latest.format("%H:%M"),
        ),
    };
    format!(
        "🙋 טרמפ #{}: {} ← {} | {when} (גמישות {} ד')",
        request.request_id, request.origin, request.destination, request.flexibility_minutes,
    )
}

fn append_match_summary(
    reply: &mut String,
    matches: &[RideMatch],
    notices: &[MatchNotice],
    send_externally: bool,
) {
    if matches.is_empty() {
        reply.push_str("\nעוד אין התאמה — נעדכן ברגע שתימצא.");
        return;
    }
    if notices.is_empty() {
        // All compatible pairs were announced earlier; nothing new to say.
        reply.push_str("\nההתאמות שכבר נשלחו נשארו בתוקף.");
        return;
    }
    if send_externally {
        reply.push_str(&format!(
            "\nנמצאו {} התאמות! שלחנו הודעה לשני הצדדים.",
            notices.len(),
        ));
    } else {
        reply.push_str(&format!("\nנמצאו {} התאמות:", notices.len()));
        for notice in notices {
            reply.push('\n');
            reply.push_str(&notice.hitchhiker_message);
        }
    }
}

fn help_text() -> &'static str {
    "אני בוט הטרמפים של הקהילה 🚗\n\
     אפשר לכתוב לי בשפה חופשית, למשל:\n\
     • \"אני נוסע מגברעם לתל אביב בימים א'-ה' ב-08:00\" — להציע טרמפ\n\
     • \"מחפשת טרמפ משדרות לבאר שבע ביום שלישי בסביבות 9\" — לבקש טרמפ\n\
     • \"מה הנסיעות שלי?\" — להציג את הרשומות שלך\n\
     • \"תמחק את הנסיעה מספר 3\" — למחוק רשומה\n\
     כשנמצאת התאמה, שני הצדדים מקבלים הודעה עם מספר הטלפון לתיאום."
}
