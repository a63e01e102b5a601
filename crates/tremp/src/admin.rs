//! Text-command admin surface.
//!
//! Reached two ways: chat messages beginning with [`ADMIN_PREFIX`] (sender
//! must be on the configured allowlist) and the HTTP admin endpoint in the
//! webhook adapter (bearer token checked at the boundary). Both paths carry
//! an explicit prefix, so an operator can inspect and clean the sandbox
//! namespace as easily as the live one.

use crate::error::StoreError;
use crate::store::{Prefix, RideStore};
use crate::tools::{format_request, format_ride};
use std::sync::Arc;
use tracing::info;

/// Reserved chat prefix for admin commands.
pub const ADMIN_PREFIX: &str = "/a";

const USAGE: &str = "פקודות ניהול:\n\
    /a list <phone> — הצגת הרשומות של משתמש\n\
    /a delete <phone> — מחיקת משתמש\n\
    /a reset <phone> — איפוס היסטוריה ורשומות\n\
    /a phone <old> <new> — העברת משתמש למספר חדש";

/// Executes administrative commands against the ride store.
pub struct AdminHandler {
    store: Arc<RideStore>,
}

impl AdminHandler {
    pub fn new(store: Arc<RideStore>) -> Self {
        Self { store }
    }

    /// Handle one admin command line.
    ///
    /// `authorized` is decided by the caller: allowlisted sender phone on
    /// the chat path, valid bearer token on the HTTP path.
    pub async fn handle(&self, text: &str, prefix: &Prefix, authorized: bool) -> String {
        if !authorized {
            return "אין הרשאה לפקודות ניהול.".to_string();
        }

        let command = text.trim().strip_prefix(ADMIN_PREFIX).unwrap_or(text).trim();
        let mut parts = command.split_whitespace();

        match (parts.next(), parts.next(), parts.next()) {
            (Some("list"), Some(phone), None) => self.list(phone, prefix).await,
            (Some("delete"), Some(phone), None) => self.delete(phone, prefix).await,
            (Some("reset"), Some(phone), None) => self.reset(phone, prefix).await,
            (Some("phone"), Some(old), Some(new)) => self.change_phone(old, new, prefix).await,
            _ => USAGE.to_string(),
        }
    }

    async fn list(&self, phone: &str, prefix: &Prefix) -> String {
        match self.store.list_records(phone, prefix).await {
            Ok((rides, requests)) if rides.is_empty() && requests.is_empty() => {
                format!("למשתמש {phone} אין רשומות.")
            }
            Ok((rides, requests)) => {
                let mut out = format!("רשומות של {phone}:");
                for ride in &rides {
                    out.push('\n');
                    out.push_str(&format_ride(ride));
                }
                for request in &requests {
                    out.push('\n');
                    out.push_str(&format_request(request));
                }
                out
            }
            Err(e) => format!("שגיאת אחסון: {e}"),
        }
    }

    async fn delete(&self, phone: &str, prefix: &Prefix) -> String {
        match self.store.get_user(phone, prefix).await {
            Ok(None) => format!("משתמש {phone} לא נמצא."),
            Ok(Some(_)) => match self.store.delete_user(phone, prefix).await {
                Ok(()) => {
                    info!("admin: deleted user {phone} (prefix '{}')", prefix.as_str());
                    format!("המשתמש {phone} נמחק.")
                }
                Err(e) => format!("שגיאת אחסון: {e}"),
            },
            Err(e) => format!("שגיאת אחסון: {e}"),
        }
    }

    async fn reset(&self, phone: &str, prefix: &Prefix) -> String {
        match self.store.get_user(phone, prefix).await {
            Ok(None) => format!("משתמש {phone} לא נמצא."),
            Ok(Some(mut doc)) => {
                doc.chat_history.clear();
                doc.driver_rides.clear();
                doc.hitchhiker_requests.clear();
                match self.store.put_user(phone, prefix, doc).await {
                    Ok(()) => {
                        info!("admin: reset user {phone} (prefix '{}')", prefix.as_str());
                        format!("המשתמש {phone} אופס.")
                    }
                    Err(e) => format!("שגיאת אחסון: {e}"),
                }
            }
            Err(e) => format!("שגיאת אחסון: {e}"),
        }
    }

    async fn change_phone(&self, old: &str, new: &str, prefix: &Prefix) -> String {
        match self.store.get_user(new, prefix).await {
            Ok(Some(_)) => return format!("המספר {new} כבר קיים — לא מעבירים."),
            Ok(None) => {}
            Err(e) => return format!("שגיאת אחסון: {e}"),
        }
        match self.store.rename_user(old, new, prefix).await {
            Ok(()) => {
                info!("admin: moved user {old} → {new} (prefix '{}')", prefix.as_str());
                format!("המשתמש הועבר מ-{old} ל-{new}.")
            }
            Err(StoreError::NotFound) => format!("משתמש {old} לא נמצא."),
            Err(e) => format!("שגיאת אחסון: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        DEFAULT_AVAILABLE_SEATS, Day, DriverRide, DriverSchedule, Record,
    };
    use crate::store::MemoryStore;
    use chrono::{NaiveTime, Utc};

    fn handler() -> (AdminHandler, Arc<RideStore>) {
        let store = Arc::new(RideStore::new(Arc::new(MemoryStore::new())));
        (AdminHandler::new(store.clone()), store)
    }

    fn ride() -> Record {
        Record::Driver(DriverRide {
            ride_id: 0,
            origin: "גברעם".into(),
            destination: "תל אביב".into(),
            schedule: DriverSchedule::Recurring {
                days: vec![Day::Sun],
                departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                return_time: None,
            },
            available_seats: DEFAULT_AVAILABLE_SEATS,
            notes: String::new(),
            route_data: None,
            created_at: Utc::now(),
            last_modified: Utc::now(),
        })
    }

    #[tokio::test]
    async fn unauthorized_is_refused() {
        let (admin, _) = handler();
        let reply = admin.handle("/a delete 972501", &Prefix::live(), false).await;
        assert!(reply.contains("אין הרשאה"));
    }

    #[tokio::test]
    async fn list_and_delete_honor_prefix() {
        let (admin, store) = handler();
        let sandbox = Prefix::sandbox();
        store.add_record("972501", ride(), &sandbox).await.unwrap();

        // The live namespace sees nothing.
        let live = admin.handle("/a list 972501", &Prefix::live(), true).await;
        assert!(live.contains("אין רשומות"));

        let listed = admin.handle("/a list 972501", &sandbox, true).await;
        assert!(listed.contains("🚗"));

        let deleted = admin.handle("/a delete 972501", &sandbox, true).await;
        assert!(deleted.contains("נמחק"));
        assert!(store.get_user("972501", &sandbox).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_clears_but_keeps_user() {
        let (admin, store) = handler();
        let prefix = Prefix::live();
        store.add_record("972501", ride(), &prefix).await.unwrap();

        let reply = admin.handle("/a reset 972501", &prefix, true).await;
        assert!(reply.contains("אופס"));

        let doc = store.get_user("972501", &prefix).await.unwrap().unwrap();
        assert!(doc.driver_rides.is_empty());
        assert!(doc.chat_history.is_empty());
    }

    #[tokio::test]
    async fn change_phone_refuses_occupied_target() {
        let (admin, store) = handler();
        let prefix = Prefix::live();
        store.add_record("972501", ride(), &prefix).await.unwrap();
        store.add_record("972502", ride(), &prefix).await.unwrap();

        let refused = admin.handle("/a phone 972501 972502", &prefix, true).await;
        assert!(refused.contains("כבר קיים"));

        let moved = admin.handle("/a phone 972501 972503", &prefix, true).await;
        assert!(moved.contains("הועבר"));
        assert!(store.get_user("972503", &prefix).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_command_prints_usage() {
        let (admin, _) = handler();
        let reply = admin.handle("/a frobnicate", &Prefix::live(), true).await;
        assert!(reply.contains("פקודות ניהול"));
    }
}
