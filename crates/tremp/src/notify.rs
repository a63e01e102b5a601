//! Match notifications: Hebrew message formatting, duplicate suppression,
//! sandbox silence, and the outbound chat sink.
//!
//! The contract with matched parties is that they exchange phone numbers —
//! each side receives the counterparty's number and arranges the pickup
//! themselves. Delivery is best-effort: a failed send is logged, never
//! retried past the sink's own timeout, and never fails the caller.

use crate::matching::RideMatch;
use crate::store::{Prefix, RideStore};
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Boxed future returned by [`ChatSink::send_text`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// Outbound plain-text chat seam. Unicode, RTL-safe bodies.
pub trait ChatSink: Send + Sync {
    fn send_text(&self, to: &str, body: &str) -> SinkFuture<'_>;
}

// ── WhatsApp Cloud sink ────────────────────────────────────────────

/// Chat sink backed by the WhatsApp Cloud messages endpoint.
pub struct WhatsAppSink {
    client: reqwest::Client,
    phone_id: String,
    token: String,
    base_url: String,
}

impl WhatsAppSink {
    pub fn new(phone_id: impl Into<String>, token: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(phone_id, token, "https://graph.facebook.com/v19.0")
    }

    pub fn with_base_url(
        phone_id: impl Into<String>,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("tremp/0.3")
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            phone_id: phone_id.into(),
            token: token.into(),
            base_url: base_url.into(),
        })
    }
}

impl ChatSink for WhatsAppSink {
    fn send_text(&self, to: &str, body: &str) -> SinkFuture<'_> {
        let to = to.to_string();
        let body = body.to_string();
        Box::pin(async move {
            let url = format!("{}/{}/messages", self.base_url, self.phone_id);
            let payload = serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": {"body": body},
            });
            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.token))
                .json(&payload)
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(format!("chat API HTTP {status}: {text}"));
            }
            debug!("sent {} chars to {to}", body.chars().count());
            Ok(())
        })
    }
}

// ── Recording sink ─────────────────────────────────────────────────

/// Sink that records messages instead of sending them. Used by tests and by
/// local harnesses that want to inspect outbound traffic.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(to, body)` pairs pushed so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ChatSink for RecordingSink {
    fn send_text(&self, to: &str, body: &str) -> SinkFuture<'_> {
        let to = to.to_string();
        let body = body.to_string();
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((to, body));
            Ok(())
        })
    }
}

// ── Emitter ────────────────────────────────────────────────────────

/// The pair of messages planned for one match. Returned to the caller even
/// when sending is suppressed, so the sandbox can display match details
/// inline.
#[derive(Clone, Debug)]
pub struct MatchNotice {
    pub driver_phone: String,
    pub hitchhiker_phone: String,
    pub driver_message: String,
    pub hitchhiker_message: String,
    pub trip_date: NaiveDate,
}

/// Formats and pushes match notifications, once per match identity.
///
/// The notified set is keyed by `(prefix, driver ride, hitchhiker request,
/// date)` so a later route refinement or a notes edit re-running the match
/// scan cannot re-notify the same pair.
pub struct NotificationEmitter {
    sink: Arc<dyn ChatSink>,
    store: Arc<RideStore>,
    notified: Mutex<HashSet<String>>,
}

impl NotificationEmitter {
    pub fn new(sink: Arc<dyn ChatSink>, store: Arc<RideStore>) -> Self {
        Self {
            sink,
            store,
            notified: Mutex::new(HashSet::new()),
        }
    }

    /// Notify both parties of each fresh match.
    ///
    /// Duplicates are suppressed silently; records deleted since the match
    /// scan are re-checked and skipped. When `send_externally` is false no
    /// sink call is made — the notices are only returned.
    pub async fn emit(
        &self,
        matches: &[RideMatch],
        prefix: &Prefix,
        send_externally: bool,
    ) -> Vec<MatchNotice> {
        let mut notices = Vec::new();

        for m in matches {
            let key = match_key(prefix, m);

            // Deleted records must not be announced; re-check both sides
            // against the store before claiming the key.
            if !self.both_sides_exist(m, prefix).await {
                debug!(
                    "match {}→{} skipped, record gone",
                    m.driver_phone, m.hitchhiker_phone
                );
                continue;
            }

            {
                let mut notified = self.notified.lock().unwrap_or_else(|e| e.into_inner());
                if !notified.insert(key) {
                    debug!(
                        "duplicate match {}→{} suppressed",
                        m.driver_phone, m.hitchhiker_phone
                    );
                    continue;
                }
            }

            let notice = format_notice(m);
            if send_externally {
                let sends = [
                    self.sink
                        .send_text(&notice.hitchhiker_phone, &notice.hitchhiker_message),
                    self.sink
                        .send_text(&notice.driver_phone, &notice.driver_message),
                ];
                for result in join_all(sends).await {
                    if let Err(cause) = result {
                        warn!("match notification send failed: {cause}");
                    }
                }
                info!(
                    "match notified: driver {} ↔ hitchhiker {} on {}",
                    notice.driver_phone, notice.hitchhiker_phone, notice.trip_date
                );
            }
            notices.push(notice);
        }

        notices
    }

    async fn both_sides_exist(&self, m: &RideMatch, prefix: &Prefix) -> bool {
        let ride_alive = match self.store.get_user(&m.driver_phone, prefix).await {
            Ok(Some(doc)) => doc.find_ride(m.ride.ride_id).is_some(),
            Ok(None) => false,
            Err(e) => {
                warn!("existence re-check failed for {}: {e}", m.driver_phone);
                false
            }
        };
        if !ride_alive {
            return false;
        }
        match self.store.get_user(&m.hitchhiker_phone, prefix).await {
            Ok(Some(doc)) => doc.find_request(m.request.request_id).is_some(),
            Ok(None) => false,
            Err(e) => {
                warn!("existence re-check failed for {}: {e}", m.hitchhiker_phone);
                false
            }
        }
    }
}

fn match_key(prefix: &Prefix, m: &RideMatch) -> String {
    format!(
        "{}|{}:{}|{}:{}|{}",
        prefix.as_str(),
        m.driver_phone,
        m.ride.ride_id,
        m.hitchhiker_phone,
        m.request.request_id,
        m.trip_date,
    )
}

fn format_notice(m: &RideMatch) -> MatchNotice {
    // Display the leg the hitchhiker actually rides: the return trip swaps
    // the listed endpoints.
    let (origin, destination) = if m.reversed {
        (&m.ride.destination, &m.ride.origin)
    } else {
        (&m.ride.origin, &m.ride.destination)
    };
    let date = m.trip_date.format("%d/%m/%Y");
    let time = m.driver_time.format("%H:%M");

    let hitchhiker_message = format!(
        "נמצאה התאמה לטרמפ! 🚗\n\
         נסיעה מ{origin} ל{destination}\n\
         בתאריך {date} בשעה {time}\n\
         לתיאום עם הנהג: {}",
        m.driver_phone,
    );
    let driver_message = format!(
        "נמצא טרמפיסט לנסיעה שלך מ{origin} ל{destination}!\n\
         מחפש טרמפ בתאריך {date} סביב השעה {time}\n\
         לתיאום: {}",
        m.hitchhiker_phone,
    );

    MatchNotice {
        driver_phone: m.driver_phone.clone(),
        hitchhiker_phone: m.hitchhiker_phone.clone(),
        driver_message,
        hitchhiker_message,
        trip_date: m.trip_date,
    }
}
