//! Backoff policy for calls that leave the process: the routing engine, the
//! intent model, and the document store.
//!
//! A [`BackoffPolicy`] says how many times a failed call may be retried and
//! how long to pause before each retry. Callers consult [`retryable`] /
//! [`fatal`] first: only rate limiting, server-side failures, and network
//! trouble are worth another attempt — client errors fail on the spot.

use std::time::Duration;

/// Error-string fragments that indicate network trouble rather than an API
/// verdict. Matched case-folded.
const NETWORK_HINTS: &[&str] = &[
    "request failed",
    "connection",
    "timed out",
    "timeout",
    "unreachable",
    "broken pipe",
];

/// How a caller retries a failing external call.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries allowed after the initial attempt. Zero disables retrying.
    pub attempts: u32,
    /// Pause before the first retry.
    pub base_delay: Duration,
    /// Ceiling on any single pause.
    pub cap: Duration,
    /// Multiplier applied per retry.
    pub growth: f64,
    /// Spread pauses out so simultaneous failures do not retry in lockstep.
    pub spread: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            base_delay: Duration::from_millis(400),
            cap: Duration::from_secs(10),
            growth: 2.0,
            spread: true,
        }
    }
}

impl BackoffPolicy {
    /// Policy allowing `attempts` retries, everything else at defaults.
    pub fn retries(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    /// Pause before retry number `retry` (zero-based).
    ///
    /// Grows geometrically up to the cap. With `spread` on, the pause is
    /// scaled into the 55%–95% band by a factor keyed on the retry number —
    /// deterministic, so tests stay stable and no rand dependency is needed.
    pub fn pause_before(&self, retry: u32) -> Duration {
        let grown = self.base_delay.as_millis() as f64 * self.growth.powi(retry as i32);
        let mut millis = grown.min(self.cap.as_millis() as f64);
        if self.spread {
            millis *= 0.55 + 0.10 * f64::from(retry.wrapping_mul(7) % 5);
        }
        Duration::from_millis(millis as u64)
    }
}

/// Whether a failed call is worth another attempt.
///
/// True for 408/429 and all 5xx statuses found in the error text, and for
/// network-level trouble that never produced a status at all.
pub fn retryable(error: &str) -> bool {
    if let Some(code) = embedded_status(error) {
        return code == 408 || code == 429 || code >= 500;
    }
    let folded = error.to_lowercase();
    NETWORK_HINTS.iter().any(|hint| folded.contains(hint))
}

/// Whether a failure is definitely unrecoverable by retrying: a 4xx verdict
/// (rate limiting and request timeouts excepted), or wording that amounts
/// to one.
pub fn fatal(error: &str) -> bool {
    match embedded_status(error) {
        Some(code) => (400..500).contains(&code) && code != 408 && code != 429,
        None => {
            let folded = error.to_lowercase();
            ["unauthorized", "forbidden", "bad request", "not found"]
                .iter()
                .any(|hint| folded.contains(hint))
        }
    }
}

/// HTTP status embedded in an error string, e.g. `"llm HTTP 503: …"`.
fn embedded_status(error: &str) -> Option<u16> {
    let (_, tail) = error.split_once("HTTP ")?;
    let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() == 3 { digits.parse().ok() } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_grows_geometrically_and_hits_the_cap() {
        let policy = BackoffPolicy {
            spread: false,
            cap: Duration::from_secs(3),
            ..BackoffPolicy::retries(6)
        };
        assert_eq!(policy.pause_before(0), Duration::from_millis(400));
        assert_eq!(policy.pause_before(1), Duration::from_millis(800));
        assert_eq!(policy.pause_before(2), Duration::from_millis(1600));
        assert_eq!(policy.pause_before(9), Duration::from_secs(3));
    }

    #[test]
    fn spread_keeps_pauses_inside_the_band() {
        let spread = BackoffPolicy::retries(4);
        let exact = BackoffPolicy {
            spread: false,
            ..BackoffPolicy::retries(4)
        };
        for retry in 0..8 {
            let jittered = spread.pause_before(retry).as_millis() as f64;
            let full = exact.pause_before(retry).as_millis() as f64;
            assert!(jittered <= full * 0.95 + 1.0, "retry {retry}: {jittered} vs {full}");
            assert!(jittered >= full * 0.55 - 1.0, "retry {retry}: {jittered} vs {full}");
        }
    }

    #[test]
    fn retrying_is_off_by_default() {
        assert_eq!(BackoffPolicy::default().attempts, 0);
        assert_eq!(BackoffPolicy::retries(2).attempts, 2);
    }

    #[test]
    fn server_side_and_throttling_statuses_retry() {
        assert!(retryable("routing API HTTP 503 Service Unavailable: down"));
        assert!(retryable("llm HTTP 429 Too Many Requests: slow down"));
        assert!(retryable("llm HTTP 500: boom"));
        assert!(!retryable("llm HTTP 404 Not Found: no such model"));
    }

    #[test]
    fn network_trouble_retries_without_a_status() {
        assert!(retryable("request failed: connection refused"));
        assert!(retryable("request failed: operation timed out"));
        assert!(!retryable("gazetteer asset missing"));
    }

    #[test]
    fn client_errors_are_fatal_but_server_errors_are_not() {
        assert!(fatal("llm HTTP 401 Unauthorized: bad key"));
        assert!(fatal("routing API HTTP 422: rejected"));
        assert!(!fatal("routing API HTTP 500: boom"));
        assert!(!fatal("llm HTTP 429: throttled"));
    }

    #[test]
    fn fatal_without_a_status_goes_by_wording() {
        assert!(fatal("upstream said: unauthorized"));
        assert!(!fatal("some other hiccup"));
    }

    #[test]
    fn embedded_status_parses_only_full_codes() {
        assert_eq!(embedded_status("x HTTP 503 y"), Some(503));
        assert_eq!(embedded_status("HTTP 41"), None);
        assert_eq!(embedded_status("no status here"), None);
    }
}
