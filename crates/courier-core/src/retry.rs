//! Redelivery delay extraction.
//!
//! When handling fails, the consumer asks [`redelivery_delay`] whether the
//! failure carries an explicit backoff hint. Errors may wrap several causes
//! (one per failed handler) and those causes may wrap further errors; the
//! first cause in wrap order that yields a delay wins. Absence of a hint is
//! the common case and is reported as `None`.

use crate::error::{CourierError, HttpStatusError};
use http::header::RETRY_AFTER;
use http::StatusCode;
use std::error::Error as StdError;
use std::time::Duration;

/// Returns the redelivery delay suggested by `error`, if any cause carries one.
///
/// # Example
///
/// ```
/// use courier_core::{redelivery_delay, CourierError, HandlerFailure, HttpStatusError};
/// use http::StatusCode;
/// use std::time::Duration;
///
/// let throttled = HttpStatusError::new(StatusCode::TOO_MANY_REQUESTS, "slow down")
///     .with_header("retry-after", "3");
/// let err = CourierError::HandlerFailed {
///     message_name: "SyncInvoice".into(),
///     failures: vec![HandlerFailure::new("sync", throttled)],
/// };
///
/// assert_eq!(redelivery_delay(&err), Some(Duration::from_secs(3)));
/// ```
#[must_use]
pub fn redelivery_delay(error: &(dyn StdError + 'static)) -> Option<Duration> {
    if let Some(http) = error.downcast_ref::<HttpStatusError>() {
        return http_delay(http);
    }

    if let Some(courier) = error.downcast_ref::<CourierError>() {
        return courier.causes().into_iter().find_map(redelivery_delay);
    }

    error.source().and_then(redelivery_delay)
}

fn http_delay(error: &HttpStatusError) -> Option<Duration> {
    if error.status != StatusCode::TOO_MANY_REQUESTS && error.status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }

    let value = error.headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // HTTP-date form; a date in the past means "retry now".
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let millis = (at.timestamp_millis() - chrono::Utc::now().timestamp_millis()).max(0);
    Some(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerFailure;

    fn throttled(retry_after: &str) -> HttpStatusError {
        HttpStatusError::new(StatusCode::TOO_MANY_REQUESTS, "rate limited")
            .with_header("retry-after", retry_after)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped")]
    struct Wrapper(#[source] HttpStatusError);

    #[test]
    fn test_no_hint_yields_none() {
        let err = CourierError::HandlerFailed {
            message_name: "Ping".into(),
            failures: vec![HandlerFailure::new("h", "plain failure")],
        };
        assert_eq!(redelivery_delay(&err), None);
    }

    #[test]
    fn test_nested_wrap_uses_innermost_cause() {
        let inner = CourierError::HandlerFailed {
            message_name: "Inner".into(),
            failures: vec![HandlerFailure::new("client", Wrapper(throttled("3")))],
        };
        let outer = CourierError::HandlerFailed {
            message_name: "Outer".into(),
            failures: vec![HandlerFailure::new("outer", inner)],
        };
        assert_eq!(redelivery_delay(&outer), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_first_classifiable_cause_wins() {
        let err = CourierError::HandlerFailed {
            message_name: "Ping".into(),
            failures: vec![
                HandlerFailure::new("a", "unclassified"),
                HandlerFailure::new("b", throttled("5")),
                HandlerFailure::new("c", throttled("9")),
            ],
        };
        assert_eq!(redelivery_delay(&err), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_other_statuses_are_ignored() {
        let err = HttpStatusError::new(StatusCode::BAD_REQUEST, "bad").with_header("retry-after", "3");
        assert_eq!(redelivery_delay(&err), None);
    }

    #[test]
    fn test_unparseable_retry_after() {
        assert_eq!(redelivery_delay(&throttled("soon")), None);
    }

    #[test]
    fn test_http_date_in_past_is_zero() {
        let err = throttled("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(redelivery_delay(&err), Some(Duration::ZERO));
    }

    #[test]
    fn test_transport_source_is_followed() {
        let err = CourierError::transport_with_source("fetch failed", throttled("2"));
        assert_eq!(redelivery_delay(&err), Some(Duration::from_secs(2)));
    }
}
