//! Error type shared by the library
//!
//! Gmail failures are classified once, where the call is made, so the retry
//! loop only has to ask [`AgentError::is_transient`].

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Type alias for Result with AgentError
pub type Result<T> = std::result::Result<T, AgentError>;

/// Seconds to wait on a 429 that carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Gmail `errors[].reason` values that mean "slow down" even on a 403
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

#[derive(Error, Debug)]
pub enum AgentError {
    /// Gmail API returned an error we have no better bucket for
    #[error("Gmail API error: {0}")]
    ApiError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Quota hit; wait `retry_after` seconds before the next attempt
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// The named message, label or profile does not exist
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// A Gmail call, model completion or summary send did not finish in time
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Label error: {0}")]
    LabelError(String),

    #[error("Categorization error: {0}")]
    CategorizationError(String),

    /// Language model call failed or returned something unusable
    #[error("Model error: {0}")]
    ModelError(String),

    /// Summary could not be rendered into a message or sent
    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AgentError {
    /// Worth another attempt: quota, 5xx, dropped connections and timeouts
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::RateLimitExceeded { .. }
                | AgentError::ServerError { .. }
                | AgentError::NetworkError(_)
                | AgentError::Timeout { .. }
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        AgentError::Timeout {
            operation: operation.into(),
            seconds: after.as_secs(),
        }
    }

    /// Classify a failed Gmail call against `resource`, e.g. `"message 18c2f"`
    pub fn gmail(resource: &str, error: google_gmail1::Error) -> Self {
        use google_gmail1::Error;

        match error {
            // The generated client parses JSON error bodies for every non-2xx
            // status, so this is where most real failures land
            Error::BadRequest(body) => match serde_json::from_value::<ErrorEnvelope>(body.clone()) {
                Ok(envelope) => {
                    let rate_limited = envelope
                        .error
                        .errors
                        .iter()
                        .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()));
                    from_status(
                        resource,
                        envelope.error.code,
                        envelope.error.message,
                        None,
                        rate_limited,
                    )
                }
                Err(_) => AgentError::BadRequest(format!("{}: {}", resource, body)),
            },
            Error::Failure(response) => {
                let status = response.status();
                from_status(
                    resource,
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown").to_string(),
                    retry_after_secs(response.headers()),
                    false,
                )
            }
            Error::HttpError(e) => AgentError::NetworkError(format!("{}: {}", resource, e)),
            Error::Io(e) => AgentError::NetworkError(format!("{}: {}", resource, e)),
            Error::MissingToken(e) => AgentError::AuthError(format!("no token for {}: {}", resource, e)),
            Error::MissingAPIKey => AgentError::AuthError(format!("no API key for {}", resource)),
            other => AgentError::ApiError(format!("{}: {}", resource, other)),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

fn from_status(
    resource: &str,
    status: u16,
    message: String,
    retry_after: Option<u64>,
    rate_limited: bool,
) -> AgentError {
    let detail = format!("{}: HTTP {} {}", resource, status, message);
    match status {
        429 => AgentError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        403 if rate_limited => AgentError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        400 => AgentError::BadRequest(detail),
        401 => AgentError::AuthError(detail),
        403 => AgentError::Forbidden(detail),
        404 => AgentError::NotFound(resource.to_string()),
        500..=599 => AgentError::ServerError { status, message: detail },
        _ => AgentError::ApiError(detail),
    }
}

/// Seconds named by a `Retry-After` header, either as a count or an HTTP date
///
/// Dates already in the past count as absent.
fn retry_after_secs(headers: &hyper::HeaderMap) -> Option<u64> {
    let value = headers.get(hyper::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.signed_duration_since(chrono::Utc::now()).num_seconds();
    (wait > 0).then_some(wait as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use serde_json::json;

    fn gmail_body(code: u16, reason: &str) -> google_gmail1::Error {
        google_gmail1::Error::BadRequest(json!({
            "error": {
                "code": code,
                "message": "Requested entity was not found.",
                "errors": [{ "domain": "global", "reason": reason, "message": "x" }],
                "status": "NOT_FOUND"
            }
        }))
    }

    fn retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_transient_errors() {
        assert!(AgentError::RateLimitExceeded { retry_after: 5 }.is_transient());
        assert!(AgentError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        }
        .is_transient());
        assert!(AgentError::NetworkError("reset".to_string()).is_transient());
        assert!(AgentError::timeout("send summary", Duration::from_secs(30)).is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(AgentError::NotFound("message abc".to_string()).is_permanent());
        assert!(AgentError::ModelError("bad json".to_string()).is_permanent());
        assert!(AgentError::DeliveryError("bad address".to_string()).is_permanent());
        assert!(AgentError::AuthError("expired".to_string()).is_permanent());
    }

    #[test]
    fn test_not_found_names_the_resource() {
        let err = AgentError::gmail("label AI/Work", gmail_body(404, "notFound"));
        assert!(matches!(&err, AgentError::NotFound(r) if r == "label AI/Work"));
        assert_eq!(err.to_string(), "label AI/Work not found");

        let err = AgentError::gmail("message 18c2f", gmail_body(404, "notFound"));
        assert_eq!(err.to_string(), "message 18c2f not found");
    }

    #[test]
    fn test_gmail_error_bodies_are_classified_by_code() {
        assert!(matches!(
            AgentError::gmail("profile", gmail_body(401, "authError")),
            AgentError::AuthError(_)
        ));
        assert!(matches!(
            AgentError::gmail("messages", gmail_body(503, "backendError")),
            AgentError::ServerError { status: 503, .. }
        ));
        assert!(matches!(
            AgentError::gmail("messages", gmail_body(429, "rateLimitExceeded")),
            AgentError::RateLimitExceeded { retry_after: 5 }
        ));
        assert!(matches!(
            AgentError::gmail("labels", gmail_body(400, "invalidArgument")),
            AgentError::BadRequest(_)
        ));
    }

    #[test]
    fn test_quota_403_is_rate_limited_but_plain_403_is_forbidden() {
        let quota = AgentError::gmail("messages", gmail_body(403, "userRateLimitExceeded"));
        assert!(quota.is_transient());

        let denied = AgentError::gmail("messages", gmail_body(403, "insufficientPermissions"));
        assert!(matches!(denied, AgentError::Forbidden(_)));
    }

    #[test]
    fn test_unrecognised_error_body_is_a_bad_request() {
        let err = AgentError::gmail("send summary", google_gmail1::Error::BadRequest(json!("oops")));
        assert!(matches!(&err, AgentError::BadRequest(m) if m.starts_with("send summary")));
    }

    #[test]
    fn test_timeout_display() {
        let err = AgentError::timeout("model gpt-4o-mini", Duration::from_secs(30));
        assert_eq!(err.to_string(), "model gpt-4o-mini timed out after 30s");
    }

    #[test]
    fn test_retry_after_seconds() {
        assert_eq!(retry_after_secs(&retry_after("120")), Some(120));
        assert_eq!(retry_after_secs(&retry_after("soon")), None);
        assert_eq!(retry_after_secs(&HeaderMap::new()), None);
    }

    #[test]
    fn test_retry_after_http_date() {
        let later = chrono::Utc::now() + chrono::Duration::seconds(60);
        let wait = retry_after_secs(&retry_after(&later.to_rfc2822())).unwrap();
        assert!((58..=60).contains(&wait), "got {}", wait);

        assert_eq!(
            retry_after_secs(&retry_after("Sun, 06 Nov 1994 08:49:37 GMT")),
            None
        );
    }

    #[test]
    fn test_rate_limit_uses_header_or_default() {
        assert!(matches!(
            from_status("messages", 429, "Too Many Requests".to_string(), Some(42), false),
            AgentError::RateLimitExceeded { retry_after: 42 }
        ));
        assert!(matches!(
            from_status("messages", 429, "Too Many Requests".to_string(), None, false),
            AgentError::RateLimitExceeded { retry_after: 5 }
        ));
    }
}
