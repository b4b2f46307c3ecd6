//! Classification of page failures into retry classes
//!
//! Every dialect reports failures as [`PageError`]; this module is the single
//! place that decides which [`ErrorClass`] a failure belongs to, plus the
//! human-readable description and remediation used in failure summaries.

use crate::backoff::ErrorClass;

use super::PageError;

/// Classify a page failure
///
/// - 429, 403 mentioning "rate limit", and Stack Exchange `throttle_violation` are rate limits
/// - 408, 5xx, network failures and undecodable bodies are transient
/// - every other 4xx is a client error
pub fn classify(error: &PageError) -> ErrorClass {
    match error {
        PageError::Status { status, body, .. } => classify_status(*status, body),
        PageError::Network { .. } => ErrorClass::Transient,
        PageError::Decode(_) => ErrorClass::Transient,
    }
}

fn classify_status(status: u16, body: &str) -> ErrorClass {
    let body = body.to_ascii_lowercase();
    match status {
        429 => ErrorClass::RateLimited,
        403 if body.contains("rate limit") => ErrorClass::RateLimited,
        400 if body.contains("throttle_violation") => ErrorClass::RateLimited,
        408 => ErrorClass::Transient,
        400..=499 => ErrorClass::ClientError,
        _ => ErrorClass::Transient,
    }
}

/// User-facing description of a failure
pub fn description(error: &PageError) -> &'static str {
    match error {
        PageError::Network { timeout: true, .. } => "network timeout",
        PageError::Network { .. } => "connection failed",
        PageError::Decode(_) => "unreadable response",
        PageError::Status { status, body, .. } => match classify_status(*status, body) {
            ErrorClass::RateLimited => "rate limit exceeded",
            _ => match status {
                400 => "invalid request",
                401 => "authentication failed (401)",
                403 => "access forbidden (403)",
                404 => "resource not found",
                422 => "query rejected by the API",
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                500..=599 => "server error",
                _ => "client error",
            },
        },
    }
}

/// Suggested remediation for a failure class
pub fn suggestion(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::RateLimited | ErrorClass::QuotaCriticallyLow => {
            "Add more credentials to the pool or lower --concurrency"
        }
        ErrorClass::Transient => "The platform or network may be unstable; resume the job later",
        ErrorClass::ClientError => {
            "Check the scope, entity kind and credential permissions; resuming will not help"
        }
    }
}
