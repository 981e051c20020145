//! Shared HTTP response helpers.
//!
//! Reads map failures to [`ClientError`]; writes classify them into
//! [`WriteError`] so the loader knows whether a retry can help.

use std::time::Duration;

use crate::error::{ClientError, WriteError};

/// `Retry-After` fallback when the header is absent or unparseable.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Check a read response for common error conditions.
///
/// Returns the response unchanged on success. Handles:
/// - **429 Too Many Requests** → [`ClientError::RateLimited`]
/// - **Non-success status** → [`ClientError::Api`] with the response body
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status() == 429 {
        return Err(ClientError::RateLimited {
            retry_after_secs: parse_retry_after(&resp),
        });
    }
    if !resp.status().is_success() {
        return Err(ClientError::Api {
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}

/// Classify a write response. `Ok(())` on any 2xx.
///
/// # Errors
///
/// - 429 and 5xx → [`WriteError::Transient`] (429 carries `Retry-After`)
/// - other non-success → [`WriteError::Permanent`] with the response body
pub async fn classify_write_response(resp: reqwest::Response) -> Result<(), WriteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status == 429 {
        let secs = parse_retry_after(&resp);
        return Err(WriteError::Transient {
            message: format!("rate limited ({status})"),
            retry_after: Some(Duration::from_secs(secs)),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status.as_u16(), body.trim())
    };
    if status.is_server_error() {
        Err(WriteError::transient(format!("server error ({detail})")))
    } else {
        Err(WriteError::permanent(format!("destination rejected row ({detail})")))
    }
}

/// Classify a transport-level write failure (no response received).
#[must_use]
pub fn classify_write_transport(err: &reqwest::Error) -> WriteError {
    if err.is_builder() {
        WriteError::permanent(format!("invalid request: {err}"))
    } else if err.is_timeout() {
        WriteError::transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        WriteError::transient(format!("connection failed: {err}"))
    } else {
        WriteError::transient(format!("transport error: {err}"))
    }
}

/// Parse the `Retry-After` header as seconds, falling back to 60 s.
fn parse_retry_after(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
