//! Shared HTTP plumbing for search backends.
//!
//! Status handling lives here (429 with `Retry-After`, other non-success
//! statuses) so each adapter only builds its request and maps its response.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use super::SearchError;

/// Transport timeout for backend HTTP clients. The aggregator applies its own
/// per-call deadline on top.
pub(crate) const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in a `BackendRequestFailed` message.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("truthseeker/", env!("CARGO_PKG_VERSION")))
        .timeout(CLIENT_TIMEOUT)
        .gzip(true)
        .build()
}

/// Return the response unchanged on success, otherwise a typed error.
pub(crate) async fn check_response(
    backend: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SearchError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(SearchError::RateLimited {
            backend: backend.to_string(),
            retry_after_secs: retry_after_secs(resp.headers()),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SearchError::BackendRequestFailed {
            backend: backend.to_string(),
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }
    Ok(resp)
}

/// `Retry-After` as seconds, falling back to 60.
fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(60)
}

/// Read an optional `{NAME}_BASE_URL` override, trimmed of trailing slashes.
pub(crate) fn base_url_from_env(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Read a credential; blank counts as absent.
pub(crate) fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
