//! Metrics recorded by the token and API layers
//!
//! - `wecom_api_attempts_total` (counter): labels `endpoint`, `outcome`
//! - `wecom_token_refresh_total` (counter): label `outcome`
//!
//! No recorder is installed here; the embedding application decides whether
//! and how to export these.

/// Record one HTTP attempt against a platform endpoint.
///
/// `outcome` is one of `success`, `rejected`, `transport_error`, `decode_error`.
pub fn record_api_attempt(endpoint: &'static str, outcome: &'static str) {
    metrics::counter!("wecom_api_attempts_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

/// Record a token refresh result (`success` or `failure`).
pub fn record_token_refresh(outcome: &'static str) {
    metrics::counter!("wecom_token_refresh_total", "outcome" => outcome).increment(1);
}
