//! Message-level metrics
//!
//! - `wecom_messages_sent_total` (counter): labels `msgtype`, `outcome`
//! - `wecom_media_uploads_total` (counter): labels `media_type`, `outcome`

use wecom_auth::ApiError;

/// Outcome label for a finished platform call.
pub fn outcome_label<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ApiError::Platform { .. }) => "rejected",
        Err(ApiError::RetriesExhausted { .. }) => "exhausted",
    }
}

pub fn record_message_sent(msgtype: &'static str, outcome: &'static str) {
    metrics::counter!("wecom_messages_sent_total", "msgtype" => msgtype, "outcome" => outcome)
        .increment(1);
}

pub fn record_media_upload(media_type: &'static str, outcome: &'static str) {
    metrics::counter!("wecom_media_uploads_total", "media_type" => media_type, "outcome" => outcome)
        .increment(1);
}
