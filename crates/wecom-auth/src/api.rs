//! Platform call envelope and bounded retry
//!
//! Every WeCom endpoint answers with a JSON object carrying `errcode` and
//! `errmsg`, plus endpoint-specific fields on success. `call_with_retry`
//! drives one logical call:
//!
//! - transport failure or a body that does not decode → retried
//! - `errcode != 0` → returned immediately as `ApiError::Platform`
//! - `errcode == 0` → endpoint payload decoded and returned
//!
//! After `retry + 1` failed attempts the caller gets `RetriesExhausted`. The
//! per-attempt causes are logged, not returned.

use std::future::Future;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::constants::ERRCODE_OK;
use crate::metrics::record_api_attempt;

/// Errors surfaced by a platform call after the retry loop.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Well-formed response with a non-zero `errcode`. Never retried.
    #[error("{endpoint} rejected by platform (errcode {code}): {message}")]
    Platform {
        endpoint: &'static str,
        code: i64,
        message: String,
    },

    /// Every attempt failed at the transport or decode level.
    #[error("{endpoint} still failing after {attempts} attempts")]
    RetriesExhausted {
        endpoint: &'static str,
        attempts: u32,
    },
}

impl ApiError {
    /// Platform `errcode` for rejections, `None` for exhausted retries.
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Platform { code, .. } => Some(*code),
            ApiError::RetriesExhausted { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug)]
enum Decoded<T> {
    Success(T),
    Rejected { code: i64, message: String },
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<Decoded<T>> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let envelope = Envelope::deserialize(&value)?;
    if envelope.errcode != ERRCODE_OK {
        return Ok(Decoded::Rejected {
            code: envelope.errcode,
            message: envelope.errmsg,
        });
    }
    T::deserialize(value).map(Decoded::Success)
}

/// Run `attempt` up to `retry + 1` times and decode the platform response.
///
/// `attempt` must build a fresh request each call; request bodies such as
/// multipart forms cannot be replayed.
pub async fn call_with_retry<T, F, Fut>(
    endpoint: &'static str,
    retry: u32,
    mut attempt: F,
) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<reqwest::Response>>,
{
    let attempts = retry.saturating_add(1);

    for n in 1..=attempts {
        let body = match attempt().await {
            Ok(response) => match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(endpoint, attempt = n, error = %e, "failed to read response body");
                    record_api_attempt(endpoint, "transport_error");
                    continue;
                }
            },
            Err(e) => {
                warn!(endpoint, attempt = n, error = %e, "request failed");
                record_api_attempt(endpoint, "transport_error");
                continue;
            }
        };

        match decode::<T>(&body) {
            Ok(Decoded::Success(payload)) => {
                debug!(endpoint, attempt = n, "request succeeded");
                record_api_attempt(endpoint, "success");
                return Ok(payload);
            }
            Ok(Decoded::Rejected { code, message }) => {
                warn!(endpoint, errcode = code, errmsg = %message, "platform rejected request");
                record_api_attempt(endpoint, "rejected");
                return Err(ApiError::Platform {
                    endpoint,
                    code,
                    message,
                });
            }
            Err(e) => {
                warn!(endpoint, attempt = n, error = %e, "response is not a valid platform envelope");
                record_api_attempt(endpoint, "decode_error");
            }
        }
    }

    Err(ApiError::RetriesExhausted { endpoint, attempts })
}
