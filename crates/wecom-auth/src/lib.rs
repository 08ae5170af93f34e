//! WeCom access token management
//!
//! Provides the platform call envelope shared by every WeCom endpoint, the
//! token endpoint client, on-disk token persistence, and the background
//! refreshing `CredentialCache`. This crate has no dependency on the message
//! client and can be used on its own by anything that needs a live token.
//!
//! Token flow:
//! 1. `CredentialCache::initialize()` loads a persisted token via `credentials::load()`
//! 2. On a miss, `TokenSource::fetch()` calls `token::fetch_token()` once
//! 3. Background task calls `CredentialCache::refresh()` every interval
//! 4. Each successful refresh is written back with `credentials::save()`
//! 5. Callers read the current token with `CredentialCache::current()`

pub mod api;
pub mod cache;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod token;

pub use api::{ApiError, call_with_retry};
pub use cache::{CredentialCache, clamp_refresh_interval};
pub use constants::*;
pub use credentials::{Credential, default_token_path};
pub use error::{Error, Result};
pub use token::{CorpTokenSource, TokenResponse, TokenSource, fetch_token};
