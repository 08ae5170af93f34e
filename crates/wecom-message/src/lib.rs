//! WeCom application message client
//!
//! Sends text, image, file, text-card, news and markdown messages through
//! `/cgi-bin/message/send`, and uploads temporary media through
//! `/cgi-bin/media/upload`. Tokens come from a `wecom_auth::CredentialCache`
//! owned by the client; call `MessageClient::close()` to stop its refresh
//! task.
//!
//! Each send merges the client's `DefaultFields` (recipients, agent id,
//! duplicate check) with per-call `SendOptions` and the message body, then
//! goes through the shared retry protocol in `wecom_auth::api`.

pub mod client;
pub mod error;
pub mod message;
pub mod metrics;

pub use client::{ClientConfig, MessageClient};
pub use error::{Error, Result};
pub use message::{
    Article, DefaultFields, MediaType, OutgoingMessage, SendOptions, SendPayload, SendReceipt,
    build_payload,
};
