//! Message client
//!
//! All six message kinds share one send path: merge fields, read the cached
//! token, POST through `call_with_retry`. Media upload uses the same retry
//! protocol with a multipart body rebuilt for every attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info, warn};
use wecom_auth::{
    CorpTokenSource, CredentialCache, DEFAULT_API_BASE, MAX_REFRESH_INTERVAL_SECS,
    MEDIA_UPLOAD_PATH, MESSAGE_SEND_PATH, call_with_retry, default_token_path,
};

use crate::error::{Error, Result};
use crate::message::{
    Article, DefaultFields, MediaType, OutgoingMessage, SendOptions, SendReceipt, build_payload,
};
use crate::metrics::{outcome_label, record_media_upload, record_message_sent};

/// Default attempts after the first one.
pub const DEFAULT_RETRY: u32 = 2;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to build a `MessageClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub corp_id: String,
    pub corp_secret: Secret<String>,
    pub agent_id: u64,
    /// Token refresh interval; clamped by the cache
    pub refresh_interval: Duration,
    /// Retries after the first attempt for every platform call
    pub retry: u32,
    pub timeout: Duration,
    pub api_base: String,
    /// Token file; `None` disables persistence
    pub token_cache_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Production defaults with the token persisted under the temp directory.
    pub fn new(corp_id: impl Into<String>, corp_secret: Secret<String>, agent_id: u64) -> Self {
        let corp_id = corp_id.into();
        let token_cache_path = Some(default_token_path(&corp_id));
        Self {
            corp_id,
            corp_secret,
            agent_id,
            refresh_interval: Duration::from_secs(MAX_REFRESH_INTERVAL_SECS),
            retry: DEFAULT_RETRY,
            timeout: DEFAULT_TIMEOUT,
            api_base: DEFAULT_API_BASE.to_string(),
            token_cache_path,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaUpload {
    media_id: String,
}

/// Client for the WeCom application message API.
///
/// Owns its `CredentialCache`. Call `close()` to stop the token refresh task.
pub struct MessageClient {
    http: reqwest::Client,
    api_base: String,
    retry: u32,
    defaults: DefaultFields,
    cache: CredentialCache,
}

impl MessageClient {
    /// Build the HTTP client and token cache, fetching or loading a token.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        let source = Arc::new(CorpTokenSource::new(
            http.clone(),
            config.api_base.clone(),
            config.corp_id.clone(),
            config.corp_secret.clone(),
            config.retry,
        ));
        let cache = CredentialCache::initialize(
            source,
            config.refresh_interval,
            config.token_cache_path.clone(),
        )
        .await;

        info!(
            corp_id = %config.corp_id,
            agent_id = config.agent_id,
            retry = config.retry,
            "message client ready"
        );

        Ok(Self::with_cache(
            http,
            config.api_base,
            config.retry,
            DefaultFields::new(config.agent_id),
            cache,
        ))
    }

    /// Assemble a client around an existing cache.
    pub fn with_cache(
        http: reqwest::Client,
        api_base: impl Into<String>,
        retry: u32,
        defaults: DefaultFields,
        cache: CredentialCache,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            retry,
            defaults,
            cache,
        }
    }

    pub fn default_fields(&self) -> &DefaultFields {
        &self.defaults
    }

    /// Replace the fields merged into every message.
    pub fn set_default_fields(&mut self, defaults: DefaultFields) {
        self.defaults = defaults;
    }

    pub fn credential_cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub async fn send_text(&self, content: impl Into<String>, safe: bool) -> Result<SendReceipt> {
        self.send(&OutgoingMessage::text(content), &SendOptions::new().safe(safe))
            .await
    }

    pub async fn send_image(&self, media_id: impl Into<String>, safe: bool) -> Result<SendReceipt> {
        self.send(&OutgoingMessage::image(media_id), &SendOptions::new().safe(safe))
            .await
    }

    pub async fn send_file(&self, media_id: impl Into<String>, safe: bool) -> Result<SendReceipt> {
        self.send(&OutgoingMessage::file(media_id), &SendOptions::new().safe(safe))
            .await
    }

    pub async fn send_text_card(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<SendReceipt> {
        self.send(
            &OutgoingMessage::text_card(title, description, url),
            &SendOptions::new(),
        )
        .await
    }

    pub async fn send_news(&self, articles: Vec<Article>, safe: bool) -> Result<SendReceipt> {
        self.send(&OutgoingMessage::news(articles), &SendOptions::new().safe(safe))
            .await
    }

    pub async fn send_markdown(&self, content: impl Into<String>) -> Result<SendReceipt> {
        self.send(&OutgoingMessage::markdown(content), &SendOptions::new())
            .await
    }

    /// Send any message with explicit options.
    ///
    /// A platform rejection is returned at once; transport and decode
    /// failures are retried up to the configured budget.
    pub async fn send(
        &self,
        message: &OutgoingMessage,
        options: &SendOptions,
    ) -> Result<SendReceipt> {
        let msgtype = message.msgtype();
        if options.safe && !message.supports_safe() {
            debug!(msgtype, "safe flag not supported for msgtype, ignoring");
        }

        let payload = build_payload(&self.defaults, message, options);
        let token = self.cache.current().await;
        let url = format!("{}{MESSAGE_SEND_PATH}", self.api_base);

        let result = call_with_retry::<SendReceipt, _, _>("message/send", self.retry, || {
            self.http
                .post(&url)
                .query(&[("access_token", token.as_str())])
                .json(&payload)
                .send()
        })
        .await;
        record_message_sent(msgtype, outcome_label(&result));

        let receipt = result?;
        if receipt.has_invalid_recipients() {
            warn!(
                msgtype,
                invalid_user = %receipt.invalid_user,
                invalid_party = %receipt.invalid_party,
                invalid_tag = %receipt.invalid_tag,
                "message sent, some recipients rejected"
            );
        } else {
            debug!(msgtype, msgid = %receipt.msgid, "message sent");
        }
        Ok(receipt)
    }

    /// Upload a temporary media file and return its `media_id`.
    ///
    /// The file is read once up front; a read failure is returned without
    /// contacting the platform.
    pub async fn upload_media(&self, path: impl AsRef<Path>, media_type: MediaType) -> Result<String> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Media(format!("reading {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        let token = self.cache.current().await;
        let url = format!("{}{MEDIA_UPLOAD_PATH}", self.api_base);

        let result = call_with_retry::<MediaUpload, _, _>("media/upload", self.retry, || {
            let part = reqwest::multipart::Part::bytes(data.clone()).file_name(file_name.clone());
            let form = reqwest::multipart::Form::new().part("media", part);
            self.http
                .post(&url)
                .query(&[("access_token", token.as_str()), ("type", media_type.as_str())])
                .multipart(form)
                .send()
        })
        .await;
        record_media_upload(media_type.as_str(), outcome_label(&result));

        let upload = result?;
        debug!(media_type = %media_type, file = %file_name, "media uploaded");
        Ok(upload.media_id)
    }

    /// Stop the token refresh task and release the client.
    pub async fn close(self) {
        self.cache.shutdown().await;
    }
}
