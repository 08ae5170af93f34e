//! WeCom endpoint paths and token cache limits

/// Production API host
pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com";

/// Token endpoint (GET, `corpid` + `corpsecret` query parameters)
pub const GETTOKEN_PATH: &str = "/cgi-bin/gettoken";

/// Application message endpoint (POST JSON, `access_token` query parameter)
pub const MESSAGE_SEND_PATH: &str = "/cgi-bin/message/send";

/// Temporary media upload endpoint (POST multipart, `access_token` + `type`)
pub const MEDIA_UPLOAD_PATH: &str = "/cgi-bin/media/upload";

/// Upper bound for the token refresh interval in seconds.
/// WeCom tokens live for 7200s; refreshing at 7000s keeps a margin.
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 7000;

/// Lower bound for the token refresh interval in seconds.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Longest `CredentialCache::shutdown()` waits for the refresh task to exit.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Success sentinel for the `errcode` field.
pub const ERRCODE_OK: i64 = 0;
