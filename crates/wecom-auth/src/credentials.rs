//! On-disk token persistence
//!
//! A single JSON file holds the last fetched token and when it was obtained,
//! so a restarted process can reuse a token that is still inside its
//! validity window. Writes use temp file + rename with 0600 permissions.
//! Reads never fail: a missing, unreadable or corrupt file is a cache miss.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A cached access token.
///
/// `obtained_at` is a unix timestamp in milliseconds. The token is valid
/// while `now < obtained_at + ttl_secs * 1000`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub obtained_at: u64,
    pub ttl_secs: u64,
}

impl Credential {
    /// Stamp a freshly fetched token with the current time.
    pub fn new(access_token: String, ttl: Duration) -> Self {
        Self {
            access_token,
            obtained_at: now_millis(),
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Expiry as a unix timestamp in milliseconds.
    pub fn expires_at(&self) -> u64 {
        self.obtained_at
            .saturating_add(self.ttl_secs.saturating_mul(1000))
    }

    pub fn is_valid_at(&self, now_millis: u64) -> bool {
        !self.access_token.is_empty() && now_millis < self.expires_at()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("obtained_at", &self.obtained_at)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Default token file for a corp: `<tmp>/wecom-notify/token-<corp_id>.json`.
pub fn default_token_path(corp_id: &str) -> PathBuf {
    std::env::temp_dir()
        .join("wecom-notify")
        .join(format!("token-{corp_id}.json"))
}

/// Load a persisted credential. Any failure is reported as `None`.
pub async fn load(path: &Path) -> Option<Credential> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted token");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable token file, ignoring");
            return None;
        }
    };

    match serde_json::from_str::<Credential>(&contents) {
        Ok(credential) => Some(credential),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt token file, ignoring");
            None
        }
    }
}

/// Temp file used while replacing `file_name`; unique per target and process.
fn temp_file_name(file_name: &str) -> String {
    format!(".{file_name}.tmp.{}", std::process::id())
}

/// Persist a credential atomically.
///
/// Creates the parent directory if needed, writes a temp file next to the
/// target, sets 0600 on unix, then renames over the target.
pub async fn save(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::CredentialParse(format!("serializing token: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("token path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(temp_file_name(&file_name));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token");
    Ok(())
}
