//! Background-refreshing access token cache
//!
//! Holds one credential, refreshes it on a fixed interval from a spawned
//! task, and optionally persists every refresh to a token file so restarts
//! within the validity window skip the fetch.
//!
//! The refresh does not look at expiry: it trusts the interval (capped at
//! `MAX_REFRESH_INTERVAL_SECS`) to stay ahead of the platform's 7200s token
//! lifetime. A failed refresh keeps the previous token in place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{MAX_REFRESH_INTERVAL_SECS, MIN_REFRESH_INTERVAL_SECS, SHUTDOWN_TIMEOUT_SECS};
use crate::credentials::{self, Credential};
use crate::error::Result;
use crate::metrics::record_token_refresh;
use crate::token::TokenSource;

/// Clamp a refresh interval into the supported range.
pub fn clamp_refresh_interval(interval: Duration) -> Duration {
    interval.clamp(
        Duration::from_secs(MIN_REFRESH_INTERVAL_SECS),
        Duration::from_secs(MAX_REFRESH_INTERVAL_SECS),
    )
}

/// State shared between the cache handle and its refresh task.
struct Inner {
    source: Arc<dyn TokenSource>,
    ttl: Duration,
    persist_path: Option<PathBuf>,
    /// Swapped wholesale on refresh; readers hold the lock only to clone the Arc.
    credential: RwLock<Option<Arc<Credential>>>,
    /// Serializes refreshes from the timer and from explicit callers.
    refresh_lock: Mutex<()>,
}

impl Inner {
    async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let token = match self.source.fetch().await {
            Ok(token) => token,
            Err(e) => {
                record_token_refresh("failure");
                return Err(e);
            }
        };

        let credential = Arc::new(Credential::new(token, self.ttl));
        *self.credential.write().await = Some(credential.clone());
        record_token_refresh("success");
        debug!("access token refreshed");

        if let Some(path) = &self.persist_path {
            if let Err(e) = credentials::save(path, &credential).await {
                warn!(path = %path.display(), error = %e, "failed to persist refreshed token");
            }
        }
        Ok(())
    }
}

/// Access token cache with a background refresh task.
///
/// Must be created inside a tokio runtime. Call `shutdown()` when done;
/// dropping the cache also stops the task at its next wake-up.
pub struct CredentialCache {
    inner: Arc<Inner>,
    interval: Duration,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CredentialCache {
    /// Build the cache, seed it, and start the refresh task.
    ///
    /// Seeding prefers a still-valid token from `persist_path`; otherwise the
    /// source is called once. A failed initial fetch is logged and leaves the
    /// cache empty until the next refresh.
    pub async fn initialize(
        source: Arc<dyn TokenSource>,
        interval: Duration,
        persist_path: Option<PathBuf>,
    ) -> Self {
        let clamped = clamp_refresh_interval(interval);
        if clamped != interval {
            warn!(
                requested_secs = interval.as_secs(),
                effective_secs = clamped.as_secs(),
                "refresh interval out of range, clamped"
            );
        }

        let inner = Arc::new(Inner {
            source,
            ttl: clamped,
            persist_path,
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        });

        let persisted = match &inner.persist_path {
            Some(path) => credentials::load(path).await,
            None => None,
        };

        let first_refresh = match persisted {
            Some(credential) if credential.is_valid() => {
                let remaining = Duration::from_millis(
                    credential
                        .expires_at()
                        .saturating_sub(credentials::now_millis()),
                );
                info!(
                    expires_at = credential.expires_at(),
                    remaining_secs = remaining.as_secs(),
                    "reusing persisted access token"
                );
                *inner.credential.write().await = Some(Arc::new(credential));
                remaining.min(clamped)
            }
            stale => {
                if stale.is_some() {
                    debug!("persisted access token expired, fetching a new one");
                }
                if let Err(e) = inner.refresh().await {
                    warn!(error = %e, "initial access token fetch failed, will retry on next refresh");
                }
                clamped
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = spawn_refresh_task(inner.clone(), first_refresh, clamped, shutdown_rx);
        info!(interval_secs = clamped.as_secs(), "credential cache started");

        Self {
            inner,
            interval: clamped,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Current access token, or an empty string if none was ever obtained.
    pub async fn current(&self) -> String {
        self.inner
            .credential
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the cached credential.
    pub async fn credential(&self) -> Option<Credential> {
        self.inner
            .credential
            .read()
            .await
            .as_deref()
            .cloned()
    }

    /// Fetch a new token now. On failure the previous token is kept.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.refresh().await
    }

    /// Effective (clamped) refresh interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the refresh task.
    ///
    /// Idempotent. An in-flight refresh is allowed to finish; the wait is
    /// bounded by `SHUTDOWN_TIMEOUT_SECS`, after which the task is left to
    /// exit on its own.
    pub async fn shutdown(&self) {
        let Some(tx) = self.shutdown_tx.lock().await.take() else {
            return;
        };
        let _ = tx.send(());

        if let Some(task) = self.task.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), task).await {
                Ok(_) => info!("credential cache stopped"),
                Err(_) => warn!(
                    timeout_secs = SHUTDOWN_TIMEOUT_SECS,
                    "refresh task did not stop in time, detaching"
                ),
            }
        }
    }
}

/// Spawn the periodic refresh loop.
///
/// The first tick fires after `first_refresh`: a full interval when the cache
/// was seeded by a fetch, or the remaining lifetime of a reused persisted
/// token. Ticks are unconditional after that. The loop exits when the
/// shutdown channel fires or is dropped.
fn spawn_refresh_task(
    inner: Arc<Inner>,
    first_refresh: Duration,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + first_refresh;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("refresh task received shutdown");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = inner.refresh().await {
                        warn!(error = %e, "scheduled token refresh failed, keeping previous token");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Token source that replays a script of results and counts calls.
    struct ScriptedSource {
        script: std::sync::Mutex<VecDeque<Option<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: &[Option<&str>]) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(
                    script.iter().map(|s| s.map(str::to_string)).collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenSource for ScriptedSource {
        fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front().flatten();
            Box::pin(async move {
                next.ok_or(Error::Api(ApiError::RetriesExhausted {
                    endpoint: "gettoken",
                    attempts: 1,
                }))
            })
        }
    }

    /// Token source producing `tok-N-N`; a torn read would mix halves.
    struct CountingSource {
        n: AtomicUsize,
    }

    impl TokenSource for CountingSource {
        fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
            let n = self.n.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(format!("tok-{n}-{n}")) })
        }
    }

    #[test]
    fn interval_above_max_is_clamped() {
        assert_eq!(
            clamp_refresh_interval(Duration::from_secs(100_000)),
            Duration::from_secs(MAX_REFRESH_INTERVAL_SECS)
        );
        assert_eq!(
            clamp_refresh_interval(Duration::ZERO),
            Duration::from_secs(MIN_REFRESH_INTERVAL_SECS)
        );
        assert_eq!(
            clamp_refresh_interval(Duration::from_secs(3600)),
            Duration::from_secs(3600)
        );
    }

    #[tokio::test]
    async fn initialize_clamps_interval() {
        let source = ScriptedSource::new(&[Some("T1")]);
        let cache = CredentialCache::initialize(source, Duration::from_secs(86_400), None).await;
        assert_eq!(cache.interval(), Duration::from_secs(MAX_REFRESH_INTERVAL_SECS));
        let credential = cache.credential().await.unwrap();
        assert_eq!(credential.ttl_secs, MAX_REFRESH_INTERVAL_SECS);
        cache.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_refresh_replaces_token() {
        let source = ScriptedSource::new(&[Some("T1"), Some("T2")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(3600), None).await;
        assert_eq!(cache.current().await, "T1");
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(3601)).await;

        assert_eq!(cache.current().await, "T2");
        assert_eq!(source.calls(), 2);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn failed_initial_fetch_leaves_empty_token() {
        let source = ScriptedSource::new(&[None]);
        let cache = CredentialCache::initialize(source, Duration::from_secs(3600), None).await;
        assert_eq!(cache.current().await, "");
        assert!(cache.credential().await.is_none());
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let source = ScriptedSource::new(&[Some("T1"), None]);
        let cache = CredentialCache::initialize(source, Duration::from_secs(3600), None).await;

        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.current().await, "T1");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn persisted_token_skips_startup_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let first = ScriptedSource::new(&[Some("T1")]);
        let cache =
            CredentialCache::initialize(first.clone(), Duration::from_secs(3600), Some(path.clone()))
                .await;
        assert_eq!(first.calls(), 1);
        cache.shutdown().await;

        let second = ScriptedSource::new(&[Some("SHOULD-NOT-BE-USED")]);
        let cache =
            CredentialCache::initialize(second.clone(), Duration::from_secs(3600), Some(path)).await;
        assert_eq!(second.calls(), 0);
        assert_eq!(cache.current().await, "T1");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn nearly_expired_persisted_token_is_refreshed_at_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let nearly_expired = Credential {
            access_token: "OLD".into(),
            obtained_at: credentials::now_millis() - 3_598_000,
            ttl_secs: 3600,
        };
        credentials::save(&path, &nearly_expired).await.unwrap();

        tokio::time::pause();
        let source = ScriptedSource::new(&[Some("NEW")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(3600), Some(path))
                .await;
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.current().await, "OLD");

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current().await, "NEW");
        cache.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_token_refresh_is_capped_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let long_lived = Credential {
            access_token: "OLD".into(),
            obtained_at: credentials::now_millis(),
            ttl_secs: 7000,
        };
        credentials::save(&path, &long_lived).await.unwrap();

        let source = ScriptedSource::new(&[Some("NEW")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(600), Some(path))
                .await;
        assert_eq!(source.calls(), 0);

        tokio::time::sleep(Duration::from_secs(601)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current().await, "NEW");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn expired_persisted_token_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let expired = Credential {
            access_token: "OLD".into(),
            obtained_at: 1_000,
            ttl_secs: 60,
        };
        credentials::save(&path, &expired).await.unwrap();

        let source = ScriptedSource::new(&[Some("NEW")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(3600), Some(path.clone()))
                .await;
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current().await, "NEW");

        let on_disk = credentials::load(&path).await.unwrap();
        assert_eq!(on_disk.access_token, "NEW");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn corrupt_persisted_token_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, b"\x00\x01garbage").await.unwrap();

        let source = ScriptedSource::new(&[Some("T1")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(3600), Some(path)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current().await, "T1");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn unwritable_persist_path_still_updates_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let path = blocker.join("token.json");

        let source = ScriptedSource::new(&[Some("T1")]);
        let cache = CredentialCache::initialize(source, Duration::from_secs(3600), Some(path)).await;
        assert_eq!(cache.current().await, "T1");
        cache.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_never_observe_torn_values() {
        let source = Arc::new(CountingSource {
            n: AtomicUsize::new(0),
        });
        let cache = Arc::new(
            CredentialCache::initialize(source, Duration::from_secs(3600), None).await,
        );

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let token = cache.current().await;
                    let parts: Vec<&str> = token.split('-').collect();
                    assert_eq!(parts.len(), 3, "unexpected token shape: {token}");
                    assert_eq!(parts[1], parts[2], "torn token: {token}");
                    tokio::task::yield_now().await;
                }
            }));
        }

        for _ in 0..200 {
            cache.refresh().await.unwrap();
        }
        for r in readers {
            r.await.unwrap();
        }
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_prompt() {
        let source = ScriptedSource::new(&[Some("T1")]);
        let cache = CredentialCache::initialize(source, Duration::from_secs(3600), None).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            cache.shutdown().await;
            cache.shutdown().await;
        })
        .await
        .expect("shutdown must not block");

        // Reads still work after the task is gone.
        assert_eq!(cache.current().await, "T1");
    }

    #[tokio::test(start_paused = true)]
    async fn no_refresh_after_shutdown() {
        let source = ScriptedSource::new(&[Some("T1"), Some("T2")]);
        let cache =
            CredentialCache::initialize(source.clone(), Duration::from_secs(60), None).await;
        cache.shutdown().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current().await, "T1");
    }
}
