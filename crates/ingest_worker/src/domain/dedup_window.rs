use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default suppression window for repeat forwards of the same node
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Time-windowed set of keys that have already been forwarded
///
/// Expiry is checked on read; [`DedupWindow::purge_expired`] reclaims memory for
/// keys that never come back.
pub struct DedupWindow {
    window: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim `key` for the current window
    ///
    /// Returns true if the caller should forward (no live entry existed); the
    /// check and the insert happen under one lock.
    pub fn try_claim(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                entries.insert(key.to_string(), now + self.window);
                true
            }
        }
    }

    /// True if `key` holds an unexpired claim
    pub fn is_claimed(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .is_some_and(|expires_at| *expires_at > now)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries until cancelled
    pub async fn run_sweeper(&self, ctx: CancellationToken, interval: Duration) -> anyhow::Result<()> {
        info!(interval_secs = interval.as_secs(), "starting dedup sweeper");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("dedup sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = self.len(), "purged expired dedup entries");
                    }
                }
            }
        }

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A poisoned map only ever holds plain timestamps, so keep using it
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
