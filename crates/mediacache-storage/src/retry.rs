//! Opening keys on eventually consistent stores.
//!
//! An object written moments ago may not be readable yet. [`open_with_backoff`]
//! retries `NotFound` on a fixed exponential schedule; every other error is returned
//! on the first attempt.

use crate::traits::{ByteReader, Storage, StorageError, StorageResult};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Five attempts, waiting 1s, 2s, 4s and 8s between them.
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the zero-based `attempt` failed: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Open `key`, retrying while the store reports it missing.
///
/// After the last attempt the error is `NotFound` and carries the last underlying
/// message. No sleep follows the final attempt.
pub async fn open_with_backoff(
    store: &dyn Storage,
    key: &str,
    policy: RetryPolicy,
) -> StorageResult<ByteReader> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match store.open(key).await {
            Ok(reader) => {
                if attempt > 0 {
                    tracing::debug!(key = %key, attempts = attempt + 1, "Opened after retry");
                }
                return Ok(reader);
            }
            Err(e) if e.is_not_found() => {
                last_error = Some(e);
                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        key = %key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Key not visible yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Open failed, not retrying");
                return Err(e);
            }
        }
    }

    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());

    tracing::warn!(key = %key, attempts = attempts, error = %detail, "Key not found after retries");

    Err(StorageError::NotFound(format!(
        "{} (after {} attempts: {})",
        key, attempts, detail
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;
    use tokio::time::Instant;

    /// Hides keys from `open` for the first `hidden_opens` calls.
    struct LaggyStorage {
        inner: MemoryStorage,
        hidden_opens: usize,
        opens: AtomicUsize,
        denied: bool,
    }

    impl LaggyStorage {
        fn new(hidden_opens: usize) -> Self {
            let inner = MemoryStorage::new();
            inner.insert("photo", "original bytes");
            Self {
                inner,
                hidden_opens,
                opens: AtomicUsize::new(0),
                denied: false,
            }
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Storage for LaggyStorage {
        async fn open(&self, key: &str) -> StorageResult<ByteReader> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if self.denied {
                return Err(StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "denied",
                )));
            }
            if n < self.hidden_opens {
                return Err(StorageError::NotFound(key.to_string()));
            }
            self.inner.open(key).await
        }
        async fn create(&self, key: &str, reader: ByteReader) -> StorageResult<u64> {
            self.inner.create(key, reader).await
        }
        async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
            self.inner.rename(from, to).await
        }
        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }
        async fn remove_all(&self, prefix: &str) -> StorageResult<()> {
            self.inner.remove_all(prefix).await
        }
        async fn exists(&self, key: &str) -> StorageResult<bool> {
            self.inner.exists(key).await
        }
        async fn dir_exists(&self, key: &str) -> StorageResult<bool> {
            self.inner.dir_exists(key).await
        }
        async fn mkdir(&self, key: &str) -> StorageResult<()> {
            self.inner.mkdir(key).await
        }
        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    #[test]
    fn default_schedule_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_key_becomes_visible() {
        let store = LaggyStorage::new(2);
        let start = Instant::now();

        let mut reader = open_with_backoff(&store, "photo", RetryPolicy::default())
            .await
            .ok()
            .unwrap();

        let mut data = String::new();
        reader.read_to_string(&mut data).await.unwrap();
        assert_eq!(data, "original bytes");
        assert_eq!(store.opens(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_attempts() {
        let store = LaggyStorage::new(usize::MAX);
        let start = Instant::now();

        let err = open_with_backoff(&store, "photo", RetryPolicy::default())
            .await
            .err()
            .unwrap();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("after 5 attempts"));
        assert_eq!(store.opens(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let mut store = LaggyStorage::new(0);
        store.denied = true;
        let start = Instant::now();

        let err = open_with_backoff(&store, "photo", RetryPolicy::default())
            .await
            .err()
            .unwrap();

        assert!(!err.is_not_found());
        assert_eq!(store.opens(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
