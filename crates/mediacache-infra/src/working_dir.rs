//! Working directory cache
//!
//! A bounded local disk cache of processed artifacts, ready to be streamed. Every
//! entry expires `ttl` after it was written or last opened and the least recently
//! used entry is evicted when `capacity` is exceeded. Losing the whole directory is
//! always safe: the processed store is the source of truth.
//!
//! Writes land in a hidden `.{name}.{id}.part` sibling and are renamed into place
//! once complete, so `exists` and `open` only ever see whole files.
//!
//! Removal for every reason funnels through one place, which deletes the file unless
//! the name is indexed again by the time the unlink runs. Renames into the folder and
//! unlinks take the same lock, so a re-admitted file is never deleted.

use lru::LruCache;
use mediacache_core::{MediaError, MediaResult, WorkingDirConfig};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const PARTIAL_SUFFIX: &str = ".part";

/// Why an entry left the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    Explicit,
    Expired,
    Capacity,
    Cleared,
    /// A newer write of the same name took the slot. The file on disk is the new one.
    Replaced,
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cause = match self {
            RemovalCause::Explicit => "explicit",
            RemovalCause::Expired => "expired",
            RemovalCause::Capacity => "capacity",
            RemovalCause::Cleared => "cleared",
            RemovalCause::Replaced => "replaced",
        };
        write!(f, "{}", cause)
    }
}

struct Index {
    folder: PathBuf,
    ttl: Duration,
    entries: Mutex<LruCache<String, Instant>>,
    /// Held while a file is renamed into the folder or unlinked from it.
    files: tokio::sync::Mutex<()>,
}

impl Index {
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Index `name` as fresh. Returns whatever the admission pushed out.
    fn admit(&self, name: &str) -> Option<(String, RemovalCause)> {
        let expires_at = Instant::now() + self.ttl;
        let displaced = self.lock().push(name.to_string(), expires_at);

        displaced.map(|(old, _)| {
            let cause = if old == name {
                RemovalCause::Replaced
            } else {
                RemovalCause::Capacity
            };
            (old, cause)
        })
    }

    async fn on_remove(&self, name: &str, cause: RemovalCause) {
        if cause == RemovalCause::Replaced {
            return;
        }

        let _files = self.files.lock().await;
        let readmitted = self.lock().contains(name);
        if readmitted {
            tracing::trace!(name = %name, cause = %cause, "Working file indexed again, keeping it");
            return;
        }

        let path = self.folder.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(name = %name, cause = %cause, "Removed working file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!(name = %name, cause = %cause, "Working file already gone");
            }
            Err(e) => {
                tracing::error!(
                    name = %name,
                    cause = %cause,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove working file"
                );
            }
        }
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut entries = self.lock();
            let names: Vec<String> = entries
                .iter()
                .filter(|(_, expires_at)| **expires_at <= now)
                .map(|(name, _)| name.clone())
                .collect();
            for name in &names {
                entries.pop(name);
            }
            names
        };

        for name in &expired {
            self.on_remove(name, RemovalCause::Expired).await;
        }
        expired.len()
    }

    async fn remove_where<F>(&self, cause: RemovalCause, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let removed: Vec<String> = {
            let mut entries = self.lock();
            let names: Vec<String> = entries
                .iter()
                .filter(|(name, _)| predicate(name))
                .map(|(name, _)| name.clone())
                .collect();
            for name in &names {
                entries.pop(name);
            }
            names
        };

        for name in &removed {
            self.on_remove(name, cause).await;
        }
        removed.len()
    }
}

/// TTL + LRU cache of files under one folder.
///
/// A background sweeper removes expired entries every `sweep_interval`. It stops on
/// [`close`](Self::close) or when the directory is dropped.
pub struct WorkingDirectory {
    index: Arc<Index>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl WorkingDirectory {
    /// Create the folder if needed and start the sweeper. Must run inside a tokio runtime.
    pub async fn new(config: WorkingDirConfig) -> MediaResult<Self> {
        let folder = if config.folder.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            config.folder
        };

        tokio::fs::create_dir_all(&folder).await.map_err(|e| {
            MediaError::Io(format!(
                "Failed to create working directory {}: {}",
                folder.display(),
                e
            ))
        })?;

        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        let index = Arc::new(Index {
            folder,
            ttl: config.ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            files: tokio::sync::Mutex::new(()),
        });

        let stale = remove_partial_files(&index.folder).await;
        if stale > 0 {
            tracing::info!(removed = stale, "Removed unfinished working files");
        }

        let shutdown = CancellationToken::new();
        spawn_sweeper(
            index.clone(),
            config.sweep_interval.max(MIN_SWEEP_INTERVAL),
            shutdown.clone(),
        );

        tracing::info!(
            folder = %index.folder.display(),
            ttl_secs = config.ttl.as_secs(),
            capacity = capacity.get(),
            "Working directory ready"
        );

        Ok(Self {
            index,
            shutdown,
            closed: AtomicBool::new(false),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.index.folder
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.index.folder.join(name)
    }

    /// Whether the file is on disk. Does not touch its expiry.
    pub async fn exists(&self, name: &str) -> MediaResult<bool> {
        validate_name(name)?;
        Ok(tokio::fs::try_exists(self.path(name)).await?)
    }

    /// Copy `reader` into `name` and index it. The file only appears under `name`
    /// once the copy has finished; a failed copy leaves neither a file nor an entry.
    pub async fn write<R>(&self, name: &str, reader: &mut R) -> MediaResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        validate_name(name)?;
        let path = self.path(name);
        let partial = self.path(&partial_name(name));

        let result: std::io::Result<u64> = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let written = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            Ok(written)
        }
        .await;

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                discard_partial(name, &partial).await;
                return Err(MediaError::Io(format!(
                    "Failed to write working file {}: {}",
                    name, e
                )));
            }
        };

        let displaced = {
            let _files = self.index.files.lock().await;
            if let Err(e) = tokio::fs::rename(&partial, &path).await {
                discard_partial(name, &partial).await;
                return Err(MediaError::Io(format!(
                    "Failed to move working file {} into place: {}",
                    name, e
                )));
            }
            self.index.admit(name)
        };

        if let Some((displaced, cause)) = displaced {
            self.index.on_remove(&displaced, cause).await;
        }

        tracing::debug!(name = %name, size_bytes = written, "Wrote working file");
        Ok(written)
    }

    /// Open `name` for reading and push its expiry out by one TTL.
    ///
    /// A file found on disk without an entry (left over from an earlier process) is
    /// adopted into the index.
    pub async fn open(&self, name: &str) -> MediaResult<tokio::fs::File> {
        validate_name(name)?;

        let (file, displaced) = {
            let _files = self.index.files.lock().await;
            let file = tokio::fs::File::open(self.path(name)).await.map_err(|e| {
                MediaError::from(e).context(&format!("open working file {}", name))
            })?;
            (file, self.index.admit(name))
        };

        if let Some((displaced, cause)) = displaced {
            self.index.on_remove(&displaced, cause).await;
        }

        Ok(file)
    }

    /// Drop the entry and delete its file.
    pub async fn remove(&self, name: &str) -> MediaResult<()> {
        validate_name(name)?;
        self.index.lock().pop(name);
        self.index.on_remove(name, RemovalCause::Explicit).await;
        Ok(())
    }

    /// Remove every entry whose name matches. Returns how many were removed.
    pub async fn remove_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        self.index
            .remove_where(RemovalCause::Explicit, predicate)
            .await
    }

    pub async fn remove_all(&self) -> usize {
        self.index.remove_where(RemovalCause::Cleared, |_| true).await
    }

    /// Remove entries past their expiry. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.index.sweep_expired().await
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweeper and delete every entry. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        let removed = self.remove_all().await;
        tracing::info!(removed = removed, "Working directory closed");
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_sweeper(index: Arc<Index>, every: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = index.sweep_expired().await;
                    if removed > 0 {
                        tracing::debug!(removed = removed, "Swept expired working files");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Working directory sweeper stopped");
                    break;
                }
            }
        }
    });
}

fn partial_name(name: &str) -> String {
    format!(".{}.{}{}", name, Uuid::new_v4().simple(), PARTIAL_SUFFIX)
}

fn is_partial_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

async fn discard_partial(name: &str, partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(name = %name, error = %e, "Failed to remove partial working file");
        }
    }
}

/// Delete `.part` files a previous process left behind. Returns how many were removed.
async fn remove_partial_files(folder: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(folder = %folder.display(), error = %e, "Failed to list working directory");
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_partial = entry.file_name().to_str().is_some_and(is_partial_name);
        if is_partial && tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }
    removed
}

fn validate_name(name: &str) -> MediaResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || is_partial_name(name)
    {
        return Err(MediaError::InvalidInput(format!(
            "Invalid working file name: {}",
            name
        )));
    }
    Ok(())
}
