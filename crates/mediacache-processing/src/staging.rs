//! Scoped temporary files for engine runs.

use mediacache_core::{MediaError, MediaResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// A private temporary directory holding every file one engine run needs (input,
/// output, cover). Everything in it is deleted when the value is dropped, on success,
/// error and unwind alike.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> MediaResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("mediacache-")
            .tempdir()
            .map_err(|e| MediaError::Io(format!("Failed to create staging directory: {}", e)))?;

        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path for `name` inside the area. The file is not created.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Copy `reader` into `name` and return its path.
    pub async fn write<R>(&self, name: &str, reader: &mut R) -> MediaResult<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.path(name);

        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            MediaError::Io(format!("Failed to create staged file {}: {}", name, e))
        })?;

        let written = tokio::io::copy(reader, &mut file).await.map_err(|e| {
            MediaError::Io(format!("Failed to write staged file {}: {}", name, e))
        })?;
        file.flush().await?;

        tracing::trace!(path = %path.display(), size_bytes = written, "Staged file");
        Ok(path)
    }

    pub async fn write_bytes(&self, name: &str, data: &[u8]) -> MediaResult<PathBuf> {
        let path = self.path(name);
        tokio::fs::write(&path, data).await.map_err(|e| {
            MediaError::Io(format!("Failed to write staged file {}: {}", name, e))
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn files_removed_on_drop() {
        let staging = StagingArea::new().unwrap();
        let root = staging.root().to_path_buf();

        let mut source: &[u8] = b"original";
        let input = staging.write("input.png", &mut source).await.unwrap();
        assert_eq!(tokio::fs::read(&input).await.unwrap(), b"original");

        staging.write_bytes("cover.jpg", b"cover").await.unwrap();

        drop(staging);
        assert!(!root.exists());
    }

    #[test]
    fn areas_do_not_collide() {
        let a = StagingArea::new().unwrap();
        let b = StagingArea::new().unwrap();
        assert_ne!(a.path("input"), b.path("input"));
    }
}
