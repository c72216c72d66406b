//! # Resource Lifecycle
//!
//! Scoped acquisition for transient media handles. Anything that holds a
//! decoder process, a raster surface, an encoder or a temporary file
//! implements [`Release`]; wrapping it in a [`Scoped`] guard releases it when
//! the guard goes out of scope, on success and error paths alike.

use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;
use crate::raster::Surface;

/// A handle whose resources must be given back explicitly
///
/// `release` must be idempotent: a second call is a no-op.
pub trait Release {
    /// Short name used in release logs
    fn label(&self) -> &'static str;

    fn release(&mut self);
}

impl<T: Release + ?Sized> Release for Box<T> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl Release for Surface {
    fn label(&self) -> &'static str {
        "raster surface"
    }

    fn release(&mut self) {
        self.clear_storage();
    }
}

/// RAII guard that releases its handle on drop
pub struct Scoped<T: Release> {
    inner: T,
    released: bool,
}

impl<T: Release> Scoped<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, released: false }
    }

    /// Release now instead of at the end of the scope
    pub fn release_now(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.released {
            self.released = true;
            debug!("Releasing {}", self.inner.label());
            self.inner.release();
        }
    }
}

impl<T: Release> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Release> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Release> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Temporary file exposing in-memory media to a path-based decoder
///
/// The file is deleted on release.
#[derive(Debug)]
pub struct EphemeralFile {
    file: Option<NamedTempFile>,
}

impl EphemeralFile {
    /// Write `data` to a new temporary file with the given suffix (".mp4")
    pub fn from_bytes(data: &[u8], suffix: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("watermark-studio-")
            .suffix(suffix)
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        debug!("Staged {} bytes at {}", data.len(), file.path().display());
        Ok(Self { file: Some(file) })
    }

    /// [`EphemeralFile::from_bytes`] on the blocking pool
    pub async fn stage(data: Bytes, suffix: String) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::from_bytes(&data, &suffix))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("staging task failed: {}", e)))?
    }

    /// Path of the staged file; `None` once released
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }
}

impl Release for EphemeralFile {
    fn label(&self) -> &'static str {
        "ephemeral file"
    }

    fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!("Failed to remove temporary file {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for EphemeralFile {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, StudioError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked {
        releases: Arc<AtomicUsize>,
        released: bool,
    }

    impl Release for Tracked {
        fn label(&self) -> &'static str {
            "tracked"
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn tracked(releases: &Arc<AtomicUsize>) -> Tracked {
        Tracked {
            releases: releases.clone(),
            released: false,
        }
    }

    #[test]
    fn test_scoped_releases_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let _guard = Scoped::new(tracked(&releases));
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_releases_on_error_path() {
        let releases = Arc::new(AtomicUsize::new(0));

        let run = || -> Result<()> {
            let _guard = Scoped::new(tracked(&releases));
            Err(StudioError::from(MediaError::Canvas {
                reason: "boom".to_string(),
            }))
        };

        assert!(run().is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_now_is_not_repeated() {
        let releases = Arc::new(AtomicUsize::new(0));
        let guard = Scoped::new(Box::new(tracked(&releases)));
        guard.release_now();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_surface_release_drops_pixels() {
        let mut surface = Scoped::new(Surface::new(64, 32).unwrap());
        assert_eq!(surface.dimensions(), (64, 32));
        surface.release();
        assert_eq!(surface.dimensions(), (0, 0));
    }

    #[test]
    fn test_ephemeral_file_removed_on_release() {
        let mut file = EphemeralFile::from_bytes(b"fake video", ".mp4").unwrap();
        let path = file.path().unwrap().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fake video");
        assert!(path.to_string_lossy().ends_with(".mp4"));

        file.release();
        assert!(!path.exists());
        assert!(file.path().is_none());
        file.release();
    }

    #[tokio::test]
    async fn test_stage_writes_off_the_runtime() {
        let mut file = EphemeralFile::stage(Bytes::from_static(b"staged clip"), ".webm".to_string())
            .await
            .unwrap();
        let path = file.path().unwrap().to_path_buf();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"staged clip");

        file.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_ephemeral_file_removed_by_guard() {
        let path = {
            let file = Scoped::new(EphemeralFile::from_bytes(b"x", ".webm").unwrap());
            file.path().unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }
}
