use std::path::Path;

use tracing::debug;

use crate::config::LimitsConfig;
use crate::error::{MediaError, Result};
use crate::media::item::MediaKind;

/// MIME type implied by a file's extension
pub fn mime_from_path<P: AsRef<Path>>(path: P) -> Option<&'static str> {
    let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" | "qt" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime)
}

/// Rejects oversized or unsupported inputs before anything is decoded
#[derive(Debug, Clone)]
pub struct FileValidator {
    limits: LimitsConfig,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

impl FileValidator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Check a file by name and size; returns its media kind and MIME type
    pub fn validate(&self, file_name: &str, size: u64) -> Result<(MediaKind, &'static str)> {
        let mime = mime_from_path(file_name).ok_or_else(|| MediaError::InvalidFileType {
            mime: Path::new(file_name)
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_else(|| "unknown".to_string()),
        })?;

        let (kind, limit) = if self.limits.image_types.iter().any(|t| t == mime) {
            (MediaKind::Image, self.limits.max_image_bytes)
        } else if self.limits.video_types.iter().any(|t| t == mime) {
            (MediaKind::Video, self.limits.max_video_bytes)
        } else {
            return Err(MediaError::InvalidFileType { mime: mime.to_string() }.into());
        };

        if size > limit {
            return Err(MediaError::FileTooLarge { size, limit }.into());
        }

        debug!("Accepted {} ({}, {} bytes)", file_name, mime, size);
        Ok((kind, mime))
    }

    /// Check a file on disk
    pub fn validate_path<P: AsRef<Path>>(&self, path: P) -> Result<(MediaKind, &'static str)> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        self.validate(&path.to_string_lossy(), size)
    }
}
