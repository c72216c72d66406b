use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    raster::text::DEFAULT_FONT_SEARCH_PATHS,
    settings::{parse_hex_color, Palette},
    video::{ContainerFormat, EncodingCandidate, VideoCodec},
};

/// Main configuration for Watermark Studio
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video decoding and re-encoding
    pub video: VideoConfig,

    /// Still-image compositing
    pub image: ImageConfig,

    /// Fonts available to text watermarks
    pub fonts: FontConfig,

    /// Input validation limits
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.image.validate()?;
        self.limits.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> crate::error::StudioError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Video pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame-capture rate and progress estimate basis
    pub target_fps: u32,

    /// Encodings tried in order; the first one the backend supports is used
    pub codec_candidates: Vec<EncodingCandidate>,

    /// Render-tick rate driving the frame loop
    pub refresh_rate_hz: u32,

    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,

    /// Read size for encoder output chunks
    pub chunk_size: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            codec_candidates: vec![
                EncodingCandidate::new(ContainerFormat::WebM, Some(VideoCodec::Vp9)),
                EncodingCandidate::new(ContainerFormat::WebM, Some(VideoCodec::Vp8)),
                EncodingCandidate::new(ContainerFormat::WebM, None),
            ],
            refresh_rate_hz: 60,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            chunk_size: 64 * 1024,
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(invalid("video.target_fps", self.target_fps));
        }

        if self.refresh_rate_hz == 0 {
            return Err(invalid("video.refresh_rate_hz", self.refresh_rate_hz));
        }

        if self.codec_candidates.is_empty() {
            return Err(invalid("video.codec_candidates", "[]"));
        }

        if self.chunk_size == 0 {
            return Err(invalid("video.chunk_size", self.chunk_size));
        }

        Ok(())
    }
}

/// Still-image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Fill colors for the light and dark color modes
    pub palette: Palette,

    /// Side of the brightness sample grid
    pub analysis_samples: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            analysis_samples: crate::analysis::brightness::DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl ImageConfig {
    fn validate(&self) -> Result<()> {
        parse_hex_color(&self.palette.light).map_err(|_| invalid("image.palette.light", &self.palette.light))?;
        parse_hex_color(&self.palette.dark).map_err(|_| invalid("image.palette.dark", &self.palette.dark))?;

        if self.analysis_samples == 0 {
            return Err(invalid("image.analysis_samples", self.analysis_samples));
        }

        Ok(())
    }
}

/// Font files for text watermarks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Family used when a requested family is not mapped
    pub default_family: String,

    /// Family name to font file
    pub families: HashMap<String, PathBuf>,

    /// Font files probed, in order, for a last-resort fallback
    pub search_paths: Vec<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            default_family: "sans-serif".to_string(),
            families: HashMap::new(),
            search_paths: DEFAULT_FONT_SEARCH_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Limits enforced before any media is decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,

    /// Accepted image MIME types
    pub image_types: Vec<String>,

    /// Accepted video MIME types
    pub video_types: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            max_video_bytes: 100 * 1024 * 1024,
            image_types: ["image/jpeg", "image/png", "image/webp", "image/gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            video_types: ["video/mp4", "video/webm", "video/quicktime", "video/x-matroska"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_image_bytes == 0 {
            return Err(invalid("limits.max_image_bytes", self.max_image_bytes));
        }

        if self.max_video_bytes == 0 {
            return Err(invalid("limits.max_video_bytes", self.max_video_bytes));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("studio.toml");

        let original = Config::default();
        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded.video.target_fps, 30);
        assert_eq!(loaded.video.codec_candidates, original.video.codec_candidates);
        assert_eq!(loaded.image.palette.light, original.image.palette.light);
        assert_eq!(loaded.limits.video_types, original.limits.video_types);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[video]\ntarget_fps = 24\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.video.target_fps, 24);
        assert_eq!(config.video.refresh_rate_hz, 60);
        assert_eq!(config.limits.max_image_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/no/such/studio.toml").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.video.codec_candidates.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.image.palette.dark = "grey".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.video.target_fps = 0;
        assert!(config.validate().is_err());
    }
}
