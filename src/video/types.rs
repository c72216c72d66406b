use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::{ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};

/// One decoded video frame in source order
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    timestamp: f64,
    buffer: RgbaImage,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, buffer: RgbaImage) -> Self {
        Self {
            index,
            timestamp,
            buffer,
        }
    }

    /// Build a frame from packed RGBA bytes; `None` when the length is wrong
    pub fn from_rgba_bytes(index: u64, timestamp: f64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self::new(index, timestamp, buffer))
    }

    /// Position in the decoded sequence, starting at zero
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Presentation time in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }
}

/// What the decoder learned about a source before playback
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,

    /// Duration in seconds
    pub duration: f64,

    /// Nominal source frame rate, if known
    pub fps: Option<f64>,

    /// Container reported by the probe, if recognised
    pub container: Option<ContainerFormat>,
}

impl VideoMetadata {
    pub fn new(width: u32, height: u32, duration: f64) -> Self {
        Self {
            width,
            height,
            duration,
            fps: None,
            container: None,
        }
    }

    /// Frames expected at the capture rate; the basis of progress reporting
    pub fn estimated_frames(&self, target_fps: u32) -> f64 {
        (self.duration * f64::from(target_fps)).max(0.0)
    }
}

/// Output or source container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    WebM,
    Mp4,
    QuickTime,
    Matroska,
}

impl ContainerFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebM => "video/webm",
            Self::Mp4 => "video/mp4",
            Self::QuickTime => "video/quicktime",
            Self::Matroska => "video/x-matroska",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::QuickTime => "mov",
            Self::Matroska => "mkv",
        }
    }

    /// ffmpeg muxer name
    pub fn muxer(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::QuickTime => "mov",
            Self::Matroska => "matroska",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webm" => Some(Self::WebM),
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" | "qt" => Some(Self::QuickTime),
            "mkv" => Some(Self::Matroska),
            _ => None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        [Self::WebM, Self::Mp4, Self::QuickTime, Self::Matroska]
            .into_iter()
            .find(|c| c.mime_type().eq_ignore_ascii_case(mime))
    }

    /// Interpret an ffprobe `format_name` such as "mov,mp4,m4a,3gp,3g2,mj2"
    pub fn from_probe_name(name: &str) -> Option<Self> {
        let names: Vec<&str> = name.split(',').map(str::trim).collect();
        if names.contains(&"webm") && !names.contains(&"matroska") {
            Some(Self::WebM)
        } else if names.contains(&"matroska") {
            Some(Self::Matroska)
        } else if names.contains(&"mp4") {
            Some(Self::Mp4)
        } else if names.contains(&"mov") {
            Some(Self::QuickTime)
        } else {
            None
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Video codecs the pipeline knows how to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vp9 => "vp9",
            Self::Vp8 => "vp8",
            Self::H264 => "h264",
        }
    }

    /// ffmpeg encoder implementing this codec
    pub fn encoder_name(self) -> &'static str {
        match self {
            Self::Vp9 => "libvpx-vp9",
            Self::Vp8 => "libvpx",
            Self::H264 => "libx264",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A source video on disk or in memory
#[derive(Debug, Clone)]
pub enum VideoInput {
    Path(PathBuf),
    Bytes { data: Bytes, file_name: String },
}

impl VideoInput {
    pub fn file_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Bytes { file_name, .. } => file_name.clone(),
        }
    }

    /// Container guessed from the file name
    pub fn container_hint(&self) -> Option<ContainerFormat> {
        match self {
            Self::Path(path) => ContainerFormat::from_path(path),
            Self::Bytes { file_name, .. } => ContainerFormat::from_path(file_name),
        }
    }
}

impl From<PathBuf> for VideoInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Result of one video run
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub data: Bytes,

    /// Container actually produced; decides the extension and MIME type
    pub container: ContainerFormat,

    /// Codec requested from the encoder; `None` for the generic fallback and
    /// for passthrough
    pub codec: Option<VideoCodec>,

    pub frame_count: u64,

    /// True when the source bytes were returned without re-encoding
    pub passthrough: bool,
}

impl EncodedVideo {
    pub fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }

    pub fn file_extension(&self) -> &'static str {
        self.container.extension()
    }

    /// Name the output after the source stem with the produced extension
    pub fn output_file_name(&self, source_name: &str) -> String {
        let stem = Path::new(source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string());
        if self.passthrough {
            format!("{}.{}", stem, self.file_extension())
        } else {
            format!("{}-watermarked.{}", stem, self.file_extension())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_names() {
        assert_eq!(ContainerFormat::from_path("clip.MP4"), Some(ContainerFormat::Mp4));
        assert_eq!(ContainerFormat::from_path("clip.webm"), Some(ContainerFormat::WebM));
        assert_eq!(ContainerFormat::from_path("clip.avi"), None);
        assert_eq!(ContainerFormat::from_mime("video/quicktime"), Some(ContainerFormat::QuickTime));
        assert_eq!(
            ContainerFormat::from_probe_name("mov,mp4,m4a,3gp,3g2,mj2"),
            Some(ContainerFormat::Mp4)
        );
        assert_eq!(ContainerFormat::from_probe_name("matroska,webm"), Some(ContainerFormat::Matroska));
    }

    #[test]
    fn test_output_name_follows_container() {
        let video = EncodedVideo {
            data: Bytes::from_static(b"webm"),
            container: ContainerFormat::WebM,
            codec: Some(VideoCodec::Vp8),
            frame_count: 3,
            passthrough: false,
        };
        assert_eq!(video.output_file_name("holiday.mp4"), "holiday-watermarked.webm");
        assert_eq!(video.mime_type(), "video/webm");
    }

    #[test]
    fn test_frame_from_bytes_checks_length() {
        assert!(Frame::from_rgba_bytes(0, 0.0, 2, 2, vec![0; 16]).is_some());
        assert!(Frame::from_rgba_bytes(0, 0.0, 2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_estimated_frames() {
        let metadata = VideoMetadata::new(640, 360, 5.0);
        assert_eq!(metadata.estimated_frames(30), 150.0);
    }
}
