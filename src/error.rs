use thiserror::Error;

/// Main error type for the Watermark Studio library
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Media processing error: {0}")]
    Media(#[from] MediaError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating, decoding, compositing or encoding media
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Invalid file type: {mime}")]
    InvalidFileType { mime: String },

    #[error("Failed to load image: {reason}")]
    ImageLoad { reason: String },

    #[error("Failed to load video: {reason}")]
    VideoLoad { reason: String },

    #[error("Video encoding failed: {reason}")]
    VideoEncoding { reason: String },

    #[error("Video frame processing failed: {reason}")]
    VideoProcessing { reason: String },

    #[error("Failed to load watermark: {reason}")]
    WatermarkLoad { reason: String },

    #[error("Raster surface error: {reason}")]
    Canvas { reason: String },
}

/// Opaque error reported by the remote optimization service
///
/// The code is surfaced unchanged; the core never interprets it beyond
/// the retryable flag.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
    pub user_message: Option<String>,
    pub retryable: bool,
}

impl RemoteError {
    pub const PENDING: &'static str = "PENDING";

    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            user_message: None,
            retryable: false,
        }
    }

    /// A `pending` result: the remote job has not finished yet
    pub fn pending<M: Into<String>>(operation: M) -> Self {
        Self {
            code: Self::PENDING.to_string(),
            message: format!("{} is still processing", operation.into()),
            user_message: Some("The file is still being processed. Please try again shortly.".to_string()),
            retryable: true,
        }
    }

    pub fn with_user_message<S: Into<String>>(mut self, message: S) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

/// Feature pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown feature: {feature_id}")]
    UnknownFeature { feature_id: String },

    #[error("Feature '{feature_id}' cannot accept {input} input")]
    UnsupportedInput { feature_id: String, input: String },

    #[error("Feature '{feature_id}' received settings for another feature")]
    SettingsMismatch { feature_id: String },

    #[error("No applied feature at order {order}")]
    NoSuchStage { order: u32 },

    #[error("Feature '{feature_id}' is already applied")]
    DuplicateFeature { feature_id: String },

    #[error("No media item with id {id}")]
    UnknownItem { id: String },

    #[error("Media item {id} is already processing")]
    AlreadyProcessing { id: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using StudioError
pub type Result<T> = std::result::Result<T, StudioError>;

impl StudioError {
    /// Machine-readable error code
    pub fn code(&self) -> &str {
        match self {
            Self::Media(MediaError::FileTooLarge { .. }) => "FILE_TOO_LARGE",
            Self::Media(MediaError::InvalidFileType { .. }) => "INVALID_FILE_TYPE",
            Self::Media(MediaError::ImageLoad { .. }) => "IMAGE_LOAD_ERROR",
            Self::Media(MediaError::VideoLoad { .. }) => "VIDEO_LOAD_ERROR",
            Self::Media(MediaError::VideoEncoding { .. }) => "VIDEO_ENCODING_ERROR",
            Self::Media(MediaError::VideoProcessing { .. }) => "VIDEO_PROCESSING_ERROR",
            Self::Media(MediaError::WatermarkLoad { .. }) => "WATERMARK_LOAD_ERROR",
            Self::Media(MediaError::Canvas { .. }) => "CANVAS_ERROR",
            Self::Remote(remote) => &remote.code,
            Self::Pipeline(_) => "PIPELINE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Remote(remote) => remote.retryable,
            Self::Media(MediaError::VideoLoad { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Media(MediaError::FileTooLarge { limit, .. }) => {
                format!("The file is too large. The maximum size is {} MB.", limit / 1024 / 1024)
            }
            Self::Media(MediaError::InvalidFileType { mime }) => {
                format!("Files of type '{}' are not supported.", mime)
            }
            Self::Media(MediaError::ImageLoad { .. }) => {
                "Could not read the image. Please check the file is a supported format.".to_string()
            }
            Self::Media(MediaError::VideoLoad { .. }) => {
                "Could not read the video. Please check the file is a supported format.".to_string()
            }
            Self::Media(MediaError::VideoEncoding { .. }) | Self::Media(MediaError::VideoProcessing { .. }) => {
                "Watermarking the video failed. Please try again.".to_string()
            }
            Self::Media(MediaError::WatermarkLoad { .. }) => {
                "Could not load the watermark. Please choose another image or font.".to_string()
            }
            Self::Remote(remote) => remote
                .user_message
                .clone()
                .unwrap_or_else(|| remote.message.clone()),
            _ => self.to_string(),
        }
    }
}
