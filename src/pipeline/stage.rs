use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PipelineError, RemoteError, Result};
use crate::raster::WatermarkImage;
use crate::remote::{BackgroundSpec, CompressionMode, OptimizationService, OptimizeOptions, RemoteSource, RemoteSuccess};
use crate::settings::WatermarkSettings;
use crate::video::ProgressCallback;

pub const WATERMARK: &str = "watermark";
pub const CONVERT: &str = "convert";
pub const REMOVE_BACKGROUND: &str = "remove-background";
pub const OPTIMIZE: &str = "optimize";

/// Data flowing between stages
#[derive(Debug, Clone)]
pub enum PipelineData {
    File { path: PathBuf, mime: String },
    Bytes { data: Bytes, mime: String, file_name: String },
    /// A result held by the remote service
    Remote { locator: String, mime: String, stats: RemoteSuccess },
}

impl PipelineData {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Bytes { .. } => "bytes",
            Self::Remote { .. } => "remote",
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Self::File { mime, .. } | Self::Bytes { mime, .. } | Self::Remote { mime, .. } => mime,
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime().starts_with("video/")
    }

    pub fn file_name(&self) -> String {
        match self {
            Self::File { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Bytes { file_name, .. } => file_name.clone(),
            Self::Remote { locator, .. } => locator.rsplit('/').next().unwrap_or(locator).to_string(),
        }
    }

    /// Load the bytes behind this data; remote results need the service
    pub async fn materialize(self, service: Option<&dyn OptimizationService>) -> Result<RemoteSource> {
        let file_name = self.file_name();
        match self {
            Self::File { path, mime } => Ok(RemoteSource {
                data: Bytes::from(tokio::fs::read(&path).await?),
                mime,
                file_name,
            }),
            Self::Bytes { data, mime, .. } => Ok(RemoteSource { data, mime, file_name }),
            Self::Remote { locator, mime, .. } => {
                let service = service.ok_or_else(|| {
                    RemoteError::new("NO_SERVICE", format!("no remote service to download {}", locator))
                })?;
                Ok(RemoteSource {
                    data: service.download(&locator).await?,
                    mime,
                    file_name,
                })
            }
        }
    }
}

/// Name a derived file after its source stem
pub(crate) fn derived_name(source: &str, suffix: &str, extension: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{}{}.{}", stem, suffix, extension)
}

/// Per-feature settings carried by a stage
#[derive(Debug, Clone)]
pub enum FeatureSettings {
    Watermark {
        settings: WatermarkSettings,
        watermark: Option<Arc<WatermarkImage>>,
    },
    Convert {
        target_format: String,
        compression: CompressionMode,
    },
    RemoveBackground {
        background: BackgroundSpec,
        compression: CompressionMode,
    },
    Optimize(OptimizeOptions),
}

impl FeatureSettings {
    /// Feature these settings belong to
    pub fn feature_id(&self) -> &'static str {
        match self {
            Self::Watermark { .. } => WATERMARK,
            Self::Convert { .. } => CONVERT,
            Self::RemoveBackground { .. } => REMOVE_BACKGROUND,
            Self::Optimize(_) => OPTIMIZE,
        }
    }
}

/// Progress sink for one stage, reporting percentages of that stage
#[derive(Clone, Default)]
pub struct StageProgress {
    sink: Option<Arc<dyn Fn(f32) + Send + Sync>>,
}

impl StageProgress {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(sink: Arc<dyn Fn(f32) + Send + Sync>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn report(&self, percent: f32) {
        if let Some(sink) = &self.sink {
            sink(percent);
        }
    }

    /// Adapt to the video pipeline's callback type
    pub fn callback(&self) -> Option<ProgressCallback> {
        self.sink.clone().map(|sink| Box::new(move |p: f32| sink(p)) as ProgressCallback)
    }
}

impl fmt::Debug for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageProgress").field("active", &self.sink.is_some()).finish()
    }
}

/// One named transformation
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    fn feature_id(&self) -> &str;

    /// Transform `input`; the output feeds the next stage
    async fn apply(&self, input: PipelineData, settings: &FeatureSettings, progress: StageProgress) -> Result<PipelineData>;

    /// Whether several instances may be applied to the same item
    fn allows_multiple(&self) -> bool {
        false
    }
}

pub(crate) fn settings_mismatch(feature_id: &str) -> crate::error::StudioError {
    PipelineError::SettingsMismatch {
        feature_id: feature_id.to_string(),
    }
    .into()
}

/// A handler bound to its settings at a position in the pipeline
#[derive(Clone)]
pub struct PipelineStage {
    pub feature_id: String,
    pub handler: Arc<dyn FeatureHandler>,
    pub settings: FeatureSettings,
    pub order: u32,
}

impl PipelineStage {
    pub fn new(handler: Arc<dyn FeatureHandler>, settings: FeatureSettings, order: u32) -> Self {
        Self {
            feature_id: handler.feature_id().to_string(),
            handler,
            settings,
            order,
        }
    }
}

impl fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStage")
            .field("feature_id", &self.feature_id)
            .field("order", &self.order)
            .finish()
    }
}
