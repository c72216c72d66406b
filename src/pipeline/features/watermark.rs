use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::compositor::{export_raster, StaticCompositor};
use crate::error::{MediaError, PipelineError, Result};
use crate::pipeline::stage::{derived_name, settings_mismatch, FeatureHandler, FeatureSettings, PipelineData, StageProgress, WATERMARK};
use crate::remote::OptimizationService;
use crate::video::{VideoInput, VideoWatermarker};

/// Watermarks images with the static compositor and videos with the frame
/// pipeline
pub struct WatermarkFeature {
    compositor: StaticCompositor,
    videos: VideoWatermarker,
    service: Option<Arc<dyn OptimizationService>>,
}

impl WatermarkFeature {
    pub fn new(compositor: StaticCompositor, videos: VideoWatermarker) -> Self {
        Self {
            compositor,
            videos,
            service: None,
        }
    }

    /// Service used to download remote results handed to this stage
    pub fn with_service(mut self, service: Arc<dyn OptimizationService>) -> Self {
        self.service = Some(service);
        self
    }

    async fn watermark_video(&self, input: PipelineData, settings: &FeatureSettings, progress: StageProgress) -> Result<PipelineData> {
        let FeatureSettings::Watermark { settings, watermark } = settings else {
            return Err(settings_mismatch(WATERMARK));
        };

        let source_name = input.file_name();
        let video_input = match input {
            PipelineData::File { path, .. } => VideoInput::Path(path),
            PipelineData::Bytes { data, file_name, .. } => VideoInput::Bytes { data, file_name },
            remote @ PipelineData::Remote { .. } => {
                let source = remote.materialize(self.service.as_deref()).await?;
                VideoInput::Bytes {
                    data: source.data,
                    file_name: source.file_name,
                }
            }
        };

        let video = self
            .videos
            .watermark(video_input, settings, watermark.as_deref(), progress.callback())
            .await?;

        Ok(PipelineData::Bytes {
            mime: video.mime_type().to_string(),
            file_name: video.output_file_name(&source_name),
            data: video.data,
        })
    }

    async fn watermark_image(&self, input: PipelineData, settings: &FeatureSettings) -> Result<PipelineData> {
        let FeatureSettings::Watermark { settings, watermark } = settings else {
            return Err(settings_mismatch(WATERMARK));
        };

        if !settings.has_content(watermark.as_deref()) {
            debug!("No watermark content, passing {} through", input.file_name());
            return Ok(input);
        }

        let source = input.materialize(self.service.as_deref()).await?;
        let compositor = self.compositor.clone();
        let settings = settings.clone();
        let watermark = watermark.clone();
        let data = source.data.clone();

        let encoded = tokio::task::spawn_blocking(move || {
            let surface = compositor.composite_bytes(&data, &settings, watermark.as_deref())?;
            export_raster(&surface)
        })
        .await
        .map_err(|e| MediaError::Canvas {
            reason: format!("compositing task failed: {}", e),
        })??;

        Ok(PipelineData::Bytes {
            data: encoded,
            mime: "image/png".to_string(),
            file_name: derived_name(&source.file_name, "-watermarked", "png"),
        })
    }
}

#[async_trait]
impl FeatureHandler for WatermarkFeature {
    fn feature_id(&self) -> &str {
        WATERMARK
    }

    async fn apply(&self, input: PipelineData, settings: &FeatureSettings, progress: StageProgress) -> Result<PipelineData> {
        if input.is_video() {
            self.watermark_video(input, settings, progress).await
        } else if input.mime().starts_with("image/") {
            self.watermark_image(input, settings).await
        } else {
            Err(PipelineError::UnsupportedInput {
                feature_id: WATERMARK.to_string(),
                input: input.mime().to_string(),
            }
            .into())
        }
    }

    fn allows_multiple(&self) -> bool {
        true
    }
}
