use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    compositor::StaticCompositor,
    config::Config,
    error::Result,
    media::{FileValidator, MediaDimensions, MediaItem, MediaKind, MediaStatus, WorkingSet},
    pipeline::{run_pipeline_with_progress, FeatureRegistry, FeatureSettings, PipelineStage, WatermarkFeature},
    raster::WatermarkImage,
    remote::OptimizationService,
    settings::WatermarkSettings,
    video::VideoWatermarker,
};

/// Drives media items through their feature pipelines
///
/// Items with no applied features get a single watermark stage built from
/// the shared settings, so a batch can be watermarked without configuring
/// every item. Each run follows the item's status lifecycle:
/// 1. `Idle` or a previous terminal state moves to `Processing`
/// 2. Stages run in order while progress is copied onto the item
/// 3. The item ends `Completed` with its result, or `Error` with the failure
pub struct ProcessingEngine {
    registry: FeatureRegistry,
    validator: FileValidator,
    shared_settings: WatermarkSettings,
    shared_watermark: Option<Arc<WatermarkImage>>,
}

impl ProcessingEngine {
    pub fn new(registry: FeatureRegistry, validator: FileValidator) -> Self {
        Self {
            registry,
            validator,
            shared_settings: WatermarkSettings::default(),
            shared_watermark: None,
        }
    }

    /// Engine with the built-in features and the ffmpeg video backend
    pub fn from_config(config: &Config, service: Option<Arc<dyn OptimizationService>>) -> Self {
        let compositor = StaticCompositor::from_config(config);
        let videos = VideoWatermarker::ffmpeg(config, compositor.fonts().clone());
        let registry = FeatureRegistry::with_builtin(WatermarkFeature::new(compositor, videos), service);
        Self::new(registry, FileValidator::new(config.limits.clone()))
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    pub fn shared_settings(&self) -> &WatermarkSettings {
        &self.shared_settings
    }

    /// Settings and image used for items without their own features
    pub fn set_shared_watermark(&mut self, settings: WatermarkSettings, watermark: Option<Arc<WatermarkImage>>) {
        self.shared_settings = settings;
        self.shared_watermark = watermark;
    }

    /// Validate a file on disk and wrap it as an item
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<MediaItem> {
        let path = path.as_ref();
        let mut item = MediaItem::from_path(path, &self.validator)?;
        if item.kind() == MediaKind::Image {
            match image::image_dimensions(path) {
                Ok((width, height)) => item.set_dimensions(MediaDimensions {
                    width,
                    height,
                    duration: None,
                }),
                Err(e) => debug!("Could not read dimensions of {:?}: {}", path, e),
            }
        }
        Ok(item)
    }

    /// Validate in-memory contents and wrap them as an item
    pub fn load_bytes<S: Into<String>>(&self, data: Bytes, file_name: S) -> Result<MediaItem> {
        let mut item = MediaItem::from_bytes(data.clone(), file_name, &self.validator)?;
        if item.kind() == MediaKind::Image {
            let dimensions = image::io::Reader::new(Cursor::new(&data[..]))
                .with_guessed_format()
                .map_err(image::ImageError::IoError)
                .and_then(|reader| reader.into_dimensions());
            match dimensions {
                Ok((width, height)) => item.set_dimensions(MediaDimensions {
                    width,
                    height,
                    duration: None,
                }),
                Err(e) => debug!("Could not read dimensions of {}: {}", item.file_name(), e),
            }
        }
        Ok(item)
    }

    /// Stages for one item: its own features, or the shared watermark
    pub fn stages_for(&self, item: &MediaItem) -> Result<Vec<PipelineStage>> {
        if !item.features().is_empty() {
            return item.stages(&self.registry);
        }

        let settings = FeatureSettings::Watermark {
            settings: item.effective_settings(&self.shared_settings),
            watermark: self.shared_watermark.clone(),
        };
        let handler = self.registry.get(settings.feature_id())?;
        Ok(vec![PipelineStage::new(handler, settings, 0)])
    }

    /// Run one item's pipeline and record the outcome on the item.
    ///
    /// The failure is also returned; the item keeps its code and
    /// user-facing message either way.
    pub async fn process(&self, item: &mut MediaItem) -> Result<()> {
        item.begin_processing()?;
        info!("Processing {} ({})", item.file_name(), item.id());

        let stages = match self.stages_for(item) {
            Ok(stages) => stages,
            Err(e) => {
                item.fail(&e);
                return Err(e);
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<f32>();
        let sink: Arc<dyn Fn(f32) + Send + Sync> = Arc::new(move |percent| {
            let _ = tx.send(percent);
        });

        let run = run_pipeline_with_progress(item.source().clone(), stages, Some(sink));
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Some(percent) = rx.recv() => item.update_progress(percent),
            }
        };
        while let Ok(percent) = rx.try_recv() {
            item.update_progress(percent);
        }

        match outcome {
            Ok(result) => {
                info!("Completed {} as {}", item.file_name(), result.file_name());
                item.complete(result);
                Ok(())
            }
            Err(e) => {
                warn!("Processing {} failed: {}", item.file_name(), e);
                item.fail(&e);
                Err(e)
            }
        }
    }

    /// Process every item that is not already completed, in insertion order.
    ///
    /// Failures stay on their items and do not stop the batch; returns the
    /// number of items that completed.
    pub async fn process_all(&self, set: &mut WorkingSet) -> usize {
        let ids: Vec<_> = set.iter().map(|item| item.id()).collect();
        let mut completed = 0;

        for id in ids {
            let Some(item) = set.get_mut(id) else { continue };
            match item.status() {
                MediaStatus::Completed | MediaStatus::Processing => continue,
                MediaStatus::Error => item.retry(),
                MediaStatus::Idle => {}
            }
            if self.process(item).await.is_ok() {
                completed += 1;
            }
        }

        info!("Batch finished: {}/{} completed", completed, set.len());
        completed
    }
}
