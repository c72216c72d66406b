use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, Result, StudioError};
use crate::media::validation::FileValidator;
use crate::pipeline::stage::WATERMARK;
use crate::pipeline::{FeatureRegistry, FeatureSettings, PipelineData, PipelineStage};
use crate::raster::WatermarkImage;
use crate::settings::WatermarkSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

/// Decoded size of a source, and its duration for videos
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaDimensions {
    pub width: u32,
    pub height: u32,
    pub duration: Option<f64>,
}

/// A feature applied to an item; `order` is its pipeline position
#[derive(Debug, Clone)]
pub struct AppliedFeature {
    pub feature_id: String,
    pub settings: FeatureSettings,
    pub order: u32,
}

/// Failure recorded on an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub code: String,
    pub message: String,
    pub user_message: String,
}

/// One selected input file and everything derived from it
#[derive(Debug, Clone)]
pub struct MediaItem {
    id: Uuid,
    kind: MediaKind,
    source: PipelineData,
    size: u64,
    dimensions: Option<MediaDimensions>,
    status: MediaStatus,
    progress: f32,
    error: Option<ItemError>,
    custom_settings: Option<WatermarkSettings>,
    features: Vec<AppliedFeature>,
    result: Option<PipelineData>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MediaItem {
    fn new(kind: MediaKind, source: PipelineData, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            source,
            size,
            dimensions: None,
            status: MediaStatus::Idle,
            progress: 0.0,
            error: None,
            custom_settings: None,
            features: Vec::new(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate and wrap a file on disk
    pub fn from_path<P: AsRef<Path>>(path: P, validator: &FileValidator) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        let (kind, mime) = validator.validate(&path.to_string_lossy(), size)?;
        Ok(Self::new(
            kind,
            PipelineData::File {
                path,
                mime: mime.to_string(),
            },
            size,
        ))
    }

    /// Validate and wrap in-memory file contents
    pub fn from_bytes<S: Into<String>>(data: Bytes, file_name: S, validator: &FileValidator) -> Result<Self> {
        let file_name = file_name.into();
        let size = data.len() as u64;
        let (kind, mime) = validator.validate(&file_name, size)?;
        Ok(Self::new(
            kind,
            PipelineData::Bytes {
                data,
                mime: mime.to_string(),
                file_name,
            },
            size,
        ))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn source(&self) -> &PipelineData {
        &self.source
    }

    pub fn file_name(&self) -> String {
        self.source.file_name()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn dimensions(&self) -> Option<MediaDimensions> {
        self.dimensions
    }

    pub fn set_dimensions(&mut self, dimensions: MediaDimensions) {
        self.dimensions = Some(dimensions);
        self.touch();
    }

    pub fn status(&self) -> MediaStatus {
        self.status
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.error.as_ref()
    }

    pub fn result(&self) -> Option<&PipelineData> {
        self.result.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn custom_settings(&self) -> Option<&WatermarkSettings> {
        self.custom_settings.as_ref()
    }

    /// Per-item override of the shared watermark settings
    pub fn set_custom_settings(&mut self, settings: Option<WatermarkSettings>) {
        self.custom_settings = settings;
        self.touch();
    }

    /// The item's override, or the shared settings
    pub fn effective_settings(&self, shared: &WatermarkSettings) -> WatermarkSettings {
        self.custom_settings.clone().unwrap_or_else(|| shared.clone())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ===== STATUS =====

    /// Enter `Processing`; any previous result or error is discarded
    pub fn begin_processing(&mut self) -> Result<()> {
        if self.status == MediaStatus::Processing {
            return Err(PipelineError::AlreadyProcessing {
                id: self.id.to_string(),
            }
            .into());
        }
        self.status = MediaStatus::Processing;
        self.progress = 0.0;
        self.error = None;
        self.result = None;
        self.touch();
        Ok(())
    }

    /// Record progress while processing; values are clamped and never go back
    pub fn update_progress(&mut self, percent: f32) {
        if self.status != MediaStatus::Processing || !percent.is_finite() {
            return;
        }
        self.progress = percent.clamp(0.0, 100.0).max(self.progress);
        self.touch();
    }

    pub fn complete(&mut self, result: PipelineData) {
        self.status = MediaStatus::Completed;
        self.progress = 100.0;
        self.result = Some(result);
        self.touch();
    }

    pub fn fail(&mut self, error: &StudioError) {
        self.status = MediaStatus::Error;
        self.error = Some(ItemError {
            code: error.code().to_string(),
            message: error.to_string(),
            user_message: error.user_message(),
        });
        self.touch();
    }

    /// Back to `Idle` for a fresh run with the same settings and features
    pub fn retry(&mut self) {
        self.status = MediaStatus::Idle;
        self.progress = 0.0;
        self.error = None;
        self.result = None;
        self.touch();
    }

    // ===== APPLIED FEATURES =====

    pub fn features(&self) -> &[AppliedFeature] {
        &self.features
    }

    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.features.iter().any(|f| f.feature_id == feature_id)
    }

    /// Append a feature after the existing ones; returns its order.
    ///
    /// Only watermarks may be applied more than once.
    pub fn add_feature(&mut self, settings: FeatureSettings) -> Result<u32> {
        let feature_id = settings.feature_id();
        if feature_id != WATERMARK && self.has_feature(feature_id) {
            return Err(PipelineError::DuplicateFeature {
                feature_id: feature_id.to_string(),
            }
            .into());
        }

        let order = self.features.iter().map(|f| f.order + 1).max().unwrap_or(0);
        self.features.push(AppliedFeature {
            feature_id: feature_id.to_string(),
            settings,
            order,
        });
        self.touch();
        debug!("Item {}: added {} at order {}", self.id, feature_id, order);
        Ok(order)
    }

    /// Add a watermark layer
    pub fn add_watermark(&mut self, settings: WatermarkSettings, watermark: Option<Arc<WatermarkImage>>) -> Result<u32> {
        self.add_feature(FeatureSettings::Watermark { settings, watermark })
    }

    fn watermark_at(&mut self, order: u32) -> Result<&mut AppliedFeature> {
        self.features
            .iter_mut()
            .find(|f| f.order == order && f.feature_id == WATERMARK)
            .ok_or_else(|| PipelineError::NoSuchStage { order }.into())
    }

    /// Replace the settings of the watermark layer at `order`, keeping its image
    pub fn update_watermark(&mut self, order: u32, settings: WatermarkSettings) -> Result<()> {
        let feature = self.watermark_at(order)?;
        let watermark = match &feature.settings {
            FeatureSettings::Watermark { watermark, .. } => watermark.clone(),
            _ => None,
        };
        feature.settings = FeatureSettings::Watermark { settings, watermark };
        self.touch();
        Ok(())
    }

    /// Replace the image of the watermark layer at `order`
    pub fn set_watermark_image(&mut self, order: u32, image: Option<Arc<WatermarkImage>>) -> Result<()> {
        let feature = self.watermark_at(order)?;
        if let FeatureSettings::Watermark { watermark, .. } = &mut feature.settings {
            *watermark = image;
        }
        self.touch();
        Ok(())
    }

    pub fn remove_feature(&mut self, order: u32) -> Result<AppliedFeature> {
        let index = self
            .features
            .iter()
            .position(|f| f.order == order)
            .ok_or(PipelineError::NoSuchStage { order })?;
        let removed = self.features.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Pipeline stages for the applied features, in order
    pub fn stages(&self, registry: &FeatureRegistry) -> Result<Vec<PipelineStage>> {
        let mut features: Vec<&AppliedFeature> = self.features.iter().collect();
        features.sort_by_key(|f| f.order);
        features
            .into_iter()
            .map(|f| {
                Ok(PipelineStage::new(
                    registry.get(&f.feature_id)?,
                    f.settings.clone(),
                    f.order,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::remote::{CompressionMode, OptimizeOptions};

    fn item() -> MediaItem {
        MediaItem::from_bytes(Bytes::from_static(b"png"), "cat.png", &FileValidator::default()).unwrap()
    }

    #[test]
    fn test_new_item_is_idle() {
        let item = item();
        assert_eq!(item.status(), MediaStatus::Idle);
        assert_eq!(item.kind(), MediaKind::Image);
        assert_eq!(item.file_name(), "cat.png");
        assert_eq!(item.size(), 3);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let err = MediaItem::from_bytes(Bytes::from_static(b"x"), "cat.bmp", &FileValidator::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_TYPE");
    }

    #[test]
    fn test_status_lifecycle() {
        let mut item = item();
        item.begin_processing().unwrap();
        assert!(item.begin_processing().is_err());

        item.update_progress(40.0);
        item.update_progress(20.0);
        item.update_progress(400.0);
        assert_eq!(item.progress(), 100.0);

        let err: StudioError = MediaError::VideoEncoding { reason: "boom".into() }.into();
        item.fail(&err);
        assert_eq!(item.status(), MediaStatus::Error);
        assert_eq!(item.error().unwrap().code, "VIDEO_ENCODING_ERROR");

        item.retry();
        assert_eq!(item.status(), MediaStatus::Idle);
        assert!(item.error().is_none());
        assert_eq!(item.progress(), 0.0);

        item.begin_processing().unwrap();
        item.complete(item.source().clone());
        assert_eq!(item.status(), MediaStatus::Completed);
        assert_eq!(item.progress(), 100.0);
        assert!(item.result().is_some());
    }

    #[test]
    fn test_progress_ignored_when_idle() {
        let mut item = item();
        item.update_progress(50.0);
        assert_eq!(item.progress(), 0.0);
    }

    #[test]
    fn test_watermark_layers_addressed_by_order() {
        let mut item = item();
        let first = item.add_watermark(WatermarkSettings::text("one"), None).unwrap();
        let second = item.add_watermark(WatermarkSettings::text("two"), None).unwrap();
        assert_eq!((first, second), (0, 1));

        item.update_watermark(second, WatermarkSettings::text("TWO")).unwrap();

        let texts: Vec<String> = item
            .features()
            .iter()
            .map(|f| match &f.settings {
                FeatureSettings::Watermark { settings, .. } => settings.text_content().to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(texts, vec!["one", "TWO"]);

        item.remove_feature(first).unwrap();
        assert_eq!(item.features().len(), 1);
        assert_eq!(item.features()[0].order, 1);
        assert!(item.update_watermark(first, WatermarkSettings::text("gone")).is_err());
    }

    #[test]
    fn test_only_watermark_may_repeat() {
        let mut item = item();
        let optimize = FeatureSettings::Optimize(OptimizeOptions::default());
        item.add_feature(optimize.clone()).unwrap();
        let err = item.add_feature(optimize).unwrap_err();
        assert_eq!(err.to_string(), "Pipeline error: Feature 'optimize' is already applied");

        item.add_feature(FeatureSettings::Convert {
            target_format: "webp".to_string(),
            compression: CompressionMode::Balanced,
        })
        .unwrap();
        assert_eq!(item.features().last().unwrap().order, 1);
    }

    #[test]
    fn test_update_watermark_rejects_other_features() {
        let mut item = item();
        let order = item.add_feature(FeatureSettings::Optimize(OptimizeOptions::default())).unwrap();
        assert!(item.update_watermark(order, WatermarkSettings::text("x")).is_err());
    }

    #[test]
    fn test_effective_settings() {
        let mut item = item();
        let shared = WatermarkSettings::text("shared");
        assert_eq!(item.effective_settings(&shared).text_content(), "shared");
        item.set_custom_settings(Some(WatermarkSettings::text("mine")));
        assert_eq!(item.effective_settings(&shared).text_content(), "mine");
    }
}
