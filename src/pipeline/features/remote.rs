use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::stage::{
    settings_mismatch, FeatureHandler, FeatureSettings, PipelineData, StageProgress, CONVERT, OPTIMIZE,
    REMOVE_BACKGROUND,
};
use crate::remote::{OptimizationService, RemoteSource, RemoteSuccess};

/// Which remote operation a [`RemoteFeature`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    Convert,
    RemoveBackground,
    Optimize,
}

impl RemoteOperation {
    pub fn feature_id(self) -> &'static str {
        match self {
            Self::Convert => CONVERT,
            Self::RemoveBackground => REMOVE_BACKGROUND,
            Self::Optimize => OPTIMIZE,
        }
    }
}

/// Delegates a stage to the remote optimization service
///
/// A `pending` outcome fails the stage with a retryable error; the result of
/// a success stays on the service and flows on as a locator.
pub struct RemoteFeature {
    operation: RemoteOperation,
    service: Arc<dyn OptimizationService>,
}

impl RemoteFeature {
    pub fn new(operation: RemoteOperation, service: Arc<dyn OptimizationService>) -> Self {
        Self { operation, service }
    }

    pub fn convert(service: Arc<dyn OptimizationService>) -> Self {
        Self::new(RemoteOperation::Convert, service)
    }

    pub fn remove_background(service: Arc<dyn OptimizationService>) -> Self {
        Self::new(RemoteOperation::RemoveBackground, service)
    }

    pub fn optimize(service: Arc<dyn OptimizationService>) -> Self {
        Self::new(RemoteOperation::Optimize, service)
    }

    async fn call(&self, source: RemoteSource, settings: &FeatureSettings) -> Result<(RemoteSuccess, String)> {
        let operation = self.operation.feature_id();
        let service = self.service.as_ref();
        let (outcome, mime) = match (self.operation, settings) {
            (RemoteOperation::Convert, FeatureSettings::Convert { target_format, compression }) => {
                let mime = format!("image/{}", target_format.trim_start_matches('.').to_lowercase());
                (service.convert(source, target_format, *compression).await?, mime)
            }
            (RemoteOperation::RemoveBackground, FeatureSettings::RemoveBackground { background, compression }) => (
                service.remove_background(source, background, *compression).await?,
                "image/png".to_string(),
            ),
            (RemoteOperation::Optimize, FeatureSettings::Optimize(options)) => {
                let mime = source.mime.clone();
                (service.optimize(source, options).await?, mime)
            }
            _ => return Err(settings_mismatch(operation)),
        };
        Ok((outcome.into_success(operation)?, mime))
    }
}

#[async_trait]
impl FeatureHandler for RemoteFeature {
    fn feature_id(&self) -> &str {
        self.operation.feature_id()
    }

    async fn apply(&self, input: PipelineData, settings: &FeatureSettings, progress: StageProgress) -> Result<PipelineData> {
        if input.is_video() {
            return Err(PipelineError::UnsupportedInput {
                feature_id: self.feature_id().to_string(),
                input: input.mime().to_string(),
            }
            .into());
        }

        let source = input.materialize(Some(self.service.as_ref())).await?;
        progress.report(10.0);

        let (success, mime) = self.call(source, settings).await?;
        info!(
            "{} done: {} -> {} bytes ({:.0}%)",
            self.feature_id(),
            success.original_size,
            success.result_size,
            success.compression_ratio * 100.0
        );

        Ok(PipelineData::Remote {
            locator: success.locator.clone(),
            mime,
            stats: success,
        })
    }
}
