use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::stage::{PipelineData, PipelineStage, StageProgress};

/// Run stages in ascending order, each one's output feeding the next.
///
/// The first failing stage fails the whole run and later stages never run.
/// With no stages the source is returned unchanged.
pub async fn run_pipeline(source: PipelineData, stages: Vec<PipelineStage>) -> Result<PipelineData> {
    run_pipeline_with_progress(source, stages, None).await
}

/// [`run_pipeline`] reporting overall progress in [0, 100]; each stage
/// covers an equal share
pub async fn run_pipeline_with_progress(
    source: PipelineData,
    mut stages: Vec<PipelineStage>,
    on_progress: Option<Arc<dyn Fn(f32) + Send + Sync>>,
) -> Result<PipelineData> {
    if stages.is_empty() {
        debug!("Empty pipeline, returning source unchanged");
        return Ok(source);
    }

    stages.sort_by_key(|stage| stage.order);
    let total = stages.len();
    info!(
        "Running pipeline: {}",
        stages.iter().map(|s| s.feature_id.as_str()).collect::<Vec<_>>().join(" -> ")
    );

    let mut data = source;
    for (index, stage) in stages.into_iter().enumerate() {
        let progress = match &on_progress {
            Some(sink) => {
                let sink = sink.clone();
                StageProgress::new(Arc::new(move |p: f32| {
                    sink((index as f32 + p.clamp(0.0, 100.0) / 100.0) / total as f32 * 100.0)
                }))
            }
            None => StageProgress::none(),
        };

        debug!("Stage {} ({}) on {} input", stage.order, stage.feature_id, data.kind());
        data = match stage.handler.apply(data, &stage.settings, progress.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Stage {} ({}) failed: {}", stage.order, stage.feature_id, e);
                return Err(e);
            }
        };
        progress.report(100.0);
    }

    Ok(data)
}
