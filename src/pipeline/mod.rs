//! # Feature Pipeline
//!
//! Runs an ordered list of named transformations over one input. Each stage's
//! output is the next stage's input and the first failure stops the run.

pub mod features;
pub mod registry;
pub mod runner;
pub mod stage;

pub use features::{RemoteFeature, RemoteOperation, WatermarkFeature};
pub use registry::FeatureRegistry;
pub use runner::{run_pipeline, run_pipeline_with_progress};
pub use stage::{FeatureHandler, FeatureSettings, PipelineData, PipelineStage, StageProgress};
