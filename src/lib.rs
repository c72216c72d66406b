//! # Watermark Studio
//!
//! Overlay text and image watermarks onto still images and videos, and chain
//! watermarking with other per-image transformations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use watermark_studio::{
//!     config::Config,
//!     engine::ProcessingEngine,
//!     settings::{PositionPreset, WatermarkSettings},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut engine = ProcessingEngine::from_config(&config, None);
//! engine.set_shared_watermark(
//!     WatermarkSettings::text("© Studio").with_preset(PositionPreset::BottomRight),
//!     None,
//! );
//!
//! let mut item = engine.load_path("holiday.jpg")?;
//! engine.process(&mut item).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`settings`] - Watermark settings and their update rules
//! - [`raster`] - Surfaces, text rendering and overlay transforms
//! - [`compositor`] - Overlay placement and still-image compositing
//! - [`video`] - Frame-by-frame video watermarking and codec negotiation
//! - [`pipeline`] - Ordered feature stages over one input
//! - [`media`] - Media items, their status and the working set
//! - [`engine`] - Runs items through their pipelines
//! - [`config`] - Configuration management
//!
//! ## Adding Features
//!
//! New transformations implement [`FeatureHandler`](pipeline::FeatureHandler)
//! and are registered with a [`FeatureRegistry`](pipeline::FeatureRegistry):
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use watermark_studio::pipeline::{FeatureHandler, FeatureSettings, PipelineData, StageProgress};
//! use watermark_studio::Result;
//!
//! struct Passthrough;
//!
//! #[async_trait]
//! impl FeatureHandler for Passthrough {
//!     fn feature_id(&self) -> &str {
//!         "passthrough"
//!     }
//!
//!     async fn apply(&self, input: PipelineData, _: &FeatureSettings, _: StageProgress) -> Result<PipelineData> {
//!         Ok(input)
//!     }
//! }
//! ```

pub mod analysis;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod pipeline;
pub mod raster;
pub mod remote;
pub mod settings;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    analysis::analyze_brightness,
    compositor::{export_raster, StaticCompositor},
    config::Config,
    engine::ProcessingEngine,
    error::{Result, StudioError},
    pipeline::run_pipeline,
    settings::WatermarkSettings,
    video::watermark_video,
};
