//! Built-in feature handlers

pub mod remote;
pub mod watermark;

pub use remote::{RemoteFeature, RemoteOperation};
pub use watermark::WatermarkFeature;
