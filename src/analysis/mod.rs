//! # Image Analysis
//!
//! Picks a default contrasting watermark color from image brightness.

pub mod brightness;

pub use brightness::{analyze_brightness, BrightnessAnalyzer, BrightnessReport, ContrastTone};
