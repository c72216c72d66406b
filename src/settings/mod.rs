//! # Watermark Settings
//!
//! Immutable description of one watermark layer plus the color palette used
//! to resolve its fill color.

pub mod color;
pub mod model;

pub use color::{parse_hex_color, Color, Palette};
pub use model::{ColorMode, PositionPreset, WatermarkKind, WatermarkSettings};
