//! # Raster Module
//!
//! Raster surfaces, alpha blending, overlay transforms and text rendering.

pub mod surface;
pub mod text;
pub mod transform;

pub use surface::{blend_overlay, Surface, WatermarkImage};
pub use text::{measure_text, render_text, FontBook};
pub use transform::{resize_overlay, rotate_about_center, rotated_bounds};
