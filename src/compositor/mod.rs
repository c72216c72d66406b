//! # Compositor
//!
//! Overlay preparation shared by still images and video frames, and the
//! static-image compositor built on it.

pub mod still;
pub mod overlay;

pub use still::{decode_image, export_raster, StaticCompositor};
pub use overlay::{anchor_point, centered_top_left, font_size_px, image_overlay_size, WatermarkOverlay};
