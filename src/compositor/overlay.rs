use image::RgbaImage;
use tracing::debug;

use crate::error::Result;
use crate::raster::{render_text, resize_overlay, rotate_about_center, FontBook, Surface, WatermarkImage};
use crate::settings::{Palette, WatermarkKind, WatermarkSettings};

/// Anchor point in pixels: the position percentages applied to the base size
pub fn anchor_point(settings: &WatermarkSettings, base_width: u32, base_height: u32) -> (f32, f32) {
    (
        settings.position_x_percent() / 100.0 * base_width as f32,
        settings.position_y_percent() / 100.0 * base_height as f32,
    )
}

/// Text size in pixels, relative to the base width
pub fn font_size_px(settings: &WatermarkSettings, base_width: u32) -> f32 {
    settings.font_size_percent() / 100.0 * base_width as f32
}

/// Overlay size for an image watermark: width relative to the base width,
/// height keeping the watermark's own aspect ratio
pub fn image_overlay_size(settings: &WatermarkSettings, base_width: u32, watermark: &WatermarkImage) -> (u32, u32) {
    let width = settings.size_percent() / 100.0 * base_width as f32;
    let height = width * watermark.height() as f32 / watermark.width().max(1) as f32;
    (width.round().max(1.0) as u32, height.round().max(1.0) as u32)
}

/// Top-left corner of a `width` x `height` box centred on `anchor`
pub fn centered_top_left(anchor: (f32, f32), width: u32, height: u32) -> (i32, i32) {
    (
        (anchor.0 - width as f32 / 2.0).round() as i32,
        (anchor.1 - height as f32 / 2.0).round() as i32,
    )
}

/// A watermark rendered and transformed for one base size
///
/// Preparing renders the text or scales the image and applies the rotation
/// once; drawing is a single clipped blend, cheap enough to repeat on every
/// video frame.
#[derive(Clone, Debug)]
pub struct WatermarkOverlay {
    bitmap: RgbaImage,
    anchor: (f32, f32),
    opacity: f32,
}

impl WatermarkOverlay {
    /// Prepare the overlay for a base of `base_width` x `base_height`.
    ///
    /// Returns `None` when there is nothing to draw: empty text, or an image
    /// watermark without an image.
    pub fn prepare(
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
        base_width: u32,
        base_height: u32,
        fonts: &FontBook,
        palette: &Palette,
    ) -> Result<Option<Self>> {
        if !settings.has_content(watermark) {
            return Ok(None);
        }

        let anchor = anchor_point(settings, base_width, base_height);
        let upright = match (settings.kind(), watermark) {
            (WatermarkKind::Text, _) => {
                let font = fonts.resolve(settings.font_family())?;
                let color = palette.resolve(settings)?;
                render_text(
                    font.as_ref(),
                    settings.text_content(),
                    font_size_px(settings, base_width),
                    color,
                )?
            }
            (WatermarkKind::Image, Some(watermark)) => {
                let (width, height) = image_overlay_size(settings, base_width, watermark);
                resize_overlay(watermark.as_image(), width, height)
            }
            (WatermarkKind::Image, None) => return Ok(None),
        };

        let bitmap = if settings.rotation_degrees() != 0.0 {
            rotate_about_center(&upright, settings.rotation_degrees())
        } else {
            upright
        };

        debug!(
            "Prepared {:?} overlay {}x{} at ({:.1}, {:.1}), rotation {:.1}",
            settings.kind(),
            bitmap.width(),
            bitmap.height(),
            anchor.0,
            anchor.1,
            settings.rotation_degrees()
        );

        Ok(Some(Self {
            bitmap,
            anchor,
            opacity: settings.effective_opacity(),
        }))
    }

    pub fn anchor(&self) -> (f32, f32) {
        self.anchor
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    pub fn top_left(&self) -> (i32, i32) {
        centered_top_left(self.anchor, self.bitmap.width(), self.bitmap.height())
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    /// Blend the overlay onto the surface; the global alpha applies to the
    /// overlay only
    pub fn draw(&self, surface: &mut Surface) {
        let (x, y) = self.top_left();
        surface.blend(&self.bitmap, x, y, self.opacity);
    }
}
