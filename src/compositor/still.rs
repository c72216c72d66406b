use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use tracing::debug;

use crate::compositor::WatermarkOverlay;
use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::raster::{FontBook, Surface, WatermarkImage};
use crate::settings::{Palette, WatermarkSettings};

/// Decode an encoded still image; failures are `ImageLoad` errors
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data).map_err(|e| {
        MediaError::ImageLoad {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Composites a watermark onto still images
#[derive(Debug, Clone)]
pub struct StaticCompositor {
    fonts: Arc<FontBook>,
    palette: Palette,
}

impl StaticCompositor {
    pub fn new(fonts: Arc<FontBook>, palette: Palette) -> Self {
        Self { fonts, palette }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(FontBook::load(&config.fonts)), config.image.palette.clone())
    }

    pub fn fonts(&self) -> &Arc<FontBook> {
        &self.fonts
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Draw `base` onto a surface of the same size, then the watermark on top.
    ///
    /// Without watermark content the surface is just the base image.
    pub fn composite(
        &self,
        base: &DynamicImage,
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
    ) -> Result<Surface> {
        let mut surface = Surface::from_image(base);
        if !settings.has_content(watermark) {
            debug!("No watermark content, returning base image");
            return Ok(surface);
        }

        let (width, height) = surface.dimensions();
        if let Some(overlay) = WatermarkOverlay::prepare(settings, watermark, width, height, &self.fonts, &self.palette)? {
            overlay.draw(&mut surface);
        }
        Ok(surface)
    }

    /// Decode `data` and composite it
    pub fn composite_bytes(
        &self,
        data: &[u8],
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
    ) -> Result<Surface> {
        let base = decode_image(data)?;
        self.composite(&base, settings, watermark)
    }
}

/// Encode a composited surface losslessly as PNG
pub fn export_raster(surface: &Surface) -> Result<Bytes> {
    surface.export_png()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::text::system_font;
    use crate::settings::{ColorMode, PositionPreset};
    use image::{Rgba, RgbaImage};

    fn base(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 40, 255])
        }))
    }

    fn compositor() -> StaticCompositor {
        StaticCompositor::new(Arc::new(FontBook::empty()), Palette::default())
    }

    #[test]
    fn test_passthrough_is_identical() {
        let base = base(120, 80);
        let surface = compositor()
            .composite(&base, &WatermarkSettings::default(), None)
            .unwrap();
        assert_eq!(surface.as_image(), &base.to_rgba8());

        let logo_without_image = WatermarkSettings::image();
        let surface = compositor().composite(&base, &logo_without_image, None).unwrap();
        assert_eq!(surface.as_image(), &base.to_rgba8());
    }

    #[test]
    fn test_logo_drawn_at_anchor() {
        let base = DynamicImage::ImageRgba8(RgbaImage::from_pixel(800, 600, Rgba([0, 0, 0, 255])));
        let logo = WatermarkImage::new(RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]))).unwrap();
        let settings = WatermarkSettings::image()
            .with_size_percent(25.0)
            .with_preset(PositionPreset::BottomRight);

        let surface = compositor().composite(&base, &settings, Some(&logo)).unwrap();

        assert_eq!(surface.dimensions(), (800, 600));
        // Overlay spans (620, 490) to (820, 590), clipped at the right edge
        assert_eq!(surface.get_pixel(620, 490), [255, 255, 255, 255]);
        assert_eq!(surface.get_pixel(799, 589), [255, 255, 255, 255]);
        assert_eq!(surface.get_pixel(619, 490), [0, 0, 0, 255]);
        assert_eq!(surface.get_pixel(620, 489), [0, 0, 0, 255]);
        assert_eq!(surface.get_pixel(700, 590), [0, 0, 0, 255]);
    }

    #[test]
    fn test_center_text_at_half_opacity() {
        let Some(font) = system_font() else { return };
        let fonts = Arc::new(FontBook::empty().with_fallback(font));
        let compositor = StaticCompositor::new(fonts, Palette::default());

        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1000, 500, Rgba([0, 0, 0, 255])));
        let settings = WatermarkSettings::text("Copyright")
            .with_font_size_percent(10.0)
            .with_preset(PositionPreset::Center)
            .with_custom_color("#FFFFFF")
            .with_opacity_percent(50);
        assert_eq!(settings.color_mode(), ColorMode::Custom);

        let surface = compositor.composite(&black, &settings, None).unwrap();
        assert_eq!(surface.dimensions(), (1000, 500));

        // Fully covered glyph pixels end up half way between black and white
        let brightest = surface.as_image().pixels().map(|p| p[0]).max().unwrap();
        assert!((126..=129).contains(&brightest), "brightest = {}", brightest);

        // The text is centred on (500, 250)
        let lit: Vec<(u32, u32)> = surface
            .as_image()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        let min_x = lit.iter().map(|p| p.0).min().unwrap();
        let max_x = lit.iter().map(|p| p.0).max().unwrap();
        let centre_x = (min_x + max_x) as f32 / 2.0;
        assert!((centre_x - 500.0).abs() < 30.0, "centre_x = {}", centre_x);
        assert!(lit.iter().all(|p| p.1 > 150 && p.1 < 350));
    }

    #[test]
    fn test_export_is_png_and_idempotent() {
        let surface = compositor()
            .composite(&base(32, 16), &WatermarkSettings::default(), None)
            .unwrap();
        let first = export_raster(&surface).unwrap();
        let second = export_raster(&surface).unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = decode_image(&first).unwrap();
        assert_eq!(decoded.to_rgba8(), *surface.as_image());
    }

    #[test]
    fn test_undecodable_base_is_image_load_error() {
        let err = compositor()
            .composite_bytes(b"not an image", &WatermarkSettings::default(), None)
            .unwrap_err();
        assert_eq!(err.code(), "IMAGE_LOAD_ERROR");
    }
}
