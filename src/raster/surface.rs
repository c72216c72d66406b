use std::path::Path;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{MediaError, Result};

/// In-memory RGBA pixel buffer that can be drawn onto and read back
///
/// The destination of every composite: the static compositor draws one base
/// image into it, the video pipeline redraws it once per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    buffer: RgbaImage,
}

impl Surface {
    /// Allocate a fully transparent surface
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::Canvas {
                reason: format!("cannot allocate a {}x{} surface", width, height),
            }
            .into());
        }
        Ok(Self {
            buffer: RgbaImage::new(width, height),
        })
    }

    /// Create a surface filled with a single color
    pub fn new_filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            buffer: RgbaImage::from_pixel(width, height, Rgba(color)),
        }
    }

    /// Allocate a surface at the image's size with the image drawn at the origin
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            buffer: image.to_rgba8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Raw RGBA bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Draw a full frame at the origin, stretched to the surface size
    pub fn draw_frame(&mut self, frame: &RgbaImage) {
        if frame.dimensions() == self.buffer.dimensions() {
            self.buffer.copy_from_slice(frame.as_raw());
        } else {
            self.buffer = image::imageops::resize(frame, self.width(), self.height(), FilterType::Triangle);
        }
    }

    /// Composite `overlay` with its top-left at (`x`, `y`) using the
    /// Porter-Duff "over" operator. `opacity` scales the overlay alpha only.
    pub fn blend(&mut self, overlay: &RgbaImage, x: i32, y: i32, opacity: f32) {
        blend_overlay(&mut self.buffer, overlay, x, y, opacity);
    }

    /// Encode the surface as PNG
    ///
    /// PNG is lossless and the encoder is deterministic, so the same pixels
    /// always produce the same bytes.
    pub fn export_png(&self) -> Result<Bytes> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(self.buffer.as_raw(), self.width(), self.height(), ColorType::Rgba8)
            .map_err(|e| MediaError::Canvas {
                reason: format!("PNG export failed: {}", e),
            })?;
        Ok(Bytes::from(out))
    }

    /// Drop the pixel storage; the surface becomes 0x0
    pub(crate) fn clear_storage(&mut self) {
        self.buffer = RgbaImage::new(0, 0);
    }
}

/// A caller-owned, already decoded watermark raster
#[derive(Clone, Debug)]
pub struct WatermarkImage {
    image: RgbaImage,
}

impl WatermarkImage {
    /// Wrap a decoded raster; a zero width or height is a watermark load error
    pub fn new(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(MediaError::WatermarkLoad {
                reason: "watermark image is empty".to_string(),
            }
            .into());
        }
        Ok(Self { image })
    }

    /// Decode a watermark from encoded bytes (PNG, JPEG, WebP, GIF)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(data).map_err(|e| MediaError::WatermarkLoad {
            reason: e.to_string(),
        })?;
        Self::from_dynamic(&decoded)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let decoded = image::open(path.as_ref()).map_err(|e| MediaError::WatermarkLoad {
            reason: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_dynamic(&decoded)
    }

    fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        Self::new(image.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Blend `overlay` onto `target` at (`x`, `y`), clipped to the target bounds
pub fn blend_overlay(target: &mut RgbaImage, overlay: &RgbaImage, x: i32, y: i32, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }

    let target_width = target.width() as i32;
    let target_height = target.height() as i32;
    let overlay_width = overlay.width() as i32;
    let overlay_height = overlay.height() as i32;

    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + overlay_width).min(target_width);
    let y_end = (y + overlay_height).min(target_height);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let stride = target_width as usize * 4;
    let overlay_raw = overlay.as_raw();
    let pixels: &mut [u8] = &mut **target;

    pixels
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y_start as usize)
        .take((y_end - y_start) as usize)
        .for_each(|(ty, row)| {
            let oy = (ty as i32 - y) as usize;
            for tx in x_start..x_end {
                let ox = (tx - x) as usize;
                let src_at = (oy * overlay_width as usize + ox) * 4;
                let src = &overlay_raw[src_at..src_at + 4];
                let dst_at = tx as usize * 4;
                blend_pixel(&mut row[dst_at..dst_at + 4], src, opacity);
            }
        });
}

fn blend_pixel(dst: &mut [u8], src: &[u8], opacity: f32) {
    let fg_alpha = f32::from(src[3]) / 255.0 * opacity;
    if fg_alpha <= 0.0 {
        return;
    }
    let bg_alpha = f32::from(dst[3]) / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    for c in 0..3 {
        let fg = f32::from(src[c]);
        let bg = f32::from(dst[c]);
        let value = (fg * fg_alpha + bg * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}
