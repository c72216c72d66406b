//! Text rasterisation for text watermarks.
//!
//! Fonts are loaded from TrueType/OpenType files named in the configuration
//! and resolved by family name. Rendering produces a tightly sized RGBA
//! bitmap whose vertical centre is the middle of the em box, so centring the
//! bitmap on an anchor gives centre/middle alignment.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::config::FontConfig;
use crate::error::{MediaError, Result};
use crate::settings::Color;

/// Font files probed when no configured family can be loaded
pub const DEFAULT_FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loaded fonts keyed by lower-cased family name
#[derive(Clone, Default)]
pub struct FontBook {
    families: HashMap<String, Arc<FontVec>>,
    default_family: Option<String>,
    fallback: Option<Arc<FontVec>>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("families", &self.families.keys().collect::<Vec<_>>())
            .field("default_family", &self.default_family)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl FontBook {
    /// An empty book: text watermarks fail with `WatermarkLoad`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every configured family, then the first readable search path as
    /// the fallback. Unreadable files are logged and skipped.
    pub fn load(config: &FontConfig) -> Self {
        let mut book = Self::empty();
        book.default_family = Some(config.default_family.to_lowercase());

        for (family, path) in &config.families {
            match load_font_file(path) {
                Ok(font) => book.insert(family, font),
                Err(e) => warn!("Skipping font family '{}': {}", family, e),
            }
        }

        book.fallback = config
            .search_paths
            .iter()
            .find_map(|path| load_font_file(path).ok())
            .map(Arc::new);

        if book.families.is_empty() && book.fallback.is_none() {
            warn!("No fonts could be loaded; text watermarks are unavailable");
        } else {
            debug!("Loaded {} font families (fallback: {})", book.families.len(), book.fallback.is_some());
        }
        book
    }

    pub fn insert(&mut self, family: &str, font: FontVec) {
        self.families.insert(family.to_lowercase(), Arc::new(font));
    }

    pub fn with_fallback(mut self, font: FontVec) -> Self {
        self.fallback = Some(Arc::new(font));
        self
    }

    /// Resolve a family: exact match, then the default family, then the fallback
    pub fn resolve(&self, family: &str) -> Result<Arc<FontVec>> {
        let wanted = family.trim().to_lowercase();
        self.families
            .get(&wanted)
            .or_else(|| self.default_family.as_ref().and_then(|d| self.families.get(d)))
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                MediaError::WatermarkLoad {
                    reason: format!("no font available for family '{}'", family),
                }
                .into()
            })
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.fallback.is_none()
    }
}

fn load_font_file<P: AsRef<Path>>(path: P) -> Result<FontVec> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| MediaError::WatermarkLoad {
        reason: format!("{}: {}", path.display(), e),
    })?;
    FontVec::try_from_vec(data).map_err(|e| {
        MediaError::WatermarkLoad {
            reason: format!("{}: {}", path.display(), e),
        }
        .into()
    })
}

/// Width and height of a single line of text at `font_size` pixels
pub fn measure_text<F: Font>(font: &F, text: &str, font_size: f32) -> (u32, u32) {
    let scaled = font.as_scaled(PxScale::from(font_size));
    let width = line_advance(&scaled, text);
    let height = scaled.ascent() - scaled.descent();
    (width.ceil().max(1.0) as u32, height.ceil().max(1.0) as u32)
}

fn line_advance<SF: ScaleFont<F>, F: Font>(scaled: &SF, text: &str) -> f32 {
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Render one line of text to a transparent RGBA bitmap in a solid color
pub fn render_text<F: Font>(font: &F, text: &str, font_size: f32, color: Color) -> Result<RgbaImage> {
    if text.trim().is_empty() {
        return Err(MediaError::Canvas {
            reason: "cannot render empty text".to_string(),
        }
        .into());
    }
    if !(font_size.is_finite() && font_size > 0.0) {
        return Err(MediaError::Canvas {
            reason: format!("invalid font size {}", font_size),
        }
        .into());
    }

    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);
    let (width, height) = measure_text(font, text, font_size);
    let mut bitmap = RgbaImage::from_pixel(width, height, Rgba([color.r, color.g, color.b, 0]));

    let baseline = scaled.ascent();
    let mut cursor = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            cursor += scaled.kern(prev, id);
        }

        let glyph = id.with_scale_and_position(scale, point(cursor, baseline));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = gx as i32 + bounds.min.x as i32;
                let y = gy as i32 + bounds.min.y as i32;
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                let pixel = bitmap.get_pixel_mut(x as u32, y as u32);
                // Same fill everywhere, so overlapping glyphs keep the stronger coverage
                pixel[3] = pixel[3].max(alpha);
            });
        }

        cursor += scaled.h_advance(id);
        prev = Some(id);
    }

    Ok(bitmap)
}

#[cfg(test)]
pub(crate) fn system_font() -> Option<FontVec> {
    DEFAULT_FONT_SEARCH_PATHS
        .iter()
        .find_map(|path| load_font_file(path).ok())
}
