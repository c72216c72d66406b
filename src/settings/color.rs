use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, Result};
use crate::settings::{ColorMode, WatermarkSettings};

/// Parsed RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }
}

/// Parse `#RGB` or `#RRGGBB`
pub fn parse_hex_color(hex: &str) -> Result<Color> {
    let digits = hex.trim().strip_prefix('#').ok_or_else(|| invalid(hex))?;

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid(hex));

    match digits.len() {
        3 => Ok(Color::new(
            channel(&digits[0..1])? * 17,
            channel(&digits[1..2])? * 17,
            channel(&digits[2..3])? * 17,
        )),
        6 => Ok(Color::new(
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        )),
        _ => Err(invalid(hex)),
    }
}

fn invalid(hex: &str) -> crate::error::StudioError {
    MediaError::Canvas {
        reason: format!("color must be #RGB or #RRGGBB, got '{}'", hex),
    }
    .into()
}

/// Fill colors used for the `Light` and `Dark` color modes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Palette {
    pub light: String,
    pub dark: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            light: "#E6E6E6".to_string(),
            dark: "#333333".to_string(),
        }
    }
}

impl Palette {
    /// Resolve the text fill color for a settings value
    pub fn resolve(&self, settings: &WatermarkSettings) -> Result<Color> {
        match settings.color_mode() {
            ColorMode::Light => parse_hex_color(&self.light),
            ColorMode::Dark => parse_hex_color(&self.dark),
            ColorMode::Custom => parse_hex_color(settings.custom_color()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000").unwrap(), Color::new(255, 0, 0));
        assert_eq!(parse_hex_color("#abc").unwrap(), Color::new(170, 187, 204));
        assert_eq!(parse_hex_color(" #00ff00 ").unwrap(), Color::new(0, 255, 0));
    }

    #[test]
    fn test_parse_hex_color_invalid() {
        assert!(parse_hex_color("FF0000").is_err());
        assert!(parse_hex_color("#FF00").is_err());
        assert!(parse_hex_color("#GGGGGG").is_err());
    }

    #[test]
    fn test_palette_resolves_by_mode() {
        let palette = Palette::default();
        let light = WatermarkSettings::text("x").with_color_mode(ColorMode::Light);
        let dark = light.with_color_mode(ColorMode::Dark);
        let custom = light.with_custom_color("#102030");

        assert_eq!(palette.resolve(&light).unwrap(), Color::new(0xE6, 0xE6, 0xE6));
        assert_eq!(palette.resolve(&dark).unwrap(), Color::new(0x33, 0x33, 0x33));
        assert_eq!(palette.resolve(&custom).unwrap(), Color::new(0x10, 0x20, 0x30));
    }
}
