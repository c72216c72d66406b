use serde::{Deserialize, Serialize};

use crate::raster::WatermarkImage;

pub const FONT_SIZE_PERCENT_RANGE: (f32, f32) = (5.0, 30.0);
pub const SIZE_PERCENT_RANGE: (f32, f32) = (5.0, 50.0);
pub const OPACITY_PERCENT_RANGE: (u8, u8) = (1, 100);
pub const ROTATION_RANGE: (f32, f32) = (-180.0, 180.0);
pub const POSITION_RANGE: (f32, f32) = (0.0, 100.0);

/// Which kind of content a watermark layer draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkKind {
    Text,
    Image,
}

/// How the fill color of a text watermark is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Light,
    Dark,
    Custom,
}

/// Named anchor positions
///
/// Every named preset maps to fixed percentages of the base dimensions;
/// `Custom` means the coordinates were set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionPreset {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Custom,
}

impl PositionPreset {
    pub const ALL: [PositionPreset; 9] = [
        Self::TopLeft,
        Self::TopCenter,
        Self::TopRight,
        Self::CenterLeft,
        Self::Center,
        Self::CenterRight,
        Self::BottomLeft,
        Self::BottomCenter,
        Self::BottomRight,
    ];

    /// Anchor coordinates in percent, or `None` for `Custom`
    pub fn coordinates(self) -> Option<(f32, f32)> {
        let (x, y) = match self {
            Self::TopLeft => (10.0, 10.0),
            Self::TopCenter => (50.0, 10.0),
            Self::TopRight => (90.0, 10.0),
            Self::CenterLeft => (10.0, 50.0),
            Self::Center => (50.0, 50.0),
            Self::CenterRight => (90.0, 50.0),
            Self::BottomLeft => (10.0, 90.0),
            Self::BottomCenter => (50.0, 90.0),
            Self::BottomRight => (90.0, 90.0),
            Self::Custom => return None,
        };
        Some((x, y))
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopCenter => "top-center",
            Self::TopRight => "top-right",
            Self::CenterLeft => "center-left",
            Self::Center => "center",
            Self::CenterRight => "center-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomCenter => "bottom-center",
            Self::BottomRight => "bottom-right",
            Self::Custom => "custom",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .chain(std::iter::once(Self::Custom))
            .find(|preset| preset.id() == id)
    }
}

/// One watermark layer
///
/// Values are immutable: every `with_*` method returns a new value and
/// enforces the update rules.
/// - setting either position axis directly resets the preset to `Custom`
/// - image watermarks are always drawn fully opaque
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettingsDraft")]
pub struct WatermarkSettings {
    kind: WatermarkKind,
    text: String,
    font_family: String,
    font_size_percent: f32,
    color_mode: ColorMode,
    custom_color: String,
    size_percent: f32,
    opacity_percent: u8,
    rotation_degrees: f32,
    position_x_percent: f32,
    position_y_percent: f32,
    position_preset: PositionPreset,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            text: String::new(),
            font_family: "sans-serif".to_string(),
            font_size_percent: 10.0,
            color_mode: ColorMode::Light,
            custom_color: "#FFFFFF".to_string(),
            size_percent: 20.0,
            opacity_percent: 50,
            rotation_degrees: 0.0,
            position_x_percent: 50.0,
            position_y_percent: 50.0,
            position_preset: PositionPreset::Center,
        }
    }
}

impl WatermarkSettings {
    /// A centred text watermark with default styling
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::default().with_text(text)
    }

    /// A centred, fully opaque image watermark
    pub fn image() -> Self {
        Self::default().with_kind(WatermarkKind::Image)
    }

    pub fn kind(&self) -> WatermarkKind {
        self.kind
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }

    pub fn font_family(&self) -> &str {
        &self.font_family
    }

    pub fn font_size_percent(&self) -> f32 {
        self.font_size_percent
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn custom_color(&self) -> &str {
        &self.custom_color
    }

    pub fn size_percent(&self) -> f32 {
        self.size_percent
    }

    pub fn opacity_percent(&self) -> u8 {
        self.opacity_percent
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    pub fn position_x_percent(&self) -> f32 {
        self.position_x_percent
    }

    pub fn position_y_percent(&self) -> f32 {
        self.position_y_percent
    }

    pub fn position_preset(&self) -> PositionPreset {
        self.position_preset
    }

    /// Opacity as applied to the overlay draw, in 0.0..=1.0
    pub fn effective_opacity(&self) -> f32 {
        match self.kind {
            WatermarkKind::Image => 1.0,
            WatermarkKind::Text => f32::from(self.opacity_percent) / 100.0,
        }
    }

    /// Whether anything would be drawn with the given watermark image
    pub fn has_content(&self, watermark: Option<&WatermarkImage>) -> bool {
        match self.kind {
            WatermarkKind::Text => !self.text.trim().is_empty(),
            WatermarkKind::Image => watermark.is_some(),
        }
    }

    pub fn with_kind(&self, kind: WatermarkKind) -> Self {
        let mut next = self.clone();
        next.kind = kind;
        if kind == WatermarkKind::Image {
            next.opacity_percent = 100;
        }
        next
    }

    pub fn with_text<S: Into<String>>(&self, text: S) -> Self {
        let mut next = self.clone();
        next.text = text.into();
        next
    }

    pub fn with_font_family<S: Into<String>>(&self, family: S) -> Self {
        let mut next = self.clone();
        next.font_family = family.into();
        next
    }

    pub fn with_font_size_percent(&self, percent: f32) -> Self {
        let mut next = self.clone();
        next.font_size_percent = clamp_f32(percent, FONT_SIZE_PERCENT_RANGE);
        next
    }

    pub fn with_size_percent(&self, percent: f32) -> Self {
        let mut next = self.clone();
        next.size_percent = clamp_f32(percent, SIZE_PERCENT_RANGE);
        next
    }

    /// Set the overlay opacity. Image watermarks stay at 100.
    pub fn with_opacity_percent(&self, percent: u8) -> Self {
        let mut next = self.clone();
        if next.kind == WatermarkKind::Text {
            next.opacity_percent = percent.clamp(OPACITY_PERCENT_RANGE.0, OPACITY_PERCENT_RANGE.1);
        }
        next
    }

    pub fn with_rotation_degrees(&self, degrees: f32) -> Self {
        let mut next = self.clone();
        next.rotation_degrees = clamp_f32(degrees, ROTATION_RANGE);
        next
    }

    pub fn with_position_x_percent(&self, x: f32) -> Self {
        let mut next = self.clone();
        next.position_x_percent = clamp_f32(x, POSITION_RANGE);
        next.position_preset = PositionPreset::Custom;
        next
    }

    pub fn with_position_y_percent(&self, y: f32) -> Self {
        let mut next = self.clone();
        next.position_y_percent = clamp_f32(y, POSITION_RANGE);
        next.position_preset = PositionPreset::Custom;
        next
    }

    pub fn with_position(&self, x: f32, y: f32) -> Self {
        self.with_position_x_percent(x).with_position_y_percent(y)
    }

    /// Move to a named preset. `Custom` keeps the current coordinates.
    pub fn with_preset(&self, preset: PositionPreset) -> Self {
        let mut next = self.clone();
        if let Some((x, y)) = preset.coordinates() {
            next.position_x_percent = x;
            next.position_y_percent = y;
        }
        next.position_preset = preset;
        next
    }

    pub fn with_color_mode(&self, mode: ColorMode) -> Self {
        let mut next = self.clone();
        next.color_mode = mode;
        next
    }

    /// Set a custom fill color and switch the color mode to `Custom`
    pub fn with_custom_color<S: Into<String>>(&self, hex: S) -> Self {
        let mut next = self.clone();
        next.custom_color = hex.into();
        next.color_mode = ColorMode::Custom;
        next
    }
}

fn clamp_f32(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Unchecked form used for deserialization; converted through the same
/// rules as the builder methods.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct SettingsDraft {
    kind: WatermarkKind,
    text: String,
    font_family: String,
    font_size_percent: f32,
    color_mode: ColorMode,
    custom_color: String,
    size_percent: f32,
    opacity_percent: u8,
    rotation_degrees: f32,
    position_x_percent: Option<f32>,
    position_y_percent: Option<f32>,
    position_preset: Option<PositionPreset>,
}

impl Default for SettingsDraft {
    fn default() -> Self {
        let defaults = WatermarkSettings::default();
        Self {
            kind: defaults.kind,
            text: defaults.text,
            font_family: defaults.font_family,
            font_size_percent: defaults.font_size_percent,
            color_mode: defaults.color_mode,
            custom_color: defaults.custom_color,
            size_percent: defaults.size_percent,
            opacity_percent: defaults.opacity_percent,
            rotation_degrees: defaults.rotation_degrees,
            position_x_percent: None,
            position_y_percent: None,
            position_preset: None,
        }
    }
}

impl From<SettingsDraft> for WatermarkSettings {
    fn from(draft: SettingsDraft) -> Self {
        let mut settings = WatermarkSettings::default()
            .with_text(draft.text)
            .with_font_family(draft.font_family)
            .with_font_size_percent(draft.font_size_percent)
            .with_size_percent(draft.size_percent)
            .with_opacity_percent(draft.opacity_percent)
            .with_rotation_degrees(draft.rotation_degrees)
            .with_color_mode(draft.color_mode);
        settings.custom_color = draft.custom_color;

        // Explicit coordinates win over the preset tag unless they agree
        settings = match (draft.position_x_percent, draft.position_y_percent, draft.position_preset) {
            (None, None, Some(preset)) => settings.with_preset(preset),
            (None, None, None) => settings,
            (Some(x), Some(y), Some(preset)) if preset.coordinates() == Some((x, y)) => {
                settings.with_preset(preset)
            }
            (x, y, _) => settings.with_position(
                x.unwrap_or(settings.position_x_percent),
                y.unwrap_or(settings.position_y_percent),
            ),
        };

        settings.with_kind(draft.kind)
    }
}
