use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::settings::ColorMode;

/// Side length of the square sample grid
pub const DEFAULT_SAMPLE_SIZE: u32 = 100;

/// Watermark tone that contrasts with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContrastTone {
    /// Dark image, use a light watermark
    Light,
    /// Bright image, use a dark watermark
    Dark,
}

impl From<ContrastTone> for ColorMode {
    fn from(tone: ContrastTone) -> Self {
        match tone {
            ContrastTone::Light => ColorMode::Light,
            ContrastTone::Dark => ColorMode::Dark,
        }
    }
}

/// Result of a brightness analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessReport {
    /// Mean luma on a 0-100 scale
    pub average: f32,
    pub tone: ContrastTone,
}

/// Samples an image on a small grid and classifies it light or dark
#[derive(Debug, Clone)]
pub struct BrightnessAnalyzer {
    sample_size: u32,
}

impl Default for BrightnessAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BrightnessAnalyzer {
    pub fn new() -> Self {
        Self::with_sample_size(DEFAULT_SAMPLE_SIZE)
    }

    pub fn with_sample_size(sample_size: u32) -> Self {
        Self {
            sample_size: sample_size.max(1),
        }
    }

    /// Downsample with a linear filter, average Rec. 601 luma, normalise to
    /// 0-100. Averages below 50 call for a light watermark.
    pub fn analyze(&self, image: &DynamicImage) -> BrightnessReport {
        let samples = image::imageops::resize(
            &image.to_rgb8(),
            self.sample_size,
            self.sample_size,
            FilterType::Triangle,
        );

        let total: f64 = samples
            .pixels()
            .map(|p| 0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2]))
            .sum();
        let count = f64::from(self.sample_size) * f64::from(self.sample_size);
        let average = (total / count / 255.0 * 100.0) as f32;

        let tone = if average < 50.0 {
            ContrastTone::Light
        } else {
            ContrastTone::Dark
        };

        debug!("Brightness average {:.1} -> {:?} watermark", average, tone);
        BrightnessReport { average, tone }
    }
}

/// Pick the default contrasting watermark tone for an image
pub fn analyze_brightness(image: &DynamicImage) -> ContrastTone {
    BrightnessAnalyzer::new().analyze(image).tone
}
