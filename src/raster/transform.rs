use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{self, Interpolation};

/// Resize an overlay to exactly `width` x `height`
pub fn resize_overlay(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width.max(1), height.max(1), FilterType::Lanczos3)
}

/// Size of the axis-aligned box holding a `width` x `height` rectangle
/// rotated by `degrees`
pub fn rotated_bounds(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let w = width as f32;
    let h = height as f32;
    let rotated_w = (w * cos + h * sin - 1e-3).ceil().max(1.0) as u32;
    let rotated_h = (w * sin + h * cos - 1e-3).ceil().max(1.0) as u32;
    (rotated_w, rotated_h)
}

/// Rotate an image clockwise by `degrees` about its centre
///
/// The canvas grows to the rotated bounding box and the centre of the source
/// lands on the centre of the result, so callers that centre the result on
/// an anchor rotate about that anchor. Everything outside the source is
/// transparent.
pub fn rotate_about_center(image: &RgbaImage, degrees: f32) -> RgbaImage {
    if degrees.rem_euclid(360.0) == 0.0 {
        return image.clone();
    }

    let (src_w, src_h) = image.dimensions();
    let (dst_w, dst_h) = rotated_bounds(src_w, src_h, degrees);

    // One spare pixel each side keeps bilinear edges inside the canvas
    let canvas_w = dst_w.max(src_w) + 2;
    let canvas_h = dst_h.max(src_h) + 2;
    let mut canvas = RgbaImage::new(canvas_w, canvas_h);
    imageops::overlay(
        &mut canvas,
        image,
        i64::from((canvas_w - src_w) / 2),
        i64::from((canvas_h - src_h) / 2),
    );

    let rotated = geometric_transformations::rotate_about_center(
        &canvas,
        degrees.to_radians(),
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
    );

    imageops::crop_imm(&rotated, (canvas_w - dst_w) / 2, (canvas_h - dst_h) / 2, dst_w, dst_h).to_image()
}
