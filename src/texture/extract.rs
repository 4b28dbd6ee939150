use image::{Rgba, RgbaImage};

use crate::config::TextureConfig;
use crate::face::{BoundingFrame, CropRect};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TextureError {
    #[error("source image is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("rgba buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("texture resolution must be at least 1, got {0}")]
    InvalidResolution(u32),
    #[error("failed to decode image: {0}")]
    Decode(String),
}

/// Face texture plus the crop it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTexture {
    pub image: RgbaImage,
    pub crop: CropRect,
}

/// Decode a PNG or JPEG byte stream into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, TextureError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| TextureError::Decode(e.to_string()))?;
    Ok(decoded.to_rgba8())
}

/// Wrap a raw RGBA8 buffer (row-major, 4 bytes per pixel).
pub fn rgba_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<RgbaImage, TextureError> {
    let expected = (width as usize) * (height as usize) * 4;
    let actual = data.len();
    RgbaImage::from_raw(width, height, data).ok_or(TextureError::BufferSize { expected, actual })
}

/// Cut the square face crop out of `source`, resample it to
/// `config.resolution` and stretch its contrast.
///
/// Output pixels whose center falls outside the source are fully transparent.
pub fn extract_texture(
    source: &RgbaImage,
    frame: &BoundingFrame,
    config: &TextureConfig,
) -> Result<ExtractedTexture, TextureError> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(TextureError::EmptySource { width, height });
    }
    if config.resolution == 0 {
        return Err(TextureError::InvalidResolution(config.resolution));
    }

    let crop = frame.crop_rect(config.padding, width, height);
    let resolution = config.resolution;
    let step = 1.0 / f64::from(resolution);

    let mut image = RgbaImage::new(resolution, resolution);
    let mut outside = 0usize;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let u = (f64::from(x) + 0.5) * step;
        let v = (f64::from(y) + 0.5) * step;
        let (px, py) = crop.pixel_at(u, v);
        match sample_bilinear(source, px, py) {
            Some(value) => *pixel = value,
            None => outside += 1,
        }
    }

    if outside > 0 {
        log::debug!(
            "texture crop extends past the source image: {outside} of {} pixels transparent",
            resolution as usize * resolution as usize
        );
    }

    apply_contrast(&mut image, config.contrast);
    Ok(ExtractedTexture { image, crop })
}

/// Bilinear sample at pixel-space position `(px, py)`, where pixel `i` covers
/// `[i, i + 1)`. Returns `None` outside the image; neighbours past the edge
/// are clamped.
fn sample_bilinear(source: &RgbaImage, px: f64, py: f64) -> Option<Rgba<u8>> {
    let (width, height) = source.dimensions();
    if !(px >= 0.0 && py >= 0.0 && px < f64::from(width) && py < f64::from(height)) {
        return None;
    }

    let fx = px - 0.5;
    let fy = py - 0.5;
    let tx = fx - fx.floor();
    let ty = fy - fy.floor();
    let max_x = i64::from(width) - 1;
    let max_y = i64::from(height) - 1;
    let x0 = (fx.floor() as i64).clamp(0, max_x) as u32;
    let y0 = (fy.floor() as i64).clamp(0, max_y) as u32;
    let x1 = (fx.floor() as i64 + 1).clamp(0, max_x) as u32;
    let y1 = (fy.floor() as i64 + 1).clamp(0, max_y) as u32;

    let p00 = source.get_pixel(x0, y0).0;
    let p10 = source.get_pixel(x1, y0).0;
    let p01 = source.get_pixel(x0, y1).0;
    let p11 = source.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = f64::from(p00[c]) * (1.0 - tx) + f64::from(p10[c]) * tx;
        let bottom = f64::from(p01[c]) * (1.0 - tx) + f64::from(p11[c]) * tx;
        out[c] = to_channel(top * (1.0 - ty) + bottom * ty);
    }
    Some(Rgba(out))
}

fn to_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Linear contrast stretch around mid-grey on RGB. Alpha is untouched.
pub fn apply_contrast(image: &mut RgbaImage, contrast: f64) {
    if (contrast - 1.0).abs() <= f64::EPSILON {
        return;
    }
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            let normalized = f64::from(*channel) / 255.0;
            *channel = to_channel(((normalized - 0.5) * contrast + 0.5) * 255.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::face::LandmarkSet;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    fn reference_frame() -> BoundingFrame {
        BoundingFrame::from_landmarks(&LandmarkSet::reference(), &FrameConfig::default())
    }

    #[test]
    fn test_contrast_keeps_midpoint_and_alpha() {
        let mut image = solid(2, 2, [128, 64, 200, 77]);
        apply_contrast(&mut image, 1.5);
        // v' = 1.5 v - 63.75
        assert_eq!(image.get_pixel(0, 0).0, [128, 32, 236, 77]);

        let mut image = solid(1, 1, [250, 5, 0, 255]);
        apply_contrast(&mut image, 3.0);
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_contrast_identity() {
        let mut image = solid(1, 1, [10, 20, 30, 40]);
        apply_contrast(&mut image, 1.0);
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 40]);
    }

    #[test]
    fn test_bilinear_interpolates_between_columns() {
        let mut image = solid(2, 1, [0, 0, 0, 255]);
        image.put_pixel(1, 0, Rgba([200, 100, 50, 255]));
        let mid = sample_bilinear(&image, 1.0, 0.5).unwrap();
        assert_eq!(mid.0, [100, 50, 25, 255]);
        // pixel centers reproduce the source exactly
        assert_eq!(sample_bilinear(&image, 1.5, 0.5).unwrap().0, [200, 100, 50, 255]);
        assert!(sample_bilinear(&image, 2.0, 0.5).is_none());
        assert!(sample_bilinear(&image, -0.01, 0.5).is_none());
    }

    #[test]
    fn test_extract_solid_face() {
        let source = solid(320, 320, [180, 140, 120, 255]);
        let config = TextureConfig {
            resolution: 64,
            contrast: 1.0,
            ..TextureConfig::default()
        };
        let texture = extract_texture(&source, &reference_frame(), &config).unwrap();

        assert_eq!(texture.image.dimensions(), (64, 64));
        assert_eq!(texture.image.get_pixel(32, 32).0, [180, 140, 120, 255]);
        assert_eq!(texture.crop, reference_frame().crop_rect(config.padding, 320, 320));
    }

    #[test]
    fn test_out_of_bounds_is_transparent() {
        // with 25% padding the crop is taller than the face span and
        // overhangs the top edge of the image
        let source = solid(100, 100, [255, 255, 255, 255]);
        let config = TextureConfig {
            resolution: 32,
            ..TextureConfig::default()
        };
        let texture = extract_texture(&source, &reference_frame(), &config).unwrap();

        assert!(texture.crop.top < 0.0);
        assert_eq!(texture.image.get_pixel(16, 0).0[3], 0);
        assert_eq!(texture.image.get_pixel(16, 16).0[3], 255);
    }

    #[test]
    fn test_rejects_empty_and_bad_buffers() {
        let empty = RgbaImage::new(0, 10);
        assert_eq!(
            extract_texture(&empty, &reference_frame(), &TextureConfig::default()),
            Err(TextureError::EmptySource { width: 0, height: 10 })
        );
        assert_eq!(
            rgba_from_raw(2, 2, vec![0; 15]),
            Err(TextureError::BufferSize { expected: 16, actual: 15 })
        );
        assert!(matches!(decode_image(b"not an image"), Err(TextureError::Decode(_))));
    }
}
