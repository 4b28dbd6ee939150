use image::RgbaImage;
use serde::Serialize;

use crate::config::SkinConfig;

/// Estimated skin color, RGB in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinToneSample {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    /// `true` when no patch was usable and the configured default was returned.
    pub fell_back: bool,
    /// Number of patches that contributed to the average.
    pub patch_count: usize,
}

impl SkinToneSample {
    #[must_use]
    pub fn fallback(config: &SkinConfig) -> Self {
        let [r, g, b] = config.default_tone;
        Self {
            r,
            g,
            b,
            fell_back: true,
            patch_count: 0,
        }
    }

    #[must_use]
    pub fn to_array(self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchSkip {
    OutOfCanvas,
    Transparent,
}

/// Average color of the square patch centered on `uv`, over pixels with
/// alpha of at least `min_alpha`.
fn sample_patch(
    texture: &RgbaImage,
    uv: [f64; 2],
    radius: u32,
    min_alpha: u8,
) -> Result<[f64; 3], PatchSkip> {
    let (width, height) = texture.dimensions();
    let cx = (uv[0] * f64::from(width)).floor();
    let cy = (uv[1] * f64::from(height)).floor();
    let r = f64::from(radius);
    if !cx.is_finite()
        || !cy.is_finite()
        || cx - r < 0.0
        || cy - r < 0.0
        || cx + r >= f64::from(width)
        || cy + r >= f64::from(height)
    {
        return Err(PatchSkip::OutOfCanvas);
    }

    let (cx, cy) = (cx as u32, cy as u32);
    let mut sum = [0.0f64; 3];
    let mut count = 0u32;
    for y in cy - radius..=cy + radius {
        for x in cx - radius..=cx + radius {
            let [r, g, b, a] = texture.get_pixel(x, y).0;
            if a < min_alpha {
                continue;
            }
            sum[0] += f64::from(r);
            sum[1] += f64::from(g);
            sum[2] += f64::from(b);
            count += 1;
        }
    }

    if count == 0 {
        return Err(PatchSkip::Transparent);
    }
    let denom = f64::from(count) * 255.0;
    Ok([sum[0] / denom, sum[1] / denom, sum[2] / denom])
}

/// Estimate the skin tone from fixed patches of the face texture.
///
/// Patches that read outside the canvas or contain no opaque pixel are
/// skipped. When every patch is skipped the configured default tone is
/// returned with `fell_back` set; this never fails.
#[must_use]
pub fn sample_skin_tone(texture: &RgbaImage, config: &SkinConfig) -> SkinToneSample {
    let radius = (config.patch_radius * f64::from(texture.width())).round().max(1.0) as u32;

    let mut total = [0.0f64; 3];
    let mut patch_count = 0usize;
    for (index, &uv) in config.sample_points.iter().enumerate() {
        match sample_patch(texture, uv, radius, config.min_alpha) {
            Ok(rgb) => {
                for (acc, value) in total.iter_mut().zip(rgb) {
                    *acc += value;
                }
                patch_count += 1;
            }
            Err(reason) => {
                log::debug!("skin patch {index} at {uv:?} skipped: {reason:?}");
            }
        }
    }

    if patch_count == 0 {
        log::warn!("no usable skin patch, using default tone {:?}", config.default_tone);
        return SkinToneSample::fallback(config);
    }

    let n = patch_count as f64;
    SkinToneSample {
        r: total[0] / n,
        g: total[1] / n,
        b: total[2] / n,
        fell_back: false,
        patch_count,
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn test_uniform_texture() {
        let texture = RgbaImage::from_pixel(256, 256, Rgba([204, 153, 102, 255]));
        let tone = sample_skin_tone(&texture, &SkinConfig::default());

        assert!(!tone.fell_back);
        assert_eq!(tone.patch_count, 3);
        assert!((tone.r - 0.8).abs() < 1e-12);
        assert!((tone.g - 0.6).abs() < 1e-12);
        assert!((tone.b - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_transparent_texture_falls_back() {
        let texture = RgbaImage::new(128, 128);
        let config = SkinConfig::default();
        let tone = sample_skin_tone(&texture, &config);

        assert!(tone.fell_back);
        assert_eq!(tone.patch_count, 0);
        assert_eq!(tone.to_array(), config.default_tone);
    }

    #[test]
    fn test_out_of_canvas_patch_is_skipped() {
        let texture = RgbaImage::from_pixel(64, 64, Rgba([255, 0, 0, 255]));
        let config = SkinConfig {
            sample_points: vec![[0.5, 0.5], [1.2, 0.5], [0.0, 0.0]],
            ..SkinConfig::default()
        };
        let tone = sample_skin_tone(&texture, &config);

        assert_eq!(tone.patch_count, 1);
        assert_eq!(tone.to_array(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_patch_ignores_faint_pixels() {
        let mut texture = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 8]));
        texture.put_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let config = SkinConfig {
            sample_points: vec![[0.5, 0.5]],
            ..SkinConfig::default()
        };
        let tone = sample_skin_tone(&texture, &config);

        assert_eq!(tone.patch_count, 1);
        assert_eq!(tone.to_array(), [1.0, 1.0, 1.0]);
    }
}
