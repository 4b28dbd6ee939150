use serde::Serialize;

use super::landmarks::LandmarkSet;
use crate::config::FrameConfig;
use crate::geom::{BBox, Point3, Tolerance, Vec3};

/// Square pixel-space crop of the source image.
///
/// `left` and `top` may be negative and `left + size` may exceed the image:
/// the crop is derived from landmarks only, the texture extractor handles the
/// parts outside the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub left: f64,
    pub top: f64,
    pub size: f64,
    pub image_width: u32,
    pub image_height: u32,
}

impl CropRect {
    /// Texture coordinate of a landmark, top-left origin (glTF convention).
    #[must_use]
    pub fn uv(&self, landmark: Point3) -> [f64; 2] {
        let px = landmark.x * f64::from(self.image_width);
        let py = landmark.y * f64::from(self.image_height);
        [(px - self.left) / self.size, (py - self.top) / self.size]
    }

    /// Source pixel position of a texture coordinate.
    #[must_use]
    pub fn pixel_at(&self, u: f64, v: f64) -> (f64, f64) {
        (self.left + u * self.size, self.top + v * self.size)
    }
}

/// Normalization frame shared by mesh, texture and UV generation.
///
/// Built once per image from the landmark bounding box and read-only after.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingFrame {
    pub center: [f64; 3],
    pub scale_x: f64,
    pub scale_y: f64,
    pub depth_scale: f64,
    width_correction: f64,
    height_correction: f64,
    depth_correction: f64,
}

impl BoundingFrame {
    #[must_use]
    pub fn from_landmarks(landmarks: &LandmarkSet, config: &FrameConfig) -> Self {
        let min_scale = Tolerance::new(config.min_scale);
        let (center, size) = match BBox::from_points(landmarks.points()) {
            Some(bbox) => (bbox.center(), bbox.size()),
            None => (Point3::ORIGIN, Vec3::ZERO),
        };

        let scale_x = min_scale.at_least(size.x);
        let scale_y = min_scale.at_least(size.y);
        if scale_x != size.x || scale_y != size.y {
            log::warn!(
                "degenerate landmark extent ({:.3e} x {:.3e}), using minimum scale {:.1e}",
                size.x,
                size.y,
                config.min_scale
            );
        }
        let depth_scale = min_scale.at_least(scale_x.max(scale_y) * config.depth_aspect);

        Self {
            center: center.to_array(),
            scale_x,
            scale_y,
            depth_scale,
            width_correction: config.width_correction,
            height_correction: config.height_correction,
            depth_correction: config.depth_correction,
        }
    }

    /// Map a landmark into model space: x right (subject's left), y up,
    /// z toward the viewer.
    #[must_use]
    pub fn to_model(&self, landmark: Point3) -> Point3 {
        let [cx, cy, cz] = self.center;
        Point3::new(
            (landmark.x - cx) / self.scale_x * self.width_correction,
            -(landmark.y - cy) / self.scale_y * self.height_correction,
            -(landmark.z - cz) / self.depth_scale * self.depth_correction,
        )
    }

    /// Model-space positions of every landmark, in landmark order.
    #[must_use]
    pub fn model_positions(&self, landmarks: &LandmarkSet) -> Vec<Point3> {
        landmarks.points().iter().map(|&p| self.to_model(p)).collect()
    }

    /// Landmark offsets divided by the frame extent, without axis flips or
    /// aspect corrections. Heuristics that compare distances use this space.
    #[must_use]
    pub fn to_normalized(&self, landmark: Point3) -> (f64, f64) {
        (landmark.x / self.scale_x, landmark.y / self.scale_y)
    }

    /// Square crop covering the face with `padding` margin on the longer side.
    #[must_use]
    pub fn crop_rect(&self, padding: f64, image_width: u32, image_height: u32) -> CropRect {
        let width = f64::from(image_width);
        let height = f64::from(image_height);
        let size = (self.scale_x * width).max(self.scale_y * height) * (1.0 + padding);
        let size = Tolerance::MIN_SCALE.at_least(size);
        let [cx, cy, _] = self.center;

        CropRect {
            left: cx * width - size * 0.5,
            top: cy * height - size * 0.5,
            size,
            image_width,
            image_height,
        }
    }

    /// UV of a landmark for an image of the given size.
    #[must_use]
    pub fn uv_for(&self, landmark: Point3, padding: f64, image_width: u32, image_height: u32) -> [f64; 2] {
        self.crop_rect(padding, image_width, image_height).uv(landmark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::landmarks::{CHIN, JAW_LEFT_TOP, NOSE_TIP};

    #[test]
    fn test_reference_frame_extent() {
        let set = LandmarkSet::reference();
        let frame = BoundingFrame::from_landmarks(&set, &FrameConfig::default());

        assert!((frame.scale_x - 0.8).abs() < 1e-12);
        assert!((frame.center[0] - 0.5).abs() < 1e-12);
        assert_eq!(frame.depth_scale, frame.scale_x.max(frame.scale_y));
    }

    #[test]
    fn test_model_axes() {
        let set = LandmarkSet::reference();
        let frame = BoundingFrame::from_landmarks(&set, &FrameConfig::default());

        // subject's left is +x, chin is -y, nose is +z
        assert!(frame.to_model(set.get(JAW_LEFT_TOP)).x > 0.0);
        assert!(frame.to_model(set.get(CHIN)).y < 0.0);
        let nose = frame.to_model(set.get(NOSE_TIP)).z;
        assert!(frame.model_positions(&set).iter().all(|p| p.z <= nose));
    }

    #[test]
    fn test_degenerate_extent_falls_back_to_min_scale() {
        let set = LandmarkSet::reference()
            .map(|p| Point3::new(0.5, p.y, 0.0))
            .unwrap();
        let config = FrameConfig::default();
        let frame = BoundingFrame::from_landmarks(&set, &config);

        assert_eq!(frame.scale_x, config.min_scale);
        let p = frame.to_model(set.get(CHIN));
        assert!(p.is_finite());
        assert_eq!(p.x, 0.0);
        assert_eq!(p.z, 0.0);
    }

    #[test]
    fn test_crop_is_square_and_centered() {
        let set = LandmarkSet::reference();
        let frame = BoundingFrame::from_landmarks(&set, &FrameConfig::default());
        let crop = frame.crop_rect(0.25, 640, 480);

        // sy * H = 0.84 * 480 is shorter than sx * W = 0.8 * 640
        assert!((crop.size - 0.8 * 640.0 * 1.25).abs() < 1e-9);
        let (mid_x, mid_y) = crop.pixel_at(0.5, 0.5);
        assert!((mid_x - frame.center[0] * 640.0).abs() < 1e-9);
        assert!((mid_y - frame.center[1] * 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_uv_matches_crop() {
        let set = LandmarkSet::reference();
        let frame = BoundingFrame::from_landmarks(&set, &FrameConfig::default());
        let crop = frame.crop_rect(0.25, 512, 512);

        for &p in set.points() {
            let [u, v] = frame.uv_for(p, 0.25, 512, 512);
            assert!((0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v));
            let (px, py) = crop.pixel_at(u, v);
            assert!((px - p.x * 512.0).abs() < 1e-9);
            assert!((py - p.y * 512.0).abs() < 1e-9);
        }
    }
}
