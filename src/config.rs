//! Tuning parameters for every pipeline stage.
//!
//! All structures deserialize with `#[serde(default)]`, so a JS caller can
//! pass a partial object and only override the fields it cares about.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
    #[error("{field} must be in {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("skin sampling needs at least one sample point")]
    NoSamplePoints,
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Top-level configuration handed to [`HeadPipeline`](crate::pipeline::HeadPipeline).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeadConfig {
    pub frame: FrameConfig,
    pub texture: TextureConfig,
    pub skin: SkinConfig,
    pub extension: ExtensionConfig,
    pub morph: MorphConfig,
    pub pose: PoseConfig,
    pub asset: AssetConfig,
}

impl HeadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate()?;
        self.texture.validate()?;
        self.skin.validate()?;
        self.extension.validate()?;
        self.morph.validate()?;
        self.asset.validate()
    }
}

/// Landmark-to-model normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameConfig {
    /// Multiplier on normalized X.
    pub width_correction: f64,
    /// Multiplier on normalized Y. Faces are taller than wide, so the unit
    /// square produced by per-axis normalization is stretched back.
    pub height_correction: f64,
    /// Multiplier on normalized Z.
    pub depth_correction: f64,
    /// `depthScale = max(sx, sy) * depth_aspect`.
    pub depth_aspect: f64,
    /// Extent used in place of a zero or non-finite landmark span.
    pub min_scale: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width_correction: 1.0,
            height_correction: 1.2,
            depth_correction: 1.0,
            depth_aspect: 1.0,
            min_scale: 1e-6,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("frame.widthCorrection", self.width_correction, 1e-3, 1e3)?;
        check_range("frame.heightCorrection", self.height_correction, 1e-3, 1e3)?;
        check_range("frame.depthCorrection", self.depth_correction, 0.0, 1e3)?;
        check_range("frame.depthAspect", self.depth_aspect, 1e-3, 1e3)?;
        check_range("frame.minScale", self.min_scale, 1e-12, 1.0)
    }
}

/// Face texture crop and post-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextureConfig {
    /// Output side length in pixels.
    pub resolution: u32,
    /// Fractional margin added around the landmark span.
    pub padding: f64,
    /// Linear contrast factor around mid-grey. `1.0` leaves colors unchanged.
    pub contrast: f64,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            padding: 0.25,
            contrast: 1.15,
        }
    }
}

impl TextureConfig {
    pub const MAX_RESOLUTION: u32 = 4096;

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "texture.resolution",
            f64::from(self.resolution),
            1.0,
            f64::from(Self::MAX_RESOLUTION),
        )?;
        check_range("texture.padding", self.padding, 0.0, 4.0)?;
        check_range("texture.contrast", self.contrast, 0.0, 10.0)
    }
}

/// Skin tone patch sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkinConfig {
    /// Patch centers in texture UV space (`[0,1]²`, top-left origin).
    pub sample_points: Vec<[f64; 2]>,
    /// Half side of each square patch as a fraction of the texture width.
    pub patch_radius: f64,
    /// Pixels with a lower alpha are ignored.
    pub min_alpha: u8,
    /// Linear RGB in `[0,1]` used when no patch is usable.
    pub default_tone: [f64; 3],
}

impl Default for SkinConfig {
    fn default() -> Self {
        Self {
            // forehead center, subject's right cheek, subject's left cheek
            sample_points: vec![[0.5, 0.30], [0.32, 0.58], [0.68, 0.58]],
            patch_radius: 0.012,
            min_alpha: 16,
            default_tone: [0.87, 0.72, 0.62],
        }
    }
}

impl SkinConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_points.is_empty() {
            return Err(ConfigError::NoSamplePoints);
        }
        for point in &self.sample_points {
            check_range("skin.samplePoints[].u", point[0], -1.0, 2.0)?;
            check_range("skin.samplePoints[].v", point[1], -1.0, 2.0)?;
        }
        check_range("skin.patchRadius", self.patch_radius, 0.0, 0.5)?;
        for channel in self.default_tone {
            check_range("skin.defaultTone", channel, 0.0, 1.0)?;
        }
        Ok(())
    }
}

/// Shape of the back-of-head taper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FalloffCurve {
    /// `f(t) = t`
    Linear,
    /// `f(t) = 1 - cos(t * PI / 2)`, slow near the face and fast at the back.
    #[default]
    Cosine,
}

impl FalloffCurve {
    /// Evaluate the curve for `t` in `[0, 1]`. Monotonic, `f(0) = 0`, `f(1) = 1`.
    #[must_use]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Cosine => 1.0 - (t * std::f64::consts::FRAC_PI_2).cos(),
        }
    }
}

/// Back-of-head synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionConfig {
    /// Number of rings behind the silhouette.
    pub layer_count: usize,
    /// Distance from the deepest contour point to the last ring, in model units.
    pub max_depth: f64,
    /// Lateral scale of the last ring relative to the silhouette.
    pub back_scale: f64,
    /// Upward shift of the last ring.
    pub max_lift: f64,
    /// Distance of the apex behind the last ring.
    pub apex_offset: f64,
    pub falloff: FalloffCurve,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            layer_count: 6,
            max_depth: 1.1,
            back_scale: 0.35,
            max_lift: 0.12,
            apex_offset: 0.15,
            falloff: FalloffCurve::Cosine,
        }
    }
}

impl ExtensionConfig {
    pub const MAX_LAYERS: usize = 64;

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "extension.layerCount",
            self.layer_count as f64,
            1.0,
            Self::MAX_LAYERS as f64,
        )?;
        check_range("extension.maxDepth", self.max_depth, 1e-6, 100.0)?;
        check_range("extension.backScale", self.back_scale, 0.0, 1.0)?;
        check_range("extension.maxLift", self.max_lift, 0.0, 10.0)?;
        check_range("extension.apexOffset", self.apex_offset, 0.0, 100.0)
    }
}

/// Morph target synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MorphConfig {
    /// Global multiplier on every rule displacement.
    pub intensity: f64,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self { intensity: 1.0 }
    }
}

impl MorphConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("morph.intensity", self.intensity, 0.0, 10.0)
    }
}

/// Handling of the detector's head pose matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoseConfig {
    /// Apply the rotation of a supplied pose matrix to all positions.
    pub apply_rotation: bool,
    /// Also apply its translation. Off by default so the head stays centered.
    pub apply_translation: bool,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            apply_rotation: true,
            apply_translation: false,
        }
    }
}

/// Attribute values for vertices without image data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetConfig {
    /// UV assigned to every extension vertex.
    pub extension_uv: [f64; 2],
    /// Vertex color of frontal vertices (the texture carries their color).
    pub frontal_color: [f64; 3],
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            extension_uv: [0.0, 0.0],
            frontal_color: [1.0, 1.0, 1.0],
        }
    }
}

impl AssetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for value in self.extension_uv {
            check_range("asset.extensionUv", value, 0.0, 1.0)?;
        }
        for value in self.frontal_color {
            check_range("asset.frontalColor", value, 0.0, 1.0)?;
        }
        Ok(())
    }
}
