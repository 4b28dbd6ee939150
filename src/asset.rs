//! Assembly of the exportable head asset.
//!
//! Frontal landmarks and the synthesized back of the head are merged into one
//! indexed triangle mesh with UVs, vertex colors and 52 absolute morph
//! targets. The asset is validated once and immutable afterwards.

use serde::Serialize;

use crate::config::{AssetConfig, PoseConfig};
use crate::face::{
    ArkitChannel, BlendshapeCoefficients, CanonicalTopology, ChannelTarget, CropRect, LandmarkSet,
};
use crate::geom::{GeomMeshDiagnostics, HeadExtension, Point3, Transform, mesh_diagnostics};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AssemblyError {
    #[error("pose matrix is singular, mirrored or not finite")]
    InvalidPose,
    #[error("{what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("index buffer length {0} is not a multiple of 3")]
    NotTriangleList(usize),
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{what} contains a non-finite value")]
    NonFinite { what: &'static str },
    #[error("morph target {position} is {actual}, expected {expected}")]
    MorphOrder {
        position: usize,
        expected: ArkitChannel,
        actual: ArkitChannel,
    },
    #[error("morph target {channel} moves extension vertex {vertex}")]
    ExtensionMoved { channel: ArkitChannel, vertex: usize },
}

/// Absolute (or, from [`FaceMeshAsset::morph_deltas`], relative) positions
/// for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphTarget {
    pub channel: ArkitChannel,
    pub positions: Vec<[f32; 3]>,
}

/// Everything an encoder needs to write the head mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMeshAsset {
    positions: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    colors: Vec<[f32; 3]>,
    indices: Vec<u32>,
    morph_targets: Vec<MorphTarget>,
    frontal_vertex_count: usize,
}

/// Borrowed stage outputs the assembler merges.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub landmarks: &'a LandmarkSet,
    /// Frontal model positions, in landmark order.
    pub frontal: &'a [Point3],
    pub crop: &'a CropRect,
    pub topology: &'a CanonicalTopology,
    pub extension: &'a HeadExtension,
    /// One target per channel in ARKit order, over frontal + extension.
    pub morph_targets: &'a [ChannelTarget],
    /// Row-major 4x4 head pose from the detector.
    pub pose: Option<&'a [f64; 16]>,
}

fn to_f32_2(v: [f64; 2]) -> [f32; 2] {
    [v[0] as f32, v[1] as f32]
}

fn to_f32_3(v: [f64; 3]) -> [f32; 3] {
    [v[0] as f32, v[1] as f32, v[2] as f32]
}

/// Rigid transform to apply for `pose`, or `None` when positions stay as
/// they are.
fn pose_transform(
    pose: Option<&[f64; 16]>,
    config: &PoseConfig,
) -> Result<Option<Transform>, AssemblyError> {
    let Some(matrix) = pose else {
        return Ok(None);
    };
    if !config.apply_rotation && !config.apply_translation {
        log::debug!("pose supplied but disabled by config");
        return Ok(None);
    }

    let rigid = Transform::from_row_major(matrix)
        .rigid_part(config.apply_translation)
        .ok_or(AssemblyError::InvalidPose)?;
    if config.apply_rotation {
        Ok(Some(rigid))
    } else {
        Ok(Some(Transform::translate(rigid.translation())))
    }
}

fn place(points: &[Point3], transform: Option<Transform>) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|&p| match transform {
            Some(t) => t.apply_point(p).to_f32_array(),
            None => p.to_f32_array(),
        })
        .collect()
}

/// Merge stage outputs into a validated [`FaceMeshAsset`].
pub fn assemble_asset(
    input: &AssemblyInput<'_>,
    pose_config: &PoseConfig,
    config: &AssetConfig,
) -> Result<FaceMeshAsset, AssemblyError> {
    let frontal_count = input.frontal.len();
    if input.landmarks.len() != frontal_count {
        return Err(AssemblyError::LengthMismatch {
            what: "landmarks",
            expected: frontal_count,
            actual: input.landmarks.len(),
        });
    }
    if input.extension.base_index as usize != frontal_count {
        return Err(AssemblyError::LengthMismatch {
            what: "extension base index",
            expected: frontal_count,
            actual: input.extension.base_index as usize,
        });
    }

    let transform = pose_transform(input.pose, pose_config)?;

    let mut base = Vec::with_capacity(frontal_count + input.extension.vertex_count());
    base.extend_from_slice(input.frontal);
    base.extend_from_slice(&input.extension.positions);
    let positions = place(&base, transform);

    let mut uvs: Vec<[f32; 2]> = input
        .landmarks
        .points()
        .iter()
        .map(|&p| to_f32_2(input.crop.uv(p)))
        .collect();
    uvs.resize(positions.len(), to_f32_2(config.extension_uv));

    let mut colors = vec![to_f32_3(config.frontal_color); frontal_count];
    colors.extend(input.extension.colors.iter().map(|&c| to_f32_3(c)));

    let mut indices = input.topology.indices().to_vec();
    indices.extend_from_slice(&input.extension.indices);

    let morph_targets = input
        .morph_targets
        .iter()
        .map(|target| MorphTarget {
            channel: target.channel,
            positions: place(&target.positions, transform),
        })
        .collect();

    let asset = FaceMeshAsset {
        positions,
        uvs,
        colors,
        indices,
        morph_targets,
        frontal_vertex_count: frontal_count,
    };
    asset.validate()?;

    log::info!(
        "assembled head: {} vertices ({} frontal), {} triangles, {} morph targets{}",
        asset.vertex_count(),
        frontal_count,
        asset.triangle_count(),
        asset.morph_targets.len(),
        if transform.is_some() { ", posed" } else { "" }
    );
    Ok(asset)
}

impl FaceMeshAsset {
    #[must_use]
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    #[must_use]
    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    #[must_use]
    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn morph_targets(&self) -> &[MorphTarget] {
        &self.morph_targets
    }

    #[must_use]
    pub fn frontal_vertex_count(&self) -> usize {
        self.frontal_vertex_count
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// `[x0, y0, z0, x1, ...]`
    #[must_use]
    pub fn positions_flat(&self) -> &[f32] {
        self.positions.as_flattened()
    }

    #[must_use]
    pub fn uvs_flat(&self) -> &[f32] {
        self.uvs.as_flattened()
    }

    #[must_use]
    pub fn colors_flat(&self) -> &[f32] {
        self.colors.as_flattened()
    }

    /// Check every buffer invariant of the asset.
    pub fn validate(&self) -> Result<(), AssemblyError> {
        let n = self.positions.len();
        for (what, len) in [("uvs", self.uvs.len()), ("colors", self.colors.len())] {
            if len != n {
                return Err(AssemblyError::LengthMismatch {
                    what,
                    expected: n,
                    actual: len,
                });
            }
        }
        if self.indices.len() % 3 != 0 {
            return Err(AssemblyError::NotTriangleList(self.indices.len()));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(AssemblyError::IndexOutOfRange {
                index,
                vertex_count: n,
            });
        }
        if !self.positions.as_flattened().iter().all(|v| v.is_finite()) {
            return Err(AssemblyError::NonFinite { what: "positions" });
        }
        if !self.uvs.as_flattened().iter().all(|v| v.is_finite()) {
            return Err(AssemblyError::NonFinite { what: "uvs" });
        }

        if self.morph_targets.len() != ArkitChannel::COUNT {
            return Err(AssemblyError::LengthMismatch {
                what: "morph targets",
                expected: ArkitChannel::COUNT,
                actual: self.morph_targets.len(),
            });
        }
        for (position, (target, expected)) in
            self.morph_targets.iter().zip(ArkitChannel::ALL).enumerate()
        {
            if target.channel != expected {
                return Err(AssemblyError::MorphOrder {
                    position,
                    expected,
                    actual: target.channel,
                });
            }
            if target.positions.len() != n {
                return Err(AssemblyError::LengthMismatch {
                    what: "morph target",
                    expected: n,
                    actual: target.positions.len(),
                });
            }
            if !target.positions.as_flattened().iter().all(|v| v.is_finite()) {
                return Err(AssemblyError::NonFinite { what: "morph target" });
            }
            let extension = self.frontal_vertex_count..n;
            if let Some(offset) = target.positions[extension.clone()]
                .iter()
                .zip(&self.positions[extension])
                .position(|(t, b)| t != b)
            {
                return Err(AssemblyError::ExtensionMoved {
                    channel: target.channel,
                    vertex: self.frontal_vertex_count + offset,
                });
            }
        }
        Ok(())
    }

    /// Morph targets as offsets from the base positions, for formats that
    /// store deltas.
    #[must_use]
    pub fn morph_deltas(&self) -> Vec<MorphTarget> {
        self.morph_targets
            .iter()
            .map(|target| MorphTarget {
                channel: target.channel,
                positions: target
                    .positions
                    .iter()
                    .zip(&self.positions)
                    .map(|(t, b)| [t[0] - b[0], t[1] - b[1], t[2] - b[2]])
                    .collect(),
            })
            .collect()
    }

    /// Base positions with every target applied at its coefficient.
    /// All-zero coefficients return the base positions unchanged.
    #[must_use]
    pub fn blend(&self, coefficients: &BlendshapeCoefficients) -> Vec<[f32; 3]> {
        let mut out = self.positions.clone();
        for target in &self.morph_targets {
            let weight = coefficients.get(target.channel);
            if weight == 0.0 {
                continue;
            }
            for ((o, b), t) in out.iter_mut().zip(&self.positions).zip(&target.positions) {
                for axis in 0..3 {
                    o[axis] += (t[axis] - b[axis]) * weight;
                }
            }
        }
        out
    }

    /// Edge topology, orientation and volume of the base mesh.
    #[must_use]
    pub fn diagnostics(&self) -> GeomMeshDiagnostics {
        mesh_diagnostics(&self.positions, &self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtensionConfig, FrameConfig, MorphConfig, TextureConfig};
    use crate::face::{BoundingFrame, MORPH_RULES, SILHOUETTE_CONTOUR, synthesize_morph_targets};
    use crate::geom::extend_contour;

    const SKIN: [f64; 3] = [0.7, 0.5, 0.4];
    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    struct Stages {
        landmarks: LandmarkSet,
        frame: BoundingFrame,
        frontal: Vec<Point3>,
        topology: CanonicalTopology,
        extension: HeadExtension,
        targets: Vec<ChannelTarget>,
        crop: CropRect,
    }

    fn stages() -> Stages {
        let landmarks = LandmarkSet::reference();
        let frame = BoundingFrame::from_landmarks(&landmarks, &FrameConfig::default());
        let frontal = frame.model_positions(&landmarks);
        let extension =
            extend_contour(&frontal, &SILHOUETTE_CONTOUR, SKIN, &ExtensionConfig::default())
                .unwrap();
        let mut base = frontal.clone();
        base.extend_from_slice(&extension.positions);
        let targets = synthesize_morph_targets(&base, &MORPH_RULES, &MorphConfig::default()).unwrap();
        let crop = frame.crop_rect(TextureConfig::default().padding, WIDTH, HEIGHT);
        Stages {
            landmarks,
            frame,
            frontal,
            topology: CanonicalTopology::standard().unwrap(),
            extension,
            targets,
            crop,
        }
    }

    fn assemble(s: &Stages, pose: Option<&[f64; 16]>, pose_config: &PoseConfig) -> Result<FaceMeshAsset, AssemblyError> {
        let input = AssemblyInput {
            landmarks: &s.landmarks,
            frontal: &s.frontal,
            crop: &s.crop,
            topology: &s.topology,
            extension: &s.extension,
            morph_targets: &s.targets,
            pose,
        };
        assemble_asset(&input, pose_config, &AssetConfig::default())
    }

    fn distance(a: [f32; 3], b: [f32; 3]) -> f64 {
        let d: Vec<f64> = (0..3).map(|i| f64::from(a[i]) - f64::from(b[i])).collect();
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }

    #[test]
    fn test_assembled_head_is_closed() {
        let s = stages();
        let asset = assemble(&s, None, &PoseConfig::default()).unwrap();

        assert_eq!(asset.vertex_count(), 81 + s.extension.vertex_count());
        assert_eq!(asset.triangle_count(), 130 + s.extension.triangle_count());
        assert_eq!(asset.morph_targets().len(), 52);
        assert_eq!(asset.positions_flat().len(), 3 * asset.vertex_count());
        assert_eq!(asset.uvs_flat().len(), 2 * asset.vertex_count());

        let diag = asset.diagnostics();
        assert!(diag.is_closed_solid(), "{diag}");
    }

    #[test]
    fn test_attributes_split_frontal_and_extension() {
        let s = stages();
        let asset = assemble(&s, None, &PoseConfig::default()).unwrap();
        let skin = [0.7f32, 0.5, 0.4];

        assert!(asset.colors()[..81].iter().all(|&c| c == [1.0, 1.0, 1.0]));
        assert!(asset.colors()[81..].iter().all(|&c| c == skin));
        assert!(asset.uvs()[81..].iter().all(|&uv| uv == [0.0, 0.0]));
        assert!(
            asset.uvs()[..81]
                .iter()
                .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]))
        );
    }

    #[test]
    fn test_uvs_match_the_texture_crop() {
        let s = stages();
        let asset = assemble(&s, None, &PoseConfig::default()).unwrap();
        let padding = TextureConfig::default().padding;

        // the extractor derives its crop from the same frame
        let texture_crop = s.frame.crop_rect(padding, WIDTH, HEIGHT);
        assert_eq!(texture_crop, s.crop);

        for (i, uv) in asset.uvs()[..81].iter().enumerate() {
            let (px, py) = texture_crop.pixel_at(f64::from(uv[0]), f64::from(uv[1]));
            let p = s.landmarks.get(i);
            assert!((px - p.x * f64::from(WIDTH)).abs() < 1e-3, "landmark {i}");
            assert!((py - p.y * f64::from(HEIGHT)).abs() < 1e-3, "landmark {i}");
        }
    }

    #[test]
    fn test_extension_entries_equal_base_in_every_target() {
        let s = stages();
        let asset = assemble(&s, None, &PoseConfig::default()).unwrap();

        for target in asset.morph_targets() {
            assert_eq!(target.positions[81..], asset.positions()[81..]);
        }
        for delta in asset.morph_deltas() {
            assert!(delta.positions[81..].iter().all(|&d| d == [0.0, 0.0, 0.0]));
        }
        let jaw = &asset.morph_deltas()[ArkitChannel::JawOpen.index()];
        assert!((jaw.positions[8][1] + 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_blend_identity_and_full_weight() {
        let s = stages();
        let asset = assemble(&s, None, &PoseConfig::default()).unwrap();
        assert_eq!(asset.blend(&BlendshapeCoefficients::default()), asset.positions());

        let mut coefficients = BlendshapeCoefficients::default();
        coefficients.set(ArkitChannel::EyeBlinkLeft, 1.0);
        let blended = asset.blend(&coefficients);
        let target = &asset.morph_targets()[ArkitChannel::EyeBlinkLeft.index()];
        for (b, t) in blended.iter().zip(&target.positions) {
            assert!(distance(*b, *t) < 1e-6);
        }
    }

    #[test]
    fn test_pose_is_applied_rigidly() {
        let s = stages();
        let plain = assemble(&s, None, &PoseConfig::default()).unwrap();

        // rotation about y by 30 degrees, uniform scale 2, translation
        let (sin, cos) = 30f64.to_radians().sin_cos();
        #[rustfmt::skip]
        let pose = [
            2.0 * cos, 0.0, 2.0 * sin, 5.0,
            0.0, 2.0, 0.0, -1.0,
            -2.0 * sin, 0.0, 2.0 * cos, 3.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let posed = assemble(&s, Some(&pose), &PoseConfig::default()).unwrap();

        let pairs = [(0, 16), (8, 30), (27, 81), (100, 200), (36, 45)];
        for (a, b) in pairs {
            let before = distance(plain.positions()[a], plain.positions()[b]);
            let after = distance(posed.positions()[a], posed.positions()[b]);
            assert!((before - after).abs() < 1e-5, "{a}-{b}: {before} vs {after}");
        }
        // translation is off by default, so the nose bridge stays at its radius
        let r_before = distance(plain.positions()[27], [0.0; 3]);
        let r_after = distance(posed.positions()[27], [0.0; 3]);
        assert!((r_before - r_after).abs() < 1e-5);

        for (base, target) in posed.positions()[81..]
            .iter()
            .zip(&posed.morph_targets()[ArkitChannel::JawOpen.index()].positions[81..])
        {
            assert_eq!(base, target);
        }
        assert!(posed.diagnostics().is_closed_solid());
    }

    #[test]
    fn test_pose_translation_is_optional() {
        let s = stages();
        let plain = assemble(&s, None, &PoseConfig::default()).unwrap();
        let mut pose = [0.0; 16];
        for i in 0..4 {
            pose[i * 5] = 1.0;
        }
        pose[3] = 0.5;

        let config = PoseConfig {
            apply_rotation: true,
            apply_translation: true,
        };
        let moved = assemble(&s, Some(&pose), &config).unwrap();
        assert!((moved.positions()[30][0] - plain.positions()[30][0] - 0.5).abs() < 1e-6);

        let disabled = PoseConfig {
            apply_rotation: false,
            apply_translation: false,
        };
        assert_eq!(assemble(&s, Some(&pose), &disabled).unwrap(), plain);
    }

    #[test]
    fn test_mirrored_pose_is_rejected() {
        let s = stages();
        let mut mirror = [0.0; 16];
        mirror[0] = -1.0;
        mirror[5] = 1.0;
        mirror[10] = 1.0;
        mirror[15] = 1.0;
        assert_eq!(
            assemble(&s, Some(&mirror), &PoseConfig::default()),
            Err(AssemblyError::InvalidPose)
        );
    }

    #[test]
    fn test_wrong_morph_count_is_rejected() {
        let mut s = stages();
        s.targets.pop();
        assert_eq!(
            assemble(&s, None, &PoseConfig::default()),
            Err(AssemblyError::LengthMismatch {
                what: "morph targets",
                expected: 52,
                actual: 51,
            })
        );
    }
}
