//! Back-of-head synthesis.
//!
//! The frontal landmark mesh is an open disk. Its silhouette contour is pushed
//! back into `layer_count` rings that shrink toward `back_scale` and rise by
//! `max_lift`, then capped with a single apex vertex. Seam, ring strips and
//! apex fan reuse the contour winding so the union with the frontal disk is a
//! closed, consistently oriented surface.

use std::collections::BTreeSet;

use super::Point3;
use crate::config::ExtensionConfig;
use crate::face::{BoundingFrame, LandmarkSet};
use crate::texture::SkinToneSample;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExtensionError {
    #[error("contour index {index} out of range for {vertex_count} frontal vertices")]
    ContourIndexOutOfRange { index: u32, vertex_count: usize },
    #[error("frontal vertex {index} is not finite")]
    NonFinitePoint { index: u32 },
    #[error("extension needs at least 1 layer")]
    NoLayers,
}

/// Generated back-of-head vertices and triangles.
///
/// Vertex `k` of this extension has global index `base_index + k`; `indices`
/// are already global and may reference frontal contour vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadExtension {
    pub positions: Vec<Point3>,
    pub colors: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
    pub base_index: u32,
    /// Number of vertices per ring (the cleaned contour length).
    pub ring_size: usize,
    pub layer_count: usize,
}

impl HeadExtension {
    fn empty(base_index: u32) -> Self {
        Self {
            base_index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Global index of the apex, if any.
    #[must_use]
    pub fn apex_index(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(self.base_index + (self.positions.len() - 1) as u32)
        }
    }
}

/// Remove consecutive repeats, including the wrap-around pair that a
/// closed-loop marker (first == last) produces.
fn clean_contour(contour: &[u32]) -> Vec<u32> {
    let mut cleaned: Vec<u32> = Vec::with_capacity(contour.len());
    for &index in contour {
        if cleaned.last() != Some(&index) {
            cleaned.push(index);
        }
    }
    while cleaned.len() > 1 && cleaned.first() == cleaned.last() {
        cleaned.pop();
    }
    cleaned
}

/// Close an open frontal surface behind its contour.
///
/// `frontal` holds model-space positions of every frontal vertex; extension
/// indices start at `frontal.len()`. `contour` must run clockwise seen from
/// +Z (the frontal triangles walk each contour edge backwards).
///
/// A contour with fewer than 3 distinct points yields an empty extension.
pub fn extend_contour(
    frontal: &[Point3],
    contour: &[u32],
    color: [f64; 3],
    config: &ExtensionConfig,
) -> Result<HeadExtension, ExtensionError> {
    let vertex_count = frontal.len();
    let base = vertex_count as u32;

    for &index in contour {
        let Some(point) = frontal.get(index as usize) else {
            return Err(ExtensionError::ContourIndexOutOfRange {
                index,
                vertex_count,
            });
        };
        if !point.is_finite() {
            return Err(ExtensionError::NonFinitePoint { index });
        }
    }
    if config.layer_count == 0 {
        return Err(ExtensionError::NoLayers);
    }

    let ring = clean_contour(contour);
    let distinct = ring.iter().collect::<BTreeSet<_>>().len();
    if distinct < 3 {
        log::warn!("silhouette contour has {distinct} distinct points, skipping head extension");
        return Ok(HeadExtension::empty(base));
    }
    if ring.len() != contour.len() {
        log::debug!("contour cleaned from {} to {} points", contour.len(), ring.len());
    }

    let ring_points: Vec<Point3> = ring.iter().map(|&i| frontal[i as usize]).collect();
    let z_ref = ring_points.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);

    let layers = config.layer_count;
    let l = ring.len();
    let mut positions: Vec<Point3> = Vec::with_capacity(layers * l + 1);
    let mut last_lift = 0.0;
    let mut last_z = z_ref;
    for i in 0..layers {
        let t = (i + 1) as f64 / layers as f64;
        let f = config.falloff.apply(t);
        let scale = 1.0 - (1.0 - config.back_scale) * f;
        let lift = config.max_lift * f;
        let z = z_ref - config.max_depth * t;
        positions.extend(
            ring_points
                .iter()
                .map(|p| Point3::new(p.x * scale, p.y * scale + lift, z)),
        );
        last_lift = lift;
        last_z = z;
    }
    positions.push(Point3::new(0.0, last_lift, last_z - config.apex_offset));

    let ring_index = |layer: usize, j: usize| base + (layer * l + j % l) as u32;
    let mut indices: Vec<u32> = Vec::with_capacity((2 * layers * l + l) * 3);

    for j in 0..l {
        let c1 = ring[j];
        let c2 = ring[(j + 1) % l];
        let e1 = ring_index(0, j);
        let e2 = ring_index(0, j + 1);
        indices.extend_from_slice(&[c1, c2, e1]);
        indices.extend_from_slice(&[c2, e2, e1]);
    }

    for layer in 0..layers - 1 {
        for j in 0..l {
            let a1 = ring_index(layer, j);
            let a2 = ring_index(layer, j + 1);
            let b1 = ring_index(layer + 1, j);
            let b2 = ring_index(layer + 1, j + 1);
            indices.extend_from_slice(&[a1, a2, b1]);
            indices.extend_from_slice(&[a2, b2, b1]);
        }
    }

    let apex = base + (layers * l) as u32;
    for j in 0..l {
        indices.extend_from_slice(&[ring_index(layers - 1, j), ring_index(layers - 1, j + 1), apex]);
    }

    let colors = vec![color; positions.len()];
    log::debug!(
        "head extension: {} rings x {} points, {} triangles",
        layers,
        l,
        indices.len() / 3
    );

    Ok(HeadExtension {
        positions,
        colors,
        indices,
        base_index: base,
        ring_size: l,
        layer_count: layers,
    })
}

/// Normalize the contour landmarks through `frame` and close the head,
/// coloring every extension vertex with `skin`.
pub fn synthesize_extension(
    landmarks: &LandmarkSet,
    contour: &[u32],
    frame: &BoundingFrame,
    skin: &SkinToneSample,
    config: &ExtensionConfig,
) -> Result<HeadExtension, ExtensionError> {
    let frontal = frame.model_positions(landmarks);
    extend_contour(&frontal, contour, skin.to_array(), config)
}
