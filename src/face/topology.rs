//! Static triangulation of the 81 frontal landmarks.
//!
//! The table is a Delaunay triangulation of the reference layout. It forms a
//! disk: eyes and mouth are filled, and its only boundary is the silhouette
//! contour. Triangles wind counter-clockwise seen from +Z in model space, so
//! each contour segment `c1 -> c2` is walked `c2 -> c1` by its frontal
//! triangle.

use super::landmarks::LANDMARK_COUNT;

/// Number of frontal vertices, one per landmark.
pub const FRONTAL_VERTEX_COUNT: usize = LANDMARK_COUNT;

const CANONICAL_TRIANGLES: [[u32; 3]; 130] = [
    [0, 1, 36], [0, 36, 80], [1, 2, 41], [1, 41, 36], [2, 3, 31],
    [2, 31, 41], [3, 4, 48], [3, 48, 31], [4, 5, 48], [5, 6, 59],
    [5, 59, 48], [6, 7, 58], [6, 58, 59], [7, 8, 57], [7, 57, 58],
    [8, 9, 57], [9, 10, 56], [9, 56, 57], [10, 11, 55], [10, 55, 56],
    [11, 12, 54], [11, 54, 55], [12, 13, 54], [13, 14, 35], [13, 35, 54],
    [14, 15, 46], [14, 46, 35], [15, 16, 45], [15, 45, 46], [16, 68, 45],
    [17, 18, 78], [17, 36, 37], [17, 37, 18], [17, 78, 79], [17, 79, 80],
    [17, 80, 36], [18, 19, 77], [18, 37, 19], [18, 77, 78], [19, 20, 76],
    [19, 37, 38], [19, 38, 20], [19, 76, 77], [20, 21, 74], [20, 38, 21],
    [20, 74, 75], [20, 75, 76], [21, 22, 74], [21, 27, 22], [21, 38, 39],
    [21, 39, 27], [22, 23, 74], [22, 27, 42], [22, 42, 43], [22, 43, 23],
    [23, 24, 72], [23, 43, 24], [23, 72, 73], [23, 73, 74], [24, 25, 71],
    [24, 43, 44], [24, 44, 25], [24, 71, 72], [25, 26, 70], [25, 44, 26],
    [25, 70, 71], [26, 44, 45], [26, 45, 68], [26, 68, 69], [26, 69, 70],
    [27, 28, 42], [27, 39, 28], [28, 29, 47], [28, 39, 40], [28, 40, 29],
    [28, 47, 42], [29, 30, 35], [29, 31, 30], [29, 35, 47], [29, 40, 31],
    [30, 31, 32], [30, 32, 33], [30, 33, 34], [30, 34, 35], [31, 40, 41],
    [31, 48, 49], [31, 49, 50], [31, 50, 32], [32, 50, 33], [33, 50, 51],
    [33, 51, 52], [33, 52, 34], [34, 52, 35], [35, 46, 47], [35, 52, 53],
    [35, 53, 54], [36, 41, 37], [37, 40, 38], [37, 41, 40], [38, 40, 39],
    [42, 47, 43], [43, 47, 44], [44, 46, 45], [44, 47, 46], [48, 59, 60],
    [48, 60, 49], [49, 60, 61], [49, 61, 50], [50, 61, 51], [51, 61, 62],
    [51, 62, 63], [51, 63, 52], [52, 63, 53], [53, 63, 64], [53, 64, 54],
    [54, 64, 55], [55, 64, 65], [55, 65, 56], [56, 65, 66], [56, 66, 57],
    [57, 66, 58], [58, 66, 67], [58, 67, 59], [59, 67, 60], [60, 67, 61],
    [61, 67, 62], [62, 65, 63], [62, 66, 65], [62, 67, 66], [63, 65, 64],
];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TopologyError {
    #[error("index buffer length {0} is not a multiple of 3")]
    NotTriangleList(usize),
    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("triangle {triangle} repeats a vertex")]
    DegenerateTriangle { triangle: usize },
}

/// A validated triangle list over the frontal vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTopology {
    indices: Vec<u32>,
    vertex_count: usize,
}

impl CanonicalTopology {
    /// Validate a triangle list against `vertex_count` vertices.
    pub fn new(indices: Vec<u32>, vertex_count: usize) -> Result<Self, TopologyError> {
        if indices.len() % 3 != 0 {
            return Err(TopologyError::NotTriangleList(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(TopologyError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        if let Some(triangle) = indices
            .chunks_exact(3)
            .position(|t| t[0] == t[1] || t[1] == t[2] || t[0] == t[2])
        {
            return Err(TopologyError::DegenerateTriangle { triangle });
        }
        Ok(Self {
            indices,
            vertex_count,
        })
    }

    /// The built-in 130-triangle face topology.
    pub fn standard() -> Result<Self, TopologyError> {
        let indices = CANONICAL_TRIANGLES.as_flattened().to_vec();
        Self::new(indices, FRONTAL_VERTEX_COUNT)
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_validates() {
        let topology = CanonicalTopology::standard().unwrap();
        assert_eq!(topology.triangle_count(), 130);
        assert_eq!(topology.vertex_count(), FRONTAL_VERTEX_COUNT);
    }

    #[test]
    fn test_every_landmark_is_used() {
        let topology = CanonicalTopology::standard().unwrap();
        let mut used = [false; FRONTAL_VERTEX_COUNT];
        for &i in topology.indices() {
            used[i as usize] = true;
        }
        assert!(used.iter().all(|&u| u));
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert_eq!(
            CanonicalTopology::new(vec![0, 1], 3),
            Err(TopologyError::NotTriangleList(2))
        );
        assert_eq!(
            CanonicalTopology::new(vec![0, 1, 3], 3),
            Err(TopologyError::IndexOutOfRange { index: 3, vertex_count: 3 })
        );
        assert_eq!(
            CanonicalTopology::new(vec![0, 1, 2, 2, 1, 1], 3),
            Err(TopologyError::DegenerateTriangle { triangle: 1 })
        );
    }
}
