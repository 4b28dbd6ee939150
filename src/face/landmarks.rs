//! The fixed 81-point landmark layout.
//!
//! Indices 0-67 follow the 68-point iBUG layout, 68-80 extend it with a
//! hairline arc so the silhouette closes over the forehead:
//!
//! | range  | feature                                   |
//! |--------|-------------------------------------------|
//! | 0-16   | jaw, from the subject's right temple      |
//! | 17-21  | subject's right brow                      |
//! | 22-26  | subject's left brow                       |
//! | 27-30  | nose bridge, down to the tip              |
//! | 31-35  | nostrils                                  |
//! | 36-41  | subject's right eye                       |
//! | 42-47  | subject's left eye                        |
//! | 48-59  | outer lips                                |
//! | 60-67  | inner lips                                |
//! | 68-80  | hairline, from near 16 over to near 0     |
//!
//! Image coordinates: x grows to the right of the image, which is the
//! subject's left. y grows downward.

use std::f64::consts::PI;

use crate::geom::Point3;

/// Number of landmarks in every [`LandmarkSet`].
pub const LANDMARK_COUNT: usize = 81;

pub const JAW_RIGHT_TOP: usize = 0;
pub const CHIN: usize = 8;
pub const JAW_LEFT_TOP: usize = 16;
pub const BROW_RIGHT_INNER: usize = 21;
pub const BROW_LEFT_INNER: usize = 22;
pub const BROW_RIGHT: [usize; 5] = [17, 18, 19, 20, 21];
pub const BROW_LEFT: [usize; 5] = [22, 23, 24, 25, 26];
pub const NOSE_BRIDGE_TOP: usize = 27;
pub const NOSE_TIP: usize = 30;
pub const NOSE_BOTTOM: usize = 33;
/// Subject's right eye: outer corner, two upper lid points, inner corner,
/// two lower lid points.
pub const EYE_RIGHT: [usize; 6] = [36, 37, 38, 39, 40, 41];
/// Subject's left eye: inner corner, two upper lid points, outer corner,
/// two lower lid points.
pub const EYE_LEFT: [usize; 6] = [42, 43, 44, 45, 46, 47];
pub const MOUTH_CORNER_RIGHT: usize = 48;
pub const MOUTH_CORNER_LEFT: usize = 54;
pub const UPPER_LIP_TOP: usize = 51;
pub const LOWER_LIP_BOTTOM: usize = 57;
pub const INNER_LIP_TOP: usize = 62;
pub const INNER_LIP_BOTTOM: usize = 66;
pub const HAIRLINE_FIRST: usize = 68;
pub const HAIRLINE_LAST: usize = 80;

/// Face outline, clockwise seen from the front. Starts at the top of the
/// subject's right jaw, crosses the hairline to the left temple and returns
/// around the chin.
pub const SILHOUETTE_CONTOUR: [u32; 30] = [
    0, 80, 79, 78, 77, 76, 75, 74, 73, 72, 71, 70, 69, 68, 16, 15, 14, 13, 12, 11, 10, 9, 8, 7,
    6, 5, 4, 3, 2, 1,
];

// Brows, nose, eyes and lips of the mean shape, indices 17..=67.
const REFERENCE_INTERIOR: [[f64; 2]; 51] = [
    [0.20, 0.26],
    [0.25, 0.22],
    [0.32, 0.21],
    [0.38, 0.23],
    [0.43, 0.27],
    [0.57, 0.27],
    [0.62, 0.23],
    [0.68, 0.21],
    [0.75, 0.22],
    [0.80, 0.26],
    [0.50, 0.32],
    [0.50, 0.40],
    [0.50, 0.48],
    [0.50, 0.55],
    [0.40, 0.58],
    [0.45, 0.60],
    [0.50, 0.62],
    [0.55, 0.60],
    [0.60, 0.58],
    [0.24, 0.32],
    [0.28, 0.29],
    [0.34, 0.29],
    [0.38, 0.33],
    [0.34, 0.35],
    [0.28, 0.35],
    [0.62, 0.33],
    [0.66, 0.29],
    [0.72, 0.29],
    [0.76, 0.32],
    [0.72, 0.35],
    [0.66, 0.35],
    [0.32, 0.72],
    [0.38, 0.68],
    [0.44, 0.66],
    [0.50, 0.67],
    [0.56, 0.66],
    [0.62, 0.68],
    [0.68, 0.72],
    [0.62, 0.78],
    [0.56, 0.80],
    [0.50, 0.81],
    [0.44, 0.80],
    [0.38, 0.78],
    [0.36, 0.72],
    [0.44, 0.70],
    [0.50, 0.70],
    [0.56, 0.70],
    [0.64, 0.72],
    [0.56, 0.74],
    [0.50, 0.75],
    [0.44, 0.74],
];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LandmarkError {
    #[error("expected {expected} landmarks, got {actual}")]
    WrongCount { expected: usize, actual: usize },
    #[error("flat landmark buffer length {0} is not a multiple of 3")]
    RaggedBuffer(usize),
    #[error("landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// An immutable, validated set of [`LANDMARK_COUNT`] landmarks.
///
/// x and y are normalized image coordinates in `[0, 1]`; z is a depth in a
/// comparable unit where smaller values are closer to the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point3>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point3>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongCount {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            });
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(LandmarkError::NonFinite { index });
        }
        Ok(Self { points })
    }

    /// Build from `[x0, y0, z0, x1, ...]` as delivered by JS detectors.
    pub fn from_flat(values: &[f32]) -> Result<Self, LandmarkError> {
        if values.len() % 3 != 0 {
            return Err(LandmarkError::RaggedBuffer(values.len()));
        }
        let points = values
            .chunks_exact(3)
            .map(|c| Point3::new(f64::from(c[0]), f64::from(c[1]), f64::from(c[2])))
            .collect();
        Self::new(points)
    }

    /// The mean frontal face the canonical topology was laid out on.
    ///
    /// The jaw and hairline are elliptic arcs around `(0.5, 0.35)`; depth is
    /// a shallow bowl with the nose pushed toward the camera.
    #[must_use]
    pub fn reference() -> Self {
        let mut uv = Vec::with_capacity(LANDMARK_COUNT);
        for k in 0..=16 {
            let t = f64::from(k) * PI / 16.0;
            uv.push([0.5 - 0.4 * t.cos(), 0.35 + 0.54 * t.sin()]);
        }
        uv.extend_from_slice(&REFERENCE_INTERIOR);
        for k in 1..=13 {
            let t = f64::from(k) * PI / 14.0;
            uv.push([0.5 + 0.4 * t.cos(), 0.35 - 0.30 * t.sin()]);
        }

        let points = uv
            .iter()
            .enumerate()
            .map(|(index, &[x, y])| {
                let dx = (x - 0.5) / 0.4;
                let dy = (y - 0.47) / 0.45;
                let mut z = 0.06 * (dx * dx + dy * dy) - 0.06;
                if index == NOSE_TIP || index == NOSE_BOTTOM {
                    z -= 0.03;
                }
                Point3::new(x, y, z)
            })
            .collect();

        Self { points }
    }

    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Landmark at `index`.
    ///
    /// # Panics
    ///
    /// If `index >= LANDMARK_COUNT`.
    #[must_use]
    pub fn get(&self, index: usize) -> Point3 {
        self.points[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return a new set with every point mapped by `f`, re-validated.
    pub fn map(&self, f: impl FnMut(Point3) -> Point3) -> Result<Self, LandmarkError> {
        Self::new(self.points.iter().copied().map(f).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_layout() {
        let set = LandmarkSet::reference();
        assert_eq!(set.len(), LANDMARK_COUNT);
        assert!(set.points().iter().all(|p| p.is_finite()));
        assert!((set.get(JAW_RIGHT_TOP).x - 0.1).abs() < 1e-12);
        assert!((set.get(JAW_LEFT_TOP).x - 0.9).abs() < 1e-12);
        assert!((set.get(CHIN).y - 0.89).abs() < 1e-12);
        // the nose tip is the closest point to the camera
        let nose_z = set.get(NOSE_TIP).z;
        assert!(set.points().iter().all(|p| p.z >= nose_z));
        // subject's left is image right
        assert!(set.get(MOUTH_CORNER_LEFT).x > set.get(MOUTH_CORNER_RIGHT).x);
    }

    #[test]
    fn test_contour_covers_jaw_and_hairline_once() {
        let mut sorted = SILHOUETTE_CONTOUR.to_vec();
        sorted.sort_unstable();
        let expected: Vec<u32> = (0..=16).chain(68..=80).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_contour_is_clockwise_from_front() {
        // model orientation: y up, so flip image y before the shoelace sum
        let set = LandmarkSet::reference();
        let n = SILHOUETTE_CONTOUR.len();
        let mut doubled_area = 0.0;
        for i in 0..n {
            let a = set.get(SILHOUETTE_CONTOUR[i] as usize);
            let b = set.get(SILHOUETTE_CONTOUR[(i + 1) % n] as usize);
            doubled_area += a.x * (-b.y) - b.x * (-a.y);
        }
        assert!(doubled_area < 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            LandmarkSet::new(vec![Point3::ORIGIN; 68]),
            Err(LandmarkError::WrongCount { expected: 81, actual: 68 })
        );

        let mut points = LandmarkSet::reference().points().to_vec();
        points[12].y = f64::NAN;
        assert_eq!(LandmarkSet::new(points), Err(LandmarkError::NonFinite { index: 12 }));

        assert_eq!(
            LandmarkSet::from_flat(&[0.0; 10]),
            Err(LandmarkError::RaggedBuffer(10))
        );
    }

    #[test]
    fn test_from_flat_roundtrips_reference_shape() {
        let flat: Vec<f32> = LandmarkSet::reference()
            .points()
            .iter()
            .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let set = LandmarkSet::from_flat(&flat).unwrap();
        assert_eq!(set.len(), LANDMARK_COUNT);
    }
}
