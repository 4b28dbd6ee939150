//! ARKit blendshape channels and coefficient resolution.
//!
//! Detectors usually report only part of the 52 channels. Missing (or zero)
//! entries are backfilled from landmark geometry: each heuristic measures a
//! distance ratio in frame-normalized space and maps it to `[0, 1]` through a
//! linear [`Calibration1D`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::frame::BoundingFrame;
use super::landmarks::{
    BROW_LEFT, BROW_LEFT_INNER, BROW_RIGHT, BROW_RIGHT_INNER, CHIN, EYE_LEFT, EYE_RIGHT,
    INNER_LIP_BOTTOM, INNER_LIP_TOP, JAW_LEFT_TOP, JAW_RIGHT_TOP, LOWER_LIP_BOTTOM, LandmarkSet,
    MOUTH_CORNER_LEFT, MOUTH_CORNER_RIGHT, NOSE_BRIDGE_TOP, NOSE_TIP, UPPER_LIP_TOP,
};

macro_rules! arkit_channels {
    ($($variant:ident => $name:literal,)*) => {
        /// The 52 ARKit face-animation channels, in canonical order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ArkitChannel {
            $($variant,)*
        }

        impl ArkitChannel {
            pub const ALL: [Self; 52] = [$(Self::$variant,)*];

            /// The ARKit name, e.g. `"jawOpen"`.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

arkit_channels! {
    BrowDownLeft => "browDownLeft",
    BrowDownRight => "browDownRight",
    BrowInnerUp => "browInnerUp",
    BrowOuterUpLeft => "browOuterUpLeft",
    BrowOuterUpRight => "browOuterUpRight",
    CheekPuff => "cheekPuff",
    CheekSquintLeft => "cheekSquintLeft",
    CheekSquintRight => "cheekSquintRight",
    EyeBlinkLeft => "eyeBlinkLeft",
    EyeBlinkRight => "eyeBlinkRight",
    EyeLookDownLeft => "eyeLookDownLeft",
    EyeLookDownRight => "eyeLookDownRight",
    EyeLookInLeft => "eyeLookInLeft",
    EyeLookInRight => "eyeLookInRight",
    EyeLookOutLeft => "eyeLookOutLeft",
    EyeLookOutRight => "eyeLookOutRight",
    EyeLookUpLeft => "eyeLookUpLeft",
    EyeLookUpRight => "eyeLookUpRight",
    EyeSquintLeft => "eyeSquintLeft",
    EyeSquintRight => "eyeSquintRight",
    EyeWideLeft => "eyeWideLeft",
    EyeWideRight => "eyeWideRight",
    JawForward => "jawForward",
    JawLeft => "jawLeft",
    JawOpen => "jawOpen",
    JawRight => "jawRight",
    MouthClose => "mouthClose",
    MouthDimpleLeft => "mouthDimpleLeft",
    MouthDimpleRight => "mouthDimpleRight",
    MouthFrownLeft => "mouthFrownLeft",
    MouthFrownRight => "mouthFrownRight",
    MouthFunnel => "mouthFunnel",
    MouthLeft => "mouthLeft",
    MouthLowerDownLeft => "mouthLowerDownLeft",
    MouthLowerDownRight => "mouthLowerDownRight",
    MouthPressLeft => "mouthPressLeft",
    MouthPressRight => "mouthPressRight",
    MouthPucker => "mouthPucker",
    MouthRight => "mouthRight",
    MouthRollLower => "mouthRollLower",
    MouthRollUpper => "mouthRollUpper",
    MouthShrugLower => "mouthShrugLower",
    MouthShrugUpper => "mouthShrugUpper",
    MouthSmileLeft => "mouthSmileLeft",
    MouthSmileRight => "mouthSmileRight",
    MouthStretchLeft => "mouthStretchLeft",
    MouthStretchRight => "mouthStretchRight",
    MouthUpperUpLeft => "mouthUpperUpLeft",
    MouthUpperUpRight => "mouthUpperUpRight",
    NoseSneerLeft => "noseSneerLeft",
    NoseSneerRight => "noseSneerRight",
    TongueOut => "tongueOut",
}

impl ArkitChannel {
    pub const COUNT: usize = Self::ALL.len();

    /// Position in [`ArkitChannel::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ArkitChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ArkitChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown blendshape channel `{0}`")]
pub struct UnknownChannel(pub String);

impl FromStr for ArkitChannel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|channel| channel.name() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// One scalar in `[0, 1]` per ARKit channel. Every channel is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendshapeCoefficients {
    values: [f32; ArkitChannel::COUNT],
}

impl Default for BlendshapeCoefficients {
    fn default() -> Self {
        Self {
            values: [0.0; ArkitChannel::COUNT],
        }
    }
}

impl BlendshapeCoefficients {
    #[must_use]
    pub fn get(&self, channel: ArkitChannel) -> f32 {
        self.values[channel.index()]
    }

    /// Store `value` clamped to `[0, 1]`; non-finite values become 0.
    pub fn set(&mut self, channel: ArkitChannel, value: f32) {
        self.values[channel.index()] = sanitize(value);
    }

    /// Channels in canonical order with their values.
    pub fn iter(&self) -> impl Iterator<Item = (ArkitChannel, f32)> + '_ {
        ArkitChannel::ALL.iter().map(|&c| (c, self.values[c.index()]))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Parse detector scores. Unknown names are logged and ignored.
    #[must_use]
    pub fn from_detector(scores: &BTreeMap<String, f32>) -> Self {
        let mut coefficients = Self::default();
        for (name, &value) in scores {
            match name.parse::<ArkitChannel>() {
                Ok(channel) => coefficients.set(channel, value),
                Err(err) => log::debug!("{err}, ignored"),
            }
        }
        coefficients
    }
}

impl Serialize for BlendshapeCoefficients {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ArkitChannel::COUNT))?;
        for (channel, value) in self.iter() {
            map.serialize_entry(channel.name(), &value)?;
        }
        map.end()
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Linear map from an observed measurement to a feature value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration1D {
    pub offset: f64,
    pub scale: f64,
}

impl Calibration1D {
    #[must_use]
    pub const fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }

    /// `min` maps to 0 and `max` to 1. `max < min` gives a falling ramp.
    #[must_use]
    pub fn from_range(min: f64, max: f64) -> Self {
        Self {
            offset: min,
            scale: 1.0 / (max - min),
        }
    }

    #[must_use]
    pub fn calibrate(&self, value: f64) -> f64 {
        (value - self.offset) * self.scale
    }
}

/// Split a signed feature into its positive and negative halves.
fn positive_negative(v: f64) -> (f64, f64) {
    (v.clamp(0.0, 1.0), (-v).clamp(0.0, 1.0))
}

/// Calibrations for every landmark heuristic. Measurements are taken after
/// dividing x by the frame width and y by the frame height.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicCalibration {
    /// Inner lip gap.
    pub jaw_open: Calibration1D,
    /// Mouth corner distance from the mouth center.
    pub mouth_smile: Calibration1D,
    /// Mouth width over jaw width, falling.
    pub mouth_pucker: Calibration1D,
    /// Eye aspect ratio, falling.
    pub eye_blink: Calibration1D,
    /// Brow inner height above the nose bridge.
    pub brow_inner_up: Calibration1D,
    /// Outer brow height above the upper lid, signed around its rest value.
    pub brow_outer: Calibration1D,
    /// Chin offset from the nose axis, signed.
    pub jaw_left_right: Calibration1D,
}

impl Default for HeuristicCalibration {
    fn default() -> Self {
        Self {
            jaw_open: Calibration1D::from_range(0.07, 0.25),
            mouth_smile: Calibration1D::from_range(0.24, 0.36),
            mouth_pucker: Calibration1D::from_range(0.40, 0.28),
            eye_blink: Calibration1D::from_range(0.30, 0.10),
            brow_inner_up: Calibration1D::from_range(0.07, 0.12),
            brow_outer: Calibration1D::new(0.071, 1.0 / 0.03),
            jaw_left_right: Calibration1D::new(0.0, 1.0 / 0.05),
        }
    }
}

struct Normalized<'a> {
    landmarks: &'a LandmarkSet,
    frame: &'a BoundingFrame,
}

impl Normalized<'_> {
    fn at(&self, index: usize) -> (f64, f64) {
        self.frame.to_normalized(self.landmarks.get(index))
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        let (ax, ay) = self.at(a);
        let (bx, by) = self.at(b);
        (ax - bx).hypot(ay - by)
    }

    fn mean_y(&self, indices: &[usize]) -> f64 {
        indices.iter().map(|&i| self.at(i).1).sum::<f64>() / indices.len() as f64
    }

    fn mean_x(&self, indices: &[usize]) -> f64 {
        indices.iter().map(|&i| self.at(i).0).sum::<f64>() / indices.len() as f64
    }

    /// `(|upper1 - lower1| + |upper2 - lower2|) / (2 |corner1 - corner2|)`
    fn eye_aspect_ratio(&self, eye: [usize; 6]) -> f64 {
        let [c1, u1, u2, c2, l2, l1] = eye;
        let width = self.distance(c1, c2);
        if width <= f64::EPSILON {
            return 0.0;
        }
        (self.distance(u1, l1) + self.distance(u2, l2)) / (2.0 * width)
    }
}

/// Estimate the channels that landmark geometry can observe.
#[must_use]
pub fn estimate_from_landmarks(
    landmarks: &LandmarkSet,
    frame: &BoundingFrame,
    calibration: &HeuristicCalibration,
) -> Vec<(ArkitChannel, f64)> {
    let n = Normalized { landmarks, frame };
    let mut estimates = Vec::with_capacity(12);

    let lip_gap = (n.at(INNER_LIP_BOTTOM).1 - n.at(INNER_LIP_TOP).1).abs();
    estimates.push((ArkitChannel::JawOpen, calibration.jaw_open.calibrate(lip_gap)));

    let mouth_center_x = n.mean_x(&[UPPER_LIP_TOP, LOWER_LIP_BOTTOM]);
    let left_corner = n.at(MOUTH_CORNER_LEFT).0 - mouth_center_x;
    let right_corner = mouth_center_x - n.at(MOUTH_CORNER_RIGHT).0;
    estimates.push((ArkitChannel::MouthSmileLeft, calibration.mouth_smile.calibrate(left_corner)));
    estimates.push((ArkitChannel::MouthSmileRight, calibration.mouth_smile.calibrate(right_corner)));

    let jaw_width = n.distance(JAW_RIGHT_TOP, JAW_LEFT_TOP);
    if jaw_width > f64::EPSILON {
        let ratio = n.distance(MOUTH_CORNER_RIGHT, MOUTH_CORNER_LEFT) / jaw_width;
        estimates.push((ArkitChannel::MouthPucker, calibration.mouth_pucker.calibrate(ratio)));
    }

    estimates.push((
        ArkitChannel::EyeBlinkLeft,
        calibration.eye_blink.calibrate(n.eye_aspect_ratio(EYE_LEFT)),
    ));
    estimates.push((
        ArkitChannel::EyeBlinkRight,
        calibration.eye_blink.calibrate(n.eye_aspect_ratio(EYE_RIGHT)),
    ));

    let inner_brow = n.mean_y(&[BROW_RIGHT_INNER, BROW_LEFT_INNER]);
    let inner_height = n.at(NOSE_BRIDGE_TOP).1 - inner_brow;
    estimates.push((ArkitChannel::BrowInnerUp, calibration.brow_inner_up.calibrate(inner_height)));

    // outer brow points against the upper lid of the same eye
    let left_height = n.mean_y(&[EYE_LEFT[1], EYE_LEFT[2]]) - n.mean_y(&BROW_LEFT[2..]);
    let right_height = n.mean_y(&[EYE_RIGHT[1], EYE_RIGHT[2]]) - n.mean_y(&BROW_RIGHT[..3]);
    let (up, down) = positive_negative(calibration.brow_outer.calibrate(left_height));
    estimates.push((ArkitChannel::BrowOuterUpLeft, up));
    estimates.push((ArkitChannel::BrowDownLeft, down));
    let (up, down) = positive_negative(calibration.brow_outer.calibrate(right_height));
    estimates.push((ArkitChannel::BrowOuterUpRight, up));
    estimates.push((ArkitChannel::BrowDownRight, down));

    let nose_axis_x = n.mean_x(&[NOSE_BRIDGE_TOP, 28, 29, NOSE_TIP]);
    let chin_offset = n.at(CHIN).0 - nose_axis_x;
    let (left, right) = positive_negative(calibration.jaw_left_right.calibrate(chin_offset));
    estimates.push((ArkitChannel::JawLeft, left));
    estimates.push((ArkitChannel::JawRight, right));

    estimates
}

/// Merge detector scores with landmark estimates.
///
/// A detector value wins unless it is absent or exactly 0, in which case the
/// heuristic estimate (if the channel has one) is used. The result always
/// holds all 52 channels in `[0, 1]`.
#[must_use]
pub fn resolve_coefficients(
    detector: &BTreeMap<String, f32>,
    landmarks: &LandmarkSet,
    frame: &BoundingFrame,
    calibration: &HeuristicCalibration,
) -> BlendshapeCoefficients {
    let mut coefficients = BlendshapeCoefficients::from_detector(detector);
    let mut backfilled = 0usize;
    for (channel, estimate) in estimate_from_landmarks(landmarks, frame, calibration) {
        if coefficients.get(channel) == 0.0 {
            coefficients.set(channel, estimate as f32);
            backfilled += 1;
        }
    }
    log::debug!(
        "blendshapes: {} detector entries, {backfilled} channels backfilled",
        detector.len()
    );
    coefficients
}
