//! Landmark layout, the normalization frame, the canonical frontal mesh and
//! the facial animation channels built on top of them.

pub mod blendshapes;
mod frame;
pub mod landmarks;
pub mod morph;
mod topology;

pub use blendshapes::{
    ArkitChannel, BlendshapeCoefficients, Calibration1D, HeuristicCalibration, UnknownChannel,
    estimate_from_landmarks, resolve_coefficients,
};
pub use frame::{BoundingFrame, CropRect};
pub use landmarks::{LANDMARK_COUNT, LandmarkError, LandmarkSet, SILHOUETTE_CONTOUR};
pub use morph::{
    ChannelRules, ChannelTarget, MORPH_RULES, MorphError, blend_targets, synthesize_morph_targets,
};
pub use topology::{CanonicalTopology, FRONTAL_VERTEX_COUNT, TopologyError};
