//! Rule-based morph targets for the 52 ARKit channels.
//!
//! Every channel is a list of displacements applied to selected frontal
//! vertices in model space. Displacements are expressed in model units (the
//! face spans roughly 1 x 1.2) and multiplied by [`MorphConfig::intensity`].

use crate::config::MorphConfig;
use crate::geom::{Point3, Vec3};

use super::blendshapes::{ArkitChannel, BlendshapeCoefficients};
use super::topology::FRONTAL_VERTEX_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Frontal vertices a rule moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSelector {
    Indices(&'static [u32]),
    /// Inclusive on both ends.
    Span { first: u32, last: u32 },
}

impl VertexSelector {
    pub fn iter(self) -> impl Iterator<Item = u32> {
        let (list, range): (&'static [u32], _) = match self {
            VertexSelector::Indices(list) => (list, 1..=0),
            VertexSelector::Span { first, last } => (&[], first..=last),
        };
        list.iter().copied().chain(range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphRule {
    pub selector: VertexSelector,
    pub axis: Axis,
    pub displacement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRules {
    pub channel: ArkitChannel,
    pub rules: &'static [MorphRule],
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MorphError {
    #[error("rule for {channel} selects vertex {index}, frontal range is {vertex_count}")]
    IndexOutOfRange {
        channel: ArkitChannel,
        index: u32,
        vertex_count: usize,
    },
    #[error("channel {0} appears more than once in the rule table")]
    DuplicateChannel(ArkitChannel),
    #[error("channel {0} has no entry in the rule table")]
    MissingChannel(ArkitChannel),
    #[error("base mesh has {actual} vertices, need at least {expected}")]
    BaseTooSmall { expected: usize, actual: usize },
}

const fn at(indices: &'static [u32], axis: Axis, displacement: f64) -> MorphRule {
    MorphRule {
        selector: VertexSelector::Indices(indices),
        axis,
        displacement,
    }
}

const fn span(first: u32, last: u32, axis: Axis, displacement: f64) -> MorphRule {
    MorphRule {
        selector: VertexSelector::Span { first, last },
        axis,
        displacement,
    }
}

const fn channel(channel: ArkitChannel, rules: &'static [MorphRule]) -> ChannelRules {
    ChannelRules { channel, rules }
}

use ArkitChannel as C;
use Axis::{X, Y, Z};

const LEFT_UPPER_LID: &[u32] = &[43, 44];
const RIGHT_UPPER_LID: &[u32] = &[37, 38];
const LEFT_LOWER_LID: &[u32] = &[46, 47];
const RIGHT_LOWER_LID: &[u32] = &[40, 41];
const LEFT_LIDS: &[u32] = &[43, 44, 46, 47];
const RIGHT_LIDS: &[u32] = &[37, 38, 40, 41];
const LOWER_INNER_LIP: &[u32] = &[65, 66, 67];
const UPPER_INNER_LIP: &[u32] = &[61, 62, 63];
const OUTER_LIPS: &[u32] = &[49, 50, 51, 52, 53, 55, 56, 57, 58, 59];

/// The standard rule table, one entry per channel in ARKit order.
pub static MORPH_RULES: [ChannelRules; ArkitChannel::COUNT] = [
    channel(C::BrowDownLeft, &[span(22, 26, Y, -0.03)]),
    channel(C::BrowDownRight, &[span(17, 21, Y, -0.03)]),
    channel(C::BrowInnerUp, &[span(20, 23, Y, 0.04)]),
    channel(C::BrowOuterUpLeft, &[span(24, 26, Y, 0.04)]),
    channel(C::BrowOuterUpRight, &[span(17, 19, Y, 0.04)]),
    channel(
        C::CheekPuff,
        &[span(2, 4, X, -0.04), span(12, 14, X, 0.04), span(2, 4, Z, 0.02), span(12, 14, Z, 0.02)],
    ),
    channel(C::CheekSquintLeft, &[span(45, 47, Y, 0.015), at(&[13, 14], Y, 0.01)]),
    channel(C::CheekSquintRight, &[at(&[36, 40, 41], Y, 0.015), at(&[2, 3], Y, 0.01)]),
    channel(C::EyeBlinkLeft, &[at(LEFT_UPPER_LID, Y, -0.035)]),
    channel(C::EyeBlinkRight, &[at(RIGHT_UPPER_LID, Y, -0.035)]),
    channel(C::EyeLookDownLeft, &[at(LEFT_UPPER_LID, Y, -0.01)]),
    channel(C::EyeLookDownRight, &[at(RIGHT_UPPER_LID, Y, -0.01)]),
    channel(C::EyeLookInLeft, &[at(LEFT_LIDS, X, -0.005)]),
    channel(C::EyeLookInRight, &[at(RIGHT_LIDS, X, 0.005)]),
    channel(C::EyeLookOutLeft, &[at(LEFT_LIDS, X, 0.005)]),
    channel(C::EyeLookOutRight, &[at(RIGHT_LIDS, X, -0.005)]),
    channel(C::EyeLookUpLeft, &[at(LEFT_UPPER_LID, Y, 0.01)]),
    channel(C::EyeLookUpRight, &[at(RIGHT_UPPER_LID, Y, 0.01)]),
    channel(C::EyeSquintLeft, &[at(LEFT_LOWER_LID, Y, 0.012), at(LEFT_UPPER_LID, Y, -0.008)]),
    channel(C::EyeSquintRight, &[at(RIGHT_LOWER_LID, Y, 0.012), at(RIGHT_UPPER_LID, Y, -0.008)]),
    channel(C::EyeWideLeft, &[at(LEFT_UPPER_LID, Y, 0.02)]),
    channel(C::EyeWideRight, &[at(RIGHT_UPPER_LID, Y, 0.02)]),
    channel(C::JawForward, &[span(5, 11, Z, 0.05), span(55, 59, Z, 0.03)]),
    channel(
        C::JawLeft,
        &[span(5, 11, X, 0.06), span(55, 59, X, 0.04), span(65, 67, X, 0.04)],
    ),
    channel(
        C::JawOpen,
        &[span(5, 11, Y, -0.12), span(55, 59, Y, -0.12), at(LOWER_INNER_LIP, Y, -0.12)],
    ),
    channel(
        C::JawRight,
        &[span(5, 11, X, -0.06), span(55, 59, X, -0.04), span(65, 67, X, -0.04)],
    ),
    channel(C::MouthClose, &[at(LOWER_INNER_LIP, Y, 0.03), at(UPPER_INNER_LIP, Y, -0.03)]),
    channel(C::MouthDimpleLeft, &[at(&[54], X, 0.01), at(&[54], Z, -0.01)]),
    channel(C::MouthDimpleRight, &[at(&[48], X, -0.01), at(&[48], Z, -0.01)]),
    channel(C::MouthFrownLeft, &[at(&[54, 64], Y, -0.03)]),
    channel(C::MouthFrownRight, &[at(&[48, 60], Y, -0.03)]),
    channel(C::MouthFunnel, &[at(OUTER_LIPS, Z, 0.03), at(&[48, 54], Z, 0.01)]),
    channel(C::MouthLeft, &[span(48, 67, X, 0.05)]),
    channel(C::MouthLowerDownLeft, &[at(&[55, 56, 65], Y, -0.025)]),
    channel(C::MouthLowerDownRight, &[at(&[58, 59, 67], Y, -0.025)]),
    channel(C::MouthPressLeft, &[at(&[52, 53], Y, -0.01), at(&[55, 56], Y, 0.01)]),
    channel(C::MouthPressRight, &[at(&[49, 50], Y, -0.01), at(&[58, 59], Y, 0.01)]),
    channel(
        C::MouthPucker,
        &[at(&[48, 60], X, 0.06), at(&[54, 64], X, -0.06), at(OUTER_LIPS, Z, 0.04)],
    ),
    channel(C::MouthRight, &[span(48, 67, X, -0.05)]),
    channel(C::MouthRollLower, &[span(56, 58, Y, 0.015), span(56, 58, Z, -0.02)]),
    channel(C::MouthRollUpper, &[span(50, 52, Y, -0.015), span(50, 52, Z, -0.02)]),
    channel(C::MouthShrugLower, &[span(56, 58, Y, 0.02), span(7, 9, Y, 0.01)]),
    channel(C::MouthShrugUpper, &[span(50, 52, Y, 0.015)]),
    channel(C::MouthSmileLeft, &[at(&[54, 64], X, 0.04), at(&[54, 64], Y, 0.04)]),
    channel(C::MouthSmileRight, &[at(&[48, 60], X, -0.04), at(&[48, 60], Y, 0.04)]),
    channel(C::MouthStretchLeft, &[at(&[54, 64], X, 0.05), at(&[54, 64], Y, -0.01)]),
    channel(C::MouthStretchRight, &[at(&[48, 60], X, -0.05), at(&[48, 60], Y, -0.01)]),
    channel(C::MouthUpperUpLeft, &[at(&[52, 53], Y, 0.025)]),
    channel(C::MouthUpperUpRight, &[at(&[49, 50], Y, 0.025)]),
    channel(C::NoseSneerLeft, &[at(&[34, 35], Y, 0.02)]),
    channel(C::NoseSneerRight, &[at(&[31, 32], Y, 0.02)]),
    channel(C::TongueOut, &[at(LOWER_INNER_LIP, Y, -0.02), at(LOWER_INNER_LIP, Z, 0.04)]),
];

/// Check that `table` covers every channel exactly once and only selects
/// frontal vertices.
pub fn validate_rules(table: &[ChannelRules]) -> Result<(), MorphError> {
    let mut seen = [false; ArkitChannel::COUNT];
    for entry in table {
        let slot = &mut seen[entry.channel.index()];
        if *slot {
            return Err(MorphError::DuplicateChannel(entry.channel));
        }
        *slot = true;

        for rule in entry.rules {
            if let Some(index) = rule
                .selector
                .iter()
                .find(|&i| i as usize >= FRONTAL_VERTEX_COUNT)
            {
                return Err(MorphError::IndexOutOfRange {
                    channel: entry.channel,
                    index,
                    vertex_count: FRONTAL_VERTEX_COUNT,
                });
            }
        }
    }
    match seen.iter().position(|&s| !s) {
        Some(missing) => Err(MorphError::MissingChannel(ArkitChannel::ALL[missing])),
        None => Ok(()),
    }
}

/// Absolute target positions for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTarget {
    pub channel: ArkitChannel,
    pub positions: Vec<Point3>,
}

/// Build one target per channel of `table`, in table order.
///
/// `base` holds the frontal vertices followed by any extension vertices;
/// the latter are copied unchanged into every target.
pub fn synthesize_morph_targets(
    base: &[Point3],
    table: &[ChannelRules],
    config: &MorphConfig,
) -> Result<Vec<ChannelTarget>, MorphError> {
    validate_rules(table)?;
    if base.len() < FRONTAL_VERTEX_COUNT {
        return Err(MorphError::BaseTooSmall {
            expected: FRONTAL_VERTEX_COUNT,
            actual: base.len(),
        });
    }

    let targets: Vec<ChannelTarget> = table
        .iter()
        .map(|entry| {
            let mut positions = base.to_vec();
            for rule in entry.rules {
                let offset = rule.axis.unit() * (rule.displacement * config.intensity);
                for index in rule.selector.iter() {
                    let p = &mut positions[index as usize];
                    *p = *p + offset;
                }
            }
            ChannelTarget {
                channel: entry.channel,
                positions,
            }
        })
        .collect();

    log::debug!(
        "morph: {} targets over {} vertices, intensity {}",
        targets.len(),
        base.len(),
        config.intensity
    );
    Ok(targets)
}

/// `base + (target - base) * weight`. A zero weight returns `base` exactly.
#[must_use]
pub fn blend(base: Point3, target: Point3, weight: f64) -> Point3 {
    base.lerp(target, weight)
}

/// Apply every target with its coefficient on top of `base`.
#[must_use]
pub fn blend_targets(
    base: &[Point3],
    targets: &[ChannelTarget],
    coefficients: &BlendshapeCoefficients,
) -> Vec<Point3> {
    let mut out = base.to_vec();
    for target in targets {
        let weight = f64::from(coefficients.get(target.channel));
        if weight == 0.0 {
            continue;
        }
        for ((o, &b), &t) in out.iter_mut().zip(base).zip(&target.positions) {
            *o = *o + t.sub_point(b) * weight;
        }
    }
    out
}
