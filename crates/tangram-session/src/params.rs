use crate::validator::FeatureOffsets;
use serde::{Deserialize, Serialize};
use tangram_convert::ConverterParams;

/// When a Placed piece may be submitted for validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationGate {
    /// Submit as soon as the piece settles.
    #[default]
    Immediate,
    /// Wait while any member of the piece's group is still moving.
    GroupSettled,
}

/// Thresholds of the per-piece state machine.
///
/// Distances are in normalized units (one square side), durations in
/// seconds of frame clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleParams {
    /// Displacement from the reference pose that counts as a move.
    pub movement_threshold: f64,
    /// Displacement tolerated while a moved piece settles.
    pub jitter_threshold: f64,
    /// How long a moved piece must stay within jitter before it is Placed.
    pub settle_dwell_duration: f64,
    /// Rotation change (radians) that also counts as a move.
    pub movement_rotation_threshold: f64,
    /// Unseen for longer than this returns a piece to Unobserved.
    pub removal_grace: f64,
    pub gate: ValidationGate,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            movement_threshold: 0.15,
            jitter_threshold: 0.05,
            settle_dwell_duration: 0.5,
            movement_rotation_threshold: 15f64.to_radians(),
            removal_grace: 1.0,
            gate: ValidationGate::Immediate,
        }
    }
}

/// Construction-group clustering policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingParams {
    /// Two active pieces closer than this are candidates for one group.
    pub group_proximity_threshold: f64,
    /// How long a pair must stay close before it links their groups.
    pub group_stability_duration: f64,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            group_proximity_threshold: 1.6,
            group_stability_duration: 0.5,
        }
    }
}

/// Tolerances of the pose matcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Maximum Euclidean distance between normalized positions.
    pub position_tolerance: f64,
    /// Maximum symmetry-reduced feature-angle difference (radians).
    pub rotation_tolerance: f64,
    pub feature_offsets: FeatureOffsets,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            position_tolerance: 0.2,
            rotation_tolerance: 10f64.to_radians(),
            feature_offsets: FeatureOffsets::default(),
        }
    }
}

/// Every tunable of a [`PuzzleSession`](crate::PuzzleSession).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub converter: ConverterParams,
    pub lifecycle: LifecycleParams,
    pub grouping: GroupingParams,
    pub validation: ValidationParams,
}
