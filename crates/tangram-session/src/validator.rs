//! Pose matching against target slots.
//!
//! Rotations are compared through feature angles rather than raw rotation,
//! so the symmetry of each shape does not produce false mismatches:
//!
//! ```text
//! feature_target = target_rotation + target_offset(shape)
//! feature_piece  = piece_rotation  ± piece_offset(shape)    (minus when flipped)
//! delta          = reduce_by_symmetry(normalize(feature_target - feature_piece), period(shape))
//! ```
//!
//! Triangles use different offsets in target space (π/4) and piece space
//! (3π/4). Both live in [`FeatureOffsets`] so they can be recalibrated
//! against known-good placements.

use crate::params::ValidationParams;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::FRAC_PI_4;
use tangram_core::{
    normalize_angle, reduce_by_symmetry, InternalPiece, PiecePose, PieceType, ShapeClass,
    TargetPiece,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-shape feature-angle offsets in radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOffsets {
    pub triangle_target: f64,
    pub triangle_piece: f64,
    pub square: f64,
    pub parallelogram: f64,
}

impl Default for FeatureOffsets {
    fn default() -> Self {
        Self {
            triangle_target: FRAC_PI_4,
            triangle_piece: 3.0 * FRAC_PI_4,
            square: 0.0,
            parallelogram: 0.0,
        }
    }
}

impl FeatureOffsets {
    pub fn target_offset(&self, shape: ShapeClass) -> f64 {
        match shape {
            ShapeClass::Square => self.square,
            ShapeClass::Parallelogram => self.parallelogram,
            _ => self.triangle_target,
        }
    }

    pub fn piece_offset(&self, shape: ShapeClass) -> f64 {
        match shape {
            ShapeClass::Square => self.square,
            ShapeClass::Parallelogram => self.parallelogram,
            _ => self.triangle_piece,
        }
    }

    #[inline]
    pub fn target_feature(&self, target: &TargetPiece) -> f64 {
        target.pose.rotation + self.target_offset(target.shape())
    }

    #[inline]
    pub fn piece_feature(&self, shape: ShapeClass, pose: &PiecePose) -> f64 {
        pose.rotation + self.signed_piece_offset(shape, pose.flipped)
    }

    /// Pose of a `shape` piece sitting exactly on `target`.
    pub fn matching_pose(&self, shape: ShapeClass, target: &TargetPiece) -> PiecePose {
        let flipped = target.pose.flipped;
        PiecePose {
            position: target.pose.position,
            rotation: normalize_angle(
                self.target_feature(target) - self.signed_piece_offset(shape, flipped),
            ),
            flipped,
        }
    }

    fn signed_piece_offset(&self, shape: ShapeClass, flipped: bool) -> f64 {
        let offset = self.piece_offset(shape);
        if flipped {
            -offset
        } else {
            offset
        }
    }
}

/// Why a piece did not validate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchReason {
    ShapeMismatch,
    FlipMismatch,
    PositionOutOfTolerance { distance: f64 },
    RotationOutOfTolerance { delta: f64 },
    NoMatchingTarget,
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchReason::ShapeMismatch => f.write_str("shape mismatch"),
            MismatchReason::FlipMismatch => f.write_str("flip mismatch"),
            MismatchReason::PositionOutOfTolerance { distance } => {
                write!(f, "position off by {distance:.3}")
            }
            MismatchReason::RotationOutOfTolerance { delta } => {
                write!(f, "rotation off by {:.1}°", delta.to_degrees())
            }
            MismatchReason::NoMatchingTarget => f.write_str("no matching target"),
        }
    }
}

/// A piece submitted for validation, possibly with a group-relative pose.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationRequest {
    pub piece_id: String,
    pub piece_type: PieceType,
    pub pose: PiecePose,
    pub assigned_target: Option<String>,
}

impl ValidationRequest {
    pub fn new(piece: &InternalPiece, assigned_target: Option<String>) -> Self {
        Self {
            piece_id: piece.id.clone(),
            piece_type: piece.piece_type,
            pose: piece.pose(),
            assigned_target,
        }
    }

    pub fn with_pose(mut self, pose: PiecePose) -> Self {
        self.pose = pose;
        self
    }
}

/// Outcome for one submitted piece.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub piece_id: String,
    /// Bound target on success.
    pub target_id: Option<String>,
    pub valid: bool,
    pub reason: Option<MismatchReason>,
}

impl ValidationResult {
    fn matched(piece_id: &str, target_id: &str) -> Self {
        Self {
            piece_id: piece_id.to_string(),
            target_id: Some(target_id.to_string()),
            valid: true,
            reason: None,
        }
    }

    fn failed(piece_id: &str, reason: MismatchReason) -> Self {
        Self {
            piece_id: piece_id.to_string(),
            target_id: None,
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Tolerance matcher with one-to-one instance binding.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    params: ValidationParams,
}

impl Validator {
    pub fn new(params: ValidationParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &ValidationParams {
        &self.params
    }

    /// Symmetry-reduced feature-angle difference between a pose and a target.
    pub fn rotation_delta(
        &self,
        shape: ShapeClass,
        pose: &PiecePose,
        target: &TargetPiece,
    ) -> f64 {
        let offsets = &self.params.feature_offsets;
        let diff =
            normalize_angle(offsets.target_feature(target) - offsets.piece_feature(shape, pose));
        reduce_by_symmetry(diff, shape.symmetry_period())
    }

    /// Check one pose against one target, reporting the first failed criterion.
    pub fn check(
        &self,
        piece_type: PieceType,
        pose: &PiecePose,
        target: &TargetPiece,
    ) -> Result<(), MismatchReason> {
        let shape = piece_type.shape();
        if shape != target.shape() {
            return Err(MismatchReason::ShapeMismatch);
        }
        if shape == ShapeClass::Parallelogram && pose.flipped != target.pose.flipped {
            return Err(MismatchReason::FlipMismatch);
        }
        let distance = pose.distance_to(&target.pose);
        if distance.is_nan() || distance > self.params.position_tolerance {
            return Err(MismatchReason::PositionOutOfTolerance { distance });
        }
        let delta = self.rotation_delta(shape, pose, target);
        if delta.is_nan() || delta.abs() > self.params.rotation_tolerance {
            return Err(MismatchReason::RotationOutOfTolerance { delta });
        }
        Ok(())
    }

    /// Does `piece` sit on `target` within tolerance?
    pub fn validate(&self, piece: &InternalPiece, target: &TargetPiece) -> bool {
        self.check(piece.piece_type, &piece.pose(), target).is_ok()
    }

    /// Validate a batch against all targets with one-to-one binding.
    pub fn validate_set(
        &self,
        requests: &[ValidationRequest],
        targets: &[TargetPiece],
    ) -> Vec<ValidationResult> {
        self.validate_against_pool(requests, targets, &HashSet::new())
    }

    /// Like [`Self::validate_set`], with some targets already reserved.
    ///
    /// Pieces with an assigned target go first and try it before searching
    /// the pool. Every target is matched by at most one request. Results come
    /// back in request order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, requests, targets, reserved), fields(requests = requests.len()))
    )]
    pub fn validate_against_pool(
        &self,
        requests: &[ValidationRequest],
        targets: &[TargetPiece],
        reserved: &HashSet<String>,
    ) -> Vec<ValidationResult> {
        let mut consumed: Vec<bool> = targets.iter().map(|t| reserved.contains(&t.id)).collect();
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|&i| requests[i].assigned_target.is_none());

        let mut results: Vec<Option<ValidationResult>> = vec![None; requests.len()];
        for i in order {
            let req = &requests[i];
            let mut own_failure = None;

            if let Some(assigned) = &req.assigned_target {
                if let Some(t) =
                    (0..targets.len()).find(|&t| !consumed[t] && targets[t].id == *assigned)
                {
                    match self.check(req.piece_type, &req.pose, &targets[t]) {
                        Ok(()) => {
                            consumed[t] = true;
                            results[i] = Some(ValidationResult::matched(&req.piece_id, assigned));
                            continue;
                        }
                        Err(reason) => own_failure = Some(reason),
                    }
                }
            }

            let result = match self.search_pool(req, targets, &consumed) {
                Ok(t) => {
                    consumed[t] = true;
                    if req.assigned_target.is_some() {
                        debug!("{} rebinds to {}", req.piece_id, targets[t].id);
                    }
                    ValidationResult::matched(&req.piece_id, &targets[t].id)
                }
                Err(nearest_reason) => {
                    ValidationResult::failed(&req.piece_id, own_failure.unwrap_or(nearest_reason))
                }
            };
            results[i] = Some(result);
        }
        results.into_iter().flatten().collect()
    }

    /// Nearest in-tolerance target of the same shape, or the reason reported
    /// by the nearest same-shape target left in the pool.
    fn search_pool(
        &self,
        req: &ValidationRequest,
        targets: &[TargetPiece],
        consumed: &[bool],
    ) -> Result<usize, MismatchReason> {
        let shape = req.piece_type.shape();
        let mut best: Option<(usize, f64)> = None;
        let mut nearest_failure: Option<(f64, MismatchReason)> = None;

        for (t, target) in targets.iter().enumerate() {
            if consumed[t] || target.shape() != shape {
                continue;
            }
            let distance = req.pose.distance_to(&target.pose);
            match self.check(req.piece_type, &req.pose, target) {
                Ok(()) => {
                    if best.is_none_or(|(_, d)| distance < d) {
                        best = Some((t, distance));
                    }
                }
                Err(reason) => {
                    if nearest_failure.as_ref().is_none_or(|(d, _)| distance < *d) {
                        nearest_failure = Some((distance, reason));
                    }
                }
            }
        }

        match best {
            Some((t, _)) => Ok(t),
            None => Err(nearest_failure
                .map(|(_, r)| r)
                .unwrap_or(MismatchReason::NoMatchingTarget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn target(id: &str, piece_type: PieceType, x: f64, y: f64, rot: f64) -> TargetPiece {
        TargetPiece::new(id, piece_type, PiecePose::new(x, y, rot))
    }

    fn request(id: &str, piece_type: PieceType, pose: PiecePose) -> ValidationRequest {
        ValidationRequest {
            piece_id: id.into(),
            piece_type,
            pose,
            assigned_target: None,
        }
    }

    #[test]
    fn triangle_offsets_are_asymmetric() {
        let v = Validator::default();
        let t = target("t", PieceType::LargeTriangle1, 0.0, 0.0, 0.3);
        // feature_target - feature_piece = 0.3 + π/4 - r - 3π/4
        let on = PiecePose::new(0.0, 0.0, 0.3 - FRAC_PI_2);
        assert_relative_eq!(v.rotation_delta(ShapeClass::LargeTriangle, &on, &t), 0.0, epsilon = 1e-12);
        assert!(v.check(PieceType::LargeTriangle2, &on, &t).is_ok());

        // a half turn is the same triangle feature
        let half = PiecePose::new(0.0, 0.0, normalize_angle(0.3 + FRAC_PI_2));
        assert!(v.check(PieceType::LargeTriangle1, &half, &t).is_ok());

        let raw = PiecePose::new(0.0, 0.0, 0.3);
        assert!(matches!(
            v.check(PieceType::LargeTriangle1, &raw, &t),
            Err(MismatchReason::RotationOutOfTolerance { .. })
        ));
    }

    #[test]
    fn square_symmetry_absorbs_quarter_turns() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 1.0, 1.0, 0.0);
        for k in [-1.0, 1.0, 2.0] {
            let pose = PiecePose::new(1.05, 0.95, normalize_angle(k * FRAC_PI_2 + 0.05));
            assert!(v.check(PieceType::Square, &pose, &t).is_ok());
        }
    }

    #[test]
    fn parallelogram_requires_matching_flip() {
        let v = Validator::default();
        let t = TargetPiece::new(
            "p",
            PieceType::Parallelogram,
            PiecePose::new(2.0, 0.0, PI).with_flip(true),
        );
        let pose = v.params().feature_offsets.matching_pose(ShapeClass::Parallelogram, &t);
        assert!(v.check(PieceType::Parallelogram, &pose, &t).is_ok());
        assert_eq!(
            v.check(PieceType::Parallelogram, &pose.with_flip(false), &t),
            Err(MismatchReason::FlipMismatch)
        );
        // no symmetry reduction: a half turn is a different placement
        let turned = PiecePose::new(2.0, 0.0, 0.0).with_flip(true);
        assert!(matches!(
            v.check(PieceType::Parallelogram, &turned, &t),
            Err(MismatchReason::RotationOutOfTolerance { .. })
        ));
    }

    #[test]
    fn flip_is_ignored_for_other_shapes() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 0.0, 0.0, 0.0);
        let pose = PiecePose::new(0.0, 0.0, 0.0).with_flip(true);
        assert!(v.check(PieceType::Square, &pose, &t).is_ok());
    }

    #[test]
    fn position_and_shape_failures() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 0.0, 0.0, 0.0);
        assert_eq!(
            v.check(PieceType::MediumTriangle, &PiecePose::new(0.0, 0.0, 0.0), &t),
            Err(MismatchReason::ShapeMismatch)
        );
        match v.check(PieceType::Square, &PiecePose::new(0.3, 0.4, 0.0), &t) {
            Err(MismatchReason::PositionOutOfTolerance { distance }) => {
                assert_relative_eq!(distance, 0.5, epsilon = 1e-12)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_finite_poses_never_match() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 0.0, 0.0, 0.0);
        assert!(matches!(
            v.check(PieceType::Square, &PiecePose::new(f64::NAN, f64::NAN, 0.0), &t),
            Err(MismatchReason::PositionOutOfTolerance { .. })
        ));
        assert!(matches!(
            v.check(PieceType::Square, &PiecePose::new(0.0, 0.0, f64::NAN), &t),
            Err(MismatchReason::RotationOutOfTolerance { .. })
        ));
    }

    #[test]
    fn bound_target_is_not_taken_by_a_closer_duplicate() {
        let v = Validator::new(ValidationParams {
            position_tolerance: 0.5,
            ..ValidationParams::default()
        });
        let offsets = FeatureOffsets::default();
        let t1 = target("t1", PieceType::SmallTriangle1, 0.0, 0.0, 0.0);
        let t2 = target("t2", PieceType::SmallTriangle2, 0.4, 0.0, 0.0);
        let on_t1 = offsets.matching_pose(ShapeClass::SmallTriangle, &t1);

        let mut p1 = request("p1", PieceType::SmallTriangle1, on_t1);
        p1.pose.position.x = 0.2;
        p1.assigned_target = Some("t1".into());
        // p2 sits right on t1, listed first
        let p2 = request("p2", PieceType::SmallTriangle2, on_t1);

        let results = v.validate_set(&[p2, p1], &[t1, t2]);
        assert_eq!(results[0].piece_id, "p2");
        assert_eq!(results[0].target_id.as_deref(), Some("t2"));
        assert_eq!(results[1].piece_id, "p1");
        assert_eq!(results[1].target_id.as_deref(), Some("t1"));
    }

    #[test]
    fn each_target_matches_at_most_once() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 0.0, 0.0, 0.0);
        let pose = PiecePose::new(0.0, 0.0, 0.0);
        let results = v.validate_set(
            &[
                request("a", PieceType::Square, pose),
                request("b", PieceType::Square, pose),
            ],
            &[t],
        );
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert_eq!(results[1].reason, Some(MismatchReason::NoMatchingTarget));
    }

    #[test]
    fn failure_reports_the_nearest_target() {
        let v = Validator::default();
        let near = target("near", PieceType::Square, 1.0, 0.0, 0.0);
        let far = target("far", PieceType::Square, 5.0, 0.0, 0.0);
        let results = v.validate_set(
            &[request("a", PieceType::Square, PiecePose::new(1.0, 0.0, 0.5))],
            &[far, near],
        );
        assert!(matches!(
            results[0].reason,
            Some(MismatchReason::RotationOutOfTolerance { .. })
        ));
    }

    #[test]
    fn nearest_in_tolerance_target_wins() {
        let v = Validator::new(ValidationParams {
            position_tolerance: 1.0,
            ..ValidationParams::default()
        });
        let a = target("a", PieceType::Square, 0.0, 0.0, 0.0);
        let b = target("b", PieceType::Square, 0.5, 0.0, 0.0);
        let results = v.validate_set(
            &[request("p", PieceType::Square, PiecePose::new(0.4, 0.0, 0.0))],
            &[a, b],
        );
        assert_eq!(results[0].target_id.as_deref(), Some("b"));
    }

    #[test]
    fn assigned_piece_rebinds_when_its_target_fails() {
        let v = Validator::default();
        let a = target("a", PieceType::Square, 0.0, 0.0, 0.0);
        let b = target("b", PieceType::Square, 3.0, 0.0, 0.0);
        let mut req = request("p", PieceType::Square, PiecePose::new(3.0, 0.0, 0.0));
        req.assigned_target = Some("a".into());
        let results = v.validate_set(&[req], &[a, b]);
        assert_eq!(results[0].target_id.as_deref(), Some("b"));
    }

    #[test]
    fn reserved_targets_are_skipped() {
        let v = Validator::default();
        let t = target("sq", PieceType::Square, 0.0, 0.0, 0.0);
        let reserved = HashSet::from(["sq".to_string()]);
        let results = v.validate_against_pool(
            &[request("p", PieceType::Square, PiecePose::new(0.0, 0.0, 0.0))],
            &[t],
            &reserved,
        );
        assert_eq!(results[0].reason, Some(MismatchReason::NoMatchingTarget));
    }
}
