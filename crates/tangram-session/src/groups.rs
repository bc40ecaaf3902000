//! Construction groups, anchors and group-relative validation poses.
//!
//! Active pieces that stay close to each other long enough are linked; a
//! group is the transitive closure of those links. Every group has exactly
//! one anchor, and the group's pieces are validated in a frame that lands
//! the anchor on a target, so a correct construction validates anywhere in
//! the workspace.

use crate::lifecycle::{LifecycleTracker, PieceRecord, PieceStatus};
use crate::params::GroupingParams;
use crate::validator::{ValidationRequest, Validator};
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use tangram_core::{normalize_angle, reduce_by_symmetry, rotate_vector, PiecePose, TargetPiece};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One construction group as of the current frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionGroup {
    pub anchor: String,
    /// Member ids, sorted; includes the anchor.
    pub members: Vec<String>,
}

impl ConstructionGroup {
    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Tracks pair proximity over time and maintains groups and anchors.
#[derive(Clone, Debug, Default)]
pub struct GroupManager {
    params: GroupingParams,
    /// `(lower id, higher id)` -> time the pair first came close.
    close_since: HashMap<(String, String), f64>,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}

impl GroupManager {
    pub fn new(params: GroupingParams) -> Self {
        Self {
            params,
            close_since: HashMap::new(),
        }
    }

    #[inline]
    pub fn params(&self) -> &GroupingParams {
        &self.params
    }

    /// Recompute groups from the active pieces and update anchor flags.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, tracker)))]
    pub fn update(&mut self, tracker: &mut LifecycleTracker, now: f64) -> Vec<ConstructionGroup> {
        let recent: Vec<String> = tracker.recently_moved().map(str::to_owned).collect();
        let records = tracker.records_mut();

        for record in records.values_mut().filter(|r| !r.status().is_active()) {
            record.is_anchor = false;
            record.remembered_anchor = None;
        }
        let ids: Vec<String> = records
            .values()
            .filter(|r| r.status().is_active())
            .map(|r| r.id.clone())
            .collect();
        if ids.is_empty() {
            self.close_since.clear();
            return Vec::new();
        }

        let coords: Vec<[f64; 2]> = ids
            .iter()
            .filter_map(|id| records.get(id))
            .map(|r| [r.pose.position.x, r.pose.position.y])
            .collect();
        let tree: KdTree<f64, 2> = (&coords).into();
        let radius = self.params.group_proximity_threshold;

        let mut links = DisjointSet::new(ids.len());
        let mut close_since = HashMap::new();
        for (i, query) in coords.iter().enumerate() {
            for nn in tree.within_unsorted::<SquaredEuclidean>(query, radius * radius) {
                let j = nn.item as usize;
                if j <= i {
                    continue;
                }
                let key = (ids[i].clone(), ids[j].clone());
                let since = self.close_since.get(&key).copied().unwrap_or(now);
                if now - since >= self.params.group_stability_duration {
                    links.union(i, j);
                }
                close_since.insert(key, since);
            }
        }
        self.close_since = close_since;

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<usize>> = Vec::new();
        for i in 0..ids.len() {
            let root = links.find(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(i);
        }

        let mut groups = Vec::with_capacity(components.len());
        for members in components {
            let member_ids: Vec<String> = members.iter().map(|&i| ids[i].clone()).collect();
            let member_recs: Vec<&PieceRecord> =
                member_ids.iter().filter_map(|id| records.get(id)).collect();
            let anchor = choose_anchor(&member_recs, &member_ids, &recent);

            for id in &member_ids {
                if let Some(record) = records.get_mut(id) {
                    let is_anchor = *id == anchor;
                    if is_anchor && !record.is_anchor && member_ids.len() > 1 {
                        debug!("{anchor} anchors a group of {}", member_ids.len());
                    }
                    record.is_anchor = is_anchor;
                    record.remembered_anchor = Some(anchor.clone());
                }
            }
            groups.push(ConstructionGroup {
                anchor,
                members: member_ids,
            });
        }
        groups
    }
}

fn earliest_moved<'a>(records: impl Iterator<Item = &'a PieceRecord>) -> Option<&'a PieceRecord> {
    records.min_by(|a, b| {
        let ka = a.first_move_seq.unwrap_or(u64::MAX);
        let kb = b.first_move_seq.unwrap_or(u64::MAX);
        ka.cmp(&kb).then_with(|| a.id.cmp(&b.id))
    })
}

fn choose_anchor(members: &[&PieceRecord], member_ids: &[String], recent: &[String]) -> String {
    let fallback = || member_ids.first().cloned().unwrap_or_default();
    let current: Vec<&PieceRecord> = members.iter().copied().filter(|r| r.is_anchor).collect();
    match current.len() {
        1 => current[0].id.clone(),
        0 => {
            let lost_anchor = members.iter().any(|r| {
                r.remembered_anchor
                    .as_ref()
                    .is_some_and(|a| !member_ids.contains(a))
            });
            let promoted = lost_anchor
                .then(|| recent.iter().find(|id| member_ids.contains(id)).cloned())
                .flatten();
            promoted
                .or_else(|| earliest_moved(members.iter().copied()).map(|r| r.id.clone()))
                .unwrap_or_else(fallback)
        }
        // merged groups keep the oldest anchor
        _ => earliest_moved(current.into_iter())
            .map(|r| r.id.clone())
            .unwrap_or_else(fallback),
    }
}

/// Rigid transform taking a group's pieces into target coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupFrame {
    /// Target the anchor lands on.
    pub target_id: String,
    pub rotation: f64,
    pub translation: Vector2<f64>,
    /// Non-anchor members that validate under this frame.
    pub confirmations: usize,
}

impl GroupFrame {
    pub fn apply(&self, pose: &PiecePose) -> PiecePose {
        let p = rotate_vector(pose.position.coords, self.rotation) + self.translation;
        PiecePose {
            position: Point2::from(p),
            rotation: normalize_angle(pose.rotation + self.rotation),
            flipped: pose.flipped,
        }
    }

    /// Best frame for a group, or `None` when no member confirms any
    /// candidate and the group should be validated in absolute coordinates.
    ///
    /// Candidates are the anchor's bound target, else every target of the
    /// anchor's shape, combined with each symmetric variant of the rotation.
    /// A member confirms a candidate when it binds one of the remaining
    /// targets under that frame.
    pub fn solve(
        anchor: &PieceRecord,
        members: &[&PieceRecord],
        targets: &[TargetPiece],
        validator: &Validator,
    ) -> Option<Self> {
        let shape = anchor.piece_type.shape();
        let offsets = &validator.params().feature_offsets;
        let bound = anchor
            .assigned_target
            .as_ref()
            .and_then(|id| targets.iter().find(|t| t.id == *id && t.shape() == shape));
        let candidates: Vec<&TargetPiece> = match bound {
            Some(t) => vec![t],
            None => targets.iter().filter(|t| t.shape() == shape).collect(),
        };

        let period = shape.symmetry_period();
        let variants = (TAU / period).round() as usize;
        let anchor_feature = offsets.piece_feature(shape, &anchor.pose);
        let others: Vec<&&PieceRecord> = members.iter().filter(|m| m.id != anchor.id).collect();

        let mut best: Option<GroupFrame> = None;
        for target in candidates {
            let base = reduce_by_symmetry(offsets.target_feature(target) - anchor_feature, period);
            for k in 0..variants.max(1) {
                let rotation = normalize_angle(base + k as f64 * period);
                let translation = target.pose.position.coords
                    - rotate_vector(anchor.pose.position.coords, rotation);
                let mut frame = GroupFrame {
                    target_id: target.id.clone(),
                    rotation,
                    translation,
                    confirmations: 0,
                };
                let requests: Vec<ValidationRequest> = others
                    .iter()
                    .map(|m| ValidationRequest {
                        piece_id: m.id.clone(),
                        piece_type: m.piece_type,
                        pose: frame.apply(&m.pose),
                        assigned_target: m.assigned_target.clone(),
                    })
                    .collect();
                // the anchor holds the candidate target
                let held = HashSet::from([target.id.clone()]);
                frame.confirmations = validator
                    .validate_against_pool(&requests, targets, &held)
                    .iter()
                    .filter(|r| r.valid)
                    .count();
                if best
                    .as_ref()
                    .is_none_or(|b| frame.confirmations > b.confirmations)
                {
                    best = Some(frame);
                }
            }
        }
        best.filter(|f| f.confirmations > 0)
    }
}

/// Ids of every target currently held by a Validated piece.
pub(crate) fn reserved_targets<'a>(
    records: impl Iterator<Item = &'a PieceRecord>,
) -> HashSet<String> {
    records
        .filter(|r| r.status() == PieceStatus::Validated)
        .filter_map(|r| r.assigned_target.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LifecycleParams;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use tangram_core::{InternalPiece, PieceType};

    fn square(id: &str, x: f64, y: f64) -> InternalPiece {
        InternalPiece {
            id: id.into(),
            piece_type: PieceType::Square,
            position: Point2::new(x, y),
            rotation: 0.0,
            flipped: false,
        }
    }

    fn moved_tracker(pieces: &[InternalPiece]) -> LifecycleTracker {
        let mut tracker = LifecycleTracker::new(LifecycleParams::default());
        let start: Vec<_> = pieces
            .iter()
            .map(|p| square(&p.id, p.position.x - 10.0, p.position.y))
            .collect();
        tracker.observe(&start, 0.0);
        // one piece at a time so the move order is well defined
        let mut current = start.clone();
        for (i, p) in pieces.iter().enumerate() {
            current[i] = p.clone();
            tracker.observe(&current, 0.1 * (i + 1) as f64);
        }
        tracker
    }

    #[test]
    fn far_apart_pieces_stay_singletons() {
        let pieces = [square("a", 0.0, 0.0), square("b", 5.0, 0.0)];
        let mut tracker = moved_tracker(&pieces);
        let mut groups = GroupManager::new(GroupingParams::default());
        let out = groups.update(&mut tracker, 1.0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|g| g.len() == 1));
        assert!(tracker.records().all(|r| r.is_anchor));
    }

    #[test]
    fn close_pairs_link_after_stability_duration() {
        let pieces = [square("a", 0.0, 0.0), square("b", 1.0, 0.0), square("c", 2.0, 0.0)];
        let mut tracker = moved_tracker(&pieces);
        let mut groups = GroupManager::new(GroupingParams {
            group_proximity_threshold: 1.2,
            group_stability_duration: 0.5,
        });
        assert_eq!(groups.update(&mut tracker, 1.0).len(), 3);
        assert_eq!(groups.update(&mut tracker, 1.3).len(), 3);

        let out = groups.update(&mut tracker, 1.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].members, ["a", "b", "c"]);
        // a moved first
        assert_eq!(out[0].anchor, "a");
        let anchors: Vec<_> = tracker
            .records()
            .filter(|r| r.is_anchor)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(anchors, ["a"]);
    }

    #[test]
    fn group_frame_lands_anchor_on_target() {
        let pieces = [square("a", 10.0, 10.0), square("b", 11.0, 10.0)];
        let tracker = moved_tracker(&pieces);
        let a = tracker.record("a").expect("a");
        let b = tracker.record("b").expect("b");
        let targets = [
            TargetPiece::new("t0", PieceType::Square, PiecePose::new(0.0, 0.0, FRAC_PI_2)),
            TargetPiece::new("t1", PieceType::Square, PiecePose::new(0.0, 1.0, FRAC_PI_2)),
        ];
        let frame =
            GroupFrame::solve(a, &[a, b], &targets, &Validator::default()).expect("frame");
        assert_eq!(frame.confirmations, 1);
        let landed = frame.apply(&a.pose);
        assert_relative_eq!(landed.position.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(landed.position.y, 0.0, epsilon = 1e-9);
        let other = frame.apply(&b.pose);
        assert_relative_eq!(other.position.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn unconfirmed_group_has_no_frame() {
        let pieces = [square("a", 10.0, 10.0), square("b", 13.0, 10.0)];
        let tracker = moved_tracker(&pieces);
        let a = tracker.record("a").expect("a");
        let b = tracker.record("b").expect("b");
        let targets = [
            TargetPiece::new("t0", PieceType::Square, PiecePose::new(0.0, 0.0, 0.0)),
            TargetPiece::new("t1", PieceType::Square, PiecePose::new(0.0, 1.0, 0.0)),
        ];
        assert!(GroupFrame::solve(a, &[a, b], &targets, &Validator::default()).is_none());
    }
}
