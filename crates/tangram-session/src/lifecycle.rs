//! Per-piece lifecycle state machine.
//!
//! ```text
//! Unobserved -> Detected -> Moved -> Placed -> Validating -> Validated
//!                             ^                          \-> Invalid
//!                             \---- renewed displacement ----/
//! ```
//!
//! Displacement is always measured against the reference pose of the current
//! state: the baseline while Detected, the settle pose while Moved and the
//! rest pose from Placed on.

use crate::params::LifecycleParams;
use crate::validator::MismatchReason;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tangram_core::{angle_distance, InternalPiece, PiecePose, PieceType};

/// Lifecycle state with the data each variant needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PieceState {
    Unobserved,
    Detected { baseline: PiecePose },
    Moved { settle_pose: PiecePose, settle_since: f64 },
    Placed { at: f64 },
    Validating,
    Validated { target_id: String },
    Invalid { reason: MismatchReason },
}

/// Fieldless view of [`PieceState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceStatus {
    Unobserved,
    Detected,
    Moved,
    Placed,
    Validating,
    Validated,
    Invalid,
}

impl PieceStatus {
    /// Pieces being manipulated; they take part in construction groups.
    #[inline]
    pub fn is_active(self) -> bool {
        !matches!(self, PieceStatus::Unobserved | PieceStatus::Detected)
    }

    /// Statuses whose reference pose is the rest pose.
    #[inline]
    fn is_resting(self) -> bool {
        matches!(
            self,
            PieceStatus::Placed
                | PieceStatus::Validating
                | PieceStatus::Validated
                | PieceStatus::Invalid
        )
    }
}

impl std::fmt::Display for PieceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PieceStatus::Unobserved => "unobserved",
            PieceStatus::Detected => "detected",
            PieceStatus::Moved => "moved",
            PieceStatus::Placed => "placed",
            PieceStatus::Validating => "validating",
            PieceStatus::Validated => "validated",
            PieceStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

impl PieceState {
    pub fn status(&self) -> PieceStatus {
        match self {
            PieceState::Unobserved => PieceStatus::Unobserved,
            PieceState::Detected { .. } => PieceStatus::Detected,
            PieceState::Moved { .. } => PieceStatus::Moved,
            PieceState::Placed { .. } => PieceStatus::Placed,
            PieceState::Validating => PieceStatus::Validating,
            PieceState::Validated { .. } => PieceStatus::Validated,
            PieceState::Invalid { .. } => PieceStatus::Invalid,
        }
    }
}

/// One state change, in the order it happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceTransition {
    pub piece_id: String,
    pub from: PieceStatus,
    pub to: PieceStatus,
    /// Frame timestamp.
    pub at: f64,
}

/// Everything the session remembers about one physical piece.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceRecord {
    pub id: String,
    pub piece_type: PieceType,
    pub state: PieceState,
    /// Pose at first appearance.
    pub baseline: PiecePose,
    /// Pose when the piece was last Placed.
    pub rest_pose: Option<PiecePose>,
    /// Most recent observed pose.
    pub pose: PiecePose,
    pub last_seen: f64,
    pub last_moved: Option<f64>,
    pub interaction_count: u32,
    pub is_anchor: bool,
    pub assigned_target: Option<String>,
    pub validated_connections: BTreeSet<String>,
    /// Anchor of this piece's group as of the previous frame.
    pub remembered_anchor: Option<String>,
    /// Ordinal of the first entry into Moved since the piece appeared.
    pub(crate) first_move_seq: Option<u64>,
}

impl PieceRecord {
    fn new(piece: &InternalPiece, now: f64) -> Self {
        let pose = piece.pose();
        Self {
            id: piece.id.clone(),
            piece_type: piece.piece_type,
            state: PieceState::Detected { baseline: pose },
            baseline: pose,
            rest_pose: None,
            pose,
            last_seen: now,
            last_moved: None,
            interaction_count: 0,
            is_anchor: false,
            assigned_target: None,
            validated_connections: BTreeSet::new(),
            remembered_anchor: None,
            first_move_seq: None,
        }
    }

    #[inline]
    pub fn status(&self) -> PieceStatus {
        self.state.status()
    }

    /// Replace the state, returning the transition when the status changed.
    pub(crate) fn set_state(&mut self, state: PieceState, at: f64) -> Option<PieceTransition> {
        let from = self.status();
        self.state = state;
        let to = self.status();
        (from != to).then(|| {
            debug!("{}: {from} -> {to} at {at:.3}s", self.id);
            PieceTransition {
                piece_id: self.id.clone(),
                from,
                to,
                at,
            }
        })
    }
}

/// Owns the piece table and advances it frame by frame.
#[derive(Clone, Debug, Default)]
pub struct LifecycleTracker {
    params: LifecycleParams,
    records: BTreeMap<String, PieceRecord>,
    /// Piece ids, most recently moved first.
    recent_moves: VecDeque<String>,
    move_seq: u64,
}

impl LifecycleTracker {
    pub fn new(params: LifecycleParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    #[inline]
    pub fn params(&self) -> &LifecycleParams {
        &self.params
    }

    pub fn record(&self, id: &str) -> Option<&PieceRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PieceRecord> {
        self.records.values()
    }

    pub(crate) fn records_mut(&mut self) -> &mut BTreeMap<String, PieceRecord> {
        &mut self.records
    }

    /// Ids ordered from most to least recently moved.
    ///
    /// Entering Moved and continued motion while Moved both count.
    pub fn recently_moved(&self) -> impl Iterator<Item = &str> {
        self.recent_moves.iter().map(String::as_str)
    }

    /// Feed the pieces observed in one frame.
    pub fn observe(&mut self, pieces: &[InternalPiece], now: f64) -> Vec<PieceTransition> {
        let mut transitions = Vec::new();
        let mut seen = BTreeSet::new();

        for piece in pieces {
            seen.insert(piece.id.as_str());
            let Some(record) = self.records.get_mut(&piece.id) else {
                let record = PieceRecord::new(piece, now);
                debug!("{}: detected at {now:.3}s", record.id);
                transitions.push(PieceTransition {
                    piece_id: record.id.clone(),
                    from: PieceStatus::Unobserved,
                    to: PieceStatus::Detected,
                    at: now,
                });
                self.records.insert(piece.id.clone(), record);
                continue;
            };

            let pose = piece.pose();
            record.pose = pose;
            record.piece_type = piece.piece_type;
            record.last_seen = now;

            let moved_before = record.last_moved;
            let entered_moved = match advance(&self.params, record, pose, now) {
                Step::Stay => false,
                Step::To(state) => {
                    let moved = matches!(state, PieceState::Moved { .. });
                    transitions.extend(record.set_state(state, now));
                    moved
                }
            };
            if entered_moved {
                self.move_seq += 1;
                record.interaction_count += 1;
                record.last_moved = Some(now);
                record.first_move_seq.get_or_insert(self.move_seq);
                record.validated_connections.clear();
            }
            if entered_moved || record.last_moved != moved_before {
                let id = record.id.clone();
                self.recent_moves.retain(|r| *r != id);
                self.recent_moves.push_front(id);
            }
        }

        for record in self.records.values_mut() {
            if seen.contains(record.id.as_str()) || record.status() == PieceStatus::Unobserved {
                continue;
            }
            if now - record.last_seen > self.params.removal_grace {
                transitions.extend(record.set_state(PieceState::Unobserved, now));
                if let Some(target) = record.assigned_target.take() {
                    debug!("{}: released {target}", record.id);
                }
                record.is_anchor = false;
                record.rest_pose = None;
                record.first_move_seq = None;
                record.validated_connections.clear();
                self.recent_moves.retain(|r| *r != record.id);
            }
        }
        transitions
    }
}

enum Step {
    Stay,
    To(PieceState),
}

fn displaced(params: &LifecycleParams, reference: &PiecePose, pose: &PiecePose, limit: f64) -> bool {
    reference.distance_to(pose) > limit
        || angle_distance(reference.rotation, pose.rotation) > params.movement_rotation_threshold
}

fn advance(params: &LifecycleParams, record: &mut PieceRecord, pose: PiecePose, now: f64) -> Step {
    let moved = || PieceState::Moved {
        settle_pose: pose,
        settle_since: now,
    };
    match &mut record.state {
        PieceState::Unobserved => {
            record.baseline = pose;
            Step::To(PieceState::Detected { baseline: pose })
        }
        PieceState::Detected { baseline } => {
            if displaced(params, baseline, &pose, params.movement_threshold) {
                Step::To(moved())
            } else {
                Step::Stay
            }
        }
        PieceState::Moved {
            settle_pose,
            settle_since,
        } => {
            if displaced(params, settle_pose, &pose, params.jitter_threshold) {
                // still in motion, restart the dwell
                *settle_pose = pose;
                *settle_since = now;
                record.last_moved = Some(now);
                Step::Stay
            } else if now - *settle_since >= params.settle_dwell_duration {
                record.rest_pose = Some(pose);
                Step::To(PieceState::Placed { at: now })
            } else {
                Step::Stay
            }
        }
        state if state.status().is_resting() => {
            let rest = record.rest_pose.unwrap_or(record.baseline);
            if displaced(params, &rest, &pose, params.movement_threshold) {
                Step::To(moved())
            } else {
                Step::Stay
            }
        }
        _ => Step::Stay,
    }
}
