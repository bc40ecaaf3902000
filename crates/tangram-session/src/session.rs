use crate::groups::{reserved_targets, ConstructionGroup, GroupFrame, GroupManager};
use crate::lifecycle::{LifecycleTracker, PieceRecord, PieceState, PieceStatus, PieceTransition};
use crate::params::{SessionParams, ValidationGate};
use crate::validator::{ValidationRequest, ValidationResult, Validator};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tangram_convert::{
    CalibrationStore, ConvertError, CoordinateConverter, MemoryCalibrationStore, SkippedObject,
};
use tangram_core::{CvFrame, InternalPuzzleState, TargetPiece};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Everything one frame produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp: f64,
    pub state: InternalPuzzleState,
    pub skipped: Vec<SkippedObject>,
    /// Set when the whole frame was dropped.
    #[serde(default)]
    pub error: Option<ConvertError>,
    pub transitions: Vec<PieceTransition>,
    pub results: Vec<ValidationResult>,
    pub groups: Vec<ConstructionGroup>,
    pub complete: bool,
}

/// Frame-driven puzzle session.
///
/// Owns the converter (and through it the calibration store), the piece
/// table and the group state. Frames must be fed in timestamp order.
pub struct PuzzleSession<S: CalibrationStore = MemoryCalibrationStore> {
    converter: CoordinateConverter<S>,
    lifecycle: LifecycleTracker,
    grouping: GroupManager,
    validator: Validator,
    targets: Vec<TargetPiece>,
    groups: Vec<ConstructionGroup>,
}

impl PuzzleSession<MemoryCalibrationStore> {
    /// Session with an in-memory calibration cache.
    pub fn with_targets(targets: Vec<TargetPiece>, params: SessionParams) -> Self {
        Self::new(targets, params, MemoryCalibrationStore::new())
    }
}

impl<S: CalibrationStore> PuzzleSession<S> {
    pub fn new(targets: Vec<TargetPiece>, params: SessionParams, store: S) -> Self {
        let SessionParams {
            converter,
            lifecycle,
            grouping,
            validation,
        } = params;
        Self {
            converter: CoordinateConverter::new(store, converter),
            lifecycle: LifecycleTracker::new(lifecycle),
            grouping: GroupManager::new(grouping),
            validator: Validator::new(validation),
            targets,
            groups: Vec::new(),
        }
    }

    #[inline]
    pub fn targets(&self) -> &[TargetPiece] {
        &self.targets
    }

    #[inline]
    pub fn converter(&self) -> &CoordinateConverter<S> {
        &self.converter
    }

    #[inline]
    pub fn converter_mut(&mut self) -> &mut CoordinateConverter<S> {
        &mut self.converter
    }

    #[inline]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn record(&self, id: &str) -> Option<&PieceRecord> {
        self.lifecycle.record(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PieceRecord> {
        self.lifecycle.records()
    }

    /// Groups as of the last processed frame.
    #[inline]
    pub fn groups(&self) -> &[ConstructionGroup] {
        &self.groups
    }

    /// Number of targets held by a Validated piece.
    pub fn validated_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| self.holders(&t.id) == 1)
            .count()
    }

    /// Every target has exactly one Validated piece bound to it.
    pub fn is_complete(&self) -> bool {
        !self.targets.is_empty() && self.targets.iter().all(|t| self.holders(&t.id) == 1)
    }

    fn holders(&self, target_id: &str) -> usize {
        self.lifecycle
            .records()
            .filter(|r| {
                r.status() == PieceStatus::Validated
                    && r.assigned_target.as_deref() == Some(target_id)
            })
            .count()
    }

    /// Run one frame through conversion, lifecycle, grouping and validation.
    ///
    /// Frames that cannot be calibrated leave the piece table untouched.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(timestamp = frame.timestamp))
    )]
    pub fn process_frame(&mut self, frame: &CvFrame) -> FrameReport {
        let now = frame.timestamp;
        let conversion = self.converter.convert_to_internal(frame);

        let mut transitions = Vec::new();
        let mut results = Vec::new();
        if conversion.is_calibrated() {
            transitions = self.lifecycle.observe(&conversion.state.pieces, now);
            self.groups = self.grouping.update(&mut self.lifecycle, now);
            self.apply_gate(now, &mut transitions);
            results = self.validate(now, &mut transitions);
            self.link_connections();
        }

        let complete = self.is_complete();
        if complete && transitions.iter().any(|t| t.to == PieceStatus::Validated) {
            info!("puzzle complete at {now:.3}s");
        }
        FrameReport {
            timestamp: now,
            state: conversion.state,
            skipped: conversion.skipped,
            error: conversion.error,
            transitions,
            results,
            groups: self.groups.clone(),
            complete,
        }
    }

    fn group_of(&self, id: &str) -> Option<&ConstructionGroup> {
        self.groups.iter().find(|g| g.contains(id))
    }

    fn apply_gate(&mut self, now: f64, transitions: &mut Vec<PieceTransition>) {
        let placed: Vec<String> = self
            .lifecycle
            .records()
            .filter(|r| r.status() == PieceStatus::Placed)
            .map(|r| r.id.clone())
            .collect();
        let gate = self.lifecycle.params().gate;

        for id in placed {
            let open = match gate {
                ValidationGate::Immediate => true,
                ValidationGate::GroupSettled => self.group_of(&id).is_none_or(|g| {
                    g.members.iter().all(|m| {
                        self.lifecycle
                            .record(m)
                            .is_none_or(|r| r.status() != PieceStatus::Moved)
                    })
                }),
            };
            if !open {
                debug!("{id}: waiting for its group to settle");
                continue;
            }
            if let Some(record) = self.lifecycle.records_mut().get_mut(&id) {
                transitions.extend(record.set_state(PieceState::Validating, now));
            }
        }
    }

    fn validate(&mut self, now: f64, transitions: &mut Vec<PieceTransition>) -> Vec<ValidationResult> {
        let submitted: Vec<&PieceRecord> = self
            .lifecycle
            .records()
            .filter(|r| matches!(r.status(), PieceStatus::Validating | PieceStatus::Invalid))
            .collect();
        if submitted.is_empty() {
            return Vec::new();
        }

        let mut frames: HashMap<&str, Option<GroupFrame>> = HashMap::new();
        let mut requests = Vec::with_capacity(submitted.len());
        for record in &submitted {
            let pose = match self.group_of(&record.id).filter(|g| g.len() > 1) {
                Some(group) => {
                    let frame = frames.entry(group.anchor.as_str()).or_insert_with(|| {
                        self.solve_group(group)
                    });
                    frame.as_ref().map_or(record.pose, |f| f.apply(&record.pose))
                }
                None => record.pose,
            };
            requests.push(ValidationRequest {
                piece_id: record.id.clone(),
                piece_type: record.piece_type,
                pose,
                assigned_target: record.assigned_target.clone(),
            });
        }

        let reserved = reserved_targets(self.lifecycle.records());
        let results = self
            .validator
            .validate_against_pool(&requests, &self.targets, &reserved);

        let records = self.lifecycle.records_mut();
        for result in &results {
            let Some(record) = records.get_mut(&result.piece_id) else {
                continue;
            };
            let state = match (&result.target_id, &result.reason) {
                (Some(target_id), _) => {
                    if record.assigned_target.as_ref() != Some(target_id) {
                        debug!("{} bound to {target_id}", record.id);
                        record.assigned_target = Some(target_id.clone());
                    }
                    PieceState::Validated {
                        target_id: target_id.clone(),
                    }
                }
                (None, Some(reason)) => PieceState::Invalid {
                    reason: reason.clone(),
                },
                (None, None) => continue,
            };
            transitions.extend(record.set_state(state, now));
        }
        results
    }

    fn solve_group(&self, group: &ConstructionGroup) -> Option<GroupFrame> {
        let anchor = self.lifecycle.record(&group.anchor)?;
        let members: Vec<&PieceRecord> = group
            .members
            .iter()
            .filter_map(|m| self.lifecycle.record(m))
            .collect();
        let frame = GroupFrame::solve(anchor, &members, &self.targets, &self.validator);
        match &frame {
            Some(f) => debug!(
                "group of {} anchored by {} maps onto {} ({} confirmed)",
                group.len(),
                group.anchor,
                f.target_id,
                f.confirmations
            ),
            None => debug!(
                "group anchored by {} has no consistent frame, using absolute poses",
                group.anchor
            ),
        }
        frame
    }

    /// Record anchor <-> member links between Validated pieces of a group.
    fn link_connections(&mut self) {
        let mut links: HashMap<String, BTreeSet<String>> = HashMap::new();
        for group in self.groups.iter().filter(|g| g.len() > 1) {
            let validated = |id: &str| {
                self.lifecycle
                    .record(id)
                    .is_some_and(|r| r.status() == PieceStatus::Validated)
            };
            if !validated(&group.anchor) {
                continue;
            }
            for member in group.members.iter().filter(|m| **m != group.anchor) {
                if validated(member) {
                    links
                        .entry(group.anchor.clone())
                        .or_default()
                        .insert(member.clone());
                    links
                        .entry(member.clone())
                        .or_default()
                        .insert(group.anchor.clone());
                }
            }
        }
        for (id, connected) in links {
            if let Some(record) = self.lifecycle.records_mut().get_mut(&id) {
                record.validated_connections.extend(connected);
            }
        }
    }
}

impl<S: CalibrationStore> std::fmt::Debug for PuzzleSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuzzleSession")
            .field("targets", &self.targets.len())
            .field("pieces", &self.lifecycle.records().count())
            .field("groups", &self.groups.len())
            .finish()
    }
}
